//! Audio Processor Trait
//!
//! The interface a host callback drives: process an interleaved `f32`
//! buffer in place, reset on discontinuity.

use crate::chain::EqualizerChain;

/// Context passed to processors containing stream metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessContext {
    pub sample_rate: f64,
    pub channels: usize,
    pub buffer_size: usize,
}

impl ProcessContext {
    pub fn new(sample_rate: f64, channels: usize, buffer_size: usize) -> Self {
        Self {
            sample_rate,
            channels,
            buffer_size,
        }
    }

    /// Number of complete frames in a buffer of `samples` interleaved samples
    pub fn frames(&self, samples: usize) -> usize {
        if self.channels == 0 {
            0
        } else {
            samples / self.channels
        }
    }
}

/// Trait for in-place audio processors
///
/// # Real-time Safety Contract
///
/// Implementors MUST follow these rules in `process()`:
/// - NO heap allocations (no Vec::push, no Box::new, no String)
/// - NO syscalls or lock acquisition
/// - Constant or O(n) time complexity where n = buffer size
pub trait AudioProcessor: Send {
    /// Process audio buffer in-place
    ///
    /// Buffer format is interleaved: [L0, R0, L1, R1, ...]
    fn process(&mut self, buffer: &mut [f32], context: &ProcessContext);

    /// Reset internal state (delay lines)
    fn reset(&mut self);

    /// Human-readable name for debugging/UI
    fn name(&self) -> &'static str;

    /// Whether this processor currently alters the signal
    fn is_enabled(&self) -> bool {
        true
    }
}

impl AudioProcessor for EqualizerChain {
    /// The chain's own channel layout wins over `context.channels`; a
    /// mismatch means the host skipped a reconfiguration and is left to the
    /// control side to fix.
    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        self.process_interleaved(buffer);
    }

    fn reset(&mut self) {
        EqualizerChain::reset(self);
    }

    fn name(&self) -> &'static str {
        "Biquad Equalizer"
    }

    fn is_enabled(&self) -> bool {
        !self.is_passthrough()
    }
}
