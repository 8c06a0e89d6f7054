//! Biquad Filter
//!
//! A single second-order IIR section split across two owners:
//!
//! - [`BiquadFilter`] lives on the audio thread. It owns the per-channel
//!   history and a private copy of the active coefficients.
//! - [`FilterHandle`] is the cheap, cloneable control side. It owns the
//!   parameters and publishes each redesigned coefficient set through a
//!   lock-free slot that the filter polls before every sample.
//!
//! Parameter edits never reset history, so the signal stays continuous
//! across an edit (at the cost of a short transient).

use std::collections::TryReserveError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::coefficients::{design, Coefficients, FilterParameters, FilterType};
use crate::response::{compute_response, FrequencyResponseSample};
use crate::slot::CoefficientSlot;

/// Replace subnormal values with exact zero
///
/// Subnormal arithmetic is dramatically slower on most CPUs, and a decaying
/// IIR tail produces exactly those values once the input goes silent.
#[inline(always)]
pub fn flush_denormal(value: f64) -> f64 {
    if value.abs() < f64::MIN_POSITIVE {
        0.0
    } else {
        value
    }
}

/// The two most recent inputs and outputs of one channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelHistory {
    pub x1: f64,
    pub x2: f64,
    pub y1: f64,
    pub y2: f64,
}

impl ChannelHistory {
    /// Whether every stored value is exactly zero
    pub fn is_silent(&self) -> bool {
        self.x1 == 0.0 && self.x2 == 0.0 && self.y1 == 0.0 && self.y2 == 0.0
    }
}

/// Parameters and coefficients captured together under the parameter lock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSnapshot {
    pub parameters: FilterParameters,
    pub coefficients: Coefficients,
    pub enabled: bool,
}

struct FilterShared {
    parameters: Mutex<FilterParameters>,
    slot: CoefficientSlot,
    enabled: AtomicBool,
}

/// Control-side handle to a filter's parameters
///
/// All setters take `&self` and may be called from any thread. Each one
/// clamps the input, redesigns the coefficients and publishes them before
/// returning, so the returned snapshot is always the designer output for the
/// stored parameters.
#[derive(Clone)]
pub struct FilterHandle {
    shared: Arc<FilterShared>,
}

impl FilterHandle {
    pub fn new(parameters: FilterParameters) -> Self {
        let parameters = parameters.sanitized();
        Self {
            shared: Arc::new(FilterShared {
                parameters: Mutex::new(parameters),
                slot: CoefficientSlot::new(design(&parameters)),
                enabled: AtomicBool::new(true),
            }),
        }
    }

    pub fn parameters(&self) -> FilterParameters {
        *self.shared.parameters.lock()
    }

    /// Latest published coefficients
    pub fn coefficients(&self) -> Coefficients {
        self.shared.slot.read().1
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Consistent view of parameters, coefficients and enable state
    pub fn snapshot(&self) -> FilterSnapshot {
        self.snapshot_then(|_| {})
    }

    pub fn set_parameters(&self, parameters: FilterParameters) -> FilterSnapshot {
        self.update(|p| *p = parameters)
    }

    pub fn set_frequency(&self, frequency: f64) -> FilterSnapshot {
        self.update(|p| p.frequency = frequency)
    }

    pub fn set_q(&self, q: f64) -> FilterSnapshot {
        self.update(|p| p.q = q)
    }

    pub fn set_gain(&self, gain_db: f64) -> FilterSnapshot {
        self.update(|p| p.gain_db = gain_db)
    }

    pub fn set_filter_type(&self, filter_type: FilterType) -> FilterSnapshot {
        self.update(|p| p.filter_type = filter_type)
    }

    /// Change the design sample rate
    ///
    /// A rate that is not positive and finite is ignored.
    pub fn set_sample_rate(&self, sample_rate: f64) -> FilterSnapshot {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            warn!("Ignoring invalid sample rate {}", sample_rate);
            return self.snapshot();
        }
        self.update(|p| p.sample_rate = sample_rate)
    }

    /// Enable or bypass the filter; bypassed filters pass audio untouched
    pub fn set_enabled(&self, enabled: bool) -> FilterSnapshot {
        self.set_enabled_then(enabled, |_| {})
    }

    /// Response of the current coefficients at `frequencies`
    pub fn frequency_response(&self, frequencies: &[f64]) -> Vec<FrequencyResponseSample> {
        let snapshot = self.snapshot();
        compute_response(&snapshot.coefficients, snapshot.parameters.sample_rate, frequencies)
    }

    fn update(&self, edit: impl FnOnce(&mut FilterParameters)) -> FilterSnapshot {
        self.update_then(edit, |_| {})
    }

    /// Apply `edit`, clamp, redesign and publish, then run `then` on the
    /// result before releasing the parameter lock
    ///
    /// `then` observes edits to this filter in the order they were applied.
    pub(crate) fn update_then(
        &self,
        edit: impl FnOnce(&mut FilterParameters),
        then: impl FnOnce(&FilterSnapshot),
    ) -> FilterSnapshot {
        let mut parameters = self.shared.parameters.lock();

        let mut next = *parameters;
        edit(&mut next);
        let next = next.sanitized();
        let coefficients = design(&next);

        *parameters = next;
        self.shared.slot.publish(coefficients);

        let snapshot = FilterSnapshot {
            parameters: next,
            coefficients,
            enabled: self.shared.enabled.load(Ordering::Acquire),
        };
        then(&snapshot);
        snapshot
    }

    pub(crate) fn set_enabled_then(&self, enabled: bool, then: impl FnOnce(&FilterSnapshot)) -> FilterSnapshot {
        let parameters = self.shared.parameters.lock();
        self.shared.enabled.store(enabled, Ordering::Release);

        let snapshot = FilterSnapshot {
            parameters: *parameters,
            coefficients: self.shared.slot.read().1,
            enabled,
        };
        then(&snapshot);
        snapshot
    }

    /// Current snapshot, with `then` run under the parameter lock
    pub(crate) fn snapshot_then(&self, then: impl FnOnce(&FilterSnapshot)) -> FilterSnapshot {
        let parameters = self.shared.parameters.lock();
        let snapshot = FilterSnapshot {
            parameters: *parameters,
            coefficients: self.shared.slot.read().1,
            enabled: self.shared.enabled.load(Ordering::Acquire),
        };
        then(&snapshot);
        snapshot
    }

    #[inline]
    fn slot(&self) -> &CoefficientSlot {
        &self.shared.slot
    }
}

/// Audio-thread side of a biquad section (Direct Form I)
///
/// # Real-time Safety
/// [`BiquadFilter::process`] performs no allocation, takes no lock and never
/// waits: it polls the coefficient slot with one atomic load and only copies
/// a new set when a complete one is available.
pub struct BiquadFilter {
    handle: FilterHandle,
    active: Coefficients,
    version: u64,
    history: Vec<ChannelHistory>,
}

impl BiquadFilter {
    /// Create a filter with its own fresh handle
    pub fn new(parameters: FilterParameters, channels: usize) -> Self {
        Self::with_handle(FilterHandle::new(parameters), channels)
    }

    /// Create the audio-side half for an existing handle
    pub fn with_handle(handle: FilterHandle, channels: usize) -> Self {
        let (version, active) = handle.slot().read();
        Self {
            handle,
            active,
            version,
            history: vec![ChannelHistory::default(); channels],
        }
    }

    /// A control handle that can be moved to another thread
    pub fn handle(&self) -> FilterHandle {
        self.handle.clone()
    }

    /// Filter one sample of `channel`
    ///
    /// A channel index outside the configured count passes through unchanged.
    #[inline]
    pub fn process(&mut self, sample: f64, channel: usize) -> f64 {
        self.refresh();

        let c = self.active;
        let Some(h) = self.history.get_mut(channel) else {
            return sample;
        };

        let y = c.b0 * sample + c.b1 * h.x1 + c.b2 * h.x2 - c.a1 * h.y1 - c.a2 * h.y2;

        h.x2 = flush_denormal(h.x1);
        h.x1 = flush_denormal(sample);
        h.y2 = flush_denormal(h.y1);
        h.y1 = flush_denormal(y);

        y
    }

    /// Adopt the newest published coefficients, if any
    ///
    /// Returns `true` when the active set changed.
    #[inline]
    pub fn refresh(&mut self) -> bool {
        match self.handle.slot().try_read_newer(self.version) {
            Some((version, coefficients)) => {
                self.version = version;
                self.active = coefficients;
                true
            }
            None => false,
        }
    }

    /// Coefficients used for the most recent sample
    pub fn active_coefficients(&self) -> Coefficients {
        self.active
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.shared.enabled.load(Ordering::Relaxed)
    }

    pub fn parameters(&self) -> FilterParameters {
        self.handle.parameters()
    }

    pub fn set_parameters(&self, parameters: FilterParameters) -> FilterSnapshot {
        self.handle.set_parameters(parameters)
    }

    pub fn set_frequency(&self, frequency: f64) -> FilterSnapshot {
        self.handle.set_frequency(frequency)
    }

    pub fn set_q(&self, q: f64) -> FilterSnapshot {
        self.handle.set_q(q)
    }

    pub fn set_gain(&self, gain_db: f64) -> FilterSnapshot {
        self.handle.set_gain(gain_db)
    }

    pub fn set_filter_type(&self, filter_type: FilterType) -> FilterSnapshot {
        self.handle.set_filter_type(filter_type)
    }

    /// Zero all channel history (stream discontinuity)
    pub fn reset(&mut self) {
        self.history.fill(ChannelHistory::default());
    }

    /// Reserve history storage for up to `channels` channels
    pub fn reserve_channels(&mut self, channels: usize) -> Result<(), TryReserveError> {
        self.history
            .try_reserve_exact(channels.saturating_sub(self.history.len()))
    }

    /// Resize history to `channels`, zeroing every entry
    ///
    /// Allocates only when `channels` exceeds the reserved capacity.
    pub fn set_channel_count(&mut self, channels: usize) {
        self.history.clear();
        self.history.resize(channels, ChannelHistory::default());
    }

    pub fn channel_count(&self) -> usize {
        self.history.len()
    }

    /// Channels the history can hold without reallocating
    pub fn channel_capacity(&self) -> usize {
        self.history.capacity()
    }

    pub fn history(&self, channel: usize) -> Option<&ChannelHistory> {
        self.history.get(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const FS: f64 = 44100.0;

    fn peaking(frequency: f64, q: f64, gain_db: f64) -> FilterParameters {
        FilterParameters::new(FilterType::Peaking, frequency, q, gain_db, FS)
    }

    #[test]
    fn test_flush_denormal() {
        assert_eq!(flush_denormal(1e-310), 0.0);
        assert_eq!(flush_denormal(-1e-310), 0.0);
        assert_eq!(flush_denormal(f64::MIN_POSITIVE), f64::MIN_POSITIVE);
        assert_eq!(flush_denormal(0.25), 0.25);
    }

    #[test]
    fn test_identity_passthrough() {
        let mut filter = BiquadFilter::new(peaking(1000.0, 1.0, 0.0), 1);
        for i in 0..64 {
            let x = (i as f64 * 0.1).sin();
            assert_eq!(filter.process(x, 0), x);
        }
    }

    #[test]
    fn test_history_length_matches_channels() {
        let mut filter = BiquadFilter::new(peaking(1000.0, 1.0, 6.0), 2);
        assert_eq!(filter.channel_count(), 2);

        filter.process(1.0, 1);
        assert!(filter.history(0).unwrap().is_silent());
        assert!(!filter.history(1).unwrap().is_silent());

        filter.set_channel_count(6);
        assert_eq!(filter.channel_count(), 6);
        for ch in 0..6 {
            assert!(filter.history(ch).unwrap().is_silent());
        }
    }

    #[test]
    fn test_reserved_channels_do_not_reallocate() {
        let mut filter = BiquadFilter::new(peaking(1000.0, 1.0, 6.0), 2);
        filter.reserve_channels(32).unwrap();
        assert!(filter.channel_capacity() >= 32);
        let storage = filter.history.as_ptr();

        for channels in [6, 1, 32, 2] {
            filter.set_channel_count(channels);
            assert_eq!(filter.channel_count(), channels);
            assert_eq!(filter.history.as_ptr(), storage);
        }
    }

    #[test]
    fn test_out_of_range_channel_passes_through() {
        let mut filter = BiquadFilter::new(peaking(1000.0, 1.0, 12.0), 1);
        assert_eq!(filter.process(0.5, 3), 0.5);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut filter = BiquadFilter::new(peaking(1000.0, 1.0, 6.0), 2);
        for i in 0..100 {
            filter.process((i as f64).sin(), 0);
            filter.process((i as f64).cos(), 1);
        }
        filter.reset();
        assert!(filter.history(0).unwrap().is_silent());
        assert!(filter.history(1).unwrap().is_silent());
    }

    #[test]
    fn test_parameter_change_keeps_history() {
        let mut filter = BiquadFilter::new(peaking(1000.0, 1.0, 6.0), 1);
        for i in 0..100 {
            filter.process((i as f64 * 0.3).sin(), 0);
        }
        let before = *filter.history(0).unwrap();

        filter.set_frequency(2000.0);
        assert_eq!(*filter.history(0).unwrap(), before);

        filter.process(0.0, 0);
        assert_eq!(
            filter.active_coefficients(),
            design(&peaking(2000.0, 1.0, 6.0))
        );
    }

    #[test]
    fn test_setter_snapshot_matches_design() {
        let filter = BiquadFilter::new(peaking(1000.0, 1.0, 0.0), 1);
        let snapshot = filter.set_gain(99.0);
        assert_eq!(snapshot.parameters.gain_db, 24.0);
        assert_eq!(snapshot.coefficients, design(&snapshot.parameters));

        let snapshot = filter.set_filter_type(FilterType::Notch);
        assert_eq!(snapshot.parameters.filter_type, FilterType::Notch);
        assert_eq!(snapshot.coefficients, design(&snapshot.parameters));
    }

    #[test]
    fn test_handle_updates_reach_filter() {
        let mut filter = BiquadFilter::new(peaking(1000.0, 1.0, 0.0), 1);
        let handle = filter.handle();

        handle.set_gain(6.0);
        assert!(filter.refresh());
        assert_eq!(filter.active_coefficients(), handle.coefficients());
        assert!(!filter.refresh());
    }

    #[test]
    fn test_invalid_sample_rate_ignored() {
        let filter = BiquadFilter::new(peaking(1000.0, 1.0, 3.0), 1);
        let snapshot = filter.handle().set_sample_rate(0.0);
        assert_eq!(snapshot.parameters.sample_rate, FS);
    }

    #[test]
    fn test_denormal_flush_settles_to_zero() {
        let mut filter = BiquadFilter::new(peaking(1000.0, 1.0, 12.0), 1);

        filter.process(1.0, 0);
        for _ in 0..200_000 {
            filter.process(0.0, 0);
        }

        let h = filter.history(0).unwrap();
        assert!(h.is_silent(), "history should settle to exact zero: {h:?}");
        for value in [h.x1, h.x2, h.y1, h.y2] {
            assert!(!value.is_subnormal());
        }
    }

    #[test]
    fn test_sine_gain_matches_design() {
        let mut filter = BiquadFilter::new(peaking(1000.0, 1.0, 6.0), 1);
        let mut peak = 0.0_f64;
        for i in 0..20_000 {
            let x = (2.0 * PI * 1000.0 * i as f64 / FS).sin();
            let y = filter.process(x, 0);
            if i >= 16_000 {
                peak = peak.max(y.abs());
            }
        }
        assert!((peak - 1.995).abs() / 1.995 < 0.01, "peak gain was {peak}");
    }
}
