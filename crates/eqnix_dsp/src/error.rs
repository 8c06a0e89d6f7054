//! DSP Error Types

use thiserror::Error;

/// Errors that can occur during DSP operations
///
/// Parameter values are never rejected (they are clamped), so everything here
/// is either a lookup miss on the control path or a construction failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Band not found: {0}")]
    BandNotFound(String),

    #[error("Duplicate band id: {0}")]
    DuplicateBand(String),

    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),

    #[error("Channel count must be at least 1, got {0}")]
    InvalidChannelCount(usize),

    #[error("Band count must be at least 1, got {0}")]
    InvalidBandCount(usize),

    #[error("Invalid frequency range: {lowest}Hz to {highest}Hz")]
    InvalidFrequencyRange { lowest: f64, highest: f64 },

    #[error("Preset has {got} gains but the chain has {expected} bands")]
    PresetBandMismatch { expected: usize, got: usize },

    #[error("Failed to allocate {0}")]
    AllocationFailed(String),
}

/// Result type alias for DSP operations
pub type DspResult<T> = Result<T, DspError>;
