//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the equalizer engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("DSP error: {0}")]
    DspError(#[from] eqnix_dsp::DspError),

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,

    #[error("Command queue full - processor is not draining commands")]
    ChannelFull,

    #[error("Unknown preset: {0}")]
    PresetNotFound(String),

    #[error("Settings I/O error: {0}")]
    SettingsIo(String),

    #[error("Failed to parse settings: {0}")]
    SettingsParse(String),

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
