//! Engine and Stream Configuration

use serde::{Deserialize, Serialize};

use eqnix_dsp::{DEFAULT_BAND_COUNT, HIGHEST_FREQUENCY, LOWEST_FREQUENCY};

/// Sample rate bounds accepted by [`StreamConfig::validate`]
pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Channel bounds accepted by [`StreamConfig::validate`]
pub const MAX_CHANNELS: u16 = eqnix_dsp::MAX_CHANNELS as u16;

/// Audio stream format as declared by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Number of interleaved channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

impl StreamConfig {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self { sample_rate, channels }
    }

    /// Nyquist frequency in Hz
    pub fn nyquist(&self) -> f64 {
        f64::from(self.sample_rate) / 2.0
    }

    /// Whether rate and channel count are in range; never allocates
    pub fn is_valid(&self) -> bool {
        (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate)
            && (1..=MAX_CHANNELS).contains(&self.channels)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if !(1..=MAX_CHANNELS).contains(&self.channels) {
            return Err(format!("Invalid channel count: {}", self.channels));
        }
        Ok(())
    }
}

/// Layout of the generated log-spaced band set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualizerConfig {
    pub band_count: usize,
    pub lowest_frequency: f64,
    pub highest_frequency: f64,
}

impl Default for EqualizerConfig {
    fn default() -> Self {
        Self {
            band_count: DEFAULT_BAND_COUNT,
            lowest_frequency: LOWEST_FREQUENCY,
            highest_frequency: HIGHEST_FREQUENCY,
        }
    }
}

impl EqualizerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.band_count == 0 || self.band_count > 64 {
            return Err(format!("Invalid band count: {}", self.band_count));
        }
        if !(self.lowest_frequency > 0.0 && self.highest_frequency > self.lowest_frequency) {
            return Err(format!(
                "Invalid frequency range: {}Hz to {}Hz",
                self.lowest_frequency, self.highest_frequency
            ));
        }
        Ok(())
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stream configuration
    pub stream: StreamConfig,

    /// Band layout
    #[serde(default)]
    pub equalizer: EqualizerConfig,

    /// Points on the log grid of each `ResponseUpdated` event
    pub response_points: usize,

    /// Whether the event pump attaches a recomputed response to each batch
    pub emit_response: bool,

    /// Capacity of the control → processor command queue
    pub command_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            equalizer: EqualizerConfig::default(),
            response_points: 256,
            emit_response: true,
            command_capacity: 32,
        }
    }
}

impl EngineConfig {
    /// Default configuration with `band_count` bands over the default range
    pub fn with_bands(band_count: usize) -> Self {
        Self {
            equalizer: EqualizerConfig {
                band_count,
                ..EqualizerConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.stream.validate()?;
        self.equalizer.validate()?;
        if self.command_capacity == 0 {
            return Err("Command capacity must be at least 1".to_string());
        }
        Ok(())
    }
}
