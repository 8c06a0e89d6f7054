//! Message Types for Thread Communication
//!
//! Commands flow from the control thread -> audio processor (applied before
//! the next buffer). Events flow from the engine -> UI thread.
//!
//! Band edits do not travel as commands: they reach the audio thread through
//! the per-band coefficient slots, so the command queue only carries stream
//! reconfiguration.

use serde::{Deserialize, Serialize};

use eqnix_dsp::{BandChange, FrequencyResponseSample};

use crate::config::StreamConfig;

/// Commands sent from the control thread to the audio processor
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Host sample rate changed (Hz)
    SetSampleRate(u32),

    /// Host channel count changed
    SetChannels(u16),

    /// Rate and channel count changed together
    UpdateStreamConfig(StreamConfig),

    /// Stream discontinuity (seek, device switch): zero all history
    Reset,
}

/// Events sent from the engine to the UI thread
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// A band's parameters or coefficients changed
    BandChanged(BandChange),

    /// Composite response after a batch of band changes
    ResponseUpdated {
        sample_rate: f64,
        points: Vec<FrequencyResponseSample>,
    },

    /// The processor applied a new stream format
    StreamReconfigured(StreamConfig),

    /// The processor zeroed its history
    Reset,

    /// A built-in or user preset was applied
    PresetApplied { name: String },

    /// Error occurred
    Error { message: String },
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}
