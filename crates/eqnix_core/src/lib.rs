//! Eqnix Core - Equalizer Engine
//!
//! This crate wraps the DSP chain for a host application:
//! - Stream and layout configuration with validation
//! - A non-blocking command queue that reconfigures the audio processor
//!   before its next buffer
//! - A typed, serializable event stream for the UI, fed by a background
//!   event pump
//! - Persistent band settings and user presets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Control / UI Thread                     │
//! │  EqualizerEngine ──band edits──▶ ChainController            │
//! │        │  ▲                            │ ChangeNotifier     │
//! │   Command│  │Event ◀── "eqnix-events" pump ◀──┘             │
//! └─────────┼──┼────────────────────────────────────────────────┘
//!           │  │ crossbeam-channel
//!           ▼  │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Audio Thread (host)                    │
//! │   EngineProcessor::process(buffer) ──▶ EqualizerChain       │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod engine;
mod error;
mod message;
mod settings;

pub use config::{EngineConfig, EqualizerConfig, StreamConfig, MAX_CHANNELS, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
pub use engine::{EngineProcessor, EqualizerEngine};
pub use error::{EngineError, EngineResult};
pub use message::{Command, Event};
pub use settings::{BandSettings, EqSettings, UserPreset};

// Re-export DSP types for convenience
pub use eqnix_dsp::{
    BandChange, BandId, ChainController, EqualizerChain, FilterType, FrequencyResponseSample,
    ParameterChange, PRESETS,
};
