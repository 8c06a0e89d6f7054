//! Eqnix DSP - Biquad Equalizer Engine
//!
//! This crate provides the signal path of the equalizer:
//! - Coefficient design for eight biquad filter types
//! - Per-channel Direct Form I biquad sections with denormal flushing
//! - A named, fixed-size cascade of bands with live parameter edits
//! - Frequency response evaluation for single bands and whole chains
//! - Change notifications for UI subscribers
//!
//! # Architecture
//!
//! The audio path follows a strict "no allocation, no lock, no wait" rule.
//! Control threads redesign coefficients and publish them through a
//! sequence-locked slot per band; the audio thread adopts a new set only
//! when a complete one is available.

mod biquad;
mod chain;
mod coefficients;
mod error;
mod notify;
mod presets;
mod processor;
mod response;
mod slot;

pub use biquad::{flush_denormal, BiquadFilter, ChannelHistory, FilterHandle, FilterSnapshot};
pub use chain::{
    log_spaced_layout, ChainController, EqualizerChain, ParameterChange, DEFAULT_BAND_COUNT,
    HIGHEST_FREQUENCY, LOWEST_FREQUENCY, MAX_CHANNELS,
};
pub use coefficients::{
    design, normalized_frequency, Coefficients, FilterParameters, FilterType, DEFAULT_SAMPLE_RATE,
    MAX_GAIN_DB, MAX_Q, MIN_GAIN_DB,
};
pub use error::{DspError, DspResult};
pub use notify::{coalesce_latest, BandChange, BandId, ChangeNotifier, ChangeSubscriber};
pub use presets::{apply_gains, apply_preset, find_preset, Preset, PRESETS};
pub use processor::{AudioProcessor, ProcessContext};
pub use response::{
    compute_cascade_response, compute_chain_response, compute_response, log_frequencies,
    magnitude_to_db, transfer, FrequencyResponseSample, ResponseCurve,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let chain = EqualizerChain::with_default_layout(48000.0, 2).unwrap();
        assert_eq!(chain.band_count(), DEFAULT_BAND_COUNT);
        let _ = design(&FilterParameters::default());
    }
}
