//! Built-in EQ Presets
//!
//! Gain curves for the default ten-band layout. Applying a preset only
//! touches gains; band types, frequencies and Q stay as they are.

use tracing::info;

use crate::chain::ChainController;
use crate::error::{DspError, DspResult};
use crate::notify::BandChange;

/// Named EQ preset with 10 band gains in dB
pub type Preset = (&'static str, [f64; 10]);

/// List of built-in presets
pub const PRESETS: &[Preset] = &[
    ("Flat", [0.0; 10]),
    ("Bass Boost", [6.0, 5.0, 3.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("Treble Boost", [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 3.0, 5.0, 6.0, 6.0]),
    ("Vocal Clarity", [-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 3.0, 2.0, 1.0, 0.0]),
    ("Bass Reduce", [-6.0, -4.0, -2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("Loudness", [4.0, 3.0, 0.0, -1.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0]),
    ("Electronic", [4.0, 3.0, 1.0, 0.0, -2.0, -2.0, 0.0, 1.0, 3.0, 4.0]),
];

/// Look up a built-in preset by name (case-insensitive)
pub fn find_preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|(n, _)| n.eq_ignore_ascii_case(name))
}

/// Set every band's gain from `gains`, in band order
///
/// The gain count must match the chain's band count; on mismatch nothing
/// is changed.
pub fn apply_gains(controller: &ChainController, gains: &[f64]) -> DspResult<Vec<BandChange>> {
    let ids = controller.band_ids();
    if ids.len() != gains.len() {
        return Err(DspError::PresetBandMismatch {
            expected: ids.len(),
            got: gains.len(),
        });
    }

    ids.iter()
        .zip(gains)
        .map(|(id, &gain)| controller.set_gain(id.as_str(), gain))
        .collect()
}

/// Apply a built-in preset to a chain
pub fn apply_preset(controller: &ChainController, preset: &Preset) -> DspResult<Vec<BandChange>> {
    let (name, gains) = preset;
    let changes = apply_gains(controller, gains)?;
    info!("Applied preset '{}'", name);
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::EqualizerChain;

    #[test]
    fn test_presets_within_gain_range() {
        for (name, gains) in PRESETS {
            for gain in gains {
                assert!((-24.0..=24.0).contains(gain), "{name} has out-of-range gain {gain}");
            }
        }
    }

    #[test]
    fn test_find_preset() {
        assert!(find_preset("bass boost").is_some());
        assert!(find_preset("Flat").is_some());
        assert!(find_preset("Nonexistent").is_none());
    }

    #[test]
    fn test_apply_preset_sets_gains() {
        let chain = EqualizerChain::with_default_layout(48000.0, 2).unwrap();
        let controller = chain.controller();
        let subscriber = controller.subscribe();

        let preset = find_preset("Loudness").unwrap();
        let changes = apply_preset(&controller, preset).unwrap();
        assert_eq!(changes.len(), 10);
        assert_eq!(subscriber.drain().len(), 10);

        for ((_, snapshot), expected) in controller.snapshots().iter().zip(preset.1) {
            assert_eq!(snapshot.parameters.gain_db, expected);
        }
    }

    #[test]
    fn test_apply_gains_mismatch_changes_nothing() {
        let chain = EqualizerChain::log_spaced(48000.0, 1, 4, 20.0, 20000.0).unwrap();
        let controller = chain.controller();

        let err = apply_gains(&controller, &[3.0; 10]).unwrap_err();
        assert_eq!(err, DspError::PresetBandMismatch { expected: 4, got: 10 });
        assert!(controller
            .snapshots()
            .iter()
            .all(|(_, s)| s.parameters.gain_db == 0.0));
    }
}
