//! Frequency Response Analysis
//!
//! Evaluates `H(z)` on the unit circle for a single coefficient set or for a
//! whole cascade. Everything here reads snapshots only, so it can run on the
//! UI thread while the audio thread keeps processing.

use std::collections::HashMap;
use std::f64::consts::PI;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::chain::ChainController;
use crate::coefficients::{normalized_frequency, Coefficients};
use crate::notify::{BandChange, BandId};

/// One point of a frequency response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyResponseSample {
    pub frequency_hz: f64,
    /// Linear amplitude ratio
    pub magnitude: f64,
    pub phase_radians: f64,
}

impl FrequencyResponseSample {
    /// Unity gain, zero phase
    pub fn flat(frequency_hz: f64) -> Self {
        Self {
            frequency_hz,
            magnitude: 1.0,
            phase_radians: 0.0,
        }
    }

    pub fn magnitude_db(&self) -> f64 {
        magnitude_to_db(self.magnitude)
    }
}

/// Linear magnitude to dB; silence maps to `f64::NEG_INFINITY`
pub fn magnitude_to_db(magnitude: f64) -> f64 {
    20.0 * magnitude.log10()
}

/// `H(e^{jω})` for one coefficient set
///
/// Uses the same `ω = π · clamp(f / nyquist, 0, 1)` as the coefficient
/// designer, so the result is the steady-state gain a sinusoid at `frequency`
/// sees through [`crate::BiquadFilter::process`].
#[inline]
pub fn transfer(coefficients: &Coefficients, sample_rate: f64, frequency: f64) -> Complex64 {
    let omega = PI * normalized_frequency(frequency, sample_rate);
    // z here stands for z⁻¹ = e^{-jω}
    let z = Complex64::from_polar(1.0, -omega);
    let c = coefficients;

    let numerator = c.b0 + (c.b1 + c.b2 * z) * z;
    let denominator = 1.0 + (c.a1 + c.a2 * z) * z;
    numerator / denominator
}

/// Response of one coefficient set at each of `frequencies`
pub fn compute_response(
    coefficients: &Coefficients,
    sample_rate: f64,
    frequencies: &[f64],
) -> Vec<FrequencyResponseSample> {
    frequencies
        .iter()
        .map(|&frequency_hz| {
            let h = transfer(coefficients, sample_rate, frequency_hz);
            FrequencyResponseSample {
                frequency_hz,
                magnitude: h.norm(),
                phase_radians: h.arg(),
            }
        })
        .collect()
}

/// Response of a cascade of coefficient sets sharing one sample rate
///
/// Magnitudes multiply and phases add. An empty cascade is flat.
pub fn compute_cascade_response<'a, I>(
    stages: I,
    sample_rate: f64,
    frequencies: &[f64],
) -> Vec<FrequencyResponseSample>
where
    I: IntoIterator<Item = &'a Coefficients>,
{
    let mut total: Vec<FrequencyResponseSample> =
        frequencies.iter().map(|&f| FrequencyResponseSample::flat(f)).collect();

    for coefficients in stages {
        for point in total.iter_mut() {
            let h = transfer(coefficients, sample_rate, point.frequency_hz);
            point.magnitude *= h.norm();
            point.phase_radians += h.arg();
        }
    }

    total
}

/// Composite response of every enabled band of a chain at its current rate
pub fn compute_chain_response(chain: &ChainController, frequencies: &[f64]) -> Vec<FrequencyResponseSample> {
    chain.response(frequencies)
}

/// `count` log-spaced frequencies from `start` up to Nyquist
///
/// The grid the response plot draws on: point `i` sits at
/// `start · 10^(i / m)` with `m = count / log10(nyquist / start)`.
pub fn log_frequencies(count: usize, start: f64, sample_rate: f64) -> Vec<f64> {
    let nyquist = sample_rate / 2.0;
    if count == 0 || !(start > 0.0) || !(nyquist > start) {
        return Vec::new();
    }

    let m = count as f64 / (nyquist / start).log10();
    (0..count)
        .map(|i| start * 10.0_f64.powf(i as f64 / m))
        .collect()
}

/// Subscriber-side model of the chain's response curve
///
/// Fed from [`BandChange`] records. Bands are keyed by id, so a record for a
/// band replaces whatever was cached for it; a record carrying a new sample
/// rate switches the whole curve to that rate.
#[derive(Debug, Clone, Default)]
pub struct ResponseCurve {
    sample_rate: Option<f64>,
    bands: HashMap<BandId, BandChange>,
    order: Vec<BandId>,
}

impl ResponseCurve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one change record into the cache
    pub fn apply(&mut self, change: &BandChange) {
        self.sample_rate = Some(change.sample_rate);

        if !self.bands.contains_key(&change.band_id) {
            self.order.push(change.band_id.clone());
        }
        self.bands.insert(change.band_id.clone(), change.clone());
    }

    /// Sample rate of the most recent record
    pub fn sample_rate(&self) -> Option<f64> {
        self.sample_rate
    }

    pub fn band(&self, band_id: &str) -> Option<&BandChange> {
        self.bands.get(band_id)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Composite response of every enabled cached band
    ///
    /// Returns a flat curve until the first record arrives.
    pub fn response(&self, frequencies: &[f64]) -> Vec<FrequencyResponseSample> {
        let Some(sample_rate) = self.sample_rate else {
            return frequencies.iter().map(|&f| FrequencyResponseSample::flat(f)).collect();
        };

        let stages = self
            .order
            .iter()
            .filter_map(|id| self.bands.get(id))
            .filter(|band| band.enabled)
            .map(|band| &band.coefficients);

        compute_cascade_response(stages, sample_rate, frequencies)
    }

    /// Response of a single cached band
    pub fn band_response(&self, band_id: &str, frequencies: &[f64]) -> Option<Vec<FrequencyResponseSample>> {
        let band = self.bands.get(band_id)?;
        let sample_rate = self.sample_rate.unwrap_or(band.sample_rate);
        Some(compute_response(&band.coefficients, sample_rate, frequencies))
    }
}
