//! Biquad Coefficient Design
//!
//! Closed-form coefficients for the eight supported filter shapes.
//! Peaking, shelf and constant-skirt forms follow the RBJ (Robert
//! Bristow-Johnson) Audio EQ Cookbook; low/high-pass use a resonance
//! construction where Q is the peak height in dB.
//!
//! Everything here is pure: one call to [`design`] evaluates the
//! trigonometry once and returns a coefficient set normalized so that
//! `a0 == 1`.

use std::f64::consts::PI;
use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Lowest gain a band accepts (dB)
pub const MIN_GAIN_DB: f64 = -24.0;

/// Highest gain a band accepts (dB)
pub const MAX_GAIN_DB: f64 = 24.0;

/// Upper bound for Q (or resonance in dB for low/high-pass)
pub const MAX_Q: f64 = 100.0;

/// Sample rate used when none (or a nonsensical one) is supplied
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Shelf slope. 1.0 is the steepest slope without overshoot.
const SHELF_SLOPE: f64 = 1.0;

/// Filter shape of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    AllPass,
    BandPass,
    HighPass,
    HighShelf,
    LowPass,
    LowShelf,
    Notch,
    Peaking,
}

impl FilterType {
    /// Every filter type, in declaration order
    pub const ALL: [FilterType; 8] = [
        FilterType::AllPass,
        FilterType::BandPass,
        FilterType::HighPass,
        FilterType::HighShelf,
        FilterType::LowPass,
        FilterType::LowShelf,
        FilterType::Notch,
        FilterType::Peaking,
    ];

    /// Whether `gain_db` affects this shape
    pub fn uses_gain(self) -> bool {
        matches!(
            self,
            FilterType::Peaking | FilterType::LowShelf | FilterType::HighShelf
        )
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterType::AllPass => "all-pass",
            FilterType::BandPass => "band-pass",
            FilterType::HighPass => "high-pass",
            FilterType::HighShelf => "high-shelf",
            FilterType::LowPass => "low-pass",
            FilterType::LowShelf => "low-shelf",
            FilterType::Notch => "notch",
            FilterType::Peaking => "peaking",
        };
        f.write_str(name)
    }
}

/// Everything the designer needs to produce one coefficient set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParameters {
    pub filter_type: FilterType,
    /// Requested center / corner frequency in Hz
    ///
    /// May exceed Nyquist; the designer works on [`FilterParameters::effective`],
    /// so the request survives a round trip through a lower sample rate.
    pub frequency: f64,
    /// Quality factor; `0` disables the band. Resonance in dB for low/high-pass.
    pub q: f64,
    /// Gain in dB, only meaningful for peaking and shelf shapes
    pub gain_db: f64,
    pub sample_rate: f64,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Peaking,
            frequency: 350.0,
            q: 1.0,
            gain_db: 0.0,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl FilterParameters {
    pub fn new(filter_type: FilterType, frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self {
            filter_type,
            frequency,
            q,
            gain_db,
            sample_rate,
        }
    }

    /// Nyquist frequency for these parameters
    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }

    /// Clamp every field into the domain it is stored in
    ///
    /// NaN collapses to the neutral value of the field (0 Hz, Q 0, 0 dB).
    /// An invalid sample rate falls back to [`DEFAULT_SAMPLE_RATE`]. The
    /// frequency is only bounded below; see [`FilterParameters::effective`].
    pub fn sanitized(self) -> Self {
        let sample_rate = if self.sample_rate.is_finite() && self.sample_rate > 0.0 {
            self.sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };

        Self {
            filter_type: self.filter_type,
            frequency: clamp_or(self.frequency, 0.0, f64::MAX, 0.0),
            q: clamp_or(self.q, 0.0, MAX_Q, 0.0),
            gain_db: clamp_or(self.gain_db, MIN_GAIN_DB, MAX_GAIN_DB, 0.0),
            sample_rate,
        }
    }

    /// The parameters actually designed: sanitized, with the frequency
    /// clamped to `[0, sample_rate / 2]`
    pub fn effective(self) -> Self {
        let p = self.sanitized();
        Self {
            frequency: p.frequency.min(p.nyquist()),
            ..p
        }
    }

    /// Frequency normalized to Nyquist, clamped to `[0, 1]`
    pub fn normalized_frequency(&self) -> f64 {
        normalized_frequency(self.frequency, self.sample_rate)
    }
}

/// `value` clamped to `[min, max]`, with NaN mapped to `nan_value`
fn clamp_or(value: f64, min: f64, max: f64, nan_value: f64) -> f64 {
    if value.is_nan() {
        nan_value
    } else {
        value.clamp(min, max)
    }
}

/// `frequency / nyquist`, clamped to `[0, 1]`
///
/// Shared by the designer and the response analyzer so both agree on ω.
pub fn normalized_frequency(frequency: f64, sample_rate: f64) -> f64 {
    let nf = frequency / (sample_rate / 2.0);
    if nf.is_nan() {
        0.0
    } else {
        nf.clamp(0.0, 1.0)
    }
}

/// Normalized biquad coefficients (`a0` is implicitly 1)
///
/// `H(z) = (b0 + b1·z⁻¹ + b2·z⁻²) / (1 + a1·z⁻¹ + a2·z⁻²)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Coefficients {
    /// Passes the input through unchanged
    pub const IDENTITY: Coefficients = Coefficients::gain(1.0);

    /// Outputs silence
    pub const BLOCK: Coefficients = Coefficients::gain(0.0);

    /// A flat gain with no memory
    pub const fn gain(g: f64) -> Self {
        Self {
            b0: g,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Divide an unnormalized set through by `na0`
    pub fn normalized(nb0: f64, nb1: f64, nb2: f64, na0: f64, na1: f64, na2: f64) -> Self {
        let a0_inv = 1.0 / na0;
        Self {
            b0: nb0 * a0_inv,
            b1: nb1 * a0_inv,
            b2: nb2 * a0_inv,
            a1: na1 * a0_inv,
            a2: na2 * a0_inv,
        }
    }

    /// Biquad with one conjugate zero pair and one conjugate pole pair
    pub fn from_zero_pole(zero: Complex64, pole: Complex64) -> Self {
        Self::normalized(
            1.0,
            -2.0 * zero.re,
            zero.norm_sqr(),
            1.0,
            -2.0 * pole.re,
            pole.norm_sqr(),
        )
    }

    pub fn to_array(self) -> [f64; 5] {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
    }

    pub fn from_array([b0, b1, b2, a1, a2]: [f64; 5]) -> Self {
        Self { b0, b1, b2, a1, a2 }
    }

    /// Whether this set is within `tolerance` of [`Coefficients::IDENTITY`]
    pub fn is_identity(&self, tolerance: f64) -> bool {
        self.to_array()
            .iter()
            .zip(Self::IDENTITY.to_array().iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }

    /// Compute coefficients for the given parameters
    pub fn design(params: &FilterParameters) -> Self {
        design(params)
    }
}

/// Map filter parameters to a normalized coefficient set
///
/// Works on [`FilterParameters::effective`], so this never produces NaN or
/// divides by zero. Boundary behavior per shape:
///
/// | shape      | nf == 0 | nf == 1 | Q <= 0   |
/// |------------|---------|---------|----------|
/// | all-pass   | 1       | 1       | -1       |
/// | band-pass  | 0       | 0       | 1        |
/// | high-pass  | 1       | 0       | 0 dB res |
/// | high-shelf | A²      | 1       | n/a      |
/// | low-pass   | 0       | 1       | 0 dB res |
/// | low-shelf  | 1       | A²      | n/a      |
/// | notch      | 1       | 1       | 0        |
/// | peaking    | 1       | 1       | A²       |
pub fn design(params: &FilterParameters) -> Coefficients {
    let p = params.effective();
    let nf = p.normalized_frequency();
    let q = p.q;

    match p.filter_type {
        FilterType::AllPass => allpass(nf, q),
        FilterType::BandPass => bandpass(nf, q),
        FilterType::HighPass => highpass(nf, q),
        FilterType::LowPass => lowpass(nf, q),
        FilterType::Notch => notch(nf, q),
        // 0 dB is exact identity for every gain shape
        FilterType::Peaking | FilterType::LowShelf | FilterType::HighShelf if p.gain_db == 0.0 => {
            Coefficients::IDENTITY
        }
        FilterType::Peaking => peaking(nf, q, gain_scale(p.gain_db)),
        FilterType::LowShelf => low_shelf(nf, gain_scale(p.gain_db)),
        FilterType::HighShelf => high_shelf(nf, gain_scale(p.gain_db)),
    }
}

/// `A = 10^(gain_db / 40)`, the square root of the linear amplitude
fn gain_scale(gain_db: f64) -> f64 {
    10.0_f64.powf(gain_db / 40.0)
}

#[inline]
fn is_interior(nf: f64) -> bool {
    nf > 0.0 && nf < 1.0
}

fn allpass(nf: f64, q: f64) -> Coefficients {
    if !is_interior(nf) {
        return Coefficients::IDENTITY;
    }
    if q <= 0.0 {
        return Coefficients::gain(-1.0);
    }

    let omega = PI * nf;
    let alpha = omega.sin() / (2.0 * q);
    let k = omega.cos();

    Coefficients::normalized(1.0 - alpha, -2.0 * k, 1.0 + alpha, 1.0 + alpha, -2.0 * k, 1.0 - alpha)
}

fn bandpass(nf: f64, q: f64) -> Coefficients {
    if !is_interior(nf) {
        return Coefficients::BLOCK;
    }
    if q <= 0.0 {
        return Coefficients::IDENTITY;
    }

    let omega = PI * nf;
    let alpha = omega.sin() / (2.0 * q);
    let k = omega.cos();

    Coefficients::normalized(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * k, 1.0 - alpha)
}

fn notch(nf: f64, q: f64) -> Coefficients {
    if !is_interior(nf) {
        return Coefficients::IDENTITY;
    }
    if q <= 0.0 {
        return Coefficients::BLOCK;
    }

    let omega = PI * nf;
    let alpha = omega.sin() / (2.0 * q);
    let k = omega.cos();

    Coefficients::normalized(1.0, -2.0 * k, 1.0, 1.0 + alpha, -2.0 * k, 1.0 - alpha)
}

fn peaking(nf: f64, q: f64, a: f64) -> Coefficients {
    if !is_interior(nf) {
        return Coefficients::IDENTITY;
    }
    if q <= 0.0 {
        return Coefficients::gain(a * a);
    }

    let omega = PI * nf;
    let alpha = omega.sin() / (2.0 * q);
    let k = omega.cos();

    Coefficients::normalized(
        1.0 + alpha * a,
        -2.0 * k,
        1.0 - alpha * a,
        1.0 + alpha / a,
        -2.0 * k,
        1.0 - alpha / a,
    )
}

/// Shelf `alpha` and the `2·sqrt(A)·alpha` term shared by both shelves
fn shelf_terms(omega: f64, a: f64) -> (f64, f64) {
    let alpha = 0.5 * omega.sin() * ((a + 1.0 / a) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt();
    (alpha, 2.0 * a.sqrt() * alpha)
}

fn low_shelf(nf: f64, a: f64) -> Coefficients {
    if nf >= 1.0 {
        return Coefficients::gain(a * a);
    }
    if nf <= 0.0 {
        return Coefficients::IDENTITY;
    }

    let omega = PI * nf;
    let k = omega.cos();
    let (_, k2) = shelf_terms(omega, a);
    let ap1 = a + 1.0;
    let am1 = a - 1.0;

    Coefficients::normalized(
        a * (ap1 - am1 * k + k2),
        2.0 * a * (am1 - ap1 * k),
        a * (ap1 - am1 * k - k2),
        ap1 + am1 * k + k2,
        -2.0 * (am1 + ap1 * k),
        ap1 + am1 * k - k2,
    )
}

fn high_shelf(nf: f64, a: f64) -> Coefficients {
    if nf >= 1.0 {
        return Coefficients::IDENTITY;
    }
    if nf <= 0.0 {
        return Coefficients::gain(a * a);
    }

    let omega = PI * nf;
    let k = omega.cos();
    let (_, k2) = shelf_terms(omega, a);
    let ap1 = a + 1.0;
    let am1 = a - 1.0;

    Coefficients::normalized(
        a * (ap1 + am1 * k + k2),
        -2.0 * a * (am1 + ap1 * k),
        a * (ap1 + am1 * k - k2),
        ap1 - am1 * k + k2,
        2.0 * (am1 - ap1 * k),
        ap1 - am1 * k - k2,
    )
}

/// `(beta, gamma)` of the resonant low/high-pass construction
///
/// `resonance_db` sets the height of the peak near cutoff; 0 dB gives a
/// Butterworth response.
fn resonant_terms(omega: f64, resonance_db: f64) -> (f64, f64) {
    let g = 10.0_f64.powf(0.05 * resonance_db.max(0.0));
    let d = ((4.0 - (16.0 - 16.0 / (g * g)).sqrt()) / 2.0).sqrt();
    let sn = 0.5 * d * omega.sin();
    let beta = 0.5 * (1.0 - sn) / (1.0 + sn);
    let gamma = (0.5 + beta) * omega.cos();
    (beta, gamma)
}

fn lowpass(nf: f64, q: f64) -> Coefficients {
    if nf >= 1.0 {
        return Coefficients::IDENTITY;
    }
    if nf <= 0.0 {
        return Coefficients::BLOCK;
    }

    let (beta, gamma) = resonant_terms(PI * nf, q);
    let alpha = 0.25 * (0.5 + beta - gamma);

    Coefficients::normalized(2.0 * alpha, 4.0 * alpha, 2.0 * alpha, 1.0, -2.0 * gamma, 2.0 * beta)
}

fn highpass(nf: f64, q: f64) -> Coefficients {
    if nf >= 1.0 {
        return Coefficients::BLOCK;
    }
    if nf <= 0.0 {
        return Coefficients::IDENTITY;
    }

    let (beta, gamma) = resonant_terms(PI * nf, q);
    let alpha = 0.25 * (0.5 + beta + gamma);

    Coefficients::normalized(2.0 * alpha, -4.0 * alpha, 2.0 * alpha, 1.0, -2.0 * gamma, 2.0 * beta)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 44100.0;

    fn params(filter_type: FilterType, frequency: f64, q: f64, gain_db: f64) -> FilterParameters {
        FilterParameters::new(filter_type, frequency, q, gain_db, FS)
    }

    /// DC gain: H(1) = sum(b) / (1 + a1 + a2)
    fn dc_gain(c: &Coefficients) -> f64 {
        (c.b0 + c.b1 + c.b2) / (1.0 + c.a1 + c.a2)
    }

    /// Nyquist gain: H(-1) = (b0 - b1 + b2) / (1 - a1 + a2)
    fn nyquist_gain(c: &Coefficients) -> f64 {
        (c.b0 - c.b1 + c.b2) / (1.0 - c.a1 + c.a2)
    }

    #[test]
    fn test_zero_gain_is_identity() {
        for filter_type in [FilterType::Peaking, FilterType::LowShelf, FilterType::HighShelf] {
            for frequency in [0.0, 20.0, 1000.0, 15000.0, FS / 2.0] {
                for q in [0.0, 0.1, 0.707, 4.0, 30.0] {
                    let c = design(&params(filter_type, frequency, q, 0.0));
                    assert!(
                        c.is_identity(1e-9),
                        "{filter_type} at {frequency}Hz q={q} should be identity, got {c:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_all_types_finite_across_domain() {
        for filter_type in FilterType::ALL {
            for frequency in [-10.0, 0.0, 1.0, 1000.0, FS / 2.0, FS, f64::NAN, f64::INFINITY] {
                for q in [-1.0, 0.0, 0.5, 10.0, f64::NAN, f64::INFINITY] {
                    for gain in [-100.0, -6.0, 0.0, 12.0, f64::NAN] {
                        let c = design(&params(filter_type, frequency, q, gain));
                        assert!(c.is_finite(), "{filter_type} f={frequency} q={q} g={gain}: {c:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_nyquist_limits() {
        let ny = FS / 2.0;
        assert_eq!(design(&params(FilterType::LowPass, ny, 1.0, 0.0)), Coefficients::IDENTITY);
        assert_eq!(design(&params(FilterType::HighPass, ny, 1.0, 0.0)), Coefficients::BLOCK);
        assert_eq!(design(&params(FilterType::BandPass, ny, 1.0, 0.0)), Coefficients::BLOCK);
        assert_eq!(design(&params(FilterType::Notch, ny, 1.0, 0.0)), Coefficients::IDENTITY);
        assert_eq!(design(&params(FilterType::HighShelf, ny, 1.0, 6.0)), Coefficients::IDENTITY);

        let low_shelf = design(&params(FilterType::LowShelf, ny, 1.0, 6.0));
        assert!((low_shelf.b0 - 10.0_f64.powf(6.0 / 20.0)).abs() < 1e-12);
    }

    #[test]
    fn test_zero_frequency_limits() {
        assert_eq!(design(&params(FilterType::LowPass, 0.0, 1.0, 0.0)), Coefficients::BLOCK);
        assert_eq!(design(&params(FilterType::HighPass, 0.0, 1.0, 0.0)), Coefficients::IDENTITY);
        assert_eq!(design(&params(FilterType::AllPass, 0.0, 1.0, 0.0)), Coefficients::IDENTITY);
        assert_eq!(design(&params(FilterType::Peaking, 0.0, 1.0, 6.0)), Coefficients::IDENTITY);
        assert_eq!(design(&params(FilterType::LowShelf, 0.0, 1.0, 6.0)), Coefficients::IDENTITY);

        let high_shelf = design(&params(FilterType::HighShelf, 0.0, 1.0, -6.0));
        assert!((high_shelf.b0 - 10.0_f64.powf(-6.0 / 20.0)).abs() < 1e-12);
    }

    #[test]
    fn test_disabled_q() {
        let a2 = 10.0_f64.powf(6.0 / 20.0);
        let peak = design(&params(FilterType::Peaking, 1000.0, 0.0, 6.0));
        assert!((peak.b0 - a2).abs() < 1e-12);
        assert_eq!(design(&params(FilterType::BandPass, 1000.0, 0.0, 0.0)), Coefficients::IDENTITY);
        assert_eq!(design(&params(FilterType::Notch, 1000.0, -3.0, 0.0)), Coefficients::BLOCK);
        assert_eq!(design(&params(FilterType::AllPass, 1000.0, 0.0, 0.0)), Coefficients::gain(-1.0));
    }

    #[test]
    fn test_lowpass_highpass_unity_passband() {
        for q in [0.0, 3.0, 12.0] {
            let lp = design(&params(FilterType::LowPass, 1000.0, q, 0.0));
            assert!((dc_gain(&lp) - 1.0).abs() < 1e-9, "low-pass DC gain at q={q}");
            assert!(nyquist_gain(&lp).abs() < 1e-9, "low-pass Nyquist gain at q={q}");

            let hp = design(&params(FilterType::HighPass, 1000.0, q, 0.0));
            assert!(dc_gain(&hp).abs() < 1e-9, "high-pass DC gain at q={q}");
            assert!((nyquist_gain(&hp) - 1.0).abs() < 1e-9, "high-pass Nyquist gain at q={q}");
        }
    }

    #[test]
    fn test_shelf_dc_and_nyquist_gain() {
        let linear = 10.0_f64.powf(-6.0 / 20.0);

        let low = design(&params(FilterType::LowShelf, 100.0, 1.0, -6.0));
        assert!((dc_gain(&low) - linear).abs() < 1e-9);
        assert!((nyquist_gain(&low) - 1.0).abs() < 1e-9);

        let high = design(&params(FilterType::HighShelf, 5000.0, 1.0, -6.0));
        assert!((dc_gain(&high) - 1.0).abs() < 1e-9);
        assert!((nyquist_gain(&high) - linear).abs() < 1e-9);
    }

    #[test]
    fn test_peaking_flat_at_edges() {
        let c = design(&params(FilterType::Peaking, 1000.0, 1.0, 9.0));
        assert!((dc_gain(&c) - 1.0).abs() < 1e-9);
        assert!((nyquist_gain(&c) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sanitize_clamps() {
        let p = FilterParameters::new(FilterType::Peaking, 50_000.0, -2.0, 40.0, 48000.0).sanitized();
        assert_eq!(p.frequency, 50_000.0);
        assert_eq!(p.effective().frequency, 24000.0);
        assert_eq!(p.q, 0.0);
        assert_eq!(p.gain_db, MAX_GAIN_DB);

        let p = FilterParameters::new(FilterType::Peaking, f64::NAN, f64::NAN, f64::NAN, -1.0).sanitized();
        assert_eq!(p.frequency, 0.0);
        assert_eq!(p.q, 0.0);
        assert_eq!(p.gain_db, 0.0);
        assert_eq!(p.sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_above_nyquist_designs_as_nyquist() {
        for filter_type in FilterType::ALL {
            let above = FilterParameters::new(filter_type, 30_000.0, 2.0, 6.0, 48000.0);
            let at = FilterParameters::new(filter_type, 24_000.0, 2.0, 6.0, 48000.0);
            assert_eq!(design(&above), design(&at), "{filter_type}");
        }
    }

    #[test]
    fn test_from_zero_pole() {
        let zero = Complex64::from_polar(1.0, 0.3);
        let pole = Complex64::from_polar(0.9, 0.3);
        let c = Coefficients::from_zero_pole(zero, pole);
        assert_eq!(c.b0, 1.0);
        assert!((c.b2 - 1.0).abs() < 1e-12);
        assert!((c.a2 - 0.81).abs() < 1e-12);
        assert!((c.a1 + 2.0 * 0.9 * 0.3_f64.cos()).abs() < 1e-12);
    }

    #[test]
    fn test_filter_type_serialization() {
        let json = serde_json::to_string(&FilterType::HighShelf).unwrap();
        assert_eq!(json, "\"high_shelf\"");
        let back: FilterType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FilterType::HighShelf);
    }
}
