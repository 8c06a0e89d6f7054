//! Equalizer Chain
//!
//! A fixed, ordered cascade of named biquad bands.
//!
//! The chain is split the same way a single filter is:
//!
//! - [`EqualizerChain`] is owned by the audio thread and runs the cascade.
//!   Reconfiguration (sample rate, channel count) goes through `&mut self`
//!   so it can only happen between buffers.
//! - [`ChainController`] is a cloneable, thread-safe handle for the control
//!   and UI threads: per-band edits by id, snapshots, change subscriptions
//!   and response queries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::biquad::{BiquadFilter, FilterHandle, FilterSnapshot};
use crate::coefficients::{FilterParameters, FilterType};
use crate::error::{DspError, DspResult};
use crate::notify::{BandChange, BandId, ChangeNotifier, ChangeSubscriber};
use crate::response::{compute_cascade_response, compute_response, FrequencyResponseSample};

/// Lowest center frequency of the default layout (Hz)
pub const LOWEST_FREQUENCY: f64 = 10.0;

/// Highest edge frequency of the default layout (Hz)
pub const HIGHEST_FREQUENCY: f64 = 20000.0;

/// Number of bands in the default layout
pub const DEFAULT_BAND_COUNT: usize = 10;

/// Most channels a chain can be configured for; history is reserved up front
pub const MAX_CHANNELS: usize = 32;

/// A single-field edit addressed to one band
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterChange {
    Frequency(f64),
    Q(f64),
    GainDb(f64),
    FilterType(FilterType),
    Enabled(bool),
}

struct BandEntry {
    id: BandId,
    handle: FilterHandle,
}

struct ChainShared {
    bands: Vec<BandEntry>,
    index: HashMap<BandId, usize>,
    notifier: ChangeNotifier,
    /// f64 bits
    sample_rate: AtomicU64,
}

/// Thread-safe control handle for an [`EqualizerChain`]
///
/// Every successful edit is published to the chain's [`ChangeNotifier`].
#[derive(Clone)]
pub struct ChainController {
    shared: Arc<ChainShared>,
}

impl ChainController {
    pub fn band_count(&self) -> usize {
        self.shared.bands.len()
    }

    /// Band ids in processing order
    pub fn band_ids(&self) -> Vec<BandId> {
        self.shared.bands.iter().map(|b| b.id.clone()).collect()
    }

    pub fn contains(&self, band_id: &str) -> bool {
        self.shared.index.contains_key(band_id)
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.shared.sample_rate.load(Ordering::Acquire))
    }

    /// Apply one edit to the named band and publish the result
    ///
    /// An unknown id leaves every band untouched.
    pub fn set_parameter(&self, band_id: &str, change: ParameterChange) -> DspResult<BandChange> {
        let entry = self.entry(band_id)?;
        let mut issued = None;
        let publish = |snapshot: &FilterSnapshot| issued = Some(self.publish(entry, snapshot));

        match change {
            ParameterChange::Frequency(f) => entry.handle.update_then(|p| p.frequency = f, publish),
            ParameterChange::Q(q) => entry.handle.update_then(|p| p.q = q, publish),
            ParameterChange::GainDb(g) => entry.handle.update_then(|p| p.gain_db = g, publish),
            ParameterChange::FilterType(t) => entry.handle.update_then(|p| p.filter_type = t, publish),
            ParameterChange::Enabled(e) => entry.handle.set_enabled_then(e, publish),
        };

        debug!("Band {} updated: {:?}", entry.id, change);
        issued.ok_or_else(|| DspError::BandNotFound(band_id.to_string()))
    }

    pub fn set_frequency(&self, band_id: &str, frequency: f64) -> DspResult<BandChange> {
        self.set_parameter(band_id, ParameterChange::Frequency(frequency))
    }

    pub fn set_q(&self, band_id: &str, q: f64) -> DspResult<BandChange> {
        self.set_parameter(band_id, ParameterChange::Q(q))
    }

    pub fn set_gain(&self, band_id: &str, gain_db: f64) -> DspResult<BandChange> {
        self.set_parameter(band_id, ParameterChange::GainDb(gain_db))
    }

    pub fn set_filter_type(&self, band_id: &str, filter_type: FilterType) -> DspResult<BandChange> {
        self.set_parameter(band_id, ParameterChange::FilterType(filter_type))
    }

    pub fn set_enabled(&self, band_id: &str, enabled: bool) -> DspResult<BandChange> {
        self.set_parameter(band_id, ParameterChange::Enabled(enabled))
    }

    /// Replace type, frequency, Q and gain of a band in one edit
    ///
    /// The band keeps the chain's sample rate regardless of
    /// `parameters.sample_rate`.
    pub fn set_parameters(&self, band_id: &str, parameters: FilterParameters) -> DspResult<BandChange> {
        let entry = self.entry(band_id)?;
        let mut issued = None;

        entry.handle.update_then(
            |p| {
                let sample_rate = p.sample_rate;
                *p = parameters;
                p.sample_rate = sample_rate;
            },
            |snapshot| issued = Some(self.publish(entry, snapshot)),
        );

        debug!("Band {} parameters replaced", entry.id);
        issued.ok_or_else(|| DspError::BandNotFound(band_id.to_string()))
    }

    /// Current snapshot of one band
    pub fn band(&self, band_id: &str) -> DspResult<FilterSnapshot> {
        Ok(self.entry(band_id)?.handle.snapshot())
    }

    /// Snapshots of every band in processing order
    pub fn snapshots(&self) -> Vec<(BandId, FilterSnapshot)> {
        self.shared
            .bands
            .iter()
            .map(|b| (b.id.clone(), b.handle.snapshot()))
            .collect()
    }

    /// Publish the current state of every band
    ///
    /// Returns the records that were issued, in band order.
    pub fn emit_all(&self) -> Vec<BandChange> {
        let mut issued = Vec::with_capacity(self.shared.bands.len());
        for entry in &self.shared.bands {
            entry
                .handle
                .snapshot_then(|snapshot| issued.push(self.publish(entry, snapshot)));
        }
        issued
    }

    pub fn subscribe(&self) -> ChangeSubscriber {
        self.shared.notifier.subscribe()
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.shared.notifier
    }

    /// Response of one band at `frequencies`
    pub fn band_response(&self, band_id: &str, frequencies: &[f64]) -> DspResult<Vec<FrequencyResponseSample>> {
        let snapshot = self.band(band_id)?;
        Ok(compute_response(&snapshot.coefficients, self.sample_rate(), frequencies))
    }

    /// Composite response of every enabled band at `frequencies`
    pub fn response(&self, frequencies: &[f64]) -> Vec<FrequencyResponseSample> {
        let snapshots = self.snapshots();
        let stages = snapshots
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(_, s)| &s.coefficients);
        compute_cascade_response(stages, self.sample_rate(), frequencies)
    }

    /// Whether every enabled band is currently an exact identity
    pub fn is_passthrough(&self) -> bool {
        self.shared.bands.iter().all(|b| {
            let s = b.handle.snapshot();
            !s.enabled || s.coefficients.is_identity(0.0)
        })
    }

    fn entry(&self, band_id: &str) -> DspResult<&BandEntry> {
        match self.shared.index.get(band_id) {
            Some(&i) => Ok(&self.shared.bands[i]),
            None => {
                warn!("Parameter change for unknown band '{}'", band_id);
                Err(DspError::BandNotFound(band_id.to_string()))
            }
        }
    }

    /// Redesign every band for `sample_rate` and publish one record per band
    ///
    /// Control side: takes each band's parameter lock. The audio side picks
    /// the new coefficients up on its own and must follow with
    /// [`EqualizerChain::adopt_sample_rate`] to zero its history.
    pub fn set_sample_rate(&self, sample_rate: f64) -> DspResult<Vec<BandChange>> {
        validate_sample_rate(sample_rate)?;
        self.shared.sample_rate.store(sample_rate.to_bits(), Ordering::Release);

        let mut issued = Vec::with_capacity(self.shared.bands.len());
        for entry in &self.shared.bands {
            entry.handle.update_then(
                |p| p.sample_rate = sample_rate,
                |snapshot| issued.push(self.publish(entry, snapshot)),
            );
        }
        debug!("Bands redesigned for {}Hz", sample_rate);
        Ok(issued)
    }

    /// Must run under the band's parameter lock so records for one band
    /// leave in edit order
    fn publish(&self, entry: &BandEntry, snapshot: &FilterSnapshot) -> BandChange {
        self.shared
            .notifier
            .publish_record(BandChange::from_snapshot(entry.id.clone(), snapshot))
    }
}

/// Audio-thread side of the equalizer
///
/// # Real-time Safety
/// The `process_*` methods, [`EqualizerChain::reset`],
/// [`EqualizerChain::set_channel_count`] and
/// [`EqualizerChain::adopt_sample_rate`] perform no allocation, take no lock
/// and never wait. Construction and [`EqualizerChain::set_sample_rate`] do,
/// and must not run on the audio thread.
pub struct EqualizerChain {
    filters: Vec<BiquadFilter>,
    /// Enable state last seen by the audio thread, per band
    enabled: Vec<bool>,
    controller: ChainController,
    channels: usize,
    sample_rate: f64,
    passthrough: bool,
}

impl EqualizerChain {
    /// Build a chain from explicit band definitions, in processing order
    pub fn new(sample_rate: f64, channels: usize, bands: Vec<(BandId, FilterParameters)>) -> DspResult<Self> {
        Self::with_notifier(sample_rate, channels, bands, ChangeNotifier::new())
    }

    /// Like [`EqualizerChain::new`], publishing into an existing notifier
    pub fn with_notifier(
        sample_rate: f64,
        channels: usize,
        bands: Vec<(BandId, FilterParameters)>,
        notifier: ChangeNotifier,
    ) -> DspResult<Self> {
        validate_sample_rate(sample_rate)?;
        validate_channel_count(channels)?;
        if bands.is_empty() {
            return Err(DspError::InvalidBandCount(0));
        }

        let mut entries: Vec<BandEntry> = Vec::new();
        let mut filters: Vec<BiquadFilter> = Vec::new();
        let mut index: HashMap<BandId, usize> = HashMap::new();
        entries
            .try_reserve_exact(bands.len())
            .map_err(|_| DspError::AllocationFailed(format!("{} bands", bands.len())))?;
        filters
            .try_reserve_exact(bands.len())
            .map_err(|_| DspError::AllocationFailed(format!("{} filters", bands.len())))?;
        index
            .try_reserve(bands.len())
            .map_err(|_| DspError::AllocationFailed("band index".to_string()))?;

        for (i, (id, parameters)) in bands.into_iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(DspError::DuplicateBand(id.to_string()));
            }
            let handle = FilterHandle::new(FilterParameters {
                sample_rate,
                ..parameters
            });
            let mut filter = BiquadFilter::with_handle(handle.clone(), channels);
            filter
                .reserve_channels(MAX_CHANNELS)
                .map_err(|_| DspError::AllocationFailed(format!("history for {}", id)))?;
            filters.push(filter);
            entries.push(BandEntry { id, handle });
        }

        info!(
            "Equalizer chain created: {} bands, {} channels, {}Hz",
            entries.len(),
            channels,
            sample_rate
        );

        let band_count = entries.len();
        let controller = ChainController {
            shared: Arc::new(ChainShared {
                bands: entries,
                index,
                notifier,
                sample_rate: AtomicU64::new(sample_rate.to_bits()),
            }),
        };

        let mut chain = Self {
            filters,
            enabled: vec![true; band_count],
            controller,
            channels,
            sample_rate,
            passthrough: false,
        };
        chain.passthrough = chain.sync_bands();
        Ok(chain)
    }

    /// `count` transparent bands on a logarithmic grid between `lowest` and
    /// `highest`
    ///
    /// The range is split into `count` log-spaced segments; each band sits at
    /// the middle of its segment with `Q = center / segment width`. The first
    /// band is a low shelf, the last a high shelf, the rest peaking. Bands are
    /// named `band0..band{count-1}`.
    pub fn log_spaced(sample_rate: f64, channels: usize, count: usize, lowest: f64, highest: f64) -> DspResult<Self> {
        Self::new(sample_rate, channels, log_spaced_layout(sample_rate, count, lowest, highest)?)
    }

    /// The default ten-band layout from 10 Hz to 20 kHz
    pub fn with_default_layout(sample_rate: f64, channels: usize) -> DspResult<Self> {
        Self::log_spaced(sample_rate, channels, DEFAULT_BAND_COUNT, LOWEST_FREQUENCY, HIGHEST_FREQUENCY)
    }

    /// Control handle for other threads
    pub fn controller(&self) -> ChainController {
        self.controller.clone()
    }

    pub fn band_count(&self) -> usize {
        self.filters.len()
    }

    pub fn band_ids(&self) -> Vec<BandId> {
        self.controller.band_ids()
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Whether the last processed buffer was skipped as a pure passthrough
    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    /// Forwarded to [`ChainController::set_parameter`]
    pub fn set_parameter(&self, band_id: &str, change: ParameterChange) -> DspResult<BandChange> {
        self.controller.set_parameter(band_id, change)
    }

    /// Forwarded to [`ChainController::response`]
    pub fn response(&self, frequencies: &[f64]) -> Vec<FrequencyResponseSample> {
        self.controller.response(frequencies)
    }

    /// Filter one frame (one sample per channel) in place
    ///
    /// Extra samples beyond the configured channel count pass through.
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        if self.sync_bands() {
            return;
        }
        self.run_frame(frame);
    }

    /// Filter one frame of `f64` samples in place
    #[inline]
    pub fn process_frame_f64(&mut self, frame: &mut [f64]) {
        if self.sync_bands() {
            return;
        }
        for (channel, sample) in frame.iter_mut().enumerate().take(self.channels) {
            *sample = self.run_channel(*sample, channel);
        }
    }

    /// Filter a single sample of `channel` through every enabled band
    #[inline]
    pub fn process_sample(&mut self, sample: f64, channel: usize) -> f64 {
        self.sync_bands();
        self.run_channel(sample, channel)
    }

    /// Filter an interleaved buffer in place
    ///
    /// Buffer format: `[c0, c1, .., cN, c0, c1, ..]`. A trailing partial
    /// frame is left untouched.
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        if self.sync_bands() {
            return;
        }
        for frame in buffer.chunks_exact_mut(self.channels) {
            self.run_frame(frame);
        }
    }

    /// Zero the history of every band (stream discontinuity)
    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }

    /// Reconfigure for `channels` channels (at most [`MAX_CHANNELS`]);
    /// resets all history
    pub fn set_channel_count(&mut self, channels: usize) -> DspResult<()> {
        validate_channel_count(channels)?;
        for filter in &mut self.filters {
            filter.set_channel_count(channels);
        }
        self.channels = channels;
        Ok(())
    }

    /// Audio-side half of a rate change: record the new rate and zero all
    /// history
    ///
    /// The bands must already have been redesigned with
    /// [`ChainController::set_sample_rate`].
    pub fn adopt_sample_rate(&mut self, sample_rate: f64) -> DspResult<()> {
        validate_sample_rate(sample_rate)?;
        self.sample_rate = sample_rate;
        for filter in &mut self.filters {
            filter.refresh();
            filter.reset();
        }
        Ok(())
    }

    /// Redesign every band for a new sample rate, publish a change record
    /// per band and reset all history
    ///
    /// Takes the band locks; for use when one thread owns both sides.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> DspResult<()> {
        self.controller.set_sample_rate(sample_rate)?;
        self.adopt_sample_rate(sample_rate)?;
        info!("Equalizer reconfigured for {}Hz", sample_rate);
        Ok(())
    }

    /// Pick up coefficient and enable-state changes from the control side
    ///
    /// Returns `true` when the whole chain is an exact passthrough. A band
    /// that was bypassed (or skipped as passthrough) re-enters with zeroed
    /// history, since its stored samples are stale.
    #[inline]
    fn sync_bands(&mut self) -> bool {
        let mut passthrough = true;
        for (filter, was_enabled) in self.filters.iter_mut().zip(self.enabled.iter_mut()) {
            filter.refresh();
            let enabled = filter.is_enabled();
            if enabled != *was_enabled {
                if enabled {
                    filter.reset();
                }
                *was_enabled = enabled;
            }
            if enabled && !filter.active_coefficients().is_identity(0.0) {
                passthrough = false;
            }
        }

        if self.passthrough && !passthrough {
            self.reset();
        }
        self.passthrough = passthrough;
        passthrough
    }

    #[inline]
    fn run_frame(&mut self, frame: &mut [f32]) {
        for (channel, sample) in frame.iter_mut().enumerate().take(self.channels) {
            *sample = self.run_channel(f64::from(*sample), channel) as f32;
        }
    }

    #[inline]
    fn run_channel(&mut self, sample: f64, channel: usize) -> f64 {
        let mut value = sample;
        for (filter, &enabled) in self.filters.iter_mut().zip(self.enabled.iter()) {
            if enabled {
                value = filter.process(value, channel);
            }
        }
        value
    }
}

/// Parameters for the log-spaced layout described on [`EqualizerChain::log_spaced`]
pub fn log_spaced_layout(
    sample_rate: f64,
    count: usize,
    lowest: f64,
    highest: f64,
) -> DspResult<Vec<(BandId, FilterParameters)>> {
    if count == 0 {
        return Err(DspError::InvalidBandCount(count));
    }
    if !(lowest.is_finite() && highest.is_finite() && lowest > 0.0 && highest > lowest) {
        return Err(DspError::InvalidFrequencyRange { lowest, highest });
    }

    let step = (highest / lowest).powf(1.0 / count as f64);
    let mut edge = lowest;

    Ok((0..count)
        .map(|i| {
            let next = edge * step;
            let center = edge + (next - edge) / 2.0;
            let q = center / (next - edge);
            edge = next;

            let filter_type = match i {
                0 => FilterType::LowShelf,
                _ if i == count - 1 => FilterType::HighShelf,
                _ => FilterType::Peaking,
            };

            (
                BandId::indexed(i),
                FilterParameters::new(filter_type, center, q, 0.0, sample_rate),
            )
        })
        .collect())
}

fn validate_channel_count(channels: usize) -> DspResult<()> {
    if (1..=MAX_CHANNELS).contains(&channels) {
        Ok(())
    } else {
        Err(DspError::InvalidChannelCount(channels))
    }
}

fn validate_sample_rate(sample_rate: f64) -> DspResult<()> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(())
    } else {
        Err(DspError::InvalidSampleRate(sample_rate))
    }
}
