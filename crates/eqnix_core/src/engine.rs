//! Equalizer Engine - Main Entry Point
//!
//! The engine wires an [`EqualizerChain`] to the three contexts that touch
//! it:
//!
//! ```text
//!   Control thread ──band edits──▶ ChainController ──slots──▶ Audio thread
//!        │                              │                        ▲
//!        └──────── Command (bounded) ───┼────────────────────────┤
//!                                       ▼                        │
//!                                ChangeNotifier           Notice (bounded)
//!                                       │                        │
//!                               "eqnix-events" pump ◀────────────┘
//!                                       │
//!                                       └──Event──▶ UI thread
//! ```
//!
//! The host owns the audio callback: it takes the [`EngineProcessor`] once
//! with [`EqualizerEngine::take_processor`] and calls
//! [`EngineProcessor::process`] for every buffer.
//!
//! A sample-rate change redesigns every band on the calling thread and
//! queues a command; at the start of the next buffer the processor only
//! records the new format and zeroes its history. Whatever the processor
//! has to report travels back over a preallocated queue and becomes an
//! [`Event`] on the pump thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender, TrySendError};
use tracing::{debug, error, info, warn};

use eqnix_dsp::{
    apply_gains, find_preset, log_frequencies, AudioProcessor, BandChange, ChainController,
    ChangeSubscriber, EqualizerChain, FilterSnapshot, FilterType, FrequencyResponseSample,
    ParameterChange, ProcessContext, ResponseCurve, BandId,
};

use crate::config::{EngineConfig, StreamConfig};
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, Event};

/// How long the event pump waits for a change before re-checking shutdown
const PUMP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Lowest frequency of the response grid attached to events (Hz)
const RESPONSE_START_HZ: f64 = 10.0;

/// Processor → pump report; the pump turns each into an [`Event`]
#[derive(Debug, Clone, Copy, PartialEq)]
enum Notice {
    Reconfigured(StreamConfig),
    Rejected(StreamConfig),
    Reset,
}

/// The control-side engine
///
/// Lives on the UI/main thread. Band edits apply immediately through the
/// chain controller; stream reconfiguration is queued to the processor.
pub struct EqualizerEngine {
    controller: ChainController,

    /// Channel for sending commands to the audio processor
    command_sender: Sender<Command>,

    /// Events from the pump and the processor
    event_receiver: Receiver<Event>,

    /// Kept for control-side events (presets)
    event_sender: Sender<Event>,

    /// Audio-thread half, until the host takes it
    processor: Option<EngineProcessor>,

    /// Handle to the event pump thread
    event_thread: Option<JoinHandle<()>>,

    /// Flag to signal shutdown
    shutdown_flag: Arc<AtomicBool>,

    /// Configuration the engine was built with
    config: EngineConfig,
}

impl EqualizerEngine {
    /// Create an engine with the default configuration
    pub fn new() -> EngineResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with a custom configuration
    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::ConfigError)?;

        let chain = EqualizerChain::log_spaced(
            f64::from(config.stream.sample_rate),
            usize::from(config.stream.channels),
            config.equalizer.band_count,
            config.equalizer.lowest_frequency,
            config.equalizer.highest_frequency,
        )?;
        let controller = chain.controller();

        let (command_sender, command_receiver) = bounded::<Command>(config.command_capacity);
        // At most one notice per command
        let (notice_sender, notice_receiver) = bounded::<Notice>(config.command_capacity);
        let (event_sender, event_receiver) = unbounded::<Event>();
        let dropped_notices = Arc::new(AtomicU64::new(0));

        let shutdown_flag = Arc::new(AtomicBool::new(false));

        // Subscribe before spawning so no change can slip past the pump
        let subscriber = controller.subscribe();
        let pump_events = event_sender.clone();
        let pump_shutdown = Arc::clone(&shutdown_flag);
        let pump_dropped = Arc::clone(&dropped_notices);
        let pump_config = config.clone();

        let event_thread = thread::Builder::new()
            .name("eqnix-events".into())
            .spawn(move || {
                Self::event_pump_main(
                    subscriber,
                    notice_receiver,
                    pump_dropped,
                    pump_events,
                    pump_shutdown,
                    pump_config,
                );
            })
            .map_err(|e| EngineError::ThreadSpawn(e.to_string()))?;

        let processor = EngineProcessor {
            chain,
            commands: command_receiver,
            notices: notice_sender,
            dropped_notices,
            stream: config.stream,
        };

        info!(
            "Engine created: {} bands, {}Hz, {} channels",
            config.equalizer.band_count, config.stream.sample_rate, config.stream.channels
        );

        Ok(Self {
            controller,
            command_sender,
            event_receiver,
            event_sender,
            processor: Some(processor),
            event_thread: Some(event_thread),
            shutdown_flag,
            config,
        })
    }

    /// Hand the audio-thread half to the host; `None` after the first call
    pub fn take_processor(&mut self) -> Option<EngineProcessor> {
        self.processor.take()
    }

    /// A control handle that can be moved to other threads
    pub fn controller(&self) -> ChainController {
        self.controller.clone()
    }

    pub fn band_ids(&self) -> Vec<BandId> {
        self.controller.band_ids()
    }

    /// Apply one edit to a band
    pub fn set_parameter(&self, band_id: &str, change: ParameterChange) -> EngineResult<BandChange> {
        Ok(self.controller.set_parameter(band_id, change)?)
    }

    /// Set gain for a single band (dB, clamped to ±24)
    pub fn set_band_gain(&self, band_id: &str, gain_db: f64) -> EngineResult<BandChange> {
        self.set_parameter(band_id, ParameterChange::GainDb(gain_db))
    }

    pub fn set_band_frequency(&self, band_id: &str, frequency: f64) -> EngineResult<BandChange> {
        self.set_parameter(band_id, ParameterChange::Frequency(frequency))
    }

    pub fn set_band_q(&self, band_id: &str, q: f64) -> EngineResult<BandChange> {
        self.set_parameter(band_id, ParameterChange::Q(q))
    }

    pub fn set_band_type(&self, band_id: &str, filter_type: FilterType) -> EngineResult<BandChange> {
        self.set_parameter(band_id, ParameterChange::FilterType(filter_type))
    }

    pub fn set_band_enabled(&self, band_id: &str, enabled: bool) -> EngineResult<BandChange> {
        self.set_parameter(band_id, ParameterChange::Enabled(enabled))
    }

    /// Apply a built-in preset by name
    pub fn apply_preset(&self, name: &str) -> EngineResult<Vec<BandChange>> {
        let (preset_name, gains) =
            find_preset(name).ok_or_else(|| EngineError::PresetNotFound(name.to_string()))?;
        self.apply_gains(preset_name, gains)
    }

    /// Set every band's gain in order and announce it under `name`
    pub fn apply_gains(&self, name: &str, gains: &[f64]) -> EngineResult<Vec<BandChange>> {
        let changes = apply_gains(&self.controller, gains)?;
        info!("Applied preset '{}'", name);
        self.emit(Event::PresetApplied { name: name.to_string() });
        Ok(changes)
    }

    /// Redesign every band for `sample_rate` and queue the switch for the
    /// processor
    ///
    /// One `BandChanged` record per band is published from this thread.
    pub fn set_sample_rate(&self, sample_rate: u32) -> EngineResult<()> {
        StreamConfig {
            sample_rate,
            ..self.config.stream
        }
        .validate()
        .map_err(EngineError::ConfigError)?;
        self.send_command(Command::SetSampleRate(sample_rate))?;
        self.redesign_for(sample_rate)
    }

    /// Queue a channel-count change for the processor
    pub fn set_channels(&self, channels: u16) -> EngineResult<()> {
        StreamConfig {
            channels,
            ..self.config.stream
        }
        .validate()
        .map_err(EngineError::ConfigError)?;
        self.send_command(Command::SetChannels(channels))
    }

    /// Queue a full stream format change for the processor, redesigning the
    /// bands first if the rate changes
    pub fn update_stream_config(&self, stream: StreamConfig) -> EngineResult<()> {
        stream.validate().map_err(EngineError::ConfigError)?;
        self.send_command(Command::UpdateStreamConfig(stream))?;
        self.redesign_for(stream.sample_rate)
    }

    /// Queue a history reset (stream discontinuity)
    pub fn reset(&self) -> EngineResult<()> {
        self.send_command(Command::Reset)
    }

    /// Publish every band's current state (triggers one `BandChanged` per band)
    pub fn request_state(&self) -> Vec<BandChange> {
        self.controller.emit_all()
    }

    /// Snapshots of every band in processing order
    pub fn snapshots(&self) -> Vec<(BandId, FilterSnapshot)> {
        self.controller.snapshots()
    }

    /// Composite response at arbitrary frequencies
    pub fn response(&self, frequencies: &[f64]) -> Vec<FrequencyResponseSample> {
        self.controller.response(frequencies)
    }

    /// Composite response on the configured log grid
    pub fn response_curve(&self) -> Vec<FrequencyResponseSample> {
        let grid = log_frequencies(
            self.config.response_points,
            RESPONSE_START_HZ,
            self.controller.sample_rate(),
        );
        self.controller.response(&grid)
    }

    /// An additional, independent change subscription
    pub fn subscribe(&self) -> ChangeSubscriber {
        self.controller.subscribe()
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Get next event, waiting up to `timeout`
    pub fn wait_event(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Configuration the engine was built with
    ///
    /// Stream changes applied later are reported through
    /// [`Event::StreamReconfigured`], not reflected here.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Send command to the audio processor without blocking
    fn send_command(&self, command: Command) -> EngineResult<()> {
        debug!("Queueing command {:?}", command);
        self.command_sender.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => EngineError::ChannelFull,
            TrySendError::Disconnected(_) => EngineError::ChannelSendError,
        })
    }

    /// Redesign the bands unless they are already at `sample_rate`
    fn redesign_for(&self, sample_rate: u32) -> EngineResult<()> {
        let sample_rate = f64::from(sample_rate);
        if sample_rate != self.controller.sample_rate() {
            self.controller.set_sample_rate(sample_rate)?;
            info!("Bands redesigned for {}Hz", sample_rate);
        }
        Ok(())
    }

    fn emit(&self, event: Event) {
        if self.event_sender.send(event).is_err() {
            warn!("Event receiver dropped");
        }
    }

    /// Event pump main loop
    ///
    /// Forwards every change record as [`Event::BandChanged`], in issue
    /// order, then optionally one [`Event::ResponseUpdated`] per batch.
    /// Processor notices become stream, reset and error events.
    fn event_pump_main(
        subscriber: ChangeSubscriber,
        mut notices: Receiver<Notice>,
        dropped_notices: Arc<AtomicU64>,
        events: Sender<Event>,
        shutdown_flag: Arc<AtomicBool>,
        config: EngineConfig,
    ) {
        info!("Event pump started");

        let mut curve = ResponseCurve::new();

        while !shutdown_flag.load(Ordering::Acquire) {
            let mut processor_gone = false;

            let running = select! {
                recv(subscriber.receiver()) -> change => match change {
                    Ok(first) => Self::forward_changes(first, &subscriber, &mut curve, &events, &config),
                    Err(_) => false,
                },
                recv(notices) -> notice => match notice {
                    Ok(notice) => Self::forward_notice(notice, &events),
                    Err(_) => {
                        processor_gone = true;
                        true
                    }
                },
                default(PUMP_POLL_INTERVAL) => true,
            };
            if !running {
                break;
            }
            if processor_gone {
                debug!("Processor dropped");
                notices = never();
            }

            let lost = dropped_notices.swap(0, Ordering::Relaxed);
            if lost > 0 {
                warn!("{} processor notices dropped, queue full", lost);
            }
        }

        info!("Event pump stopped");
    }

    /// Forward `first` and everything queued behind it; `false` once the
    /// event receiver is gone
    fn forward_changes(
        first: BandChange,
        subscriber: &ChangeSubscriber,
        curve: &mut ResponseCurve,
        events: &Sender<Event>,
        config: &EngineConfig,
    ) -> bool {
        let mut batch = vec![first];
        batch.extend(subscriber.drain());

        for change in &batch {
            curve.apply(change);
        }

        let delivered = batch
            .into_iter()
            .all(|change| events.send(Event::BandChanged(change)).is_ok());
        if !delivered {
            error!("Event receiver dropped, stopping pump");
            return false;
        }

        if config.emit_response {
            if let Some(sample_rate) = curve.sample_rate() {
                let grid = log_frequencies(config.response_points, RESPONSE_START_HZ, sample_rate);
                let points = curve.response(&grid);
                if events.send(Event::ResponseUpdated { sample_rate, points }).is_err() {
                    return false;
                }
            }
        }
        true
    }

    fn forward_notice(notice: Notice, events: &Sender<Event>) -> bool {
        let event = match notice {
            Notice::Reconfigured(stream) => {
                info!(
                    "Stream reconfigured: {}Hz, {} channels",
                    stream.sample_rate, stream.channels
                );
                Event::StreamReconfigured(stream)
            }
            Notice::Rejected(stream) => {
                let message = stream.validate().err().unwrap_or_else(|| {
                    format!(
                        "Stream configuration {}Hz, {} channels could not be applied",
                        stream.sample_rate, stream.channels
                    )
                });
                warn!("Rejected stream configuration: {}", message);
                Event::error(message)
            }
            Notice::Reset => Event::Reset,
        };

        if events.send(event).is_err() {
            error!("Event receiver dropped, stopping pump");
            return false;
        }
        true
    }
}

impl Drop for EqualizerEngine {
    fn drop(&mut self) {
        // Signal shutdown
        self.shutdown_flag.store(true, Ordering::Release);

        // Wait for the pump to notice
        if let Some(handle) = self.event_thread.take() {
            if handle.join().is_err() {
                error!("Event pump panicked");
            }
        }
    }
}

/// Audio-thread half of the engine
///
/// # Real-time Safety
/// [`EngineProcessor::process`] drains pending commands without blocking,
/// then runs the chain. Applying a command takes no lock and does not
/// allocate: bands were redesigned by the control side, history storage is
/// reserved for [`crate::MAX_CHANNELS`] channels, and reports go into a
/// preallocated queue. A full queue drops the report and bumps a counter
/// that the pump logs.
pub struct EngineProcessor {
    chain: EqualizerChain,
    commands: Receiver<Command>,
    notices: Sender<Notice>,
    dropped_notices: Arc<AtomicU64>,
    stream: StreamConfig,
}

impl EngineProcessor {
    /// Apply pending commands, then filter an interleaved buffer in place
    #[inline]
    pub fn process(&mut self, buffer: &mut [f32]) {
        self.apply_pending_commands();
        self.chain.process_interleaved(buffer);
    }

    /// Apply every queued command; returns how many were applied
    pub fn apply_pending_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
            applied += 1;
        }
        applied
    }

    /// Stream format currently in effect
    pub fn stream_config(&self) -> StreamConfig {
        self.stream
    }

    pub fn chain(&self) -> &EqualizerChain {
        &self.chain
    }

    pub fn controller(&self) -> ChainController {
        self.chain.controller()
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::SetSampleRate(sample_rate) => self.reconfigure(StreamConfig {
                sample_rate,
                ..self.stream
            }),
            Command::SetChannels(channels) => self.reconfigure(StreamConfig {
                channels,
                ..self.stream
            }),
            Command::UpdateStreamConfig(stream) => self.reconfigure(stream),
            Command::Reset => {
                self.chain.reset();
                self.notify(Notice::Reset);
            }
        }
    }

    fn reconfigure(&mut self, next: StreamConfig) {
        if !next.is_valid() {
            self.notify(Notice::Rejected(next));
            return;
        }
        if next == self.stream {
            return;
        }

        if next.sample_rate != self.stream.sample_rate
            && self.chain.adopt_sample_rate(f64::from(next.sample_rate)).is_err()
        {
            self.notify(Notice::Rejected(next));
            return;
        }
        if next.channels != self.stream.channels
            && self.chain.set_channel_count(usize::from(next.channels)).is_err()
        {
            self.notify(Notice::Rejected(next));
            return;
        }
        // Equal rates with a new channel count still start from silence
        self.chain.reset();

        self.stream = next;
        self.notify(Notice::Reconfigured(next));
    }

    fn notify(&self, notice: Notice) {
        if self.notices.try_send(notice).is_err() {
            self.dropped_notices.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl AudioProcessor for EngineProcessor {
    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        EngineProcessor::process(self, buffer);
    }

    fn reset(&mut self) {
        self.chain.reset();
    }

    fn name(&self) -> &'static str {
        "eqnix engine"
    }

    fn is_enabled(&self) -> bool {
        !self.chain.is_passthrough()
    }
}
