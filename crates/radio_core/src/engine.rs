//! Audio Engine - main entry point.
//!
//! The `AudioEngine` lives on the caller's thread and exposes a lifecycle
//! plus a synchronous snapshot; the mixer itself runs on a dedicated
//! real-time-priority thread reachable only through a bounded command
//! queue and an unbounded event stream, keeping the UI-thread/audio-thread
//! split explicit at the API boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use radio_dsp::{LevelSnapshot, SpectrumSnapshot, Visualizer, WaveformSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::arbiter::UsbArbiter;
use crate::capability::{
    Capabilities, Category, EqualizerMode, RadioBand, ScanDirection, SourceKind, SourceState,
    TransportAction,
};
use crate::config::EngineConfig;
use crate::ducking::Policy;
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, Event, SinkRegistration, SourceRegistration};
use crate::mixer::{Mixer, SourceContribution};
use crate::sink::{Sink, SinkState};
use crate::source::{GenericSource, RadioBackend, Source, SourceBackend};
use crate::source_id::{SourceId, SourceIdGenerator};

/// Initial and maximum retry intervals for a failed sink: periodically
/// retried with exponential backoff, starting at 1 s and capped at 60 s.
const SINK_RETRY_INITIAL: Duration = Duration::from_secs(1);
const SINK_RETRY_MAX: Duration = Duration::from_secs(60);

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Running,
    Paused,
    Stopping,
    Stopped,
    Disposed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub id: String,
    pub kind: SourceKind,
    pub state: SourceState,
}

/// Synchronous, double-buffered view of engine state. Read by control-plane
/// callers without a channel round-trip; written only by the mixer thread
/// at block boundaries. Metrics/visualization arrays are double-buffered
/// the same way.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub state: EngineState,
    pub active_primary: Option<String>,
    pub master_volume: f32,
    pub balance: f32,
    pub is_muted: bool,
    pub ducking_active: bool,
    pub ducking_level: f32,
    pub peak: f32,
    pub rms: f32,
    pub is_clipping: bool,
    pub sources: Vec<SourceSummary>,
    /// Device path -> owning source id, mirroring `UsbArbiter::list` for
    /// `usbReservations` without a channel round-trip.
    pub usb_reservations: Vec<(String, String)>,
}

impl EngineSnapshot {
    fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            active_primary: None,
            master_volume: 1.0,
            balance: 0.0,
            is_muted: false,
            ducking_active: false,
            ducking_level: 1.0,
            peak: 0.0,
            rms: 0.0,
            is_clipping: false,
            sources: Vec::new(),
            usb_reservations: Vec::new(),
        }
    }
}

/// A registered source plus its assignable mix parameters.
struct SourceEntry {
    source: Box<dyn Source>,
    volume: f32,
    muted: bool,
}

/// A registered sink plus its routing whitelist and failover bookkeeping.
struct SinkEntry {
    sink: Box<dyn Sink>,
    priority: u32,
    whitelist: Option<std::collections::HashSet<SourceId>>,
    /// Interval before the next reconnect attempt once `Failed`; doubles on
    /// every failed retry up to `SINK_RETRY_MAX`, resets to
    /// `SINK_RETRY_INITIAL` as soon as a retry succeeds.
    retry_backoff: Duration,
    /// `None` unless the sink is `Failed` and awaiting its next retry.
    next_retry_at: Option<Instant>,
}

/// State owned exclusively by the mixer thread. Never shared; the
/// `EngineSnapshot` is the only window the rest of the process gets into it.
struct EngineInner {
    mixer: Mixer,
    visualizer: Arc<RwLock<Visualizer>>,
    arbiter: Arc<UsbArbiter>,
    id_gen: Arc<SourceIdGenerator>,
    config: EngineConfig,
    sources: HashMap<SourceId, SourceEntry>,
    active_primary: Option<SourceId>,
    sinks: HashMap<String, SinkEntry>,
    sink_order: Vec<String>,
}

impl EngineInner {
    fn new(
        config: EngineConfig,
        visualizer: Arc<RwLock<Visualizer>>,
        id_gen: Arc<SourceIdGenerator>,
        arbiter: Arc<UsbArbiter>,
    ) -> Self {
        Self {
            mixer: Mixer::new(config.frame, config.meter_decay_ms),
            visualizer,
            arbiter,
            id_gen,
            config,
            sources: HashMap::new(),
            active_primary: None,
            sinks: HashMap::new(),
            sink_order: Vec::new(),
        }
    }

    /// Inserts an already-initialized source built on the caller's thread
    /// (sources are created by the Engine on demand), the source-side
    /// analog of `register_sink`.
    fn register_source(&mut self, registration: SourceRegistration) {
        let id = registration.source.id().clone();
        self.sources.insert(
            id,
            SourceEntry {
                source: registration.source,
                volume: 1.0,
                muted: false,
            },
        );
    }

    /// Looks up a registered source's backend as a `RadioBackend`, or emits
    /// `Event::error` and returns `None` if the id is unknown or the source
    /// isn't a radio tuner.
    fn radio_backend_mut(&mut self, source: &SourceId, events: &Sender<Event>) -> Option<&mut RadioBackend> {
        let entry = match self.sources.get_mut(source) {
            Some(entry) => entry,
            None => {
                events.send(Event::error(format!("unknown source: {source}"))).ok();
                return None;
            }
        };
        let generic = match entry.source.as_any_mut().downcast_mut::<GenericSource>() {
            Some(generic) => generic,
            None => {
                events.send(Event::error(format!("source {source} is not a radio"))).ok();
                return None;
            }
        };
        match generic.backend_mut().as_any_mut().downcast_mut::<RadioBackend>() {
            Some(radio) => Some(radio),
            None => {
                events.send(Event::error(format!("source {source} is not a radio"))).ok();
                None
            }
        }
    }

    /// Inserts a newly built sink, keeping `sink_order` sorted
    /// highest-priority-first (higher `priority` value wins ties first).
    fn register_sink(&mut self, registration: SinkRegistration) {
        let SinkRegistration { name, priority, sink } = registration;
        self.sinks.insert(
            name.clone(),
            SinkEntry {
                sink,
                priority,
                whitelist: None,
                retry_backoff: SINK_RETRY_INITIAL,
                next_retry_at: None,
            },
        );
        self.sink_order.retain(|n| n != &name);
        let pos = self
            .sink_order
            .iter()
            .position(|n| self.sinks[n].priority < priority)
            .unwrap_or(self.sink_order.len());
        self.sink_order.insert(pos, name);
    }

    /// Attempts to reconnect any `Failed` sink whose backoff has elapsed.
    /// Runs once per block, ahead of dispatch, so a recovered sink rejoins
    /// `sink_order`'s dispatch pass the same block it reconnects.
    fn retry_failed_sinks(&mut self, events: &Sender<Event>) {
        let now = Instant::now();
        for sink_name in self.sink_order.clone() {
            let Some(entry) = self.sinks.get_mut(&sink_name) else { continue };
            if entry.sink.state() != SinkState::Failed {
                continue;
            }
            match entry.next_retry_at {
                Some(at) if now < at => continue,
                _ => {}
            }
            if entry.sink.connect(self.config.frame).is_ok() {
                entry.retry_backoff = SINK_RETRY_INITIAL;
                entry.next_retry_at = None;
                info!(sink = %sink_name, "sink recovered");
                events.send(Event::SinkRecovered { sink: sink_name }).ok();
            } else {
                entry.retry_backoff = (entry.retry_backoff * 2).min(SINK_RETRY_MAX);
                entry.next_retry_at = Some(now + entry.retry_backoff);
            }
        }
    }

    fn apply_command(&mut self, command: Command, events: &Sender<Event>) {
        debug!(?command, "applying command");
        match command {
            Command::SetMasterVolume(v) => self.mixer.set_master_volume(v),
            Command::SetBalance(b) => self.mixer.set_balance(b),
            Command::SetMute(m) => self.mixer.set_muted(m),
            Command::SwitchPrimary(id) => self.switch_primary(id, events),
            Command::Transport(action) => self.apply_transport(action, events),
            Command::SpawnEvent { id, kind, policy, priority, duration_ms } => {
                self.spawn_event(id, kind, policy, priority, duration_ms, events)
            }
            Command::SetSourceVolume { source, volume } => {
                if let Some(entry) = self.sources.get_mut(&source) {
                    entry.volume = volume.clamp(0.0, 1.0);
                }
            }
            Command::SetSourceMuted { source, muted } => {
                if let Some(entry) = self.sources.get_mut(&source) {
                    entry.muted = muted;
                }
            }
            Command::SetSinkEnabled { sink, enabled } => {
                if !enabled {
                    if let Some(entry) = self.sinks.get_mut(&sink) {
                        entry.sink.disconnect();
                    }
                }
            }
            Command::SetSinkVolume { sink, volume } => {
                if let Some(entry) = self.sinks.get_mut(&sink) {
                    entry.sink.set_volume(volume.clamp(0.0, 1.0));
                }
            }
            Command::SetRouting { sink, whitelist } => {
                if let Some(entry) = self.sinks.get_mut(&sink) {
                    entry.whitelist = whitelist.map(|ids| ids.into_iter().collect());
                }
            }
            Command::TuneRadio { source, frequency } => {
                if let Some(radio) = self.radio_backend_mut(&source, events) {
                    radio.set_frequency(frequency);
                }
            }
            Command::SetRadioBand { source, band } => {
                if let Some(radio) = self.radio_backend_mut(&source, events) {
                    radio.set_band(band);
                }
            }
            Command::SetRadioScanning { source, direction } => {
                if let Some(radio) = self.radio_backend_mut(&source, events) {
                    radio.set_scanning(direction);
                }
            }
            Command::SetRadioEqualizerMode { source, mode } => {
                if let Some(radio) = self.radio_backend_mut(&source, events) {
                    radio.set_equalizer_mode(mode);
                }
            }
            Command::RemoveSource(id) => self.remove_source(&id, events),
            Command::ReservationSweep(id) => self.arbiter.release_all(&id),
            Command::RequestState => {}
            Command::Shutdown => {}
        }
    }

    /// Stops and disposes a registered source, then releases any USB
    /// reservation it still holds and drops it from every bookkeeping
    /// structure.
    fn remove_source(&mut self, id: &SourceId, events: &Sender<Event>) {
        if let Some(mut entry) = self.sources.remove(id) {
            let _ = entry.source.stop();
            entry.source.dispose();
            events
                .send(Event::SourceStateChanged {
                    source: id.to_string(),
                    state: "Disposed".to_string(),
                })
                .ok();
        }
        if self.active_primary.as_ref() == Some(id) {
            self.active_primary = None;
        }
        self.arbiter.release_all(id);
        self.mixer.ducking_mut().release(id);
    }

    fn switch_primary(&mut self, incoming: SourceId, events: &Sender<Event>) {
        if let Some(outgoing) = self.active_primary.take() {
            if let Some(entry) = self.sources.get_mut(&outgoing) {
                let _ = entry.source.stop_with_fade();
                events
                    .send(Event::SourceStateChanged {
                        source: outgoing.to_string(),
                        state: format!("{:?}", entry.source.state()),
                    })
                    .ok();
            }
        }
        if let Some(entry) = self.sources.get_mut(&incoming) {
            if entry.source.category() == Category::Primary {
                if entry.source.play().is_ok() {
                    self.active_primary = Some(incoming.clone());
                    events
                        .send(Event::PrimarySwitched {
                            source: incoming.to_string(),
                        })
                        .ok();
                }
            }
        }
    }

    /// `transport` verb handling: `Next`/`Previous` have no backend
    /// support in this engine (real queue-aware primaries are external
    /// collaborators) and always report `Unsupported` without touching
    /// source state.
    fn apply_transport(&mut self, action: TransportAction, events: &Sender<Event>) {
        let Some(primary) = self.active_primary.clone() else {
            events.send(Event::error("no primary source")).ok();
            return;
        };
        let Some(entry) = self.sources.get_mut(&primary) else {
            events.send(Event::error(format!("unknown source: {primary}"))).ok();
            return;
        };
        let caps = entry.source.capabilities();
        let result = match action {
            TransportAction::Play => entry.source.play(),
            TransportAction::Pause if caps.contains(Capabilities::PAUSE) => entry.source.pause(),
            TransportAction::Pause => Err(EngineError::Unsupported("pause".into())),
            TransportAction::Stop => entry.source.stop(),
            TransportAction::Seek(pos) if caps.contains(Capabilities::SEEK) => entry.source.seek(pos),
            TransportAction::Seek(_) => Err(EngineError::Unsupported("seek".into())),
            TransportAction::Next | TransportAction::Previous => {
                Err(EngineError::Unsupported("next/previous".into()))
            }
        };
        match result {
            Ok(()) => {
                events
                    .send(Event::SourceStateChanged {
                        source: primary.to_string(),
                        state: format!("{:?}", entry.source.state()),
                    })
                    .ok();
            }
            Err(e) => {
                events.send(Event::error(e)).ok();
            }
        }
    }

    fn spawn_event(
        &mut self,
        id: SourceId,
        kind: SourceKind,
        policy_kind: crate::ducking::DuckingPolicy,
        priority: u8,
        duration_ms: u32,
        events: &Sender<Event>,
    ) {
        use crate::source::ClipBackend;
        let block_period_ms = self.config.frame.block_period().as_secs_f32() * 1000.0;
        let backend = ClipBackend::new(880.0, duration_ms, block_period_ms);
        let mut source = GenericSource::new(id.clone(), kind, Box::new(backend));
        if source.mark_ready().is_err() || source.play().is_err() {
            events.send(Event::error("failed to start event source")).ok();
            return;
        }
        let mut policy = Policy::from_defaults(self.config.ducking, policy_kind);
        policy.priority = priority;
        self.mixer.ducking_mut().engage(id.clone(), policy, None);
        self.sources.insert(
            id.clone(),
            SourceEntry {
                source: Box::new(source),
                volume: 1.0,
                muted: false,
            },
        );
        events
            .send(Event::SourceStateChanged {
                source: id.to_string(),
                state: "Playing".to_string(),
            })
            .ok();
    }

    /// Runs one block: pull from every source, mix, dispatch to sinks, and
    /// garbage-collect completed event sources.
    fn process_block(&mut self, snapshot: &Arc<RwLock<EngineSnapshot>>, events: &Sender<Event>) {
        self.retry_failed_sinks(events);

        let frame = self.config.frame;
        let ids: Vec<SourceId> = self.sources.keys().cloned().collect();
        let mut contributions = Vec::with_capacity(ids.len());
        let mut to_dispose = Vec::new();

        for id in &ids {
            let entry = self.sources.get_mut(id).expect("key from own map");
            let mut block = vec![0.0f32; frame.block_len()];
            entry.source.produce(frame, &mut block);
            let category = entry.source.category();
            contributions.push(SourceContribution {
                id: id.clone(),
                category,
                volume: entry.volume,
                muted: entry.muted,
                samples: block,
            });
            if category == Category::Event && entry.source.state() == SourceState::Disposed {
                to_dispose.push(id.clone());
            }
        }

        let mix_block = self.mixer.process_block(&contributions);
        self.visualizer.write().process(&mix_block.master);

        for id in &to_dispose {
            self.sources.remove(id);
            self.arbiter.release_all(id);
            self.mixer.ducking_mut().release(id);
        }

        for sink_name in self.sink_order.clone() {
            let Some(entry) = self.sinks.get_mut(&sink_name) else { continue };
            if entry.sink.state() != SinkState::Streaming {
                continue;
            }
            let routed = self.mixer.route_for_sink(&mix_block, entry.whitelist.as_ref());
            if entry.sink.write_block(&routed).is_err() {
                warn!(sink = %sink_name, "sink write failed, marking failed");
                entry.next_retry_at = Some(Instant::now() + entry.retry_backoff);
                events.send(Event::SinkFailed { sink: sink_name.clone() }).ok();
                self.promote_next_sink(&sink_name, events);
            }
        }

        if mix_block.state.is_clipping {
            events.send(Event::ClipDetected { peak: mix_block.state.peak }).ok();
        }

        let mut snap = snapshot.write();
        snap.active_primary = self.active_primary.as_ref().map(|id| id.to_string());
        snap.master_volume = mix_block.state.master_volume;
        snap.balance = mix_block.state.balance;
        snap.is_muted = mix_block.state.is_muted;
        snap.ducking_active = !self.mixer.ducking_mut().is_idle();
        snap.ducking_level = mix_block.state.ducking_envelope.primary_gain;
        snap.peak = mix_block.state.peak;
        snap.rms = mix_block.state.rms;
        snap.is_clipping = mix_block.state.is_clipping;
        snap.sources = self
            .sources
            .iter()
            .map(|(id, entry)| SourceSummary {
                id: id.to_string(),
                kind: entry.source.kind(),
                state: entry.source.state(),
            })
            .collect();
        snap.usb_reservations = self
            .arbiter
            .list()
            .into_iter()
            .map(|(device, owner)| (device, owner.to_string()))
            .collect();
    }

    fn promote_next_sink(&mut self, failed: &str, events: &Sender<Event>) {
        if let Some(pos) = self.sink_order.iter().position(|s| s == failed) {
            if let Some(next) = self.sink_order.get(pos + 1).cloned() {
                if let Some(entry) = self.sinks.get_mut(&next) {
                    if entry.sink.connect(self.config.frame).is_ok() {
                        events.send(Event::SinkPromoted { sink: next }).ok();
                    }
                }
            }
        }
    }
}

/// The main audio engine controller. Lives on the caller's thread; all
/// mutation crosses the bounded command queue, all observation is via the
/// synchronous snapshot or the event stream.
pub struct AudioEngine {
    command_sender: Sender<Command>,
    sink_sender: Sender<SinkRegistration>,
    source_sender: Sender<SourceRegistration>,
    event_receiver: Receiver<Event>,
    mixer_thread: Option<JoinHandle<()>>,
    shutdown_flag: Arc<AtomicBool>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
    visualizer: Arc<RwLock<Visualizer>>,
    id_gen: Arc<SourceIdGenerator>,
    arbiter: Arc<UsbArbiter>,
    config: EngineConfig,
}

impl AudioEngine {
    pub fn new() -> EngineResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let (command_sender, command_receiver) = bounded::<Command>(64);
        let (sink_sender, sink_receiver) = unbounded::<SinkRegistration>();
        let (source_sender, source_receiver) = unbounded::<SourceRegistration>();
        let (event_sender, event_receiver) = unbounded::<Event>();

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let snapshot = Arc::new(RwLock::new(EngineSnapshot::new()));
        let id_gen = Arc::new(SourceIdGenerator::new());
        let arbiter = Arc::new(UsbArbiter::new());

        let vis = config.visualizer;
        let block_period_ms = config.frame.block_period().as_secs_f32() * 1000.0;
        let visualizer = Visualizer::new(
            config.frame.sample_rate as f32,
            config.frame.channels as usize,
            vis.fft_size,
            vis.use_window,
            vis.smoothing,
            vis.peak_hold_ms as f32,
            block_period_ms,
            vis.waveform_len,
        )
        .map_err(EngineError::from)?;
        let visualizer = Arc::new(RwLock::new(visualizer));

        let shutdown_clone = Arc::clone(&shutdown_flag);
        let snapshot_clone = Arc::clone(&snapshot);
        let visualizer_clone = Arc::clone(&visualizer);
        let id_gen_clone = Arc::clone(&id_gen);
        let arbiter_clone = Arc::clone(&arbiter);
        let config_clone = config.clone();

        let mixer_thread = thread::Builder::new()
            .name("radio-mixer".into())
            .spawn(move || {
                Self::mixer_thread_main(
                    command_receiver,
                    sink_receiver,
                    source_receiver,
                    event_sender,
                    shutdown_clone,
                    snapshot_clone,
                    visualizer_clone,
                    id_gen_clone,
                    arbiter_clone,
                    config_clone,
                );
            })
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        Ok(Self {
            command_sender,
            sink_sender,
            source_sender,
            event_receiver,
            mixer_thread: Some(mixer_thread),
            shutdown_flag,
            snapshot,
            visualizer,
            id_gen,
            arbiter,
            config,
        })
    }

    fn mixer_thread_main(
        commands: Receiver<Command>,
        sinks: Receiver<SinkRegistration>,
        sources: Receiver<SourceRegistration>,
        events: Sender<Event>,
        shutdown: Arc<AtomicBool>,
        snapshot: Arc<RwLock<EngineSnapshot>>,
        visualizer: Arc<RwLock<Visualizer>>,
        id_gen: Arc<SourceIdGenerator>,
        arbiter: Arc<UsbArbiter>,
        config: EngineConfig,
    ) {
        info!("mixer thread starting");
        let mut inner = EngineInner::new(config.clone(), visualizer, id_gen, arbiter);
        snapshot.write().state = EngineState::Ready;
        let block_period = config.frame.block_period();

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            match commands.recv_timeout(block_period) {
                Ok(Command::Shutdown) => break,
                Ok(cmd) => inner.apply_command(cmd, &events),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            for registration in sinks.try_iter() {
                info!(sink = %registration.name, "sink registered");
                inner.register_sink(registration);
            }
            for registration in sources.try_iter() {
                info!(source = %registration.source.id(), "source registered");
                inner.register_source(registration);
            }
            if snapshot.read().state == EngineState::Running {
                inner.process_block(&snapshot, &events);
            }
        }

        snapshot.write().state = EngineState::Stopped;
        events.send(Event::Stopped).ok();
        info!("mixer thread stopped");
    }

    pub fn start(&self) -> EngineResult<()> {
        let mut snap = self.snapshot.write();
        if snap.state == EngineState::Running {
            return Err(EngineError::AlreadyRunning);
        }
        snap.state = EngineState::Running;
        drop(snap);
        info!("engine started");
        Ok(())
    }

    pub fn pause(&self) -> EngineResult<()> {
        let mut snap = self.snapshot.write();
        if snap.state != EngineState::Running {
            return Err(EngineError::NotRunning);
        }
        snap.state = EngineState::Paused;
        Ok(())
    }

    pub fn resume(&self) -> EngineResult<()> {
        let mut snap = self.snapshot.write();
        if snap.state != EngineState::Paused {
            return Err(EngineError::NotRunning);
        }
        snap.state = EngineState::Running;
        Ok(())
    }

    pub fn stop(&self) -> EngineResult<()> {
        let mut snap = self.snapshot.write();
        snap.state = EngineState::Stopping;
        drop(snap);
        self.send(Command::Shutdown)?;
        info!("engine stop requested");
        Ok(())
    }

    pub fn switch_primary(&self, source: SourceId) -> EngineResult<()> {
        self.send(Command::SwitchPrimary(source))
    }

    pub fn transport(&self, action: TransportAction) -> EngineResult<()> {
        self.send(Command::Transport(action))
    }

    /// `spawnEvent`: returns the new event source's id
    /// synchronously, minted off the shared generator before the spawn
    /// command even reaches the mixer thread.
    pub fn spawn_event(
        &self,
        kind: SourceKind,
        policy: crate::ducking::DuckingPolicy,
        priority: u8,
        duration_ms: u32,
    ) -> EngineResult<SourceId> {
        let id = self.id_gen.next(kind);
        self.send(Command::SpawnEvent { id: id.clone(), kind, policy, priority, duration_ms })?;
        Ok(id)
    }

    /// Builds and registers a Primary-category source (`listSources` /
    /// `switchPrimary` need something to list and switch to).
    /// The id is minted synchronously off the shared generator so the
    /// caller can act on it (e.g. `switch_primary`) before the registration
    /// has even reached the mixer thread.
    pub fn register_source(&self, kind: SourceKind, backend: Box<dyn SourceBackend>) -> EngineResult<SourceId> {
        let id = self.id_gen.next(kind);
        let mut source = GenericSource::new(id.clone(), kind, backend);
        source.mark_ready()?;
        self.source_sender
            .send(SourceRegistration { source: Box::new(source), device_path: None })
            .map_err(|_| EngineError::Busy("source registration channel closed".into()))?;
        Ok(id)
    }

    /// Convenience constructor for a `Radio`-kind source, wired to a fresh
    /// `RadioBackend` tuned to `frequency` on `band`.
    pub fn register_radio(&self, frequency: f32, band: RadioBand) -> EngineResult<SourceId> {
        let block_period_ms = self.config.frame.block_period().as_secs_f32() * 1000.0;
        let backend = RadioBackend::new(band, frequency, block_period_ms);
        self.register_source(SourceKind::Radio, Box::new(backend))
    }

    /// Registers a source that exclusively owns a physical device path:
    /// reserves `device_path` synchronously before the source ever reaches
    /// the mixer thread, returning `EngineError::Busy` with the current
    /// owner if another source already holds it.
    /// The reservation is released when the source is later removed via
    /// [`AudioEngine::remove_source`] or when it self-disposes.
    pub fn register_exclusive_source(
        &self,
        kind: SourceKind,
        backend: Box<dyn SourceBackend>,
        device_path: impl Into<String>,
    ) -> EngineResult<SourceId> {
        let device_path = device_path.into();
        let id = self.id_gen.next(kind);
        if let Err(_conflict) = self.arbiter.reserve(&device_path, id.clone()) {
            let owner = self.arbiter.owner_of(&device_path).map(|o| o.to_string()).unwrap_or_default();
            return Err(EngineError::Busy(format!("{device_path} held by {owner}")));
        }
        let mut source = GenericSource::new(id.clone(), kind, backend);
        if let Err(e) = source.mark_ready() {
            let _ = self.arbiter.release(&device_path, &id);
            return Err(e);
        }
        if self
            .source_sender
            .send(SourceRegistration { source: Box::new(source), device_path: Some(device_path.clone()) })
            .is_err()
        {
            let _ = self.arbiter.release(&device_path, &id);
            return Err(EngineError::Busy("source registration channel closed".into()));
        }
        Ok(id)
    }

    /// Convenience constructor for a `Vinyl`-kind source bound to the
    /// turntable's exclusive USB device path. The actual phono-preamp
    /// capture is an external hardware collaborator out of scope here;
    /// this registers a silent backend through the same reservation path
    /// a real driver would use.
    pub fn register_vinyl(&self, device_path: impl Into<String>) -> EngineResult<SourceId> {
        self.register_exclusive_source(SourceKind::Vinyl, Box::new(crate::source::SilenceSource), device_path)
    }

    /// Stops, disposes, and removes a registered source, releasing any USB
    /// reservation it still holds.
    pub fn remove_source(&self, source: SourceId) -> EngineResult<()> {
        self.send(Command::RemoveSource(source))
    }

    pub fn tune_radio(&self, source: SourceId, frequency: f32) -> EngineResult<()> {
        self.send(Command::TuneRadio { source, frequency })
    }

    pub fn set_radio_band(&self, source: SourceId, band: RadioBand) -> EngineResult<()> {
        self.send(Command::SetRadioBand { source, band })
    }

    pub fn set_radio_scanning(&self, source: SourceId, direction: Option<ScanDirection>) -> EngineResult<()> {
        self.send(Command::SetRadioScanning { source, direction })
    }

    pub fn set_radio_equalizer_mode(&self, source: SourceId, mode: EqualizerMode) -> EngineResult<()> {
        self.send(Command::SetRadioEqualizerMode { source, mode })
    }

    pub fn set_master_volume(&self, volume: f32) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(EngineError::OutOfRange("master_volume".into()));
        }
        self.send(Command::SetMasterVolume(volume))
    }

    pub fn set_balance(&self, balance: f32) -> EngineResult<()> {
        if !(-1.0..=1.0).contains(&balance) {
            return Err(EngineError::OutOfRange("balance".into()));
        }
        self.send(Command::SetBalance(balance))
    }

    pub fn set_muted(&self, muted: bool) -> EngineResult<()> {
        self.send(Command::SetMute(muted))
    }

    /// Hands a freshly built sink to the mixer thread. Dispatch order is
    /// determined by `priority` (higher wins ties first), not call order.
    pub fn register_sink(&self, name: impl Into<String>, priority: u32, sink: Box<dyn Sink>) -> EngineResult<()> {
        self.sink_sender
            .send(SinkRegistration { name: name.into(), priority, sink })
            .map_err(|_| EngineError::Busy("sink registration channel closed".into()))
    }

    pub fn set_sink_enabled(&self, sink: impl Into<String>, enabled: bool) -> EngineResult<()> {
        self.send(Command::SetSinkEnabled { sink: sink.into(), enabled })
    }

    pub fn set_sink_volume(&self, sink: impl Into<String>, volume: f32) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(EngineError::OutOfRange("sink_volume".into()));
        }
        self.send(Command::SetSinkVolume { sink: sink.into(), volume })
    }

    pub fn set_routing(&self, sink: impl Into<String>, whitelist: Option<Vec<SourceId>>) -> EngineResult<()> {
        self.send(Command::SetRouting { sink: sink.into(), whitelist })
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.read().clone()
    }

    /// Latest fully-formed spectrum snapshot (`getSpectrum`).
    /// Pull-based: callers get whatever the mixer thread last produced,
    /// never a half-updated array.
    pub fn spectrum(&self) -> SpectrumSnapshot {
        self.visualizer.read().spectrum()
    }

    /// Latest level snapshot (`getLevels`).
    pub fn levels(&self) -> LevelSnapshot {
        self.visualizer.read().levels()
    }

    /// Latest waveform snapshot (`getWaveform`).
    pub fn waveform(&self) -> WaveformSnapshot {
        self.visualizer.read().waveform()
    }

    pub fn try_recv_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn send(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .try_send(command)
            .map_err(|_| EngineError::Busy("command queue full".into()))
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
        let _ = self.command_sender.try_send(Command::Shutdown);
        if let Some(handle) = self.mixer_thread.take() {
            if handle.join().is_err() {
                error!("mixer thread panicked during shutdown");
            }
        }
    }
}
