//! RPC verb adapters: one plain `pub fn` per verb, each
//! taking `&AudioEngine` and typed arguments and returning a typed result
//! or a [`ControlError`]. No transport dependency lives here: any caller
//! (HTTP, IPC, a test harness) can call these functions directly.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use radio_core::{
    AudioEngine, Category, DeviceType, DuckingPolicy, EngineState, SourceId, SourceKind,
    TransportAction,
};
use radio_dsp::{LevelSnapshot, SpectrumSnapshot, WaveformSnapshot};
use radio_sinks::{HttpBroadcastSink, LocalSink};

use crate::error::ControlError;

/// `getPlaybackState` / the common "new state" result shared by
/// `setMaster`, `transport`, and `switchPrimary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackState {
    pub engine_state: EngineState,
    pub primary: Option<String>,
    pub master_volume: f32,
    pub balance: f32,
    pub muted: bool,
    pub ducking_active: bool,
    pub ducking_level: f32,
}

impl From<radio_core::EngineSnapshot> for PlaybackState {
    fn from(snapshot: radio_core::EngineSnapshot) -> Self {
        Self {
            engine_state: snapshot.state,
            primary: snapshot.active_primary,
            master_volume: snapshot.master_volume,
            balance: snapshot.balance,
            muted: snapshot.is_muted,
            ducking_active: snapshot.ducking_active,
            ducking_level: snapshot.ducking_level,
        }
    }
}

pub fn get_playback_state(engine: &AudioEngine) -> PlaybackState {
    engine.snapshot().into()
}

/// Any argument left `None` leaves that field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetMasterArgs {
    pub volume: Option<f32>,
    pub balance: Option<f32>,
    pub muted: Option<bool>,
}

pub fn set_master(engine: &AudioEngine, args: SetMasterArgs) -> Result<PlaybackState, ControlError> {
    if let Some(volume) = args.volume {
        engine.set_master_volume(volume)?;
    }
    if let Some(balance) = args.balance {
        engine.set_balance(balance)?;
    }
    if let Some(muted) = args.muted {
        engine.set_muted(muted)?;
    }
    Ok(get_playback_state(engine))
}

/// Commits the action to the command queue and returns the best-known
/// state; the mixer thread applies it within one block period, so a
/// caller polling immediately after may still observe the pre-transport
/// state.
pub fn transport(engine: &AudioEngine, action: TransportAction) -> Result<PlaybackState, ControlError> {
    if engine.snapshot().active_primary.is_none() {
        return Err(ControlError::unavailable("no primary source is active"));
    }
    engine.transport(action)?;
    Ok(get_playback_state(engine))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCatalogue {
    /// Every Primary-category kind this engine can host, regardless of
    /// whether one is currently registered.
    pub available_primary_kinds: Vec<SourceKind>,
    pub active: Vec<radio_core::SourceSummary>,
}

const PRIMARY_KINDS: [SourceKind; 5] = [
    SourceKind::Radio,
    SourceKind::Vinyl,
    SourceKind::FilePlayer,
    SourceKind::Spotify,
    SourceKind::HttpPull,
];

pub fn list_sources(engine: &AudioEngine) -> SourceCatalogue {
    SourceCatalogue {
        available_primary_kinds: PRIMARY_KINDS.to_vec(),
        active: engine.snapshot().sources,
    }
}

pub fn switch_primary(engine: &AudioEngine, source: SourceId) -> Result<PlaybackState, ControlError> {
    let catalogue = engine.snapshot();
    let known = catalogue.sources.iter().any(|s| s.id == source.to_string());
    if !known {
        return Err(ControlError::unavailable(format!("unknown source: {source}")));
    }
    engine.switch_primary(source)?;
    Ok(get_playback_state(engine))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnEventArgs {
    pub kind: SourceKind,
    pub policy: DuckingPolicy,
    pub priority: u8,
    pub duration_ms: u32,
}

/// Returns the new event source's id (`eventId`). Rejects a
/// Primary-category `kind` up front rather than letting it silently
/// spawn as an overlay.
pub fn spawn_event(engine: &AudioEngine, args: SpawnEventArgs) -> Result<String, ControlError> {
    if args.kind.category() != Category::Event {
        return Err(ControlError::unsupported(format!(
            "{:?} is a primary source kind, not an event kind",
            args.kind
        )));
    }
    let id = engine.spawn_event(args.kind, args.policy, args.priority, args.duration_ms)?;
    Ok(id.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub channels: u16,
    pub sample_rates: Vec<u32>,
}

impl From<radio_core::AudioDevice> for OutputDeviceInfo {
    fn from(device: radio_core::AudioDevice) -> Self {
        Self {
            id: device.id,
            name: device.name,
            is_default: device.is_default,
            channels: device.max_channels,
            sample_rates: device.sample_rates,
        }
    }
}

pub fn list_output_devices() -> Result<Vec<OutputDeviceInfo>, ControlError> {
    let devices = radio_core::AudioDevice::enumerate_all()?;
    Ok(devices
        .into_iter()
        .filter(|d| d.device_type == DeviceType::Output)
        .map(OutputDeviceInfo::from)
        .collect())
}

/// `refreshDevices` is just a fresh enumeration; the "ack" the verb table
/// promises is the `Ok(())` itself, the refreshed list comes from a
/// follow-up `listOutputDevices` call.
pub fn refresh_devices() -> Result<(), ControlError> {
    radio_core::AudioDevice::enumerate_all()?;
    Ok(())
}

/// Swaps the engine's local-device sink onto `device_id`, registering a
/// fresh `LocalSink` under the well-known `"local"` name so it takes over
/// the existing priority slot.
pub fn set_output_device(engine: &AudioEngine, device_id: &str) -> Result<(), ControlError> {
    let devices = list_output_devices()?;
    let device = devices
        .into_iter()
        .find(|d| d.id == device_id)
        .ok_or_else(|| ControlError::not_found(format!("output device not found: {device_id}")))?;
    let sink = LocalSink::new("local", Some(device.name), 8);
    engine
        .register_sink("local", 100, Box::new(sink))
        .map_err(|_| ControlError::busy("sink registration channel is full"))
}

pub fn usb_reservations(engine: &AudioEngine) -> Vec<(String, String)> {
    engine.snapshot().usb_reservations
}

pub fn get_spectrum(engine: &AudioEngine) -> SpectrumSnapshot {
    engine.spectrum()
}

pub fn get_levels(engine: &AudioEngine) -> LevelSnapshot {
    engine.levels()
}

pub fn get_waveform(engine: &AudioEngine) -> WaveformSnapshot {
    engine.waveform()
}

#[derive(Debug, Clone)]
pub struct VisualizationFrame {
    pub spectrum: Option<SpectrumSnapshot>,
    pub levels: Option<LevelSnapshot>,
    pub waveform: Option<WaveformSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualizationChannels {
    pub spectrum: bool,
    pub levels: bool,
    pub waveform: bool,
}

/// `subscribeVisualization`: the actual wire-level push transport
/// (WebSocket, SSE, ...) is out of scope here, same as the rest of the
/// HTTP/REST surface. This gives a transport a
/// channel to forward: a dedicated thread polls the pull-based visualizer
/// API at `poll_interval` and pushes a frame whenever any subscribed
/// channel has moved on to a new timestamp.
pub fn subscribe_visualization(
    engine_handle: std::sync::Arc<AudioEngine>,
    channels: VisualizationChannels,
    poll_interval: Duration,
) -> mpsc::Receiver<VisualizationFrame> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("radio-visualization-poll".into())
        .spawn(move || {
            let mut last_spectrum_ts = None;
            let mut last_levels_ts = None;
            let mut last_waveform_ts = None;
            loop {
                let spectrum = channels.spectrum.then(|| engine_handle.spectrum());
                let levels = channels.levels.then(|| engine_handle.levels());
                let waveform = channels.waveform.then(|| engine_handle.waveform());

                let spectrum_changed =
                    spectrum.as_ref().is_some_and(|s| last_spectrum_ts.replace(s.timestamp) != Some(s.timestamp));
                let levels_changed =
                    levels.as_ref().is_some_and(|l| last_levels_ts.replace(l.timestamp) != Some(l.timestamp));
                let waveform_changed = waveform
                    .as_ref()
                    .is_some_and(|w| last_waveform_ts.replace(w.timestamp) != Some(w.timestamp));

                if spectrum_changed || levels_changed || waveform_changed {
                    let frame = VisualizationFrame { spectrum, levels, waveform };
                    if sender.send(frame).is_err() {
                        break;
                    }
                }
                thread::sleep(poll_interval);
            }
        })
        .expect("failed to spawn visualization poll thread");
    receiver
}

/// `streamAudio`: registers an `HttpBroadcastSink` (`radio_sinks::http`),
/// which already implements chunked PCM/WAV fan-out, under a
/// caller-chosen label.
pub fn stream_audio(
    engine: &AudioEngine,
    label: impl Into<String>,
    bind_addr: std::net::SocketAddr,
) -> Result<(), ControlError> {
    let label = label.into();
    let sink = HttpBroadcastSink::new(label.clone(), bind_addr);
    engine
        .register_sink(label, 0, Box::new(sink))
        .map_err(|_| ControlError::busy("sink registration channel is full"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_playback_state_reflects_master_volume() {
        let engine = AudioEngine::new().unwrap();
        engine.set_master_volume(0.4).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let state = get_playback_state(&engine);
        assert!((state.master_volume - 0.4).abs() < 1e-6);
    }

    #[test]
    fn set_master_rejects_out_of_range_volume() {
        let engine = AudioEngine::new().unwrap();
        let err = set_master(&engine, SetMasterArgs { volume: Some(2.0), ..Default::default() }).unwrap_err();
        assert_eq!(err.kind, crate::error::ControlErrorKind::OutOfRange);
    }

    #[test]
    fn transport_with_no_primary_is_unavailable() {
        let engine = AudioEngine::new().unwrap();
        let err = transport(&engine, TransportAction::Play).unwrap_err();
        assert_eq!(err.kind, crate::error::ControlErrorKind::Unavailable);
    }

    #[test]
    fn spawn_event_rejects_primary_kind() {
        let engine = AudioEngine::new().unwrap();
        let err = spawn_event(
            &engine,
            SpawnEventArgs { kind: SourceKind::Radio, policy: DuckingPolicy::AttenuatePrimary, priority: 0, duration_ms: 500 },
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::error::ControlErrorKind::Unsupported);
    }

    #[test]
    fn spawn_event_returns_a_parseable_id() {
        let engine = AudioEngine::new().unwrap();
        engine.start().unwrap();
        let id = spawn_event(
            &engine,
            SpawnEventArgs { kind: SourceKind::Chime, policy: DuckingPolicy::AttenuatePrimary, priority: 0, duration_ms: 40 },
        )
        .unwrap();
        assert!(id.starts_with("chime-"));
    }

    #[test]
    fn switch_primary_rejects_unknown_source() {
        let engine = AudioEngine::new().unwrap();
        let made_up = radio_core::SourceIdGenerator::new().next(SourceKind::Radio);
        let err = switch_primary(&engine, made_up).unwrap_err();
        assert_eq!(err.kind, crate::error::ControlErrorKind::Unavailable);
    }

    #[test]
    fn list_sources_enumerates_primary_kinds() {
        let engine = AudioEngine::new().unwrap();
        let catalogue = list_sources(&engine);
        assert_eq!(catalogue.available_primary_kinds.len(), 5);
        assert!(catalogue.active.is_empty());
    }

    #[test]
    fn usb_reservations_start_empty() {
        let engine = AudioEngine::new().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(usb_reservations(&engine).is_empty());
    }
}
