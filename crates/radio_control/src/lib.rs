//! Control plane for the home radio engine: plain
//! `pub fn` adapters over [`radio_core::AudioEngine`] that any transport
//! (HTTP, a local IPC bridge, a test harness) can call directly, plus the
//! error taxonomy and persistence-repository traits shared across them.
//!
//! This crate owns no transport, no window, and no tray icon: it exists
//! so a thin outer layer can expose the engine to whatever UI or protocol
//! a deployment wants, without that layer re-deriving error mapping or
//! repository contracts of its own.

pub mod commands;
pub mod error;
pub mod persistence;

pub use commands::{
    get_levels, get_playback_state, get_spectrum, get_waveform, list_output_devices,
    list_sources, refresh_devices, set_master, set_output_device, spawn_event,
    stream_audio, subscribe_visualization, switch_primary, transport, usb_reservations,
    OutputDeviceInfo, PlaybackState, SetMasterArgs, SourceCatalogue, SpawnEventArgs,
    VisualizationChannels, VisualizationFrame,
};
pub use error::{ControlError, ControlErrorKind};
pub use persistence::{
    ConfigSectionRepo, Fingerprint, FingerprintRepo, PlayHistoryEntry, PlayHistoryRepo,
    RadioPreset, RadioPresetRepo, TrackMetadata, TrackMetadataRepo,
};
