//! Persisted-state repository traits: play history, track metadata store,
//! fingerprint cache, radio presets, and configuration sections. The core
//! reads/writes via a thin repository abstraction; bit-exact schemas are
//! owned by the persistence layer.
//!
//! No concrete backend lives here: file I/O stays isolated behind a
//! narrow repository surface rather than inlined through the engine. A
//! SQLite, JSON-file, or in-memory implementation is a downstream crate's
//! problem.

use chrono::{DateTime, Utc};
use radio_core::{RadioBand, SourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ControlError;

/// One row of play history. Rejected on insert if the same
/// `(title, artist)` appears within 300 s of an existing entry
/// (duplicate suppression).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayHistoryEntry {
    pub title: String,
    pub artist: String,
    pub source_kind: SourceKind,
    pub played_at: DateTime<Utc>,
}

pub trait PlayHistoryRepo: Send + Sync {
    /// Must enforce the 300 s duplicate-suppression rule itself; callers
    /// rely on this, not on engine-side checking.
    fn append(&self, entry: PlayHistoryEntry) -> Result<(), ControlError>;

    fn range(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<PlayHistoryEntry>, ControlError>;

    /// Most-played `(title, artist)` pairs, descending by count.
    fn top(&self, limit: usize) -> Result<Vec<(String, String, u32)>, ControlError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_ms: Option<u32>,
}

pub trait TrackMetadataRepo: Send + Sync {
    fn upsert(&self, track: TrackMetadata) -> Result<(), ControlError>;
    fn search(&self, query: &str) -> Result<Vec<TrackMetadata>, ControlError>;
}

/// An audio fingerprint keyed by its content hash, used to recognize a
/// previously seen track on a source that doesn't carry metadata itself
/// (e.g. radio, vinyl).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hash: String,
    pub track_id: String,
}

pub trait FingerprintRepo: Send + Sync {
    fn insert_or_update(&self, fingerprint: Fingerprint) -> Result<(), ControlError>;
    fn find_by_hash(&self, hash: &str) -> Result<Option<Fingerprint>, ControlError>;
    fn delete(&self, hash: &str) -> Result<(), ControlError>;
}

/// A saved tuning, unique by `(band, frequency)`. Capped at 50 presets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioPreset {
    pub label: String,
    pub band: RadioBand,
    pub frequency: f32,
}

pub trait RadioPresetRepo: Send + Sync {
    /// Must reject a save past the 50-preset cap or a duplicate
    /// `(band, frequency)` pair.
    fn save(&self, preset: RadioPreset) -> Result<(), ControlError>;
    fn list(&self) -> Result<Vec<RadioPreset>, ControlError>;
    fn delete(&self, band: RadioBand, frequency: f32) -> Result<(), ControlError>;
}

/// Opaque-to-the-core configuration sections (audio, visualizer,
/// outputs, ...). Each section is a bag of JSON the core never
/// interprets; `radio_core::EngineConfig` is serialized into one of these
/// verbatim rather than this crate re-deriving a schema for it.
pub trait ConfigSectionRepo: Send + Sync {
    fn get_section(&self, name: &str) -> Result<Option<Value>, ControlError>;
    fn set_section(&self, name: &str, value: Value) -> Result<(), ControlError>;
}
