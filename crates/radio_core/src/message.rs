//! Commands flowing into the mixer thread and events flowing out of it.
//! Every control-plane mutation is a `Command` enqueued for application
//! at the next block boundary; every externally observable change is an
//! `Event`.

use serde::{Deserialize, Serialize};

use crate::capability::{EqualizerMode, RadioBand, ScanDirection, SourceKind, TransportAction};
use crate::ducking::DuckingPolicy;
use crate::sink::Sink;
use crate::source::Source;
use crate::source_id::SourceId;

/// Moves a freshly built sink onto the mixer thread. Carried on its own
/// channel rather than folded into `Command` because `Command` derives
/// `Clone` and `Box<dyn Sink>` cannot.
pub struct SinkRegistration {
    pub name: String,
    pub priority: u32,
    pub sink: Box<dyn Sink>,
}

/// Moves a freshly built, already-`mark_ready`'d source onto the mixer
/// thread, the source-side analog of [`SinkRegistration`]. `device_path` is
/// set when the caller already reserved an exclusive USB device for this
/// source; the mixer thread uses it only to know the reservation exists,
/// since release is owner-keyed, not path-keyed.
pub struct SourceRegistration {
    pub source: Box<dyn Source>,
    pub device_path: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Command {
    SetMasterVolume(f32),
    SetBalance(f32),
    SetMute(bool),
    SwitchPrimary(SourceId),
    /// `transport` verb: acts on whichever source currently
    /// holds the primary slot.
    Transport(TransportAction),
    SpawnEvent {
        /// Minted synchronously by the caller (`spawnEvent` returns
        /// `eventId`) so it's available before the command even
        /// reaches the mixer thread.
        id: SourceId,
        kind: SourceKind,
        policy: DuckingPolicy,
        priority: u8,
        duration_ms: u32,
    },
    SetSourceVolume {
        source: SourceId,
        volume: f32,
    },
    SetSourceMuted {
        source: SourceId,
        muted: bool,
    },
    SetSinkEnabled {
        sink: String,
        enabled: bool,
    },
    SetSinkVolume {
        sink: String,
        volume: f32,
    },
    SetRouting {
        sink: String,
        whitelist: Option<Vec<SourceId>>,
    },
    /// Radio-specific extension command: synchronous from the
    /// caller's perspective, though `signal_strength` settles over up to
    /// 500 ms of simulated hardware lock time.
    TuneRadio {
        source: SourceId,
        frequency: f32,
    },
    SetRadioBand {
        source: SourceId,
        band: RadioBand,
    },
    SetRadioScanning {
        source: SourceId,
        direction: Option<ScanDirection>,
    },
    SetRadioEqualizerMode {
        source: SourceId,
        mode: EqualizerMode,
    },
    /// Stops, disposes, and removes a registered source, releasing any USB
    /// reservation it still holds: a source holds its reservation for the
    /// entire span from `Initializing` entry to `Disposed` exit.
    RemoveSource(SourceId),
    ReservationSweep(SourceId),
    RequestState,
    Shutdown,
}

/// Observable engine events. Variants that cross the (out-of-scope)
/// transport boundary carry the `#[serde(tag = "type", content =
/// "payload")]` envelope the control plane forwards verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    Started,
    Stopped,
    SourceStateChanged {
        source: String,
        state: String,
    },
    PrimarySwitched {
        source: String,
    },
    DuckingChanged {
        active: bool,
        level: f32,
    },
    UnderrunDetected {
        source: String,
        count: u64,
    },
    ClipDetected {
        peak: f32,
    },
    SinkFailed {
        sink: String,
    },
    SinkPromoted {
        sink: String,
    },
    SinkRecovered {
        sink: String,
    },
    Error {
        message: String,
    },
}

impl Event {
    /// Builds an error event from any displayable error type.
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_roundtrips_through_json_with_tagged_envelope() {
        let event = Event::ClipDetected { peak: 1.0 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"ClipDetected\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Event::ClipDetected { peak } if peak == 1.0));
    }

    #[test]
    fn error_helper_wraps_display() {
        let event = Event::error("boom");
        assert!(matches!(event, Event::Error { message } if message == "boom"));
    }

    #[test]
    fn sink_failover_events_carry_names() {
        let failed = Event::SinkFailed { sink: "local".into() };
        let promoted = Event::SinkPromoted { sink: "http".into() };
        assert!(matches!(failed, Event::SinkFailed { sink } if sink == "local"));
        assert!(matches!(promoted, Event::SinkPromoted { sink } if sink == "http"));
    }
}
