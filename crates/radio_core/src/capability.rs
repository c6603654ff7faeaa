//! Source kind, category, state, and the capability bitset.
//!
//! Sources are modeled as a tagged variant plus a capability bitset, not as
//! an inheritance tree: transport verbs check the relevant
//! bit and return `Unsupported` otherwise.

use serde::{Deserialize, Serialize};

/// The nine source types the engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Radio,
    Vinyl,
    FilePlayer,
    Spotify,
    HttpPull,
    Tts,
    Chime,
    Notification,
    Effect,
}

/// Whether a source competes for the single active-primary slot, or is a
/// short-lived overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Primary,
    Event,
}

impl SourceKind {
    pub fn category(self) -> Category {
        match self {
            SourceKind::Radio
            | SourceKind::Vinyl
            | SourceKind::FilePlayer
            | SourceKind::Spotify
            | SourceKind::HttpPull => Category::Primary,
            SourceKind::Tts | SourceKind::Chime | SourceKind::Notification | SourceKind::Effect => {
                Category::Event
            }
        }
    }

    /// Short, lowercase tag used to build `SourceId`s.
    pub fn tag(self) -> &'static str {
        match self {
            SourceKind::Radio => "radio",
            SourceKind::Vinyl => "vinyl",
            SourceKind::FilePlayer => "file",
            SourceKind::Spotify => "spotify",
            SourceKind::HttpPull => "httppull",
            SourceKind::Tts => "tts",
            SourceKind::Chime => "chime",
            SourceKind::Notification => "notification",
            SourceKind::Effect => "effect",
        }
    }

    /// Capabilities a freshly constructed source of this kind carries by
    /// default. Concrete sources may narrow this (e.g. a live radio tuner
    /// never supports `Seek`).
    pub fn default_capabilities(self) -> Capabilities {
        match self {
            SourceKind::Radio => Capabilities::PLAY | Capabilities::STOP,
            SourceKind::Vinyl => Capabilities::PLAY | Capabilities::PAUSE | Capabilities::STOP,
            SourceKind::FilePlayer => {
                Capabilities::PLAY
                    | Capabilities::PAUSE
                    | Capabilities::STOP
                    | Capabilities::SEEK
                    | Capabilities::NEXT
                    | Capabilities::PREVIOUS
                    | Capabilities::SHUFFLE
                    | Capabilities::REPEAT
                    | Capabilities::QUEUE
            }
            SourceKind::Spotify => {
                Capabilities::PLAY
                    | Capabilities::PAUSE
                    | Capabilities::STOP
                    | Capabilities::SEEK
                    | Capabilities::NEXT
                    | Capabilities::PREVIOUS
                    | Capabilities::SHUFFLE
                    | Capabilities::REPEAT
            }
            SourceKind::HttpPull => Capabilities::PLAY | Capabilities::PAUSE | Capabilities::STOP,
            SourceKind::Tts | SourceKind::Chime | SourceKind::Notification | SourceKind::Effect => {
                Capabilities::PLAY | Capabilities::STOP
            }
        }
    }
}

/// AM/FM/shortwave/longwave band selector for the Radio-specific
/// extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioBand {
    Am,
    Fm,
    Sw,
    Lw,
}

impl RadioBand {
    /// Tuning step in the band's native units (kHz for AM/SW/LW, MHz·10 for
    /// FM), used as the default `step` when a `RadioBackend` switches bands.
    pub fn default_step(self) -> f32 {
        match self {
            RadioBand::Am => 9.0,
            RadioBand::Fm => 0.1,
            RadioBand::Sw => 5.0,
            RadioBand::Lw => 9.0,
        }
    }
}

/// Tone-shaping preset applied by the tuner hardware itself, distinct from
/// any mixer-level global EQ: this is a per-source hint a real tuner
/// driver may or may not honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EqualizerMode {
    Flat,
    Voice,
    Music,
    Bass,
}

/// Seek direction for a scanning tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanDirection {
    Up,
    Down,
}

/// The `transport` verb's action argument: applies to
/// whichever source currently holds the primary slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TransportAction {
    Play,
    Pause,
    Stop,
    Seek(u64),
    Next,
    Previous,
}

/// The 8-state lifecycle shared by every source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceState {
    Uninitialized,
    Initializing,
    Ready,
    Playing,
    Paused,
    Stopped,
    Failed,
    Disposed,
}

impl SourceState {
    /// Terminal states produce silence.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SourceState::Stopped | SourceState::Failed | SourceState::Disposed
        )
    }
}

/// Per-source capability flags gating which transport verbs are meaningful.
/// A small closed bitset over a `u16`, the idiomatic stand-in for a
/// `bitflags!`-style type without adding a new dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities(u16);

impl Capabilities {
    pub const PLAY: Capabilities = Capabilities(1 << 0);
    pub const PAUSE: Capabilities = Capabilities(1 << 1);
    pub const STOP: Capabilities = Capabilities(1 << 2);
    pub const SEEK: Capabilities = Capabilities(1 << 3);
    pub const NEXT: Capabilities = Capabilities(1 << 4);
    pub const PREVIOUS: Capabilities = Capabilities(1 << 5);
    pub const SHUFFLE: Capabilities = Capabilities(1 << 6);
    pub const REPEAT: Capabilities = Capabilities(1 << 7);
    pub const QUEUE: Capabilities = Capabilities(1 << 8);

    pub const NONE: Capabilities = Capabilities(0);

    pub fn contains(self, bit: Capabilities) -> bool {
        self.0 & bit.0 == bit.0
    }

    pub fn union(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 | other.0)
    }

    pub fn without(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 & !other.0)
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Capabilities;
    fn bitor(self, rhs: Capabilities) -> Capabilities {
        self.union(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_player_has_full_transport() {
        let caps = SourceKind::FilePlayer.default_capabilities();
        assert!(caps.contains(Capabilities::SEEK));
        assert!(caps.contains(Capabilities::SHUFFLE));
    }

    #[test]
    fn radio_has_no_seek() {
        let caps = SourceKind::Radio.default_capabilities();
        assert!(!caps.contains(Capabilities::SEEK));
        assert!(caps.contains(Capabilities::PLAY));
    }

    #[test]
    fn categories_split_primary_from_event() {
        assert_eq!(SourceKind::Radio.category(), Category::Primary);
        assert_eq!(SourceKind::Tts.category(), Category::Event);
    }

    #[test]
    fn fm_default_step_is_tenth_mhz() {
        assert_eq!(RadioBand::Fm.default_step(), 0.1);
    }

    #[test]
    fn terminal_states_are_flagged() {
        assert!(SourceState::Stopped.is_terminal());
        assert!(SourceState::Failed.is_terminal());
        assert!(SourceState::Disposed.is_terminal());
        assert!(!SourceState::Playing.is_terminal());
    }
}
