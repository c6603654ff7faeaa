//! The `Sink` trait and its lifecycle: a pluggable output model
//! (local device, HTTP broadcast, net-receiver cast).
//!
//! Lives in `radio_core`, not `radio_sinks`, so the mixer can hold `Box<dyn
//! Sink>` without `radio_core` depending on the crate that implements them.

use serde::{Deserialize, Serialize};

use crate::config::Frame;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkKind {
    LocalDevice,
    HttpBroadcast,
    NetReceiver,
}

/// Sink lifecycle: `Idle -> Connecting -> Streaming`, with
/// `Failed` reachable from `Connecting` or `Streaming` and `Disposed`
/// terminal from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkState {
    Idle,
    Connecting,
    Streaming,
    Failed,
    Disposed,
}

/// A destination for mixed audio blocks. Implementations own their own I/O
/// thread or async task; `write_block` must never block the mixer thread
/// for more than a bounded, short interval.
///
/// State contract the Engine relies on for failover: a
/// `write_block` error must leave `state()` reporting `Failed` (tearing
/// down whatever I/O resources need tearing down along the way) so the
/// Engine's retry loop knows to keep reconnecting it. `disconnect()` is the
/// separate, explicit "stop, go idle, don't retry" path used for
/// `setSinkEnabled(false)`.
pub trait Sink: Send {
    fn kind(&self) -> SinkKind;

    fn state(&self) -> SinkState;

    /// Begin accepting blocks. Idempotent if already connecting/streaming.
    fn connect(&mut self, frame: Frame) -> Result<(), EngineError>;

    /// Push one mixed block. `block.len()` is always `frame.block_len()`
    /// for the frame given to `connect`. On error, the implementation must
    /// have already transitioned itself to `Failed`.
    fn write_block(&mut self, block: &[f32]) -> Result<(), EngineError>;

    /// Tear down any I/O resources and transition to `Idle`. Safe to call
    /// from any state.
    fn disconnect(&mut self);

    /// A short human-readable identity for logs and the control plane.
    fn label(&self) -> &str;

    /// Applies a per-sink volume multiplier in `[0, 1]`, composed with
    /// master volume by the implementation (`setSinkVolume`).
    fn set_volume(&mut self, volume: f32);

    /// Frames dropped since the sink was last connected, for
    /// `listOutputDevices`-style diagnostics.
    fn dropped_frames(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSink {
        state: SinkState,
        blocks_written: usize,
        volume: f32,
    }

    impl Sink for StubSink {
        fn kind(&self) -> SinkKind {
            SinkKind::LocalDevice
        }
        fn state(&self) -> SinkState {
            self.state
        }
        fn connect(&mut self, _frame: Frame) -> Result<(), EngineError> {
            self.state = SinkState::Streaming;
            Ok(())
        }
        fn write_block(&mut self, _block: &[f32]) -> Result<(), EngineError> {
            self.blocks_written += 1;
            Ok(())
        }
        fn disconnect(&mut self) {
            self.state = SinkState::Idle;
        }
        fn label(&self) -> &str {
            "stub"
        }
        fn set_volume(&mut self, volume: f32) {
            self.volume = volume.clamp(0.0, 1.0);
        }
        fn dropped_frames(&self) -> u64 {
            0
        }
    }

    #[test]
    fn connect_transitions_to_streaming() {
        let mut sink = StubSink {
            state: SinkState::Idle,
            blocks_written: 0,
            volume: 1.0,
        };
        sink.connect(Frame::default()).unwrap();
        assert_eq!(sink.state(), SinkState::Streaming);
    }

    #[test]
    fn disconnect_returns_to_idle() {
        let mut sink = StubSink {
            state: SinkState::Streaming,
            blocks_written: 3,
            volume: 1.0,
        };
        sink.disconnect();
        assert_eq!(sink.state(), SinkState::Idle);
    }

    #[test]
    fn set_volume_clamps_into_unit_range() {
        let mut sink = StubSink {
            state: SinkState::Idle,
            blocks_written: 0,
            volume: 1.0,
        };
        sink.set_volume(1.5);
        assert_eq!(sink.volume, 1.0);
        sink.set_volume(-0.5);
        assert_eq!(sink.volume, 0.0);
    }
}
