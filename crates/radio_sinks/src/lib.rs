//! Radio Sinks - Output Backends
//!
//! Concrete [`radio_core::Sink`] implementations for the home radio audio
//! engine:
//!
//! | Sink             | Transport                          | Fan-out           |
//! |------------------|-------------------------------------|--------------------|
//! | `LocalSink`      | `cpal` device output                | single device      |
//! | `HttpBroadcastSink` | chunked WAV/PCM over HTTP        | N clients           |
//! | `NetReceiverSink`   | `HttpBroadcastSink` + `Discovery` | 1 receiver device  |
//!
//! `radio_core` defines the `Sink` trait and owns the mixer that dispatches
//! to it; this crate only supplies implementations, mirroring how
//! platform backends implemented `PlatformBackend` without owning the
//! audio graph that called into them.

mod error;
mod http;
mod local;
mod net_receiver;

pub use error::SinkError;
pub use http::HttpBroadcastSink;
pub use local::LocalSink;
pub use net_receiver::{Discovery, LoopbackDiscovery, NetReceiverSink};

#[cfg(test)]
mod tests {
    use super::*;
    use radio_core::{Sink, SinkState};

    #[test]
    fn every_sink_kind_starts_idle() {
        let local = LocalSink::new("local", None, 8);
        assert_eq!(local.state(), SinkState::Idle);

        let http = HttpBroadcastSink::new("broadcast", "127.0.0.1:0".parse().unwrap());
        assert_eq!(http.state(), SinkState::Idle);

        let cast = NetReceiverSink::new(
            "cast",
            "127.0.0.1:0".parse().unwrap(),
            Box::new(LoopbackDiscovery::new()),
        );
        assert_eq!(cast.state(), SinkState::Idle);
    }
}
