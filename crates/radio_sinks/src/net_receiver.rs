//! Net-receiver (Chromecast-style) cast sink: wraps an
//! [`HttpBroadcastSink`] with a `Discovery` step that announces the stream
//! URL to a receiver device. The announce/handshake protocol itself is out
//! of scope; `Discovery` is the seam a real mDNS/cast implementation plugs
//! into.

use std::net::SocketAddr;

use radio_core::{EngineError, Frame, Sink, SinkKind, SinkState};

use crate::http::HttpBroadcastSink;

/// Announces a stream URL to a receiver device and tears the announcement
/// down again. Implementations own whatever discovery/handshake protocol
/// they speak; the sink only needs `announce`/`withdraw`.
pub trait Discovery: Send {
    fn announce(&mut self, stream_url: &str) -> Result<(), EngineError>;
    fn withdraw(&mut self);
}

/// A `Discovery` that never actually reaches the network, for tests and for
/// local development without a real receiver device on the LAN.
pub struct LoopbackDiscovery {
    announced_url: Option<String>,
}

impl LoopbackDiscovery {
    pub fn new() -> Self {
        Self { announced_url: None }
    }

    pub fn announced_url(&self) -> Option<&str> {
        self.announced_url.as_deref()
    }
}

impl Default for LoopbackDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl Discovery for LoopbackDiscovery {
    fn announce(&mut self, stream_url: &str) -> Result<(), EngineError> {
        self.announced_url = Some(stream_url.to_string());
        Ok(())
    }

    fn withdraw(&mut self) {
        self.announced_url = None;
    }
}

/// Wraps an [`HttpBroadcastSink`] and announces its stream URL through a
/// [`Discovery`] implementation on connect, withdrawing it on disconnect.
pub struct NetReceiverSink {
    inner: HttpBroadcastSink,
    discovery: Box<dyn Discovery>,
    stream_url: String,
}

impl NetReceiverSink {
    pub fn new(label: impl Into<String>, bind_addr: SocketAddr, discovery: Box<dyn Discovery>) -> Self {
        let label = label.into();
        let stream_url = format!("http://{bind_addr}/stream");
        Self {
            inner: HttpBroadcastSink::new(label, bind_addr),
            discovery,
            stream_url,
        }
    }
}

impl Sink for NetReceiverSink {
    fn kind(&self) -> SinkKind {
        SinkKind::NetReceiver
    }

    fn state(&self) -> SinkState {
        self.inner.state()
    }

    fn connect(&mut self, frame: Frame) -> Result<(), EngineError> {
        self.inner.connect(frame)?;
        self.discovery.announce(&self.stream_url)
    }

    fn write_block(&mut self, block: &[f32]) -> Result<(), EngineError> {
        self.inner.write_block(block)
    }

    fn disconnect(&mut self) {
        self.discovery.withdraw();
        self.inner.disconnect();
    }

    fn label(&self) -> &str {
        self.inner.label()
    }

    fn set_volume(&mut self, volume: f32) {
        self.inner.set_volume(volume);
    }

    fn dropped_frames(&self) -> u64 {
        self.inner.dropped_frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_http_sink_state_and_kind() {
        let sink = NetReceiverSink::new(
            "cast",
            "127.0.0.1:0".parse().unwrap(),
            Box::new(LoopbackDiscovery::new()),
        );
        assert_eq!(sink.kind(), SinkKind::NetReceiver);
        assert_eq!(sink.state(), SinkState::Idle);
    }

    #[test]
    fn loopback_discovery_records_and_clears_announced_url() {
        let mut discovery = LoopbackDiscovery::new();
        assert!(discovery.announced_url().is_none());
        discovery.announce("http://127.0.0.1:9000/stream").unwrap();
        assert_eq!(discovery.announced_url(), Some("http://127.0.0.1:9000/stream"));
        discovery.withdraw();
        assert!(discovery.announced_url().is_none());
    }

    #[test]
    fn write_block_before_connect_is_unavailable() {
        let mut sink = NetReceiverSink::new(
            "cast",
            "127.0.0.1:0".parse().unwrap(),
            Box::new(LoopbackDiscovery::new()),
        );
        let block = vec![0.0f32; 64];
        assert!(sink.write_block(&block).is_err());
    }
}
