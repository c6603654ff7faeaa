//! HTTP broadcast sink: a chunked WAV/PCM stream served over HTTP, fanned
//! out to every connected client with independent backpressure per client.
//! No client-facing handshake or discovery protocol lives here; this is
//! a dedicated encoder-free broadcast thread, unlike the single-consumer
//! local sink.
//!
//! A slow client never blocks the mixer thread or the other clients: each
//! client gets its own bounded channel, and a client that can't keep up
//! (`try_send` fails `max_consecutive_full_sends` times running) is
//! dropped, not the sink.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::JoinHandle;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use crossbeam_channel::{bounded, Sender as CbSender};
use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use radio_core::{EngineError, Frame, Sink, SinkKind, SinkState};

fn state_from_u8(v: u8) -> SinkState {
    match v {
        0 => SinkState::Idle,
        1 => SinkState::Connecting,
        2 => SinkState::Streaming,
        3 => SinkState::Failed,
        _ => SinkState::Disposed,
    }
}

fn u8_from_state(s: SinkState) -> u8 {
    match s {
        SinkState::Idle => 0,
        SinkState::Connecting => 1,
        SinkState::Streaming => 2,
        SinkState::Failed => 3,
        SinkState::Disposed => 4,
    }
}

struct ClientSlot {
    id: u64,
    tx: mpsc::Sender<Bytes>,
    consecutive_full_sends: u32,
}

#[derive(Clone)]
struct AppState {
    clients: Arc<Mutex<Vec<ClientSlot>>>,
    next_client_id: Arc<AtomicU64>,
    header: Bytes,
    client_channel_capacity: usize,
}

/// Streams the WAV header once, then forwards whatever bytes arrive on
/// `rx`. Removes its own client slot on drop, covering the case where the
/// HTTP client (not the mixer thread) hangs up first.
struct ClientByteStream {
    header: Option<Bytes>,
    rx: mpsc::Receiver<Bytes>,
    id: u64,
    clients: Arc<Mutex<Vec<ClientSlot>>>,
}

impl Stream for ClientByteStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(header) = self.header.take() {
            return Poll::Ready(Some(Ok(header)));
        }
        self.rx.poll_recv(cx).map(|opt| opt.map(Ok))
    }
}

impl Drop for ClientByteStream {
    fn drop(&mut self) {
        self.clients.lock().retain(|c| c.id != self.id);
    }
}

async fn stream_handler(State(state): State<AppState>) -> impl IntoResponse {
    let id = state.next_client_id.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::channel(state.client_channel_capacity);
    state.clients.lock().push(ClientSlot {
        id,
        tx,
        consecutive_full_sends: 0,
    });
    let body = axum::body::Body::from_stream(ClientByteStream {
        header: Some(state.header.clone()),
        rx,
        id,
        clients: state.clients.clone(),
    });
    axum::http::Response::builder()
        .header(axum::http::header::CONTENT_TYPE, "audio/wav")
        .body(body)
        .expect("static header set is always a valid response")
}

fn wav_header(frame: Frame) -> Bytes {
    let channels = frame.channels;
    let sample_rate = frame.sample_rate;
    let bits_per_sample: u16 = 16;
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * block_align as u32;

    let mut buf = Vec::with_capacity(44);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&u32::MAX.to_le_bytes()); // unknown total size, streaming
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&u32::MAX.to_le_bytes()); // unknown data size, streaming
    Bytes::from(buf)
}

pub(crate) fn pcm16_bytes(block: &[f32], gain: f32) -> Bytes {
    let mut buf = Vec::with_capacity(block.len() * 2);
    for &sample in block {
        let v = (sample * gain).clamp(-1.0, 1.0);
        let quantized = (v * i16::MAX as f32) as i16;
        buf.extend_from_slice(&quantized.to_le_bytes());
    }
    Bytes::from(buf)
}

enum ThreadControl {
    Shutdown,
}

/// Serves the mix as a chunked WAV stream to any number of HTTP clients.
pub struct HttpBroadcastSink {
    label: String,
    bind_addr: SocketAddr,
    client_channel_capacity: usize,
    max_consecutive_full_sends: u32,
    state: Arc<AtomicU8>,
    clients: Arc<Mutex<Vec<ClientSlot>>>,
    volume: Arc<Mutex<f32>>,
    dropped_frames: Arc<AtomicU64>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<ThreadControl>>,
    thread: Option<JoinHandle<()>>,
}

impl HttpBroadcastSink {
    pub fn new(label: impl Into<String>, bind_addr: SocketAddr) -> Self {
        Self {
            label: label.into(),
            bind_addr,
            client_channel_capacity: 64,
            max_consecutive_full_sends: 3,
            state: Arc::new(AtomicU8::new(u8_from_state(SinkState::Idle))),
            clients: Arc::new(Mutex::new(Vec::new())),
            volume: Arc::new(Mutex::new(1.0)),
            dropped_frames: Arc::new(AtomicU64::new(0)),
            shutdown_tx: None,
            thread: None,
        }
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.lock().len()
    }

    fn set_state(&self, s: SinkState) {
        self.state.store(u8_from_state(s), Ordering::Release);
    }
}

impl Sink for HttpBroadcastSink {
    fn kind(&self) -> SinkKind {
        SinkKind::HttpBroadcast
    }

    fn state(&self) -> SinkState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    fn connect(&mut self, frame: Frame) -> Result<(), EngineError> {
        self.disconnect();
        self.set_state(SinkState::Connecting);

        let app_state = AppState {
            clients: Arc::clone(&self.clients),
            next_client_id: Arc::new(AtomicU64::new(0)),
            header: wav_header(frame),
            client_channel_capacity: self.client_channel_capacity,
        };
        let app = Router::new().route("/stream", get(stream_handler)).with_state(app_state);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<ThreadControl>();
        let (ready_tx, ready_rx): (CbSender<Result<(), String>>, _) = bounded(1);
        let state = Arc::clone(&self.state);
        let label = self.label.clone();
        let bind_addr = self.bind_addr;

        let thread = std::thread::Builder::new()
            .name(format!("radio-http-sink-{}", self.label))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        state.store(u8_from_state(SinkState::Failed), Ordering::Release);
                        ready_tx.send(Err(e.to_string())).ok();
                        return;
                    }
                };

                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
                        Ok(l) => l,
                        Err(e) => {
                            state.store(u8_from_state(SinkState::Failed), Ordering::Release);
                            ready_tx.send(Err(e.to_string())).ok();
                            return;
                        }
                    };
                    state.store(u8_from_state(SinkState::Streaming), Ordering::Release);
                    ready_tx.send(Ok(())).ok();
                    info!(sink = %label, addr = %bind_addr, "http broadcast sink listening");

                    let serve = axum::serve(listener, app);
                    tokio::select! {
                        result = serve => {
                            if let Err(e) = result {
                                warn!(sink = %label, error = %e, "http broadcast server exited with error");
                            }
                        }
                        _ = shutdown_rx => {
                            debug!(sink = %label, "http broadcast sink shutting down");
                        }
                    }
                });
            })
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.thread = Some(thread);
                self.shutdown_tx = None;
                self.disconnect();
                return Err(EngineError::StreamBuildError(e));
            }
            Err(_) => return Err(EngineError::StreamBuildError("http sink thread died before binding".into())),
        }

        self.shutdown_tx = Some(shutdown_tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn write_block(&mut self, block: &[f32]) -> Result<(), EngineError> {
        if self.state() != SinkState::Streaming {
            return Err(EngineError::Unavailable(format!("{} is not streaming", self.label)));
        }
        let gain = *self.volume.lock();
        let bytes = pcm16_bytes(block, gain);
        let max_full_sends = self.max_consecutive_full_sends;
        let label = &self.label;
        let dropped_frames = &self.dropped_frames;

        self.clients.lock().retain_mut(|client| match client.tx.try_send(bytes.clone()) {
            Ok(()) => {
                client.consecutive_full_sends = 0;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                dropped_frames.fetch_add(1, Ordering::Relaxed);
                client.consecutive_full_sends += 1;
                if client.consecutive_full_sends >= max_full_sends {
                    warn!(sink = %label, client = client.id, "disconnecting slow http client");
                    false
                } else {
                    true
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            tx.send(ThreadControl::Shutdown).ok();
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!(sink = %self.label, "http sink thread panicked during shutdown");
            }
        }
        self.clients.lock().clear();
        self.set_state(SinkState::Idle);
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_volume(&mut self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

impl Drop for HttpBroadcastSink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_has_riff_wave_and_fmt_chunks() {
        let header = wav_header(Frame::default());
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(header.len(), 44);
    }

    #[test]
    fn pcm16_encodes_full_scale_sine_without_overflow() {
        let block = vec![1.0f32, -1.0, 0.0, 0.5];
        let bytes = pcm16_bytes(&block, 1.0);
        assert_eq!(bytes.len(), 8);
        let first = i16::from_le_bytes([bytes[0], bytes[1]]);
        assert_eq!(first, i16::MAX);
    }

    #[test]
    fn pcm16_applies_gain() {
        let block = vec![1.0f32];
        let full = pcm16_bytes(&block, 1.0);
        let half = pcm16_bytes(&block, 0.5);
        let full_sample = i16::from_le_bytes([full[0], full[1]]);
        let half_sample = i16::from_le_bytes([half[0], half[1]]);
        assert!(half_sample < full_sample);
    }

    #[test]
    fn starts_idle_with_no_connected_clients() {
        let sink = HttpBroadcastSink::new("broadcast", "127.0.0.1:0".parse().unwrap());
        assert_eq!(sink.state(), SinkState::Idle);
        assert_eq!(sink.connected_clients(), 0);
    }

    #[test]
    fn write_block_before_connect_is_unavailable() {
        let mut sink = HttpBroadcastSink::new("broadcast", "127.0.0.1:0".parse().unwrap());
        let block = vec![0.0f32; 128];
        assert!(sink.write_block(&block).is_err());
    }
}
