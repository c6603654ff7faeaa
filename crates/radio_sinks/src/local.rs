//! Local device output sink: opens a `cpal` output stream on a dedicated
//! thread and feeds it from a ring buffer the mixer thread writes into.
//!
//! Builds the stream for whichever sample format the device reports,
//! `.play()`s it, and keeps the `Stream` alive for as long as the struct
//! that owns it needs it running. The stream has to live on its own
//! thread since `connect`/`disconnect` are driven from the mixer thread
//! and `cpal::Stream` isn't `Send` on every platform, so the thread that
//! builds it is also the one
//! that drops it.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use tracing::{debug, error, warn};

use radio_core::{
    frame_ring, EngineError, Frame, FrameConsumer, FrameProducer, PushOutcome, PushPolicy, Sink,
    SinkKind, SinkState,
};
use radio_dsp::LinearResampler;

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

enum ThreadControl {
    Shutdown,
}

/// Output to the system's default device, or a named one.
pub struct LocalSink {
    label: String,
    device_name: Option<String>,
    ring_capacity_blocks: usize,
    state: Arc<AtomicU8>,
    volume: Arc<parking_lot::Mutex<f32>>,
    dropped_frames: Arc<AtomicU64>,
    producer: Option<FrameProducer>,
    control_tx: Option<Sender<ThreadControl>>,
    thread: Option<JoinHandle<()>>,
}

impl LocalSink {
    pub fn new(label: impl Into<String>, device_name: Option<String>, ring_capacity_blocks: usize) -> Self {
        Self {
            label: label.into(),
            device_name,
            ring_capacity_blocks: ring_capacity_blocks.max(2),
            state: Arc::new(AtomicU8::new(u8_from_state(SinkState::Idle))),
            volume: Arc::new(parking_lot::Mutex::new(1.0)),
            dropped_frames: Arc::new(AtomicU64::new(0)),
            producer: None,
            control_tx: None,
            thread: None,
        }
    }

    fn set_state(&self, s: SinkState) {
        self.state.store(u8_from_state(s), Ordering::Release);
    }

    fn find_device(&self) -> Result<cpal::Device, EngineError> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| EngineError::DeviceNotFound(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| EngineError::DeviceNotFound(name.clone())),
            None => host.default_output_device().ok_or(EngineError::NoDevicesFound),
        }
    }
}

impl Sink for LocalSink {
    fn kind(&self) -> SinkKind {
        SinkKind::LocalDevice
    }

    fn state(&self) -> SinkState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    fn connect(&mut self, frame: Frame) -> Result<(), EngineError> {
        self.disconnect();
        self.set_state(SinkState::Connecting);

        let device = self.find_device()?;
        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;
        let sample_format = supported.sample_format();
        let device_rate = supported.sample_rate().0;
        let config = StreamConfig {
            channels: frame.channels,
            sample_rate: cpal::SampleRate(device_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, consumer) = frame_ring(self.ring_capacity_blocks, frame.block_len(), PushPolicy::DropOldest);
        let (control_tx, control_rx) = bounded::<ThreadControl>(4);
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);

        let state = Arc::clone(&self.state);
        let volume = Arc::clone(&self.volume);
        let dropped = Arc::clone(&self.dropped_frames);
        let label = self.label.clone();
        let channels = frame.channels as usize;
        let input_rate = frame.sample_rate;

        let thread = std::thread::Builder::new()
            .name(format!("radio-local-sink-{}", self.label))
            .spawn(move || {
                let resampler = if device_rate != input_rate {
                    LinearResampler::new(channels, input_rate, device_rate).ok()
                } else {
                    None
                };

                let built = match sample_format {
                    SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, resampler, volume, dropped),
                    SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, resampler, volume, dropped),
                    SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, resampler, volume, dropped),
                    other => Err(format!("unsupported sample format: {other:?}")),
                };

                let stream = match built {
                    Ok(s) => s,
                    Err(e) => {
                        error!(sink = %label, error = %e, "failed to build output stream");
                        state.store(u8_from_state(SinkState::Failed), Ordering::Release);
                        ready_tx.send(Err(e)).ok();
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    error!(sink = %label, error = %e, "failed to start output stream");
                    state.store(u8_from_state(SinkState::Failed), Ordering::Release);
                    ready_tx.send(Err(e.to_string())).ok();
                    return;
                }

                state.store(u8_from_state(SinkState::Streaming), Ordering::Release);
                ready_tx.send(Ok(())).ok();
                debug!(sink = %label, "local sink stream playing");

                loop {
                    match control_rx.recv() {
                        Ok(ThreadControl::Shutdown) | Err(_) => break,
                    }
                }
                drop(stream);
                debug!(sink = %label, "local sink stream stopped");
            })
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.thread = Some(thread);
                self.control_tx = None;
                self.disconnect();
                return Err(EngineError::StreamBuildError(e));
            }
            Err(_) => return Err(EngineError::StreamBuildError("sink thread died before starting".into())),
        }

        self.producer = Some(producer);
        self.control_tx = Some(control_tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn write_block(&mut self, block: &[f32]) -> Result<(), EngineError> {
        if self.state() != SinkState::Streaming {
            return Err(EngineError::Unavailable(format!("{} is not streaming", self.label)));
        }
        let Some(producer) = &self.producer else {
            self.set_state(SinkState::Failed);
            return Err(EngineError::Unavailable(format!("{} has no producer", self.label)));
        };
        match producer.push(block) {
            PushOutcome::Ok => Ok(()),
            PushOutcome::OverwroteOldest => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            PushOutcome::WouldBlock => {
                self.set_state(SinkState::Failed);
                Err(EngineError::Transient(format!("{} ring buffer full", self.label)))
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(tx) = self.control_tx.take() {
            tx.send(ThreadControl::Shutdown).ok();
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!(sink = %self.label, "local sink thread panicked during shutdown");
            }
        }
        self.producer = None;
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

impl Drop for LocalSink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    consumer: FrameConsumer,
    mut resampler: Option<LinearResampler>,
    volume: Arc<parking_lot::Mutex<f32>>,
    dropped: Arc<AtomicU64>,
) -> Result<cpal::Stream, String>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let block_len = consumer.block_len();
    let mut raw = vec![0.0f32; block_len];
    let mut carry: Vec<f32> = Vec::with_capacity(block_len * 2);

    let err_fn = |err| error!("local sink stream error: {}", err);

    let data_callback = move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        let gain = *volume.lock();
        while carry.len() < data.len() {
            match consumer.pop(&mut raw) {
                radio_core::PopOutcome::Ok => match resampler.as_mut() {
                    Some(r) => carry.extend_from_slice(&r.process(&raw)),
                    None => carry.extend_from_slice(&raw),
                },
                radio_core::PopOutcome::Empty => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    carry.resize(data.len(), 0.0);
                    break;
                }
            }
        }
        let take = data.len().min(carry.len());
        for (slot, sample) in data.iter_mut().zip(carry.drain(..take)) {
            *slot = T::from_sample(sample * gain);
        }
        for slot in data.iter_mut().skip(take) {
            *slot = T::from_sample(0.0f32);
        }
    };

    device
        .build_output_stream(config, data_callback, err_fn, None)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_and_label_is_preserved() {
        let sink = LocalSink::new("local", None, 8);
        assert_eq!(sink.state(), SinkState::Idle);
        assert_eq!(sink.label(), "local");
        assert_eq!(sink.dropped_frames(), 0);
    }

    #[test]
    fn write_block_before_connect_is_unavailable() {
        let mut sink = LocalSink::new("local", None, 8);
        let block = vec![0.0f32; 256];
        assert!(sink.write_block(&block).is_err());
    }

    #[test]
    fn set_volume_clamps_into_unit_range() {
        let mut sink = LocalSink::new("local", None, 8);
        sink.set_volume(2.0);
        assert_eq!(*sink.volume.lock(), 1.0);
        sink.set_volume(-1.0);
        assert_eq!(*sink.volume.lock(), 0.0);
    }

    #[test]
    fn disconnect_before_connect_is_a_no_op() {
        let mut sink = LocalSink::new("local", None, 8);
        sink.disconnect();
        assert_eq!(sink.state(), SinkState::Idle);
    }
}
