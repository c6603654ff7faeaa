//! The Visualizer tap: runs spectrum, level, and waveform analysis against
//! the mix block, non-mutating, in parallel with sink dispatch. Read
//! access is pull-based and atomic at block granularity,
//! mirroring the `radio_core::EngineSnapshot` double-buffer pattern: the
//! mixer thread is the sole writer, the lock is only ever held for a clone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::DspError;
use crate::level::{ChannelLevel, LevelMeter};
use crate::spectrum::Spectrum;
use crate::waveform::WaveformRing;

#[derive(Debug, Clone)]
pub struct SpectrumSnapshot {
    pub magnitudes: Vec<f32>,
    pub bin_frequencies: Vec<f32>,
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct LevelSnapshot {
    pub channels: Vec<ChannelLevel>,
    pub is_clipping: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct WaveformSnapshot {
    pub channels: Vec<Vec<f32>>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    magnitudes: Vec<f32>,
    bin_frequencies: Vec<f32>,
    levels: Vec<ChannelLevel>,
    is_clipping: bool,
    waveform: Vec<Vec<f32>>,
    timestamp: u64,
    is_active: bool,
}

/// A singleton owned by the Mixer. `process()` runs on the mixer thread;
/// `spectrum()` / `levels()` / `waveform()` are called by observers on
/// other threads.
pub struct Visualizer {
    spectrum: Spectrum,
    levels: LevelMeter,
    waveform: WaveformRing,
    channels: usize,
    block_counter: AtomicU64,
    snapshot: Arc<RwLock<Snapshot>>,
}

impl Visualizer {
    pub fn new(
        sample_rate: f32,
        channels: usize,
        fft_size: usize,
        use_window: bool,
        smoothing: f32,
        peak_hold_ms: f32,
        block_period_ms: f32,
        waveform_len: usize,
    ) -> Result<Self, DspError> {
        let spectrum = Spectrum::new(fft_size, sample_rate, use_window, smoothing)?;
        let bin_frequencies = spectrum.bin_frequencies().to_vec();
        Ok(Self {
            spectrum,
            levels: LevelMeter::new(channels, peak_hold_ms, block_period_ms),
            waveform: WaveformRing::new(channels, waveform_len),
            channels,
            block_counter: AtomicU64::new(0),
            snapshot: Arc::new(RwLock::new(Snapshot {
                bin_frequencies,
                ..Default::default()
            })),
        })
    }

    /// Runs all three analyses against one mix block. Never mutates the
    /// block it is given.
    pub fn process(&mut self, block: &[f32]) {
        self.spectrum.push_block(block, self.channels);
        let levels = self.levels.process(block);
        let is_clipping = self.levels.is_clipping();
        self.waveform.push_block(block);

        let timestamp = self.block_counter.fetch_add(1, Ordering::AcqRel) + 1;
        let waveform = (0..self.channels).map(|ch| self.waveform.snapshot(ch)).collect();

        let mut snap = self.snapshot.write();
        snap.magnitudes = self.spectrum.magnitudes().to_vec();
        snap.levels = levels;
        snap.is_clipping = is_clipping;
        snap.waveform = waveform;
        snap.timestamp = timestamp;
        snap.is_active = true;
    }

    pub fn spectrum(&self) -> SpectrumSnapshot {
        let snap = self.snapshot.read();
        SpectrumSnapshot {
            magnitudes: snap.magnitudes.clone(),
            bin_frequencies: snap.bin_frequencies.clone(),
            timestamp: snap.timestamp,
        }
    }

    pub fn levels(&self) -> LevelSnapshot {
        let snap = self.snapshot.read();
        LevelSnapshot {
            channels: snap.levels.clone(),
            is_clipping: snap.is_clipping,
            timestamp: snap.timestamp,
        }
    }

    pub fn waveform(&self) -> WaveformSnapshot {
        let snap = self.snapshot.read();
        WaveformSnapshot {
            channels: snap.waveform.clone(),
            timestamp: snap.timestamp,
        }
    }

    pub fn is_active(&self) -> bool {
        self.snapshot.read().is_active
    }

    /// Zeroes all internal buffers and clears `is_active` until the next
    /// `process()` call.
    pub fn reset(&mut self) {
        self.spectrum.reset();
        self.levels.reset();
        self.waveform.reset();
        self.block_counter.store(0, Ordering::Relaxed);
        let mut snap = self.snapshot.write();
        snap.magnitudes.iter_mut().for_each(|m| *m = 0.0);
        snap.levels.clear();
        snap.is_clipping = false;
        snap.waveform.iter_mut().for_each(|w| w.iter_mut().for_each(|s| *s = 0.0));
        snap.timestamp = 0;
        snap.is_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_block(amplitude: f32, freq_hz: f32, sample_rate: f32, channels: usize, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * channels];
        let step = std::f32::consts::TAU * freq_hz / sample_rate;
        for i in 0..frames {
            let s = amplitude * (step * i as f32).sin();
            for ch in 0..channels {
                out[i * channels + ch] = s;
            }
        }
        out
    }

    #[test]
    fn inactive_before_first_process() {
        let visualizer = Visualizer::new(48_000.0, 2, 2048, true, 0.7, 300.0, 21.3, 1024).unwrap();
        assert!(!visualizer.is_active());
    }

    #[test]
    fn becomes_active_and_snapshot_atomic_after_process() {
        let mut visualizer = Visualizer::new(48_000.0, 2, 2048, true, 0.7, 300.0, 21.3, 1024).unwrap();
        let block = sine_block(0.5, 440.0, 48_000.0, 2, 1024);
        visualizer.process(&block);
        assert!(visualizer.is_active());

        let spectrum = visualizer.spectrum();
        assert_eq!(spectrum.magnitudes.len(), 1024);
        assert_eq!(spectrum.bin_frequencies.len(), 1024);

        let levels = visualizer.levels();
        assert!((levels.channels[0].peak - 0.5).abs() < 0.1);
        assert!(!levels.is_clipping);

        let waveform = visualizer.waveform();
        assert_eq!(waveform.channels[0].len(), 1024);
        assert_eq!(spectrum.timestamp, levels.timestamp);
        assert_eq!(levels.timestamp, waveform.timestamp);
    }

    #[test]
    fn reset_clears_activity_and_levels() {
        let mut visualizer = Visualizer::new(48_000.0, 2, 1024, true, 0.7, 300.0, 21.3, 512).unwrap();
        let block = sine_block(1.0, 1000.0, 48_000.0, 2, 512);
        visualizer.process(&block);
        assert!(visualizer.is_active());
        visualizer.reset();
        assert!(!visualizer.is_active());
        let levels = visualizer.levels();
        assert!(levels.channels.is_empty());
    }

    #[test]
    fn clip_flag_mirrors_the_mixer_threshold() {
        let mut visualizer = Visualizer::new(48_000.0, 2, 1024, true, 0.7, 300.0, 21.3, 512).unwrap();
        let block = sine_block(1.0, 1000.0, 48_000.0, 2, 512);
        visualizer.process(&block);
        assert!(visualizer.levels().is_clipping);
    }
}
