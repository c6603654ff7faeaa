//! Clock & Frame configuration, and the engine's immutable config snapshot.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// The canonical clock: sample rate, channel count, and block size, fixed
/// once at engine initialization. All internal audio is interleaved 32-bit
/// float in [-1.0, 1.0] at this rate/channel count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames_per_block: usize,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            frames_per_block: 1024,
        }
    }
}

impl Frame {
    /// Number of interleaved f32 samples in one block.
    pub fn block_len(&self) -> usize {
        self.frames_per_block * self.channels as usize
    }

    /// Wall-clock duration of one block at this rate.
    pub fn block_period(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_block as f64 / self.sample_rate as f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate < 8000 || self.sample_rate > 192_000 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(ConfigError::InvalidChannels(self.channels));
        }
        if self.frames_per_block == 0 {
            return Err(ConfigError::InvalidBlockSize(self.frames_per_block));
        }
        Ok(())
    }
}

/// Ducking envelope defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DuckingDefaults {
    pub floor: f32,
    pub attack_ms: u32,
    pub release_ms: u32,
}

impl Default for DuckingDefaults {
    fn default() -> Self {
        Self {
            floor: 0.15,
            attack_ms: 80,
            release_ms: 300,
        }
    }
}

/// Visualizer defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisualizerDefaults {
    pub fft_size: usize,
    pub smoothing: f32,
    pub peak_hold_ms: u32,
    pub waveform_len: usize,
    /// Whether spectrum analysis windows the last FFT-size samples with a
    /// Hann window before the FFT.
    pub use_window: bool,
}

impl Default for VisualizerDefaults {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.7,
            peak_hold_ms: 300,
            waveform_len: 1024,
            use_window: true,
        }
    }
}

/// Immutable configuration snapshot, installed at a block boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub frame: Frame,
    /// Ring buffer capacity, in whole blocks (default 8).
    pub ring_capacity_blocks: usize,
    pub ducking: DuckingDefaults,
    pub visualizer: VisualizerDefaults,
    /// Meter decay time constant for display smoothing (default 300 ms).
    pub meter_decay_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame: Frame::default(),
            ring_capacity_blocks: 8,
            ducking: DuckingDefaults::default(),
            visualizer: VisualizerDefaults::default(),
            meter_decay_ms: 300,
        }
    }
}

impl EngineConfig {
    /// Low-latency preset: smaller block, shallower rings.
    pub fn low_latency() -> Self {
        Self {
            frame: Frame {
                sample_rate: 48_000,
                channels: 2,
                frames_per_block: 256,
            },
            ring_capacity_blocks: 4,
            ..Self::default()
        }
    }

    /// Stability preset: larger block, deeper rings.
    pub fn stable() -> Self {
        Self {
            frame: Frame {
                sample_rate: 48_000,
                channels: 2,
                frames_per_block: 2048,
            },
            ring_capacity_blocks: 12,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.frame.validate()?;
        if self.ring_capacity_blocks == 0 {
            return Err(ConfigError::InvalidRingCapacity(self.ring_capacity_blocks));
        }
        if !self.visualizer.fft_size.is_power_of_two() {
            return Err(ConfigError::FftSizeNotPowerOfTwo(self.visualizer.fft_size));
        }
        if !(0.0..=1.0).contains(&self.ducking.floor) {
            return Err(ConfigError::OutOfRange("ducking.floor"));
        }
        Ok(())
    }

    /// Platform-specific path the control plane's config-section repository
    /// persists `EngineConfig`'s JSON-serialized sections under, e.g.
    /// `~/.config/radio/radio/config.json` on Linux.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "radio", "radio").map(|proj| proj.config_dir().join("config.json"))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),
    #[error("invalid channel count: {0}")]
    InvalidChannels(u16),
    #[error("invalid block size: {0}")]
    InvalidBlockSize(usize),
    #[error("invalid ring capacity: {0}")]
    InvalidRingCapacity(usize),
    #[error("FFT size must be a power of two, got {0}")]
    FftSizeNotPowerOfTwo(usize),
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_frame_is_reference_rate() {
        let frame = Frame::default();
        assert_eq!(frame.sample_rate, 48_000);
        assert_eq!(frame.channels, 2);
        assert_eq!(frame.frames_per_block, 1024);
    }

    #[test]
    fn block_period_is_about_21_ms() {
        let frame = Frame::default();
        let ms = frame.block_period().as_secs_f64() * 1000.0;
        assert!((ms - 21.33).abs() < 0.1);
    }

    #[test]
    fn rejects_non_power_of_two_fft_size() {
        let mut config = EngineConfig::default();
        config.visualizer.fft_size = 2000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FftSizeNotPowerOfTwo(_))
        ));
    }

    #[test]
    fn presets_differ_in_latency() {
        let low = EngineConfig::low_latency();
        let stable = EngineConfig::stable();
        assert!(low.frame.frames_per_block < stable.frame.frames_per_block);
        assert!(low.frame.block_period() < stable.frame.block_period());
    }

    #[test]
    fn default_config_path_ends_in_config_json() {
        if let Some(path) = EngineConfig::default_config_path() {
            assert_eq!(path.file_name().unwrap(), "config.json");
        }
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.frame.sample_rate, back.frame.sample_rate);
    }
}
