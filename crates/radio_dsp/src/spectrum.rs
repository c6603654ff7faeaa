//! Windowed FFT spectrum analysis.
//!
//! Keeps the rustfft + Hann-window + attack/decay smoothing machinery of a
//! conventional real-time spectrum analyzer, but returns the full linear
//! per-bin magnitude array (length `fft_size/2`) instead of collapsing it
//! into a handful of display-rounded bins: downstream visualization
//! consumers need bin-accurate spectra.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::error::DspError;

/// Precomputed Hann window coefficients for a given FFT size.
fn hann_coeffs(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|n| 0.5 * (1.0 - (std::f32::consts::TAU * n as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// Computes the windowed FFT of the most recent `fft_size` samples pushed
/// into it and exposes a magnitude vector of length `fft_size/2`.
pub struct Spectrum {
    fft_size: usize,
    sample_rate: f32,
    use_window: bool,
    smoothing: f32,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    ring: Vec<f32>,
    write_pos: usize,
    filled: usize,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    bin_freqs: Vec<f32>,
}

impl Spectrum {
    /// `smoothing` is the exponential retain factor in [0,1] (default 0.7
    /// retain). `fft_size` must be a power of two.
    pub fn new(fft_size: usize, sample_rate: f32, use_window: bool, smoothing: f32) -> Result<Self, DspError> {
        if fft_size == 0 || !fft_size.is_power_of_two() {
            return Err(DspError::InvalidFftSize(fft_size));
        }
        if !(0.0..=1.0).contains(&smoothing) {
            return Err(DspError::InvalidSmoothing(smoothing));
        }
        if sample_rate <= 0.0 {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let bin_freqs = (0..fft_size / 2)
            .map(|k| k as f32 * sample_rate / fft_size as f32)
            .collect();

        Ok(Self {
            fft_size,
            sample_rate,
            use_window,
            smoothing,
            window: hann_coeffs(fft_size),
            fft,
            ring: vec![0.0; fft_size],
            write_pos: 0,
            filled: 0,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            magnitudes: vec![0.0; fft_size / 2],
            bin_freqs,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Frequency in Hz at the center of bin `k`, `k · sample_rate / N`.
    pub fn bin_frequencies(&self) -> &[f32] {
        &self.bin_freqs
    }

    /// Mixes an interleaved multi-channel block to mono and feeds it into
    /// the analysis ring. Recomputes the magnitude vector once enough
    /// samples have accumulated; otherwise the prior magnitudes are kept
    /// (the visualizer's snapshot stays "latest fully-formed result").
    pub fn push_block(&mut self, block: &[f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for frame in block.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() / channels as f32;
            self.ring[self.write_pos] = mono;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
            self.filled = (self.filled + 1).min(self.fft_size);
        }
        if self.filled == self.fft_size {
            self.recompute();
        }
    }

    fn recompute(&mut self) {
        for i in 0..self.fft_size {
            let idx = (self.write_pos + i) % self.fft_size;
            let sample = self.ring[idx];
            let windowed = if self.use_window {
                sample * self.window[i]
            } else {
                sample
            };
            self.scratch[i] = Complex::new(windowed, 0.0);
        }
        self.fft.process(&mut self.scratch);

        // Normalize so a full-scale sine at one bin reads close to 1.0.
        let norm = if self.use_window {
            self.fft_size as f32 / 4.0
        } else {
            self.fft_size as f32 / 2.0
        };

        for (bin, c) in self.magnitudes.iter_mut().zip(self.scratch.iter()) {
            let raw = c.norm() / norm;
            *bin = *bin * self.smoothing + raw * (1.0 - self.smoothing);
        }
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn reset(&mut self) {
        self.ring.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
        self.filled = 0;
        self.magnitudes.iter_mut().for_each(|m| *m = 0.0);
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
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
    fn rejects_non_power_of_two() {
        assert!(matches!(
            Spectrum::new(2000, 48_000.0, true, 0.7),
            Err(DspError::InvalidFftSize(2000))
        ));
    }

    #[test]
    fn magnitude_length_is_half_fft_size() {
        let spectrum = Spectrum::new(2048, 48_000.0, true, 0.7).unwrap();
        assert_eq!(spectrum.magnitudes().len(), 1024);
        assert_eq!(spectrum.bin_frequencies().len(), 1024);
    }

    #[test]
    fn bin_centers_match_k_times_sample_rate_over_n() {
        let spectrum = Spectrum::new(2048, 48_000.0, true, 0.7).unwrap();
        let freqs = spectrum.bin_frequencies();
        assert_eq!(freqs[0], 0.0);
        assert!((freqs[1] - 48_000.0 / 2048.0).abs() < 1e-3);
    }

    #[test]
    fn sine_peak_lands_within_one_bin_of_440hz() {
        let sample_rate = 48_000.0;
        let fft_size = 2048;
        let mut spectrum = Spectrum::new(fft_size, sample_rate, true, 0.0).unwrap();
        let block = sine_block(0.5, 440.0, sample_rate, 2, fft_size);
        spectrum.push_block(&block, 2);

        let bin_width = sample_rate / fft_size as f32;
        let expected_bin = (440.0 / bin_width).round() as usize;
        let (peak_bin, _) = spectrum
            .magnitudes()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        assert!((peak_bin as i64 - expected_bin as i64).abs() <= 1);
    }

    #[test]
    fn reset_zeroes_magnitudes() {
        let sample_rate = 48_000.0;
        let fft_size = 512;
        let mut spectrum = Spectrum::new(fft_size, sample_rate, true, 0.0).unwrap();
        let block = sine_block(0.8, 1000.0, sample_rate, 2, fft_size);
        spectrum.push_block(&block, 2);
        assert!(spectrum.magnitudes().iter().any(|&m| m > 0.0));
        spectrum.reset();
        assert!(spectrum.magnitudes().iter().all(|&m| m == 0.0));
    }
}
