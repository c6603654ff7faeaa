//! DSP Error Types

use thiserror::Error;

/// Errors that can occur during DSP operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("FFT size must be a power of two, got {0}")]
    InvalidFftSize(usize),

    #[error("smoothing factor must be in [0,1], got {0}")]
    InvalidSmoothing(f32),

    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(f32),

    #[error("buffer size mismatch: expected {expected}, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },

    #[error("resample ratio must be positive, got {0}")]
    InvalidResampleRatio(f64),
}
