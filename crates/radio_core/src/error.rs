//! Engine error types.
//!
//! Internal variants describe what actually went wrong inside the engine;
//! [`EngineError::taxonomy`] maps each one onto the flat external taxonomy
//! exposed across the control plane (Unsupported / OutOfRange /
//! NotFound / Busy / Unavailable / Transient / Fatal).

use thiserror::Error;

/// Errors that can occur in the audio engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no audio devices found")]
    NoDevicesFound,

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("failed to play audio stream: {0}")]
    StreamPlayError(String),

    #[error("stream configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("engine already running")]
    AlreadyRunning,

    #[error("engine not running")]
    NotRunning,

    #[error("ring buffer overflow - audio thread can't keep up")]
    BufferOverflow,

    #[error("ring buffer underflow - not enough data available")]
    BufferUnderflow,

    #[error("dsp error: {0}")]
    DspError(#[from] radio_dsp::DspError),

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("source does not support this operation: {0}")]
    Unsupported(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("device already in use: {0}")]
    Busy(String),

    #[error("source or sink unavailable: {0}")]
    Unavailable(String),

    #[error("transient failure, retry may succeed: {0}")]
    Transient(String),

    #[error("channel send error - receiver dropped")]
    ChannelSendError,

    #[error("channel receive error - sender dropped")]
    ChannelRecvError,
}

/// The flat external category a given `EngineError` belongs to.
/// Control-plane adapters use this to pick an HTTP-ish status
/// rather than leaking internal variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTaxonomy {
    Unsupported,
    OutOfRange,
    NotFound,
    Busy,
    Unavailable,
    Transient,
    Fatal,
}

impl EngineError {
    pub fn taxonomy(&self) -> ErrorTaxonomy {
        match self {
            EngineError::NoDevicesFound => ErrorTaxonomy::NotFound,
            EngineError::DeviceNotFound(_) => ErrorTaxonomy::NotFound,
            EngineError::UnknownSource(_) => ErrorTaxonomy::NotFound,
            EngineError::Unsupported(_) => ErrorTaxonomy::Unsupported,
            EngineError::OutOfRange(_) => ErrorTaxonomy::OutOfRange,
            EngineError::ConfigError(_) => ErrorTaxonomy::OutOfRange,
            EngineError::Busy(_) => ErrorTaxonomy::Busy,
            EngineError::AlreadyRunning => ErrorTaxonomy::Busy,
            EngineError::Unavailable(_) => ErrorTaxonomy::Unavailable,
            EngineError::NotRunning => ErrorTaxonomy::Unavailable,
            EngineError::Transient(_) => ErrorTaxonomy::Transient,
            EngineError::BufferOverflow | EngineError::BufferUnderflow => ErrorTaxonomy::Transient,
            EngineError::StreamBuildError(_)
            | EngineError::StreamPlayError(_)
            | EngineError::DspError(_)
            | EngineError::ChannelSendError
            | EngineError::ChannelRecvError => ErrorTaxonomy::Fatal,
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::NoDevicesFound;
        assert!(err.to_string().contains("no audio devices"));

        let err = EngineError::DeviceNotFound("Test Device".into());
        assert!(err.to_string().contains("Test Device"));
    }

    #[test]
    fn test_error_from_dsp() {
        let dsp_err = radio_dsp::DspError::InvalidFftSize(17);
        let engine_err: EngineError = dsp_err.into();
        assert!(matches!(engine_err, EngineError::DspError(_)));
    }

    #[test]
    fn taxonomy_maps_unknown_source_to_not_found() {
        let err = EngineError::UnknownSource("radio-9".into());
        assert_eq!(err.taxonomy(), ErrorTaxonomy::NotFound);
    }

    #[test]
    fn taxonomy_maps_busy_device() {
        let err = EngineError::Busy("usb-turntable-0".into());
        assert_eq!(err.taxonomy(), ErrorTaxonomy::Busy);
    }
}
