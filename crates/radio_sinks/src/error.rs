//! Sink error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("no output device found")]
    NoDeviceFound,

    #[error("output device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to build output stream: {0}")]
    StreamBuildError(String),

    #[error("failed to start output stream: {0}")]
    StreamPlayError(String),

    #[error("sink thread failed to start: {0}")]
    ThreadSpawnError(String),

    #[error("http broadcast server failed to bind {0}: {1}")]
    BindFailed(String, String),

    #[error("client channel full, disconnecting: {0}")]
    ClientBackpressure(String),

    #[error("discovery error: {0}")]
    DiscoveryError(String),
}

impl From<SinkError> for radio_core::EngineError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::NoDeviceFound => radio_core::EngineError::NoDevicesFound,
            SinkError::DeviceNotFound(d) => radio_core::EngineError::DeviceNotFound(d),
            SinkError::StreamBuildError(e) => radio_core::EngineError::StreamBuildError(e),
            SinkError::StreamPlayError(e) => radio_core::EngineError::StreamPlayError(e),
            SinkError::ThreadSpawnError(e) => radio_core::EngineError::StreamBuildError(e),
            SinkError::BindFailed(addr, e) => {
                radio_core::EngineError::Unavailable(format!("{addr}: {e}"))
            }
            SinkError::ClientBackpressure(c) => radio_core::EngineError::Transient(c),
            SinkError::DiscoveryError(e) => radio_core::EngineError::Unavailable(e),
        }
    }
}
