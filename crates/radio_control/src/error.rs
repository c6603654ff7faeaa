//! The external error taxonomy that every RPC verb returns: a typed kind
//! plus a message, so a caller can branch on what went wrong instead of
//! string-matching an error's `Display` output.

use thiserror::Error;

use radio_core::{EngineError, ErrorTaxonomy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlErrorKind {
    Unsupported,
    OutOfRange,
    NotFound,
    Busy,
    Unavailable,
    Transient,
    Fatal,
}

/// A control-plane error: the flat external kind plus a human-readable
/// message, returned synchronously to the RPC caller regardless of what
/// happens on the mixer thread. The mixer keeps running either way.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct ControlError {
    pub kind: ControlErrorKind,
    pub message: String,
}

impl ControlError {
    pub fn new(kind: ControlErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ControlErrorKind::Unsupported, message)
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(ControlErrorKind::OutOfRange, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ControlErrorKind::NotFound, message)
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ControlErrorKind::Busy, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ControlErrorKind::Unavailable, message)
    }
}

impl From<EngineError> for ControlError {
    fn from(err: EngineError) -> Self {
        let kind = match err.taxonomy() {
            ErrorTaxonomy::Unsupported => ControlErrorKind::Unsupported,
            ErrorTaxonomy::OutOfRange => ControlErrorKind::OutOfRange,
            ErrorTaxonomy::NotFound => ControlErrorKind::NotFound,
            ErrorTaxonomy::Busy => ControlErrorKind::Busy,
            ErrorTaxonomy::Unavailable => ControlErrorKind::Unavailable,
            ErrorTaxonomy::Transient => ControlErrorKind::Transient,
            ErrorTaxonomy::Fatal => ControlErrorKind::Fatal,
        };
        let message = err.to_string();
        Self { kind, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_carries_its_taxonomy_kind_through() {
        let err: ControlError = EngineError::Busy("usb-turntable-0".into()).into();
        assert_eq!(err.kind, ControlErrorKind::Busy);
        assert!(err.message.contains("usb-turntable-0"));
    }

    #[test]
    fn unknown_source_maps_to_not_found() {
        let err: ControlError = EngineError::UnknownSource("radio-9".into()).into();
        assert_eq!(err.kind, ControlErrorKind::NotFound);
    }
}
