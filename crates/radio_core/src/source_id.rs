//! Opaque, stable source identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::capability::SourceKind;

/// Opaque, stable identifier for a [`crate::Source`], unique for the
/// engine's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Generates stable, human-legible `SourceId`s (`"radio-0"`, `"tts-3"`, ...)
/// from a monotonic counter. Shared by the Engine for every spawned source.
#[derive(Debug, Default)]
pub struct SourceIdGenerator {
    counter: AtomicU64,
}

impl SourceIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    pub fn next(&self, kind: SourceKind) -> SourceId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        SourceId(format!("{}-{}", kind.tag(), n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_tagged() {
        let gen = SourceIdGenerator::new();
        let a = gen.next(SourceKind::Radio);
        let b = gen.next(SourceKind::Tts);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("radio-"));
        assert!(b.as_str().starts_with("tts-"));
    }
}
