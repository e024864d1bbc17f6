//! Time-ordered identifiers.
//!
//! Every entity id is a 128-bit UUIDv7: the leading bits carry wall-clock
//! milliseconds, so byte-wise comparison of ids from one [`IdSource`] yields
//! generation order. The textual form is the fixed-length hyphenated
//! encoding and parses back without ambiguity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FlowError;

/// An entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Id(uuid)
    }

    /// Parse the fixed-length textual form.
    pub fn parse_str(s: &str) -> Result<Self, FlowError> {
        Uuid::parse_str(s)
            .map(Id)
            .map_err(|_| FlowError::InvalidId(s.to_string()))
    }

    /// Decode from a 16-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FlowError> {
        Uuid::from_slice(bytes)
            .map(Id)
            .map_err(|_| FlowError::InvalidId(format!("{} byte slice", bytes.len())))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Source of fresh identifiers.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> Id;
}

/// Production [`IdSource`]: UUIDv7 with a strictly-monotonic guard, so ids
/// issued later within the same millisecond still sort after earlier ones.
pub struct MonotonicIdSource {
    last: Mutex<Uuid>,
}

impl MonotonicIdSource {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Uuid::nil()),
        }
    }
}

impl Default for MonotonicIdSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for MonotonicIdSource {
    fn next_id(&self) -> Id {
        let mut last = self.last.lock();
        let mut candidate = Uuid::now_v7();
        if candidate.as_bytes() <= last.as_bytes() {
            let bumped = u128::from_be_bytes(*last.as_bytes()).wrapping_add(1);
            candidate = Uuid::from_u128(bumped);
        }
        *last = candidate;
        Id(candidate)
    }
}

/// Deterministic [`IdSource`] for tests: a counter packed into the UUID,
/// preserving the byte-order-equals-generation-order contract.
pub struct FakeIdSource {
    counter: AtomicU64,
}

impl FakeIdSource {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }
}

impl Default for FakeIdSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for FakeIdSource {
    fn next_id(&self) -> Id {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Id(Uuid::from_u128(n as u128))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_ordering() {
        let source = MonotonicIdSource::new();
        let mut prev = source.next_id();
        for _ in 0..1000 {
            let next = source.next_id();
            assert!(next > prev, "ids must be strictly increasing");
            assert!(next.as_bytes() > prev.as_bytes());
            prev = next;
        }
    }

    #[test]
    fn test_text_round_trip() {
        let source = MonotonicIdSource::new();
        let id = source.next_id();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        let parsed = Id::parse_str(&text).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_bytes_round_trip() {
        let source = FakeIdSource::new();
        let id = source.next_id();
        let parsed = Id::from_slice(id.as_bytes()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_invalid_text() {
        assert!(matches!(
            Id::parse_str("not-a-uuid"),
            Err(FlowError::InvalidId(_))
        ));
    }

    #[test]
    fn test_invalid_slice_length() {
        assert!(matches!(
            Id::from_slice(&[1, 2, 3]),
            Err(FlowError::InvalidId(_))
        ));
    }

    #[test]
    fn test_fake_source_is_deterministic() {
        let a = FakeIdSource::new();
        let b = FakeIdSource::new();
        assert_eq!(a.next_id(), b.next_id());
        assert_eq!(a.next_id(), b.next_id());
    }
}
