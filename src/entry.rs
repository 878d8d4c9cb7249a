//! Entry and key ordering
//!
//! An entry is a key with an optional value. A missing value is a tombstone:
//! the key was deleted as of that write.

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// Order two keys lexicographically by byte.
///
/// The first differing byte decides; when one key is a prefix of the other
/// the shorter one sorts first.
#[inline]
pub fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// A single versioned key/value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    key: Bytes,
    value: Option<Bytes>,
    /// Logical write time (unix micros). Diagnostic only: duplicates are
    /// resolved by which source an entry came from, never by this value.
    timestamp: u64,
}

impl Entry {
    /// A live key/value pair stamped with the current time
    pub fn put(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::with_timestamp(key.into(), Some(value.into()), now_micros())
    }

    /// A tombstone for `key` stamped with the current time
    pub fn tombstone(key: impl Into<Bytes>) -> Self {
        Self::with_timestamp(key.into(), None, now_micros())
    }

    pub fn with_timestamp(key: Bytes, value: Option<Bytes>, timestamp: u64) -> Self {
        Self {
            key,
            value,
            timestamp,
        }
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Bytes this entry contributes to memtable accounting
    pub fn size_bytes(&self) -> usize {
        self.key.len() + self.value.as_ref().map_or(0, |v| v.len())
    }

    pub fn into_value(self) -> Option<Bytes> {
        self.value
    }
}

pub(crate) fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
