//! Record codec
//!
//! The self-describing record shared by the commit log and SSTable data
//! files. All integers are little-endian `u64`:
//!
//! ```text
//! ┌──────────┬───────────┬───────────┬─────────────────────┬─────────────┐
//! │ KeyLen   │ Key       │ Timestamp │ ValueLen            │ Value       │
//! │ (8)      │ (KeyLen)  │ (8)       │ (8, MAX = tombstone)│ (ValueLen)  │
//! └──────────┴───────────┴───────────┴─────────────────────┴─────────────┘
//! ```
//!
//! Tombstones carry no value bytes.

use std::io::{self, Write};

use bytes::Bytes;

use crate::entry::Entry;
use crate::error::{Result, StrataError};

/// Width of every length/time field
pub(crate) const FIELD_SIZE: usize = 8;

/// Value length written for a tombstone
pub(crate) const TOMBSTONE_MARKER: u64 = u64::MAX;

/// Encoded size of `entry`
pub(crate) fn encoded_len(entry: &Entry) -> usize {
    FIELD_SIZE * 3 + entry.size_bytes()
}

/// Stream `entry` into `writer`, returning the number of bytes written
pub(crate) fn write_to<W: Write>(writer: &mut W, entry: &Entry) -> io::Result<usize> {
    let key = entry.key();
    writer.write_all(&(key.len() as u64).to_le_bytes())?;
    writer.write_all(key)?;
    writer.write_all(&entry.timestamp().to_le_bytes())?;
    match entry.value() {
        Some(value) => {
            writer.write_all(&(value.len() as u64).to_le_bytes())?;
            writer.write_all(value)?;
        }
        None => writer.write_all(&TOMBSTONE_MARKER.to_le_bytes())?,
    }
    Ok(encoded_len(entry))
}

#[inline]
pub(crate) fn read_u64(src: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; FIELD_SIZE];
    raw.copy_from_slice(&src[at..at + FIELD_SIZE]);
    u64::from_le_bytes(raw)
}

/// Decode the record starting at `at`, checking every length against the
/// buffer. Returns the entry and the offset just past it.
pub(crate) fn decode(src: &[u8], at: usize) -> Result<(Entry, usize)> {
    let layout = checked_layout(src, at)?;
    Ok((layout.entry(src), layout.end))
}

/// Decode the record at `at` from a buffer that already passed
/// [`checked_layout`] for this offset.
pub(crate) fn decode_trusted(src: &[u8], at: usize) -> (Entry, usize) {
    let layout = trusted_layout(src, at);
    (layout.entry(src), layout.end)
}

/// Key of the record at `at` in a validated buffer
#[inline]
pub(crate) fn key_trusted(src: &[u8], at: usize) -> &[u8] {
    let key_len = read_u64(src, at) as usize;
    let start = at + FIELD_SIZE;
    &src[start..start + key_len]
}

/// Byte positions of one record's fields
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordLayout {
    key_start: usize,
    key_end: usize,
    timestamp: u64,
    value: Option<(usize, usize)>,
    pub(crate) end: usize,
}

impl RecordLayout {
    fn entry(&self, src: &[u8]) -> Entry {
        Entry::with_timestamp(
            Bytes::copy_from_slice(&src[self.key_start..self.key_end]),
            self.value
                .map(|(start, end)| Bytes::copy_from_slice(&src[start..end])),
            self.timestamp,
        )
    }

    pub(crate) fn key<'a>(&self, src: &'a [u8]) -> &'a [u8] {
        &src[self.key_start..self.key_end]
    }

    pub(crate) fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

fn trusted_layout(src: &[u8], at: usize) -> RecordLayout {
    let key_len = read_u64(src, at) as usize;
    let key_start = at + FIELD_SIZE;
    let key_end = key_start + key_len;
    let timestamp = read_u64(src, key_end);
    let value_len = read_u64(src, key_end + FIELD_SIZE);
    let value_start = key_end + FIELD_SIZE * 2;

    let (value, end) = if value_len == TOMBSTONE_MARKER {
        (None, value_start)
    } else {
        let value_end = value_start + value_len as usize;
        (Some((value_start, value_end)), value_end)
    };

    RecordLayout {
        key_start,
        key_end,
        timestamp,
        value,
        end,
    }
}

/// Locate the fields of the record at `at`, failing with `Corruption` if any
/// of them would run past the end of `src`.
pub(crate) fn checked_layout(src: &[u8], at: usize) -> Result<RecordLayout> {
    let fits = |start: usize, len: u64| -> Result<usize> {
        usize::try_from(len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .filter(|&end| end <= src.len())
            .ok_or_else(|| {
                StrataError::Corruption(format!(
                    "record at offset {} overruns buffer of {} bytes",
                    at,
                    src.len()
                ))
            })
    };

    let key_start = fits(at, FIELD_SIZE as u64)?;
    let key_end = fits(key_start, read_u64(src, at))?;
    let value_len_at = fits(key_end, FIELD_SIZE as u64)?;
    let value_start = fits(value_len_at, FIELD_SIZE as u64)?;

    let value_len = read_u64(src, value_len_at);
    if value_len != TOMBSTONE_MARKER {
        fits(value_start, value_len)?;
    }

    Ok(trusted_layout(src, at))
}
