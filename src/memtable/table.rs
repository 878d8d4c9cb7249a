//! MemTable implementation
//!
//! SkipMap-based memtable with an atomic size counter.

use std::cell::RefCell;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

use crate::entry::Entry;

/// In-memory table for recent writes
///
/// ## Size accounting
/// `size` moves by `new - old` for every overwrite and by `new` for a fresh
/// key. The delta is computed from the exact entry the insert replaced, so
/// the counter always equals the sum over some serialization of the puts.
pub struct MemTable {
    data: SkipMap<Bytes, Entry>,
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: SkipMap::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// Insert or overwrite `entry`, returning the entry it replaced
    pub fn put(&self, entry: Entry) -> Option<Entry> {
        let added = entry.size_bytes();
        let replaced: RefCell<Option<Entry>> = RefCell::new(None);

        // The closure sees the value being replaced. It may run more than
        // once under contention; the last call is the one that took effect.
        self.data.compare_insert(entry.key().clone(), entry, |old| {
            *replaced.borrow_mut() = Some(old.clone());
            true
        });

        let replaced = replaced.into_inner();
        let removed = replaced.as_ref().map_or(0, Entry::size_bytes);
        if added >= removed {
            self.size.fetch_add(added - removed, Ordering::AcqRel);
        } else {
            self.size.fetch_sub(removed - added, Ordering::AcqRel);
        }
        replaced
    }

    /// Point lookup. A tombstone is returned as-is.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.data.get(key).map(|e| e.value().clone())
    }

    /// Ascending entries in `[from, to)`; `None` leaves that side unbounded
    pub fn range(self: &Arc<Self>, from: Option<&[u8]>, to: Option<&[u8]>) -> MemTableRange {
        MemTableRange {
            table: Arc::clone(self),
            next: match from {
                Some(key) => Bound::Included(Bytes::copy_from_slice(key)),
                None => Bound::Unbounded,
            },
            to: to.map(Bytes::copy_from_slice),
            done: false,
        }
    }

    /// All entries in key order (for flush)
    pub fn iter(self: &Arc<Self>) -> MemTableRange {
        self.range(None, None)
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a key range of a MemTable
///
/// Holds its own `Arc` to the table and re-seeks past the last returned key
/// on every step, so it never borrows from the caller and keeps working
/// while other threads insert. Each step is therefore a skip list search,
/// O(log n), rather than a pointer hop.
pub struct MemTableRange {
    table: Arc<MemTable>,
    next: Bound<Bytes>,
    to: Option<Bytes>,
    done: bool,
}

impl Iterator for MemTableRange {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let found = match &self.next {
            Bound::Included(key) => self.table.data.lower_bound(Bound::Included(key.as_ref())),
            Bound::Excluded(key) => self.table.data.lower_bound(Bound::Excluded(key.as_ref())),
            Bound::Unbounded => self.table.data.front(),
        };

        let entry = match found {
            Some(e) => e.value().clone(),
            None => {
                self.done = true;
                return None;
            }
        };

        if let Some(to) = &self.to {
            if entry.key().as_ref() >= to.as_ref() {
                self.done = true;
                return None;
            }
        }

        self.next = Bound::Excluded(entry.key().clone());
        Some(entry)
    }
}
