//! SSTable Iterator
//!
//! Sequential iteration over a contiguous slice of a table's data file.

use std::sync::Arc;

use crate::entry::Entry;
use crate::record;

use super::SSTable;

/// Iterator over SSTable entries in sorted key order
///
/// Keeps the table (and so its mappings) alive until the iterator drops.
pub struct SSTableIterator {
    table: Arc<SSTable>,
    /// Offset of the next record
    position: usize,
    /// Stop before this offset
    end: usize,
}

impl SSTableIterator {
    pub(super) fn new(table: Arc<SSTable>, position: usize, end: usize) -> Self {
        Self {
            table,
            position,
            end,
        }
    }
}

impl Iterator for SSTableIterator {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.end {
            return None;
        }

        let (entry, next) = record::decode_trusted(self.table.data_bytes(), self.position);
        self.position = next;
        Some(entry)
    }
}
