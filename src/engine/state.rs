//! Engine State
//!
//! The immutable tuple readers see. Every transition builds a new value and
//! publishes it with a single atomic swap; nothing in here is ever mutated
//! after publication except the memtable's own contents.

use std::sync::Arc;

use crate::entry::Entry;
use crate::iterator::EntryIter;
use crate::memtable::MemTable;
use crate::storage::SSTable;

/// A frozen memtable waiting to be written out by flush `token`
#[derive(Clone)]
pub(crate) struct FlushSnapshot {
    pub(crate) token: u64,
    pub(crate) table: Arc<MemTable>,
}

/// (memtable, pending snapshot, SSTables oldest → newest)
#[derive(Clone)]
pub(crate) struct EngineState {
    pub(crate) memtable: Arc<MemTable>,
    pub(crate) snapshot: Option<FlushSnapshot>,
    pub(crate) sstables: Vec<Arc<SSTable>>,
}

impl EngineState {
    pub(crate) fn new(memtable: MemTable, sstables: Vec<Arc<SSTable>>) -> Self {
        Self {
            memtable: Arc::new(memtable),
            snapshot: None,
            sstables,
        }
    }

    /// Newest entry for `key` across all sources, tombstones included
    pub(crate) fn get(&self, key: &[u8]) -> Option<Entry> {
        if let Some(entry) = self.memtable.get(key) {
            return Some(entry);
        }
        if let Some(entry) = self.snapshot.as_ref().and_then(|s| s.table.get(key)) {
            return Some(entry);
        }
        self.sstables.iter().rev().find_map(|table| table.get(key))
    }

    /// One iterator per source over `[from, to)`, oldest → newest
    pub(crate) fn sources(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Vec<EntryIter> {
        let mut sources: Vec<EntryIter> = Vec::with_capacity(self.sstables.len() + 2);
        for table in &self.sstables {
            sources.push(Box::new(table.range(from, to)));
        }
        if let Some(snapshot) = &self.snapshot {
            sources.push(Box::new(snapshot.table.range(from, to)));
        }
        sources.push(Box::new(self.memtable.range(from, to)));
        sources
    }

    pub(crate) fn has_in_memory_data(&self) -> bool {
        !self.memtable.is_empty() || self.snapshot.is_some()
    }

    /// Rough number of entries across all sources (duplicates counted)
    pub(crate) fn entry_estimate(&self) -> usize {
        self.sstables.iter().map(|t| t.entry_count()).sum::<usize>()
            + self.snapshot.as_ref().map_or(0, |s| s.table.entry_count())
            + self.memtable.entry_count()
    }

    /// Rough number of payload bytes across all sources
    pub(crate) fn size_estimate(&self) -> usize {
        self.sstables.iter().map(|t| t.data_size()).sum::<usize>()
            + self.snapshot.as_ref().map_or(0, |s| s.table.size())
            + self.memtable.size()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Freeze the current memtable as `snapshot`'s table, start a fresh one
    pub(crate) fn with_frozen_memtable(&self, snapshot: FlushSnapshot) -> Self {
        Self {
            memtable: Arc::new(MemTable::new()),
            snapshot: Some(snapshot),
            sstables: self.sstables.clone(),
        }
    }

    /// Drop the pending snapshot in favour of the table it was written to
    pub(crate) fn with_flushed(&self, table: Arc<SSTable>) -> Self {
        let mut sstables = self.sstables.clone();
        sstables.push(table);
        sstables.sort_by_key(|t| t.token());
        Self {
            memtable: Arc::clone(&self.memtable),
            snapshot: None,
            sstables,
        }
    }

    /// Replace the `captured` tables with `table`, keeping every table that
    /// appeared after the capture
    pub(crate) fn with_compacted(&self, captured: &[Arc<SSTable>], table: Arc<SSTable>) -> Self {
        let mut sstables: Vec<Arc<SSTable>> = self
            .sstables
            .iter()
            .filter(|t| !captured.iter().any(|c| Arc::ptr_eq(c, t)))
            .cloned()
            .collect();
        sstables.push(table);
        sstables.sort_by_key(|t| t.token());
        Self {
            memtable: Arc::clone(&self.memtable),
            snapshot: self.snapshot.clone(),
            sstables,
        }
    }
}
