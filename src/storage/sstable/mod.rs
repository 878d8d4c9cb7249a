//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## Layout
//! Each table is a directory holding two files:
//! ```text
//! data.db   ┌──────────────────────────────────────────────────────┐
//!           │ Record 0 │ Record 1 │ ... │ Record N-1               │
//!           │ (see `record` module, ascending by key)              │
//!           └──────────────────────────────────────────────────────┘
//! index.db  ┌──────────────────────────────────────────────────────┐
//!           │ Offset 0 (u64) │ Offset 1 (u64) │ ... │ Offset N-1   │
//!           │ (byte offset of each record in data.db)              │
//!           └──────────────────────────────────────────────────────┘
//! ```
//! Both files are memory-mapped read-only; lookups binary-search the index
//! and compare keys straight out of the data mapping.

mod builder;
mod iterator;
mod reader;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::{SSTable, TableKind};

// =============================================================================
// Shared Constants (used by builder, reader, manager)
// =============================================================================

/// Records, sorted by key
pub(crate) const DATA_FILE: &str = "data.db";

/// One little-endian u64 offset per record
pub(crate) const INDEX_FILE: &str = "index.db";

/// Directory name prefix of flush output
pub(crate) const FLUSH_PREFIX: &str = "sstable_";

/// Directory name prefix of compaction output
pub(crate) const COMPACTED_PREFIX: &str = "compacted_";

/// Width of one index slot
pub(crate) const INDEX_ENTRY_SIZE: usize = 8;
