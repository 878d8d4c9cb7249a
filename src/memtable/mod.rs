//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast concurrent reads and writes in memory, no external locking
//! - Track approximate byte size for flush triggers
//! - Ordered iteration for flushes and range scans
//!
//! ## Data Structure Choice
//! `crossbeam_skiplist::SkipMap`:
//! - Ordered keys (required for SSTable generation)
//! - Lock-free inserts and lookups from any number of threads
//! - Entries are never removed; a frozen memtable is dropped as a whole once
//!   its SSTable is installed

mod table;

pub use table::{MemTable, MemTableRange};
