//! Iterator Module
//!
//! Combines sorted entry streams from every source of the engine into the
//! single view readers and compaction see.
//!
//! ## Source Order
//! ```text
//!  oldest                                              newest
//!  SSTable(t1) ─ SSTable(t2) ─ ... ─ flush snapshot ─ memtable
//! ```
//! When several sources hold the same key the newest one wins. Timestamps
//! inside entries play no part in this.

mod merge;

pub use merge::{EntryIter, MergeIterator, TombstoneFilter};
