//! Storage Module
//!
//! Persistent storage layer: immutable, memory-mapped SSTables and the
//! manager that names, creates and discovers them.
//!
//! ## Responsibilities
//! - Persist frozen memtables and compaction output in sorted form
//! - Efficient range scans and point lookups (binary search, no copies
//!   until an entry is returned)
//! - Crash-safe creation (temporary directory + rename)
//! - Startup cleanup of tables superseded by a compaction
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/sstables/
//!   ├── sstable_<token>/      flush output
//!   │     ├── data.db
//!   │     └── index.db
//!   ├── compacted_<token>/    compaction output
//!   └── .tmp_<token>/         table being written, never read
//! ```
//! Tokens are zero-padded to 20 digits so names sort like their tokens.

mod manager;
pub mod sstable;

pub use manager::StorageManager;
pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, TableKind};
