//! # StrataKV
//!
//! An embedded, single-node log-structured merge storage engine with:
//! - A memory-mapped commit log for durability, written off the caller's thread
//! - A lock-free sorted memtable
//! - Immutable, memory-mapped SSTables with a binary-searched offset index
//! - Background flush and full compaction on dedicated worker threads
//! - Lock-free reads over an atomically published state
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │        get / range / upsert / flush / compact / close       │
//! └──────┬───────────────────────┬───────────────────────┬──────┘
//!        │ upsert                │ reads                 │ maintenance
//!        ▼                       ▼                       ▼
//! ┌─────────────┐   ┌────────────────────────┐   ┌──────────────┐
//! │  WalWriter  │   │  EngineState (ArcSwap) │   │ flush worker │
//! │  (thread)   │   │ memtable / snapshot    │   │ compaction   │
//! └──────┬──────┘   │ SSTables (old → new)   │   │   worker     │
//!        ▼          └───────────┬────────────┘   └───────┬──────┘
//! ┌─────────────┐               │ MergeIterator          │
//! │  wal.log    │               ▼                        ▼
//! │  (mmap)     │        ┌─────────────────────────────────────┐
//! └─────────────┘        │  StorageManager: sstables/<token>/  │
//!                        │  data.db + index.db (mmap)          │
//!                        └─────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod entry;
pub(crate) mod record;
pub mod memtable;
pub mod wal;
pub mod storage;
pub mod iterator;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StrataError};
pub use config::{Config, WalSyncStrategy};
pub use engine::{Engine, Scan};
pub use entry::Entry;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StrataKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
