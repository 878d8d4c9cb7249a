//! Write-Ahead Log (WAL) Module
//!
//! Provides durability for writes that have not reached an SSTable yet.
//!
//! ## Responsibilities
//! - Append every upsert before it becomes visible in the memtable
//! - Replay unflushed records on startup
//! - Drop records once the flush that captured them is installed
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Cursor: next free offset (u64)          │
//! ├─────────────────────────────────────────┤
//! │ Record 1  (see `record` module)         │
//! │ Record 2                                │
//! │ ...                                     │
//! ├─────────────────────────────────────────┤
//! │ Unused capacity (grows ×1.5 on demand)  │
//! └─────────────────────────────────────────┘
//! ```

mod commit_log;
mod writer;

pub use commit_log::{CommitLog, START_OFFSET};
pub use writer::WalWriter;

pub(crate) use commit_log::sync_parent_dir;
