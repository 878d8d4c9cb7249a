//! Storage Manager
//!
//! Owns the SSTable directory and everything about naming tables.
//!
//! ## Responsibilities
//! - Hand out time-derived, strictly increasing tokens
//! - Create new tables (flush and compaction output) atomically
//! - Discover existing tables on startup, oldest → newest
//! - Remove tables superseded by a compaction that finished before a crash

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::entry::{now_micros, Entry};
use crate::error::Result;

use super::sstable::{SSTable, TableKind};

/// Prefix of directories holding a table that is still being written
const TMP_PREFIX: &str = ".tmp_";

/// Manages the on-disk table directory
///
/// ## Concurrency:
/// - `last_token`: Mutex around the token clock (held for a few instructions)
/// - All methods use `&self`; table creation itself needs no lock because
///   every table gets its own token and therefore its own directory
pub struct StorageManager {
    /// Directory that holds one sub-directory per SSTable
    root: PathBuf,

    /// Last token handed out (or the largest one found on disk)
    last_token: Mutex<u64>,
}

impl StorageManager {
    /// Open or create the table directory at `path`
    ///
    /// On startup:
    /// 1. Create the directory if it doesn't exist
    /// 2. Delete leftover temporary directories from interrupted writes
    /// 3. Seed the token clock past every token found on disk
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut last_token = 0u64;
        for dir_entry in fs::read_dir(path)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else { continue };

            if let Some(token) = name.strip_prefix(TMP_PREFIX) {
                if let Ok(token) = token.parse::<u64>() {
                    last_token = last_token.max(token);
                }
                tracing::warn!(dir = %dir_entry.path().display(), "removing unfinished SSTable");
                fs::remove_dir_all(dir_entry.path())?;
            } else if let Some((_, token)) = TableKind::parse_dir_name(name) {
                last_token = last_token.max(token);
            }
        }

        Ok(Self {
            root: path.to_path_buf(),
            last_token: Mutex::new(last_token),
        })
    }

    /// Open every live table, ordered oldest → newest by token
    ///
    /// A compacted table covers everything older than itself. Tables with a
    /// smaller token than the newest compacted one are left over from a
    /// compaction that was installed but not cleaned up; they are deleted
    /// here instead of being opened.
    pub fn load_tables(&self) -> Result<Vec<Arc<SSTable>>> {
        let mut found: Vec<(u64, TableKind, PathBuf)> = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let name = dir_entry.file_name();
            if let Some((kind, token)) = name.to_str().and_then(TableKind::parse_dir_name) {
                found.push((token, kind, dir_entry.path()));
            }
        }
        found.sort_by_key(|(token, _, _)| *token);

        let newest_compacted = found
            .iter()
            .filter(|(_, kind, _)| *kind == TableKind::Compacted)
            .map(|(token, _, _)| *token)
            .max();

        let mut tables = Vec::with_capacity(found.len());
        for (token, _, dir) in found {
            if newest_compacted.is_some_and(|newest| token < newest) {
                tracing::warn!(dir = %dir.display(), "removing SSTable superseded by compaction");
                fs::remove_dir_all(&dir)?;
                continue;
            }
            tables.push(Arc::new(SSTable::open(&dir)?));
        }

        tracing::info!(count = tables.len(), dir = %self.root.display(), "loaded SSTables");
        Ok(tables)
    }

    /// Write `entries` (strictly ascending) as table `token` of `kind`
    ///
    /// The table is built under a temporary name and renamed into place, so
    /// a crash leaves either the complete table or nothing that is read.
    pub fn create_table<I>(
        &self,
        kind: TableKind,
        token: u64,
        entries: I,
        count_hint: usize,
        size_hint: usize,
    ) -> Result<Arc<SSTable>>
    where
        I: IntoIterator<Item = Entry>,
    {
        let tmp_dir = self.root.join(format!("{}{:020}", TMP_PREFIX, token));
        let final_dir = self.table_path(kind, token);

        // Left behind by an earlier attempt at the same token whose table
        // was never published
        for stale in [&tmp_dir, &final_dir] {
            if stale.exists() {
                fs::remove_dir_all(stale)?;
            }
        }

        match SSTable::create(&tmp_dir, &final_dir, entries, count_hint, size_hint) {
            Ok(table) => {
                tracing::info!(
                    dir = %final_dir.display(),
                    entries = table.entry_count(),
                    bytes = table.data_size(),
                    "created SSTable"
                );
                Ok(Arc::new(table))
            }
            Err(e) => {
                if tmp_dir.exists() {
                    let _ = fs::remove_dir_all(&tmp_dir);
                }
                Err(e)
            }
        }
    }

    /// Next token: the current time in unix microseconds, bumped if needed
    /// so tokens are strictly increasing
    pub fn next_token(&self) -> u64 {
        let mut last = self.last_token.lock();
        let token = now_micros().max(*last + 1);
        *last = token;
        token
    }

    /// Directory of table `token` of `kind`
    pub fn table_path(&self, kind: TableKind, token: u64) -> PathBuf {
        self.root.join(kind.dir_name(token))
    }

    /// Get the table directory path
    pub fn root(&self) -> &Path {
        &self.root
    }
}
