//! Configuration for StrataKV
//!
//! Centralized configuration with sensible defaults. Loading configuration
//! from files or the environment is left to the embedding application.

use std::path::PathBuf;

use crate::error::{Result, StrataError};

/// Main configuration for a StrataKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (commit log, SSTables)
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (commit log)
    ///     └── sstables/        (one directory per SSTable)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Commit Log Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to msync the commit log
    pub wal_sync_strategy: WalSyncStrategy,

    /// Capacity the commit log region starts with (and shrinks back to after
    /// a flush), in bytes
    pub wal_initial_capacity: u64,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Memtable size (in bytes) at which a background flush is triggered
    pub memtable_size_limit: usize,
}

/// Commit log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// msync after every record (safest, slowest)
    EveryWrite,

    /// msync after N records (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./stratakv_data"),
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            wal_initial_capacity: 1024 * 1024,     // 1 MB
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memtable_size_limit == 0 {
            return Err(StrataError::Config(
                "memtable_size_limit must be greater than zero".to_string(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(StrataError::Config(
                "wal sync count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the commit log sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the initial commit log capacity (in bytes)
    pub fn wal_initial_capacity(mut self, bytes: u64) -> Self {
        self.config.wal_initial_capacity = bytes;
        self
    }

    /// Set the memtable flush threshold (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
