//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Publish the (memtable, flush snapshot, SSTables) state atomically
//! - Route writes through the commit log into the memtable
//! - Merge every source for reads
//! - Run flush and compaction on their own worker threads
//! - Replay the commit log on startup
//!
//! ## Flush State Machine
//! ```text
//!            prepare                      retire
//!  Normal ───────────▶ FlushPending ─────────────▶ Normal
//!  (memtable)          (memtable + snapshot)       (memtable, +1 SSTable)
//!                          │   ▲
//!                          └───┘ persist failed: snapshot stays readable,
//!                                the next flush writes it first
//! ```

mod state;
mod worker;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::entry::Entry;
use crate::error::{ErrorSlot, Result, StrataError};
use crate::iterator::{MergeIterator, TombstoneFilter};
use crate::memtable::MemTable;
use crate::storage::{StorageManager, TableKind};
use crate::wal::{CommitLog, WalWriter};

use state::{EngineState, FlushSnapshot};
use worker::{Trigger, Worker};

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Reads** (get/range): lock-free. They load the published state once
///   and work on that value for the rest of the call.
/// - **Writes** (upsert): hold `write_gate` shared around (commit log
///   enqueue, memtable insert), so writers run in parallel.
/// - **Flush prepare**: holds `write_gate` exclusively while it swaps in a
///   fresh memtable, so no write can land in a memtable after it froze.
/// - **State transitions** (prepare, retire, compaction install):
///   serialized by `state_lock`. Readers never take it.
pub struct Engine {
    core: Arc<Core>,

    /// Writes frozen memtables out, one at a time
    flusher: Worker,

    /// Merges all tables into one, one compaction at a time
    compactor: Worker,

    closed: AtomicBool,
}

/// State shared between the public handle and the worker threads
struct Core {
    config: Config,

    /// Directory for all SSTables
    storage_dir: PathBuf,

    storage: StorageManager,

    wal: WalWriter,

    /// Current published state
    state: ArcSwap<EngineState>,

    /// Serializes read-modify-write transitions of `state`
    state_lock: Mutex<()>,

    /// Shared by upserts, exclusive for flush prepare
    write_gate: RwLock<()>,

    /// First failure of a flush or compaction nobody was waiting for
    errors: Arc<ErrorSlot>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Load existing SSTables (dropping any superseded by compaction)
    /// 3. Replay the commit log into a fresh memtable
    /// 4. Start the commit log writer and the maintenance workers
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;

        // Step 2: Compute paths (derived from data_dir, not configurable)
        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        // Step 3: Open storage and load existing SSTables
        let storage = StorageManager::open(&storage_dir)?;
        let sstables = storage.load_tables()?;

        // Step 4: Replay the commit log
        let log = CommitLog::open(
            &wal_path,
            config.wal_initial_capacity,
            config.wal_sync_strategy,
        )?;
        let memtable = MemTable::new();
        let replayed = log.load()?;
        let replayed_count = replayed.len();
        for entry in replayed {
            memtable.put(entry);
        }
        if replayed_count > 0 {
            tracing::info!(
                entries = replayed_count,
                bytes = memtable.size(),
                "replayed commit log"
            );
        }
        let needs_flush = memtable.should_flush(config.memtable_size_limit);

        let wal = WalWriter::start(log)?;
        let errors = Arc::new(ErrorSlot::new());

        let core = Arc::new(Core {
            config,
            storage_dir,
            storage,
            wal,
            state: ArcSwap::from_pointee(EngineState::new(memtable, sstables)),
            state_lock: Mutex::new(()),
            write_gate: RwLock::new(()),
            errors: Arc::clone(&errors),
        });

        // Step 5: Start the maintenance workers
        let flusher = {
            let core = Arc::clone(&core);
            Worker::start("flush", Arc::clone(&errors), move |trigger| core.flush(trigger))?
        };
        let compactor = {
            let core = Arc::clone(&core);
            Worker::start("compaction", errors, move |_| core.compact())?
        };

        let engine = Self {
            core,
            flusher,
            compactor,
            closed: AtomicBool::new(false),
        };

        if needs_flush {
            engine.flusher.schedule();
        }

        tracing::info!(
            data_dir = %engine.core.config.data_dir.display(),
            sstables = engine.sstable_count(),
            "engine opened"
        );
        Ok(engine)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the latest value for `key`
    ///
    /// Search order (first hit wins, a tombstone means absent):
    /// 1. MemTable
    /// 2. Flush snapshot, if one is pending
    /// 3. SSTables, newest to oldest
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        let state = self.core.state.load();
        Ok(state.get(key).and_then(Entry::into_value))
    }

    /// Live entries with keys in `[from, to)`, ascending
    ///
    /// `None` leaves that side unbounded. The scan works on the state as of
    /// this call and keeps the tables it reads alive until it is dropped.
    pub fn range(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<Scan> {
        self.ensure_open()?;
        let state = self.core.state.load_full();
        let merged = MergeIterator::new(state.sources(from, to));
        Ok(Scan {
            inner: TombstoneFilter::new(merged),
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert, overwrite or (with no value) delete a key
    ///
    /// The entry is queued on the commit log and applied to the memtable.
    /// Crossing the memtable size limit schedules a flush without waiting
    /// for it.
    pub fn upsert(&self, entry: Entry) -> Result<()> {
        self.ensure_open()?;

        let needs_flush = {
            let _gate = self.core.write_gate.read();
            self.core.wal.log(&entry)?;
            let state = self.core.state.load();
            state.memtable.put(entry);
            state
                .memtable
                .should_flush(self.core.config.memtable_size_limit)
        };

        if needs_flush {
            self.flusher.schedule();
        }
        Ok(())
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.upsert(Entry::put(
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
        ))
    }

    /// Delete a key (writes a tombstone)
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.upsert(Entry::tombstone(Bytes::copy_from_slice(key)))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Write the memtable to a new SSTable and wait for it
    ///
    /// Returns `false` if there was nothing to write. Once the table is
    /// installed the flush counts as done: failing to trim the commit log
    /// afterwards is reported through [`Engine::background_error`] and
    /// [`Engine::close`] instead.
    pub fn flush(&self) -> Result<bool> {
        self.ensure_open()?;
        self.flusher.request()
    }

    /// Merge every SSTable and the in-memory data into one table and wait
    ///
    /// Returns `false` if compaction would not change anything.
    pub fn compact(&self) -> Result<bool> {
        self.ensure_open()?;
        self.compactor.request()
    }

    /// Queue a compaction without waiting for it
    pub fn schedule_compaction(&self) -> Result<()> {
        self.ensure_open()?;
        self.compactor.schedule();
        Ok(())
    }

    /// Wait until every queued commit log record is written and msynced
    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        self.core.wal.sync()
    }

    /// Close the engine gracefully
    ///
    /// Flushes the memtable, stops both workers after their queued jobs,
    /// then drains and closes the commit log. Reports the first background
    /// failure, if any. Later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let flushed = self.flusher.request();
        let flusher = self.flusher.shutdown();
        let compactor = self.compactor.shutdown();
        let wal = self.core.wal.close();

        flushed?;
        flusher?;
        compactor?;
        wal?;

        if let Some(failure) = self.core.errors.get() {
            return Err(StrataError::Background(failure));
        }
        tracing::info!(data_dir = %self.core.config.data_dir.display(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.core.config.data_dir
    }

    /// Get the storage directory path (where SSTables are stored)
    pub fn storage_dir(&self) -> &Path {
        &self.core.storage_dir
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.core.state.load().memtable.size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.core.state.load().memtable.entry_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.core.state.load().sstables.len()
    }

    /// Whether a frozen memtable is still waiting to be written
    pub fn has_pending_flush(&self) -> bool {
        self.core.state.load().snapshot.is_some()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// First failure of a background flush, compaction or commit log write
    pub fn background_error(&self) -> Option<String> {
        self.core.errors.get().or_else(|| self.core.wal.failure())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StrataError::Closed);
        }
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "engine closed with error");
        }
    }
}

impl Core {
    // =========================================================================
    // Flush
    // =========================================================================

    /// Body of the flush worker
    fn flush(&self, trigger: Trigger) -> Result<bool> {
        let mut written = false;

        // Left over from a failed attempt; it must go out before the
        // current memtable can be frozen.
        let pending = self.state.load().snapshot.clone();
        if let Some(snapshot) = pending {
            tracing::info!(token = snapshot.token, "retrying pending flush");
            self.persist(snapshot)?;
            written = true;
        }

        if trigger == Trigger::Automatic
            && !self
                .state
                .load()
                .memtable
                .should_flush(self.config.memtable_size_limit)
        {
            return Ok(written);
        }

        match self.prepare_flush()? {
            Some(snapshot) => {
                self.persist(snapshot)?;
                Ok(true)
            }
            None => Ok(written),
        }
    }

    /// Freeze the memtable. Returns `None` when it is empty.
    fn prepare_flush(&self) -> Result<Option<FlushSnapshot>> {
        let _gate = self.write_gate.write();
        let _lock = self.state_lock.lock();

        let current = self.state.load_full();
        if let Some(pending) = &current.snapshot {
            return Err(StrataError::InvariantViolation(format!(
                "flush {} is still pending",
                pending.token
            )));
        }
        if current.memtable.is_empty() {
            return Ok(None);
        }

        let snapshot = FlushSnapshot {
            token: self.storage.next_token(),
            table: Arc::clone(&current.memtable),
        };

        // Every record of the frozen memtable is queued ahead of this mark.
        self.wal.mark(snapshot.token)?;
        self.state
            .store(Arc::new(current.with_frozen_memtable(snapshot.clone())));

        tracing::debug!(
            token = snapshot.token,
            entries = snapshot.table.entry_count(),
            "froze memtable"
        );
        Ok(Some(snapshot))
    }

    /// Write `snapshot` out, install the table and drop its log records
    fn persist(&self, snapshot: FlushSnapshot) -> Result<()> {
        let table = self.storage.create_table(
            TableKind::Flush,
            snapshot.token,
            snapshot.table.iter(),
            snapshot.table.entry_count(),
            snapshot.table.size(),
        )?;

        {
            let _lock = self.state_lock.lock();
            let current = self.state.load_full();
            match &current.snapshot {
                Some(pending) if pending.token == snapshot.token => {}
                _ => {
                    table.mark_for_removal();
                    return Err(StrataError::InvariantViolation(format!(
                        "flush {} retired twice",
                        snapshot.token
                    )));
                }
            }
            self.state.store(Arc::new(current.with_flushed(table)));
        }

        // The table is already published. Records the clear failed to drop
        // stay in the log ahead of every newer record, so replaying them
        // only rewrites values the table already holds.
        if let Err(e) = self.wal.clear(snapshot.token) {
            self.errors.record("commit log clear", &e);
        }
        tracing::info!(token = snapshot.token, "flush complete");
        Ok(())
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Body of the compaction worker
    fn compact(&self) -> Result<bool> {
        let (captured, token) = {
            let _lock = self.state_lock.lock();
            let captured = self.state.load_full();
            let unchanged = !captured.has_in_memory_data()
                && match captured.sstables.as_slice() {
                    [] => true,
                    [only] => only.tombstone_count() == 0,
                    _ => false,
                };
            if unchanged {
                return Ok(false);
            }
            // Allocated together with the capture so that any flush frozen
            // after it gets a larger token.
            (captured, self.storage.next_token())
        };

        tracing::info!(
            token,
            sstables = captured.sstables.len(),
            "compaction started"
        );

        let merged = TombstoneFilter::new(MergeIterator::new(captured.sources(None, None)));
        let table = self.storage.create_table(
            TableKind::Compacted,
            token,
            merged,
            captured.entry_estimate(),
            captured.size_estimate(),
        )?;
        let entries = table.entry_count();

        {
            let _lock = self.state_lock.lock();
            let current = self.state.load_full();
            self.state
                .store(Arc::new(current.with_compacted(&captured.sstables, table)));
        }

        for obsolete in &captured.sstables {
            obsolete.mark_for_removal();
        }

        tracing::info!(token, entries, "compaction complete");
        Ok(true)
    }
}

/// Result of [`Engine::range`]: live entries in ascending key order
pub struct Scan {
    inner: TombstoneFilter<MergeIterator>,
}

impl Iterator for Scan {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
