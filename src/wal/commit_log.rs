//! Commit Log
//!
//! A growable, memory-mapped append-only region. The first 8 bytes hold the
//! offset of the next free byte; records follow back to back.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::config::WalSyncStrategy;
use crate::entry::Entry;
use crate::error::{Result, StrataError};
use crate::record;

/// First record offset (just past the cursor header)
pub const START_OFFSET: u64 = 8;

/// Growth factor applied whenever the region is (re)sized
const GROWTH_FACTOR: f64 = 1.5;

/// Memory-mapped commit log file
pub struct CommitLog {
    path: PathBuf,
    file: File,
    map: MmapMut,
    /// Next free offset (mirrors the on-disk header)
    cursor: u64,
    initial_capacity: u64,
    sync_strategy: WalSyncStrategy,
    /// Records appended since the last msync
    uncommitted: usize,
}

impl CommitLog {
    /// Open or create the commit log at `path`
    ///
    /// A fresh file is sized to `initial_capacity × 1.5`. An existing file
    /// keeps its size and cursor; call [`CommitLog::load`] to replay it.
    pub fn open(path: &Path, initial_capacity: u64, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let initial_capacity = initial_capacity.max(START_OFFSET);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let existing_len = file.metadata()?.len();
        let fresh = existing_len == 0;
        if !fresh && existing_len < START_OFFSET {
            return Err(StrataError::Corruption(format!(
                "commit log {} is {} bytes, shorter than its header",
                path.display(),
                existing_len
            )));
        }

        if fresh {
            file.set_len(grown(initial_capacity))?;
        }

        // SAFETY: the file is owned by this process for the engine's
        // lifetime; nothing else truncates it while mapped.
        let mut map = unsafe { MmapMut::map_mut(&file)? };

        let cursor = if fresh {
            map[..8].copy_from_slice(&START_OFFSET.to_le_bytes());
            map.flush()?;
            START_OFFSET
        } else {
            let cursor = record::read_u64(&map, 0);
            if cursor < START_OFFSET || cursor > map.len() as u64 {
                return Err(StrataError::Corruption(format!(
                    "commit log cursor {} outside file of {} bytes",
                    cursor,
                    map.len()
                )));
            }
            cursor
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            map,
            cursor,
            initial_capacity,
            sync_strategy,
            uncommitted: 0,
        })
    }

    /// Replay every record in write order
    pub fn load(&self) -> Result<Vec<Entry>> {
        let region = &self.map[..self.cursor as usize];
        let mut entries = Vec::new();
        let mut at = START_OFFSET as usize;

        while at < region.len() {
            let (entry, next) = record::decode(region, at).map_err(|e| {
                StrataError::Corruption(format!("commit log {}: {}", self.path.display(), e))
            })?;
            entries.push(entry);
            at = next;
        }

        Ok(entries)
    }

    /// Append one record, growing the region when it would not fit
    pub fn append(&mut self, entry: &Entry) -> Result<()> {
        let required = self.cursor + record::encoded_len(entry) as u64;
        if required > self.map.len() as u64 {
            self.grow(required)?;
        }

        let start = self.cursor as usize;
        let mut target = &mut self.map[start..required as usize];
        record::write_to(&mut target, entry)?;

        self.set_cursor(required);
        self.uncommitted += 1;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count,
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    /// Force dirty pages to disk
    pub fn sync(&mut self) -> Result<()> {
        self.map.flush()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Current end of the written records
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Mapped capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.map.len() as u64
    }

    /// Records appended since the last sync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop every record before `offset`, keeping the rest in order.
    ///
    /// The surviving tail is written to a sibling temp file which is then
    /// renamed over the log, so a crash leaves either the old or the new log.
    pub fn discard_through(&mut self, offset: u64) -> Result<()> {
        if offset < START_OFFSET || offset > self.cursor {
            return Err(StrataError::InvariantViolation(format!(
                "commit log discard offset {} outside [{}, {}]",
                offset, START_OFFSET, self.cursor
            )));
        }

        let tail = &self.map[offset as usize..self.cursor as usize];
        let new_cursor = START_OFFSET + tail.len() as u64;
        let capacity = grown(self.initial_capacity).max(grown(new_cursor));

        let tmp_path = self.path.with_extension("log.tmp");
        let tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.set_len(capacity)?;

        {
            // SAFETY: the temp file was just created by us and is not shared.
            let mut fresh = unsafe { MmapMut::map_mut(&tmp)? };
            fresh[..8].copy_from_slice(&new_cursor.to_le_bytes());
            fresh[START_OFFSET as usize..new_cursor as usize].copy_from_slice(tail);
            fresh.flush()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        sync_parent_dir(&self.path)?;

        // SAFETY: see `open`; `tmp` now lives at `self.path`.
        self.map = unsafe { MmapMut::map_mut(&tmp)? };
        self.file = tmp;

        tracing::debug!(
            discarded = offset - START_OFFSET,
            retained = new_cursor - START_OFFSET,
            capacity,
            "commit log cleared"
        );

        self.cursor = new_cursor;
        self.uncommitted = 0;
        Ok(())
    }

    /// Drop every record
    pub fn clear(&mut self) -> Result<()> {
        self.discard_through(self.cursor)
    }

    fn grow(&mut self, required: u64) -> Result<()> {
        let capacity = grown(required);
        tracing::debug!(
            current = self.map.len(),
            required,
            capacity,
            "commit log growing"
        );

        self.map.flush()?;
        self.file.set_len(capacity)?;
        // SAFETY: see `open`.
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        Ok(())
    }

    fn set_cursor(&mut self, cursor: u64) {
        self.map[..8].copy_from_slice(&cursor.to_le_bytes());
        self.cursor = cursor;
    }
}

fn grown(size: u64) -> u64 {
    (size as f64 * GROWTH_FACTOR).ceil() as u64
}

#[cfg(unix)]
pub(crate) fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
