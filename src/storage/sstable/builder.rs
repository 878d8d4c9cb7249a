//! SSTable Builder
//!
//! Streams sorted entries into a new table directory.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::entry::Entry;
use crate::error::{Result, StrataError};
use crate::record;
use crate::wal::sync_parent_dir;

use super::{SSTable, DATA_FILE, INDEX_FILE};

/// Upper bound for the data writer's buffer, whatever the size hint says
const MAX_BUFFER: usize = 4 * 1024 * 1024;

/// Builder for creating new SSTables from sorted entries
///
/// Everything is written into a temporary directory; [`SSTableBuilder::finish`]
/// renames it into place, so a table is either complete or invisible.
pub struct SSTableBuilder {
    /// Temporary directory being filled
    dir: PathBuf,
    /// Buffered writer for the data file
    data: BufWriter<File>,
    /// Start offset of every record written so far
    offsets: Vec<u64>,
    /// Current write position in the data file
    current_offset: u64,
    /// Last key added, to enforce ascending order
    last_key: Option<Bytes>,
}

impl SSTableBuilder {
    /// Create a builder writing into `tmp_dir`
    ///
    /// `count_hint` and `size_hint` (expected entries and payload bytes)
    /// only size internal buffers.
    pub fn new(tmp_dir: &Path, count_hint: usize, size_hint: usize) -> Result<Self> {
        fs::create_dir_all(tmp_dir)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_dir.join(DATA_FILE))?;

        let buffer = size_hint.clamp(8 * 1024, MAX_BUFFER);

        Ok(Self {
            dir: tmp_dir.to_path_buf(),
            data: BufWriter::with_capacity(buffer, file),
            offsets: Vec::with_capacity(count_hint),
            current_offset: 0,
            last_key: None,
        })
    }

    /// Append `entry`; keys must be strictly ascending
    pub fn add(&mut self, entry: &Entry) -> Result<()> {
        if let Some(last) = &self.last_key {
            if entry.key() <= last {
                return Err(StrataError::InvariantViolation(format!(
                    "SSTable input not strictly ascending: {:?} after {:?}",
                    entry.key(),
                    last
                )));
            }
        }

        self.offsets.push(self.current_offset);
        self.current_offset += record::write_to(&mut self.data, entry)? as u64;
        self.last_key = Some(entry.key().clone());
        Ok(())
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> usize {
        self.offsets.len()
    }

    /// Write the index, sync both files, move the directory to `final_dir`
    /// and open the finished table.
    pub fn finish(self, final_dir: &Path) -> Result<SSTable> {
        let data = self.data.into_inner().map_err(|e| {
            StrataError::StorageFault(format!("Failed to flush SSTable data: {}", e))
        })?;
        data.sync_all()?;

        let index_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.dir.join(INDEX_FILE))?;
        let mut index = BufWriter::new(index_file);
        for offset in &self.offsets {
            index.write_all(&offset.to_le_bytes())?;
        }
        let index = index.into_inner().map_err(|e| {
            StrataError::StorageFault(format!("Failed to flush SSTable index: {}", e))
        })?;
        index.sync_all()?;

        fs::rename(&self.dir, final_dir)?;
        sync_parent_dir(final_dir)?;

        SSTable::open(final_dir)
    }

    /// Give up on the table and delete the temporary directory
    pub fn abandon(self) -> Result<()> {
        let dir = self.dir.clone();
        drop(self);
        fs::remove_dir_all(dir)?;
        Ok(())
    }
}
