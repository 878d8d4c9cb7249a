//! SSTable Reader
//!
//! Memory-maps a finished table and answers point and range queries by
//! binary search over the offset index.

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memmap2::Mmap;

use crate::entry::Entry;
use crate::error::{Result, StrataError};
use crate::record;

use super::iterator::SSTableIterator;
use super::builder::SSTableBuilder;
use super::{COMPACTED_PREFIX, DATA_FILE, FLUSH_PREFIX, INDEX_ENTRY_SIZE, INDEX_FILE};

/// How a table came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Written from a frozen memtable
    Flush,
    /// Written by compaction; supersedes every table with a smaller token
    Compacted,
}

impl TableKind {
    fn prefix(self) -> &'static str {
        match self {
            TableKind::Flush => FLUSH_PREFIX,
            TableKind::Compacted => COMPACTED_PREFIX,
        }
    }

    /// Directory name of the table `token` of this kind
    /// (`Flush`, 42) → "sstable_00000000000000000042"
    pub fn dir_name(self, token: u64) -> String {
        format!("{}{:020}", self.prefix(), token)
    }

    /// Inverse of [`TableKind::dir_name`]; `None` for anything else
    pub fn parse_dir_name(name: &str) -> Option<(TableKind, u64)> {
        [TableKind::Flush, TableKind::Compacted]
            .into_iter()
            .find_map(|kind| {
                let digits = name.strip_prefix(kind.prefix())?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                digits.parse().ok().map(|token| (kind, token))
            })
    }
}

/// A read-only file mapping, released exactly once
struct MappedRegion(Option<Mmap>);

impl MappedRegion {
    fn map(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self(None));
        }
        // SAFETY: table files are immutable once renamed into place and are
        // only deleted after the last reference to this mapping is gone.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self(Some(map)))
    }

    #[inline]
    fn bytes(&self) -> &[u8] {
        self.0.as_deref().unwrap_or(&[])
    }

    fn release(&mut self) {
        self.0.take();
    }
}

/// An immutable, memory-mapped SSTable
///
/// Shared as `Arc<SSTable>` between published engine states and open
/// iterators. The mappings live exactly as long as the last `Arc`.
pub struct SSTable {
    dir: PathBuf,
    token: u64,
    kind: TableKind,
    data: MappedRegion,
    index: MappedRegion,
    entry_count: usize,
    tombstone_count: usize,
    /// Delete the directory when the last reference drops
    remove_on_drop: AtomicBool,
}

impl SSTable {
    /// Write `entries` (strictly ascending) into `tmp_dir`, move it to
    /// `final_dir` and open the result
    pub fn create<I>(
        tmp_dir: &Path,
        final_dir: &Path,
        entries: I,
        count_hint: usize,
        size_hint: usize,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut builder = SSTableBuilder::new(tmp_dir, count_hint, size_hint)?;
        for entry in entries {
            if let Err(e) = builder.add(&entry) {
                if let Err(cleanup) = builder.abandon() {
                    tracing::warn!(
                        dir = %tmp_dir.display(),
                        error = %cleanup,
                        "failed to remove unfinished SSTable"
                    );
                }
                return Err(e);
            }
        }
        builder.finish(final_dir)
    }

    /// Map an existing table directory and validate its structure
    ///
    /// The directory name carries the token and kind. Every index slot must
    /// point at the next record in `data.db`, records must tile the file
    /// exactly and keys must be strictly ascending. Anything else is
    /// reported as `Corruption`.
    pub fn open(dir: &Path) -> Result<Self> {
        let (kind, token) = dir
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(TableKind::parse_dir_name)
            .ok_or_else(|| {
                StrataError::Corruption(format!(
                    "{} is not an SSTable directory name",
                    dir.display()
                ))
            })?;

        let data = MappedRegion::map(&dir.join(DATA_FILE))?;
        let index = MappedRegion::map(&dir.join(INDEX_FILE))?;

        let (entry_count, tombstone_count) = validate(dir, data.bytes(), index.bytes())?;

        Ok(Self {
            dir: dir.to_path_buf(),
            token,
            kind,
            data,
            index,
            entry_count,
            tombstone_count,
            remove_on_drop: AtomicBool::new(false),
        })
    }

    /// Point lookup. A tombstone is returned as-is.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        let position = self.lower_bound(key);
        if position < self.entry_count && self.key_at(position) == key {
            let (entry, _) = record::decode_trusted(self.data.bytes(), self.offset_at(position));
            return Some(entry);
        }
        None
    }

    /// Ascending entries in `[from, to)`; `None` leaves that side unbounded
    pub fn range(self: &Arc<Self>, from: Option<&[u8]>, to: Option<&[u8]>) -> SSTableIterator {
        let start = from.map_or(0, |key| self.lower_bound(key));
        let end = to.map_or(self.entry_count, |key| self.lower_bound(key));

        let start_offset = self.position_offset(start);
        let end_offset = self.position_offset(end.max(start));
        SSTableIterator::new(Arc::clone(self), start_offset, end_offset)
    }

    /// All entries in key order
    pub fn iter(self: &Arc<Self>) -> SSTableIterator {
        self.range(None, None)
    }

    /// Smallest index position whose key is >= `key` (the insertion point
    /// when `key` is absent). Returns `entry_count` if every key is smaller.
    pub fn lower_bound(&self, key: &[u8]) -> usize {
        let mut low = 0;
        let mut high = self.entry_count;
        while low < high {
            let mid = low + (high - low) / 2;
            if self.key_at(mid) < key {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstone_count
    }

    /// Size of the data file in bytes
    pub fn data_size(&self) -> usize {
        self.data.bytes().len()
    }

    pub fn min_key(&self) -> Option<&[u8]> {
        (self.entry_count > 0).then(|| self.key_at(0))
    }

    pub fn max_key(&self) -> Option<&[u8]> {
        self.entry_count.checked_sub(1).map(|last| self.key_at(last))
    }

    /// Delete the table's files once no state or iterator references it
    pub fn mark_for_removal(&self) {
        self.remove_on_drop.store(true, Ordering::Release);
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    pub(super) fn data_bytes(&self) -> &[u8] {
        self.data.bytes()
    }

    #[inline]
    fn offset_at(&self, position: usize) -> usize {
        record::read_u64(self.index.bytes(), position * INDEX_ENTRY_SIZE) as usize
    }

    #[inline]
    fn key_at(&self, position: usize) -> &[u8] {
        record::key_trusted(self.data.bytes(), self.offset_at(position))
    }

    /// Byte offset where the record at `position` starts (end of data for
    /// `entry_count`)
    fn position_offset(&self, position: usize) -> usize {
        if position >= self.entry_count {
            self.data.bytes().len()
        } else {
            self.offset_at(position)
        }
    }
}

impl fmt::Debug for SSTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SSTable")
            .field("dir", &self.dir)
            .field("token", &self.token)
            .field("kind", &self.kind)
            .field("entry_count", &self.entry_count)
            .finish()
    }
}

impl Drop for SSTable {
    fn drop(&mut self) {
        self.data.release();
        self.index.release();

        if self.remove_on_drop.load(Ordering::Acquire) {
            match fs::remove_dir_all(&self.dir) {
                Ok(()) => tracing::debug!(dir = %self.dir.display(), "removed obsolete SSTable"),
                Err(e) => tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "failed to remove obsolete SSTable"
                ),
            }
        }
    }
}

/// Check the index against the data file; returns (entries, tombstones)
fn validate(dir: &Path, data: &[u8], index: &[u8]) -> Result<(usize, usize)> {
    let corrupt = |what: String| StrataError::Corruption(format!("{}: {}", dir.display(), what));

    if index.len() % INDEX_ENTRY_SIZE != 0 {
        return Err(corrupt(format!(
            "index size {} is not a multiple of {}",
            index.len(),
            INDEX_ENTRY_SIZE
        )));
    }

    let entry_count = index.len() / INDEX_ENTRY_SIZE;
    let mut expected = 0usize;
    let mut tombstones = 0usize;
    let mut previous: Option<&[u8]> = None;

    for position in 0..entry_count {
        let offset = record::read_u64(index, position * INDEX_ENTRY_SIZE);
        if offset != expected as u64 {
            return Err(corrupt(format!(
                "index slot {} points at {}, expected {}",
                position, offset, expected
            )));
        }

        let layout = record::checked_layout(data, expected)?;
        let key = layout.key(data);
        if let Some(previous) = previous {
            if previous >= key {
                return Err(corrupt(format!("keys not ascending at slot {}", position)));
            }
        }
        if layout.is_tombstone() {
            tombstones += 1;
        }

        previous = Some(key);
        expected = layout.end;
    }

    if expected != data.len() {
        return Err(corrupt(format!(
            "index covers {} of {} data bytes",
            expected,
            data.len()
        )));
    }

    Ok((entry_count, tombstones))
}
