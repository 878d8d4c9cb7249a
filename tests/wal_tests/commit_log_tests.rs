//! Tests for the Commit Log
//!
//! These tests verify:
//! - Fresh file layout (capacity, cursor header)
//! - Append and replay in write order
//! - Growth of the mapped region
//! - Discarding a prefix of the log
//! - Sync strategies
//! - Corruption detection on open and replay

use std::fs;
use std::path::PathBuf;

use stratakv::config::WalSyncStrategy;
use stratakv::wal::{CommitLog, START_OFFSET};
use stratakv::{Entry, StrataError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wal.log");
    (temp_dir, path)
}

fn open(path: &PathBuf, capacity: u64) -> CommitLog {
    CommitLog::open(path, capacity, WalSyncStrategy::EveryWrite).unwrap()
}

fn keys(entries: &[Entry]) -> Vec<Vec<u8>> {
    entries.iter().map(|e| e.key().to_vec()).collect()
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_fresh_log_layout() {
    let (_temp, path) = setup_temp_log();
    let log = open(&path, 1024);

    assert_eq!(log.cursor(), START_OFFSET);
    assert_eq!(log.capacity(), 1536);
    assert_eq!(fs::metadata(&path).unwrap().len(), 1536);
    assert!(log.load().unwrap().is_empty());
}

#[test]
fn test_cursor_header_is_persisted() {
    let (_temp, path) = setup_temp_log();
    {
        let mut log = open(&path, 1024);
        log.append(&Entry::put("key", "value")).unwrap();
    }

    let raw = fs::read(&path).unwrap();
    let cursor = u64::from_le_bytes(raw[..8].try_into().unwrap());
    // 8 header + 8 key_len + 3 key + 8 timestamp + 8 value_len + 5 value
    assert_eq!(cursor, 8 + 8 + 3 + 8 + 8 + 5);
}

// =============================================================================
// Append / Load Tests
// =============================================================================

#[test]
fn test_append_and_load_in_order() {
    let (_temp, path) = setup_temp_log();
    let mut log = open(&path, 1024);

    log.append(&Entry::put("b", "1")).unwrap();
    log.append(&Entry::put("a", "2")).unwrap();
    log.append(&Entry::tombstone("b")).unwrap();

    let entries = log.load().unwrap();
    assert_eq!(keys(&entries), vec![b"b".to_vec(), b"a".to_vec(), b"b".to_vec()]);
    assert_eq!(entries[1].value().unwrap().as_ref(), b"2");
    assert!(entries[2].is_tombstone());
}

#[test]
fn test_reopen_replays_records() {
    let (_temp, path) = setup_temp_log();
    let written = vec![Entry::put("k1", "v1"), Entry::tombstone("k2"), Entry::put("k3", "")];
    {
        let mut log = open(&path, 1024);
        for entry in &written {
            log.append(entry).unwrap();
        }
    }

    let log = open(&path, 1024);
    assert_eq!(log.load().unwrap(), written);
}

#[test]
fn test_growth_preserves_all_records() {
    let (_temp, path) = setup_temp_log();
    let mut log = open(&path, 64);
    assert_eq!(log.capacity(), 96);

    let written: Vec<Entry> = (0..200)
        .map(|i| Entry::put(format!("key-{:03}", i), format!("value-{}", i)))
        .collect();
    for entry in &written {
        log.append(entry).unwrap();
    }

    assert!(log.capacity() > 96);
    assert!(log.cursor() <= log.capacity());
    assert_eq!(log.load().unwrap(), written);

    drop(log);
    let log = open(&path, 64);
    assert_eq!(log.load().unwrap(), written);
}

// =============================================================================
// Discard Tests
// =============================================================================

#[test]
fn test_discard_through_keeps_later_records() {
    let (_temp, path) = setup_temp_log();
    let mut log = open(&path, 1024);

    log.append(&Entry::put("old-1", "v")).unwrap();
    log.append(&Entry::put("old-2", "v")).unwrap();
    let mark = log.cursor();
    log.append(&Entry::put("new-1", "v")).unwrap();
    log.append(&Entry::tombstone("new-2")).unwrap();

    log.discard_through(mark).unwrap();

    assert_eq!(keys(&log.load().unwrap()), vec![b"new-1".to_vec(), b"new-2".to_vec()]);
    assert!(!path.with_extension("log.tmp").exists());

    // The log keeps accepting appends after the rewrite
    log.append(&Entry::put("new-3", "v")).unwrap();
    drop(log);

    let log = open(&path, 1024);
    assert_eq!(
        keys(&log.load().unwrap()),
        vec![b"new-1".to_vec(), b"new-2".to_vec(), b"new-3".to_vec()]
    );
}

#[test]
fn test_clear_empties_log() {
    let (_temp, path) = setup_temp_log();
    let mut log = open(&path, 1024);

    for i in 0..10 {
        log.append(&Entry::put(format!("k{}", i), "v")).unwrap();
    }
    log.clear().unwrap();

    assert_eq!(log.cursor(), START_OFFSET);
    assert!(log.load().unwrap().is_empty());
}

#[test]
fn test_discard_shrinks_back_to_initial_capacity() {
    let (_temp, path) = setup_temp_log();
    let mut log = open(&path, 64);

    for i in 0..100 {
        log.append(&Entry::put(format!("k{:03}", i), "value")).unwrap();
    }
    assert!(log.capacity() > 96);

    log.clear().unwrap();
    assert_eq!(log.capacity(), 96);
}

#[test]
fn test_discard_outside_log_is_rejected() {
    let (_temp, path) = setup_temp_log();
    let mut log = open(&path, 1024);
    log.append(&Entry::put("k", "v")).unwrap();

    let beyond = log.cursor() + 1;
    assert!(matches!(
        log.discard_through(beyond),
        Err(StrataError::InvariantViolation(_))
    ));
    assert_eq!(log.load().unwrap().len(), 1);
}

// =============================================================================
// Sync Strategy Tests
// =============================================================================

#[test]
fn test_sync_every_write() {
    let (_temp, path) = setup_temp_log();
    let mut log = open(&path, 1024);

    log.append(&Entry::put("k", "v")).unwrap();
    assert_eq!(log.uncommitted_count(), 0);
}

#[test]
fn test_sync_every_n_entries() {
    let (_temp, path) = setup_temp_log();
    let mut log =
        CommitLog::open(&path, 1024, WalSyncStrategy::EveryNEntries { count: 3 }).unwrap();

    log.append(&Entry::put("a", "v")).unwrap();
    log.append(&Entry::put("b", "v")).unwrap();
    assert_eq!(log.uncommitted_count(), 2);

    log.append(&Entry::put("c", "v")).unwrap();
    assert_eq!(log.uncommitted_count(), 0);

    log.append(&Entry::put("d", "v")).unwrap();
    log.sync().unwrap();
    assert_eq!(log.uncommitted_count(), 0);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_file_shorter_than_header_is_corruption() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, [1u8, 2, 3, 4]).unwrap();

    let result = CommitLog::open(&path, 1024, WalSyncStrategy::EveryWrite);
    assert!(matches!(result, Err(StrataError::Corruption(_))));
}

#[test]
fn test_cursor_outside_file_is_corruption() {
    let (_temp, path) = setup_temp_log();
    let mut raw = vec![0u8; 64];
    raw[..8].copy_from_slice(&1000u64.to_le_bytes());
    fs::write(&path, &raw).unwrap();

    let result = CommitLog::open(&path, 1024, WalSyncStrategy::EveryWrite);
    assert!(matches!(result, Err(StrataError::Corruption(_))));
}

#[test]
fn test_malformed_record_is_corruption() {
    let (_temp, path) = setup_temp_log();
    let mut raw = vec![0u8; 64];
    raw[..8].copy_from_slice(&40u64.to_le_bytes());
    // Key length far beyond the cursor
    raw[8..16].copy_from_slice(&1000u64.to_le_bytes());
    fs::write(&path, &raw).unwrap();

    let log = CommitLog::open(&path, 1024, WalSyncStrategy::EveryWrite).unwrap();
    assert!(matches!(log.load(), Err(StrataError::Corruption(_))));
}
