//! Tests for StorageManager
//!
//! These tests verify:
//! - Token allocation (time-derived, strictly increasing)
//! - Table creation and naming
//! - Discovery order on startup
//! - Cleanup of unfinished and superseded tables

use std::fs;
use std::path::Path;

use stratakv::storage::{StorageManager, TableKind};
use stratakv::Entry;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn entries(prefix: &str, count: usize) -> Vec<Entry> {
    (0..count)
        .map(|i| Entry::put(format!("{}-{:03}", prefix, i), "v"))
        .collect()
}

fn dir_names(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Token Tests
// =============================================================================

#[test]
fn test_tokens_strictly_increase() {
    let temp = TempDir::new().unwrap();
    let manager = StorageManager::open(temp.path()).unwrap();

    let mut last = 0;
    for _ in 0..1000 {
        let token = manager.next_token();
        assert!(token > last);
        last = token;
    }
}

#[test]
fn test_token_clock_starts_past_existing_tables() {
    let temp = TempDir::new().unwrap();
    let future = u64::MAX / 2;
    {
        let manager = StorageManager::open(temp.path()).unwrap();
        manager
            .create_table(TableKind::Flush, future, entries("k", 1), 1, 0)
            .unwrap();
    }

    let manager = StorageManager::open(temp.path()).unwrap();
    assert!(manager.next_token() > future);
}

// =============================================================================
// Creation Tests
// =============================================================================

#[test]
fn test_create_table_names() {
    let temp = TempDir::new().unwrap();
    let manager = StorageManager::open(temp.path()).unwrap();

    let flushed = manager
        .create_table(TableKind::Flush, 10, entries("a", 5), 5, 0)
        .unwrap();
    let compacted = manager
        .create_table(TableKind::Compacted, 11, entries("b", 5), 5, 0)
        .unwrap();

    assert_eq!(flushed.dir(), manager.table_path(TableKind::Flush, 10));
    assert_eq!(compacted.kind(), TableKind::Compacted);
    assert_eq!(
        dir_names(temp.path()),
        vec!["compacted_00000000000000000011", "sstable_00000000000000000010"]
    );
}

#[test]
fn test_failed_create_leaves_nothing() {
    let temp = TempDir::new().unwrap();
    let manager = StorageManager::open(temp.path()).unwrap();

    let unsorted = vec![Entry::put("b", "1"), Entry::put("a", "1")];
    assert!(manager
        .create_table(TableKind::Flush, 1, unsorted, 2, 0)
        .is_err());
    assert!(dir_names(temp.path()).is_empty());
}

// =============================================================================
// Discovery Tests
// =============================================================================

#[test]
fn test_load_tables_oldest_first() {
    let temp = TempDir::new().unwrap();
    {
        let manager = StorageManager::open(temp.path()).unwrap();
        for token in [30, 10, 20] {
            manager
                .create_table(TableKind::Flush, token, entries("k", 3), 3, 0)
                .unwrap();
        }
    }

    let manager = StorageManager::open(temp.path()).unwrap();
    let tables = manager.load_tables().unwrap();
    let tokens: Vec<u64> = tables.iter().map(|t| t.token()).collect();
    assert_eq!(tokens, vec![10, 20, 30]);
}

#[test]
fn test_open_removes_unfinished_tables() {
    let temp = TempDir::new().unwrap();
    let leftover = temp.path().join(".tmp_00000000000000000005");
    fs::create_dir_all(&leftover).unwrap();
    fs::write(leftover.join("data.db"), b"partial").unwrap();

    let manager = StorageManager::open(temp.path()).unwrap();
    assert!(!leftover.exists());
    assert!(manager.load_tables().unwrap().is_empty());
}

#[test]
fn test_superseded_tables_removed_on_load() {
    let temp = TempDir::new().unwrap();
    {
        let manager = StorageManager::open(temp.path()).unwrap();
        manager
            .create_table(TableKind::Flush, 1, entries("old", 3), 3, 0)
            .unwrap();
        manager
            .create_table(TableKind::Flush, 2, entries("old", 3), 3, 0)
            .unwrap();
        // Compaction installed, but the process died before cleanup
        manager
            .create_table(TableKind::Compacted, 3, entries("old", 3), 3, 0)
            .unwrap();
        // Flushed while the compaction was running
        manager
            .create_table(TableKind::Flush, 4, entries("new", 3), 3, 0)
            .unwrap();
    }

    let manager = StorageManager::open(temp.path()).unwrap();
    let tables = manager.load_tables().unwrap();

    let tokens: Vec<u64> = tables.iter().map(|t| t.token()).collect();
    assert_eq!(tokens, vec![3, 4]);
    assert_eq!(
        dir_names(temp.path()),
        vec!["compacted_00000000000000000003", "sstable_00000000000000000004"]
    );
}

#[test]
fn test_older_compacted_table_is_also_superseded() {
    let temp = TempDir::new().unwrap();
    {
        let manager = StorageManager::open(temp.path()).unwrap();
        manager
            .create_table(TableKind::Compacted, 1, entries("a", 1), 1, 0)
            .unwrap();
        manager
            .create_table(TableKind::Compacted, 2, entries("b", 1), 1, 0)
            .unwrap();
    }

    let manager = StorageManager::open(temp.path()).unwrap();
    let tables = manager.load_tables().unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].token(), 2);
}

#[test]
fn test_unrelated_entries_are_ignored() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("README"), b"hello").unwrap();
    fs::create_dir_all(temp.path().join("backup")).unwrap();

    let manager = StorageManager::open(temp.path()).unwrap();
    assert!(manager.load_tables().unwrap().is_empty());
    assert!(temp.path().join("backup").exists());
}
