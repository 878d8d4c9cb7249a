//! Concurrency Tests for Engine
//!
//! These tests verify:
//! - Range scans stay consistent while writes cross the flush threshold
//! - Concurrent writers lose nothing
//! - Reads see their own writes during flush and compaction

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use stratakv::config::{Config, WalSyncStrategy};
use stratakv::Engine;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_engine(memtable_limit: usize) -> (TempDir, Arc<Engine>) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 1000 })
        .memtable_size_limit(memtable_limit)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, Arc::new(engine))
}

fn key(i: usize) -> String {
    format!("key-{:05}", i)
}

fn value_for(key: &[u8]) -> Vec<u8> {
    let mut value = b"value-".to_vec();
    value.extend_from_slice(key);
    value
}

// =============================================================================
// Scan Consistency Tests
// =============================================================================

#[test]
fn test_scans_consistent_while_writes_cross_threshold() {
    // Small limit so the 10,000 writes go through many flushes
    let (_temp, engine) = setup_engine(16 * 1024);
    let total = 10_000;

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 0..total {
                let k = key(i);
                engine.put(k.as_bytes(), &value_for(k.as_bytes())).unwrap();
            }
        })
    };

    let scanners: Vec<_> = (0..100)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut previous: Option<Vec<u8>> = None;
                let mut seen = 0usize;
                for entry in engine.range(None, None).unwrap() {
                    if let Some(previous) = &previous {
                        assert!(previous.as_slice() < entry.key().as_ref(), "not ascending");
                    }
                    assert_eq!(
                        entry.value().unwrap().as_ref(),
                        value_for(entry.key()).as_slice(),
                        "torn record"
                    );
                    previous = Some(entry.key().to_vec());
                    seen += 1;
                }
                seen
            })
        })
        .collect();

    writer.join().unwrap();
    for scanner in scanners {
        assert!(scanner.join().unwrap() <= total);
    }

    let all: Vec<_> = engine.range(None, None).unwrap().collect();
    assert_eq!(all.len(), total);
    assert!(engine.background_error().is_none());
}

#[test]
fn test_scans_during_compaction() {
    let (_temp, engine) = setup_engine(1024 * 1024);

    for round in 0..5 {
        for i in 0..500 {
            let k = key(i * 5 + round);
            engine.put(k.as_bytes(), &value_for(k.as_bytes())).unwrap();
        }
        engine.flush().unwrap();
    }

    let compactor = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.compact().unwrap())
    };

    let scanners: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.range(None, None).unwrap().count())
        })
        .collect();

    assert!(compactor.join().unwrap());
    for scanner in scanners {
        assert_eq!(scanner.join().unwrap(), 2500);
    }
    assert_eq!(engine.sstable_count(), 1);
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_concurrent_writers_lose_nothing() {
    let (_temp, engine) = setup_engine(8 * 1024);

    let writers: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..1000 {
                    let k = format!("t{}-{:04}", t, i);
                    engine.put(k.as_bytes(), &value_for(k.as_bytes())).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    engine.flush().unwrap();
    for t in 0..8 {
        for i in (0..1000).step_by(37) {
            let k = format!("t{}-{:04}", t, i);
            assert_eq!(
                engine.get(k.as_bytes()).unwrap().unwrap().as_ref(),
                value_for(k.as_bytes()).as_slice()
            );
        }
    }
    assert_eq!(engine.range(None, None).unwrap().count(), 8000);
}

#[test]
fn test_read_your_writes_under_maintenance() {
    let (_temp, engine) = setup_engine(4 * 1024);
    let stop = Arc::new(AtomicBool::new(false));

    let maintainer = {
        let engine = Arc::clone(&engine);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                engine.flush().unwrap();
                engine.compact().unwrap();
            }
        })
    };

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..1500 {
                    let k = format!("w{}-{:04}", t, i);
                    engine.put(k.as_bytes(), b"v").unwrap();
                    assert!(engine.get(k.as_bytes()).unwrap().is_some(), "lost {}", k);
                    if i % 3 == 0 {
                        engine.delete(k.as_bytes()).unwrap();
                        assert!(engine.get(k.as_bytes()).unwrap().is_none(), "resurrected {}", k);
                    }
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    stop.store(true, Ordering::Release);
    maintainer.join().unwrap();

    // 1500 per writer, every third deleted
    assert_eq!(engine.range(None, None).unwrap().count(), 4 * 1000);
    assert!(engine.background_error().is_none());
}
