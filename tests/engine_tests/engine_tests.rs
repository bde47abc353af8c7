//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/set/delete operations
//! - multi_get with and without skip_missing
//! - Flush to SSTable and reads across sources
//! - Crash recovery from WAL (including torn tails)
//! - Engine lifecycle (open/close/destroy)
//! - Concurrent access patterns

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::thread;

use lodekv::dir::{self, FileKind};
use lodekv::{Engine, IteratorMode, LodeError, Options};
use tempfile::TempDir;

use super::{collect, open_at, setup_temp_engine, test_options, value};

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_set_then_get() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("key1", "value1").unwrap();
    engine.put("key2", "value2").unwrap();

    assert_eq!(value(&engine, "key1"), Some("value1".into()));
    assert_eq!(value(&engine, "key2"), Some("value2".into()));
    assert_eq!(value(&engine, "missing"), None);
}

#[test]
fn test_overwrite_returns_latest() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("k", "v1").unwrap();
    engine.set("k", "v2").unwrap();
    assert_eq!(value(&engine, "k"), Some("v2".into()));
}

#[test]
fn test_delete_hides_previous_value() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("k", "v").unwrap();
    engine.flush().unwrap();
    engine.delete("k").unwrap();
    assert_eq!(value(&engine, "k"), None);

    // Deleting a key that never existed is fine
    engine.delete("never").unwrap();
    assert_eq!(value(&engine, "never"), None);
}

#[test]
fn test_empty_value_is_distinct_from_absence() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("empty", "").unwrap();
    assert_eq!(engine.get("empty").unwrap(), Some(vec![]));
    assert_eq!(engine.get("other").unwrap(), None);
}

#[test]
fn test_sequences_increase_per_operation() {
    let (_temp, engine) = setup_temp_engine();
    assert_eq!(engine.latest_sequence(), 0);

    engine.set("a", "1").unwrap();
    engine.delete("a").unwrap();
    assert_eq!(engine.latest_sequence(), 2);
}

// =============================================================================
// multi_get Tests
// =============================================================================

#[test]
fn test_multi_get_skip_missing_compacts_result() {
    let (_temp, engine) = setup_temp_engine();
    engine.set("a", "1").unwrap();
    engine.set("c", "3").unwrap();

    let values = engine.multi_get(&["a", "b", "c"], true).unwrap();
    assert_eq!(values, vec![Some(b"1".to_vec()), Some(b"3".to_vec())]);
}

#[test]
fn test_multi_get_keeps_positions_without_skip() {
    let (_temp, engine) = setup_temp_engine();
    engine.set("a", "1").unwrap();
    engine.set("b", "").unwrap();
    engine.set("c", "3").unwrap();
    engine.delete("c").unwrap();

    let values = engine.multi_get(&["c", "a", "zz", "b"], false).unwrap();
    assert_eq!(
        values,
        vec![None, Some(b"1".to_vec()), None, Some(vec![])]
    );
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_flush_moves_data_to_l0() {
    let (_temp, engine) = setup_temp_engine();
    for i in 0..100 {
        engine.set(format!("key{:03}", i), format!("value{}", i)).unwrap();
    }

    engine.flush().unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!(stats.tables_per_level[0], 1);
    assert_eq!(stats.immutable_memtables, 0);

    for i in 0..100 {
        assert_eq!(value(&engine, &format!("key{:03}", i)), Some(format!("value{}", i)));
    }
}

#[test]
fn test_flush_of_empty_memtable_is_noop() {
    let (_temp, engine) = setup_temp_engine();
    let before = engine.stats().unwrap();
    engine.flush().unwrap();
    let after = engine.stats().unwrap();
    assert_eq!(before.tables_per_level, after.tables_per_level);
    assert_eq!(before.manifest_version, after.manifest_version);
}

#[test]
fn test_small_memtable_seals_and_flushes() {
    let temp = TempDir::new().unwrap();
    let options = test_options()
        .memtable_size_limit(512)
        .disable_auto_compactions(true)
        .build();
    let engine = Engine::open(temp.path(), options).unwrap();

    for i in 0..200 {
        engine.set(format!("key{:04}", i), "x".repeat(20)).unwrap();
    }
    let stats = engine.stats().unwrap();
    assert!(stats.tables_per_level[0] > 1);

    // Old WAL segments are removed once their memtable is durable
    let segments = dir::list_files(temp.path(), FileKind::Wal).unwrap();
    assert!(segments.len() <= 2, "segments left: {:?}", segments);

    for i in (0..200).step_by(17) {
        assert!(engine.get(format!("key{:04}", i)).unwrap().is_some());
    }
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recovery_after_drop_without_close() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open_at(temp.path());
        engine.set("persist", "me").unwrap();
        engine.delete("gone").unwrap();
        // Dropped without close: data lives only in the WAL
    }

    let engine = open_at(temp.path());
    assert_eq!(value(&engine, "persist"), Some("me".into()));
    assert_eq!(engine.stats().unwrap().tables_per_level[0], 1);
}

#[test]
fn test_reopen_right_after_drop_with_background_worker() {
    let temp = TempDir::new().unwrap();
    let options = || {
        test_options()
            .background_jobs(true)
            .memtable_size_limit(2 * 1024)
            .level0_compaction_trigger(2)
            .build()
    };

    for round in 0..5 {
        let engine = Engine::open(temp.path(), options()).unwrap();
        for i in 0..100 {
            engine.set(format!("r{}:{:03}", round, i), "x".repeat(64)).unwrap();
        }
        // Dropping while the worker may still be flushing must release the lock
        drop(engine);
    }

    let engine = open_at(temp.path());
    assert_eq!(collect(engine.iterator(IteratorMode::Start).unwrap()).len(), 500);
    assert_eq!(value(&engine, "r4:099"), Some("x".repeat(64)));
}

#[test]
fn test_sequences_continue_across_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open_at(temp.path());
        engine.set("a", "1").unwrap();
        engine.set("b", "2").unwrap();
        engine.set("c", "3").unwrap();
        engine.close().unwrap();
    }

    let engine = open_at(temp.path());
    assert_eq!(engine.latest_sequence(), 3);
    engine.set("a", "new").unwrap();
    assert_eq!(engine.latest_sequence(), 4);
    assert_eq!(value(&engine, "a"), Some("new".into()));
}

#[test]
fn test_recovery_truncates_torn_wal_tail() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open_at(temp.path());
        engine.set("a", "1").unwrap();
        engine.set("b", "2").unwrap();
    }

    let segment = *dir::list_files(temp.path(), FileKind::Wal).unwrap().last().unwrap();
    let path = dir::wal_path(temp.path(), segment);
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap();
    drop(file);

    let engine = open_at(temp.path());
    assert_eq!(value(&engine, "a"), Some("1".into()));
    assert_eq!(value(&engine, "b"), Some("2".into()));
    assert_eq!(engine.latest_sequence(), 2);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_second_open_is_locked() {
    let (temp, _engine) = setup_temp_engine();
    let err = Engine::open(temp.path(), test_options().build()).unwrap_err();
    assert!(matches!(err, LodeError::Locked(_)));
}

#[test]
fn test_close_is_idempotent_and_final() {
    let (temp, engine) = setup_temp_engine();
    engine.set("k", "v").unwrap();

    engine.close().unwrap();
    engine.close().unwrap();
    assert!(engine.is_closed());

    assert!(matches!(engine.get("k"), Err(LodeError::Closed)));
    assert!(matches!(engine.set("k", "v2"), Err(LodeError::Closed)));
    assert!(matches!(engine.iterator(IteratorMode::Start), Err(LodeError::Closed)));

    // Lock is released and the write was flushed
    let reopened = open_at(temp.path());
    assert_eq!(value(&reopened, "k"), Some("v".into()));
}

#[test]
fn test_create_if_missing_and_error_if_exists() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");

    let no_create = test_options().create_if_missing(false).build();
    assert!(matches!(
        Engine::open(&path, no_create),
        Err(LodeError::InvalidArgument(_))
    ));

    open_at(&path).close().unwrap();

    let exclusive = test_options().error_if_exists(true).build();
    assert!(matches!(
        Engine::open(&path, exclusive),
        Err(LodeError::InvalidArgument(_))
    ));
}

#[test]
fn test_invalid_options_are_rejected() {
    let temp = TempDir::new().unwrap();
    let options = test_options().memtable_size_limit(0).build();
    assert!(matches!(
        Engine::open(temp.path(), options),
        Err(LodeError::InvalidArgument(_))
    ));
    assert!(Options::builder().num_levels(1).build().validate().is_err());
}

#[test]
fn test_destroy_then_open_is_empty() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");
    {
        let engine = open_at(&path);
        engine.set("k", "v").unwrap();
        engine.flush().unwrap();
        engine.set("k2", "v2").unwrap();
        engine.close().unwrap();
    }

    Engine::destroy(&path, &Options::default()).unwrap();
    assert!(!path.exists());

    let engine = Engine::open_default(&path).unwrap();
    assert_eq!(value(&engine, "k"), None);
    assert_eq!(value(&engine, "k2"), None);
    assert!(collect(engine.iterator(IteratorMode::Start).unwrap()).is_empty());
}

#[test]
fn test_destroy_fails_while_open() {
    let (temp, engine) = setup_temp_engine();
    engine.set("k", "v").unwrap();

    let err = Engine::destroy(temp.path(), &Options::default()).unwrap_err();
    assert!(matches!(err, LodeError::Locked(_)));
    assert_eq!(value(&engine, "k"), Some("v".into()));
}

#[test]
fn test_info_log_records_events() {
    let (temp, engine) = setup_temp_engine();
    engine.set("k", "v").unwrap();
    engine.flush().unwrap();
    engine.close().unwrap();

    let log = std::fs::read_to_string(temp.path().join(dir::LOG_FILE)).unwrap();
    assert!(log.contains("opened read-write"));
    assert!(log.contains("flushed memtable"));
    assert!(log.contains("closed"));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_and_readers() {
    let temp = TempDir::new().unwrap();
    let options = Options::builder()
        .memtable_size_limit(4 * 1024)
        .level0_compaction_trigger(2)
        .build();
    let engine = Arc::new(Engine::open(temp.path(), options).unwrap());

    let mut handles = Vec::new();
    for t in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..250 {
                let key = format!("t{}-{:04}", t, i);
                engine.set(&key, format!("value-{}", i)).unwrap();
                assert!(engine.get(&key).unwrap().is_some());
            }
        }));
    }
    for _ in 0..2 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                let pairs = collect(engine.iterator(IteratorMode::Start).unwrap());
                let mut sorted = pairs.clone();
                sorted.sort();
                assert_eq!(pairs, sorted);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.latest_sequence(), 1000);
    engine.close().unwrap();
    drop(engine);

    let reopened = open_at(temp.path());
    assert_eq!(collect(reopened.iterator(IteratorMode::Start).unwrap()).len(), 1000);
}

#[test]
fn test_write_stall_keeps_every_write() {
    let temp = TempDir::new().unwrap();
    let options = Options::builder()
        .memtable_size_limit(256)
        .max_immutable_memtables(1)
        .build();
    let engine = Engine::open(temp.path(), options).unwrap();

    for i in 0..300 {
        engine.set(format!("k{:04}", i), "some value bytes").unwrap();
    }
    let stats = engine.stats().unwrap();
    assert!(stats.immutable_memtables <= 2);
    for i in 0..300 {
        assert!(engine.get(format!("k{:04}", i)).unwrap().is_some(), "k{:04}", i);
    }
}
