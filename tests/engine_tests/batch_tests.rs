//! Tests for WriteBatch
//!
//! These tests verify:
//! - Buffer operations (put, delete, len, clear, iter)
//! - A committed batch takes contiguous sequences and applies in order
//! - Readers never observe part of a batch
//! - Batches survive recovery as a unit

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use lodekv::{BatchOp, Engine, IteratorMode, WriteBatch};
use tempfile::TempDir;

use super::{collect, open_at, setup_temp_engine, test_options, value};

#[test]
fn test_batch_buffer_operations() {
    let mut batch = WriteBatch::new();
    assert!(batch.is_empty());

    batch.put("a", "1").put("b", "2").delete("a");
    assert_eq!(batch.len(), 3);
    assert!(batch.size_in_bytes() > 0);

    let keys: Vec<&[u8]> = batch.iter().map(BatchOp::key).collect();
    assert_eq!(keys, vec![&b"a"[..], &b"b"[..], &b"a"[..]]);
    assert!(matches!(batch.iter().last(), Some(BatchOp::Delete { .. })));

    batch.clear();
    assert!(batch.is_empty());
    assert_eq!(batch.size_in_bytes(), 0);
}

#[test]
fn test_batch_applies_in_order() {
    let (_temp, engine) = setup_temp_engine();
    engine.set("a", "old").unwrap();

    let mut batch = WriteBatch::new();
    batch.put("a", "1").put("b", "2").delete("a").put("c", "3");
    engine.write(&batch).unwrap();

    assert_eq!(engine.latest_sequence(), 5);
    assert_eq!(value(&engine, "a"), None);
    assert_eq!(
        collect(engine.iterator(IteratorMode::Start).unwrap()),
        vec![("b".into(), "2".into()), ("c".into(), "3".into())]
    );
}

#[test]
fn test_empty_batch_is_noop() {
    let (_temp, engine) = setup_temp_engine();
    engine.write(&WriteBatch::new()).unwrap();
    assert_eq!(engine.latest_sequence(), 0);
}

#[test]
fn test_batch_survives_recovery() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open_at(temp.path());
        let mut batch = WriteBatch::new();
        for i in 0..50 {
            batch.put(format!("k{:02}", i), format!("v{}", i));
        }
        engine.write(&batch).unwrap();
    }

    let engine = open_at(temp.path());
    assert_eq!(engine.latest_sequence(), 50);
    assert_eq!(collect(engine.iterator(IteratorMode::Start).unwrap()).len(), 50);
}

#[test]
fn test_readers_never_see_partial_batch() {
    let temp = TempDir::new().unwrap();
    let options = test_options().memtable_size_limit(2048).build();
    let engine = Arc::new(Engine::open(temp.path(), options).unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let engine = Arc::clone(&engine);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for round in 0..300 {
                let mut batch = WriteBatch::new();
                let v = round.to_string();
                batch.put("x", &v).put("y", &v).put("z", &v);
                engine.write(&batch).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut checks = 0;
    while !done.load(Ordering::SeqCst) || checks == 0 {
        let values = engine.multi_get(&["x", "y", "z"], false).unwrap();
        assert!(values[0] == values[1] && values[1] == values[2], "{:?}", values);

        let pairs = collect(engine.iterator(IteratorMode::Start).unwrap());
        if !pairs.is_empty() {
            assert_eq!(pairs.len(), 3);
            assert!(pairs.iter().all(|(_, v)| *v == pairs[0].1));
        }
        checks += 1;
    }
    writer.join().unwrap();
}
