//! Tests for iterators and snapshots
//!
//! These tests verify:
//! - Start/End/From modes in both directions
//! - Forward and reverse yield the same key set reversed
//! - Iterators read at the snapshot taken at creation
//! - Snapshots and get_at/iterator_at
//! - close() releases pinned tables

use lodekv::{Direction, IteratorMode};

use super::{collect, setup_temp_engine, value};

fn keys(pairs: &[(String, String)]) -> Vec<String> {
    pairs.iter().map(|(k, _)| k.clone()).collect()
}

fn populate(engine: &lodekv::Engine) {
    // Spread keys over the memtable and two L0 tables
    for k in ["b", "d", "f"] {
        engine.set(k, format!("{}1", k)).unwrap();
    }
    engine.flush().unwrap();
    for k in ["a", "d", "g"] {
        engine.set(k, format!("{}2", k)).unwrap();
    }
    engine.flush().unwrap();
    engine.set("c", "c3").unwrap();
    engine.delete("f").unwrap();
}

#[test]
fn test_start_and_end_modes() {
    let (_temp, engine) = setup_temp_engine();
    populate(&engine);

    let forward = collect(engine.iterator(IteratorMode::Start).unwrap());
    assert_eq!(keys(&forward), vec!["a", "b", "c", "d", "g"]);
    assert_eq!(forward[3].1, "d2");

    let backward = collect(engine.iterator(IteratorMode::End).unwrap());
    let mut reversed = keys(&forward);
    reversed.reverse();
    assert_eq!(keys(&backward), reversed);
    assert_eq!(backward, forward.into_iter().rev().collect::<Vec<_>>());
}

#[test]
fn test_from_modes() {
    let (_temp, engine) = setup_temp_engine();
    populate(&engine);

    let from_c = collect(engine.iterator(IteratorMode::From(b"c", Direction::Forward)).unwrap());
    assert_eq!(keys(&from_c), vec!["c", "d", "g"]);

    let from_cc = collect(engine.iterator(IteratorMode::From(b"cc", Direction::Forward)).unwrap());
    assert_eq!(keys(&from_cc), vec!["d", "g"]);

    let back_from_d = collect(engine.iterator(IteratorMode::From(b"d", Direction::Reverse)).unwrap());
    assert_eq!(keys(&back_from_d), vec!["d", "c", "b", "a"]);

    let back_from_e = collect(engine.iterator(IteratorMode::From(b"e", Direction::Reverse)).unwrap());
    assert_eq!(keys(&back_from_e), vec!["d", "c", "b", "a"]);

    assert!(collect(engine.iterator(IteratorMode::From(b"h", Direction::Forward)).unwrap()).is_empty());
    assert!(collect(engine.iterator(IteratorMode::From(b"0", Direction::Reverse)).unwrap()).is_empty());
}

#[test]
fn test_iterator_ignores_later_writes_and_flushes() {
    let (_temp, engine) = setup_temp_engine();
    engine.set("a", "1").unwrap();
    engine.set("b", "1").unwrap();

    let iter = engine.iterator(IteratorMode::Start).unwrap();
    engine.set("a", "2").unwrap();
    engine.set("c", "new").unwrap();
    engine.delete("b").unwrap();
    engine.flush().unwrap();
    engine.compact_all().unwrap();

    assert_eq!(
        collect(iter),
        vec![("a".into(), "1".into()), ("b".into(), "1".into())]
    );
    assert_eq!(value(&engine, "a"), Some("2".into()));
}

#[test]
fn test_snapshot_reads() {
    let (_temp, engine) = setup_temp_engine();
    engine.set("k", "v1").unwrap();
    let snapshot = engine.snapshot().unwrap();
    assert_eq!(snapshot.sequence(), 1);

    engine.set("k", "v2").unwrap();
    engine.set("other", "x").unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.get_at(&snapshot, "k").unwrap(), Some(b"v1".to_vec()));
    assert_eq!(engine.get_at(&snapshot, "other").unwrap(), None);
    assert_eq!(
        collect(engine.iterator_at(&snapshot, IteratorMode::Start).unwrap()),
        vec![("k".into(), "v1".into())]
    );
    assert_eq!(value(&engine, "k"), Some("v2".into()));
    assert_eq!(engine.stats().unwrap().open_snapshots, 1);

    drop(snapshot);
    assert_eq!(engine.stats().unwrap().open_snapshots, 0);
}

#[test]
fn test_close_releases_pinned_tables() {
    let (_temp, engine) = setup_temp_engine();
    engine.set("a", "1").unwrap();
    engine.flush().unwrap();
    engine.set("b", "2").unwrap();
    engine.flush().unwrap();

    let mut iter = engine.iterator(IteratorMode::Start).unwrap();
    assert_eq!(engine.stats().unwrap().open_snapshots, 1);

    engine.compact_all().unwrap();
    assert_eq!(engine.stats().unwrap().pinned_obsolete_tables, 2);

    iter.close();
    iter.close();
    assert!(iter.is_closed());
    assert!(iter.next().is_none());
    assert_eq!(engine.stats().unwrap().open_snapshots, 0);

    // Purged at the next structural change
    engine.set("c", "3").unwrap();
    engine.flush().unwrap();
    assert_eq!(engine.stats().unwrap().pinned_obsolete_tables, 0);
}
