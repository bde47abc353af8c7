//! Tests for MemTable
//!
//! These tests verify:
//! - Snapshot-bounded point lookups over multiple versions
//! - Tombstones and expiry are returned for the caller to judge
//! - Ordered scans in both directions
//! - Size accounting and seal threshold
//! - Concurrent inserts and reads

use std::ops::Bound;
use std::sync::Arc;
use std::thread;

use lodekv::entry::{Entry, InternalKey, MAX_SEQUENCE};
use lodekv::iterator::Direction;
use lodekv::memtable::MemTable;

fn keys(entries: &[Entry]) -> Vec<(String, u64)> {
    entries
        .iter()
        .map(|e| (String::from_utf8(e.key.clone()).unwrap(), e.sequence))
        .collect()
}

// =============================================================================
// Point Lookups
// =============================================================================

#[test]
fn test_get_newest_version_at_snapshot() {
    let table = MemTable::new(1);
    table.insert(Entry::put("k", "v1", 1));
    table.insert(Entry::put("k", "v2", 5));
    table.insert(Entry::put("k", "v3", 9));

    assert_eq!(table.get(b"k", MAX_SEQUENCE).unwrap().sequence, 9);
    assert_eq!(table.get(b"k", 8).unwrap().into_value(), Some(b"v2".to_vec()));
    assert_eq!(table.get(b"k", 1).unwrap().sequence, 1);
    assert!(table.get(b"k", 0).is_none());
}

#[test]
fn test_get_does_not_leak_into_next_key() {
    let table = MemTable::new(1);
    table.insert(Entry::put("a", "1", 3));
    table.insert(Entry::put("b", "2", 1));

    assert!(table.get(b"a", 2).is_none());
    assert!(table.get(b"aa", MAX_SEQUENCE).is_none());
}

#[test]
fn test_tombstone_and_expired_entries_are_returned() {
    let table = MemTable::new(1);
    table.insert(Entry::put("k", "v", 1).with_expiry(Some(100)));
    table.insert(Entry::tombstone("k", 2));

    let newest = table.get(b"k", MAX_SEQUENCE).unwrap();
    assert!(newest.is_tombstone());

    let older = table.get(b"k", 1).unwrap();
    assert!(older.is_expired(100));
    assert!(!older.is_expired(99));
    assert_eq!(older.live_value(150), None);
    assert_eq!(older.live_value(50), Some(&b"v"[..]));
}

// =============================================================================
// Scans
// =============================================================================

#[test]
fn test_forward_scan_orders_by_key_then_newest_first() {
    let table = MemTable::new(1);
    table.insert(Entry::put("b", "x", 2));
    table.insert(Entry::put("a", "x", 1));
    table.insert(Entry::put("b", "y", 4));
    table.insert(Entry::put("c", "x", 3));

    let all = table.scan(Bound::Unbounded, Direction::Forward, usize::MAX);
    assert_eq!(
        keys(&all),
        vec![
            ("a".into(), 1),
            ("b".into(), 4),
            ("b".into(), 2),
            ("c".into(), 3)
        ]
    );

    let from_b = table.scan(
        Bound::Included(InternalKey::new("b", MAX_SEQUENCE)),
        Direction::Forward,
        2,
    );
    assert_eq!(keys(&from_b), vec![("b".into(), 4), ("b".into(), 2)]);
}

#[test]
fn test_reverse_scan_from_upper_bound() {
    let table = MemTable::new(1);
    for (i, k) in ["a", "b", "c", "d"].iter().enumerate() {
        table.insert(Entry::put(*k, "v", i as u64 + 1));
    }

    let back = table.scan(
        Bound::Included(InternalKey::new("c", 0)),
        Direction::Reverse,
        usize::MAX,
    );
    assert_eq!(
        keys(&back),
        vec![("c".into(), 3), ("b".into(), 2), ("a".into(), 1)]
    );
}

#[test]
fn test_try_for_each_visits_in_order() {
    let table = MemTable::new(1);
    table.insert(Entry::put("z", "1", 1));
    table.insert(Entry::put("m", "2", 2));

    let mut seen = Vec::new();
    table
        .try_for_each(|e| {
            seen.push(e.key);
            Ok(())
        })
        .unwrap();
    assert_eq!(seen, vec![b"m".to_vec(), b"z".to_vec()]);
}

// =============================================================================
// Accounting
// =============================================================================

#[test]
fn test_size_and_counts() {
    let table = MemTable::new(7);
    assert!(table.is_empty());
    assert_eq!(table.wal_id(), 7);

    let after_one = table.insert(Entry::put("key", "value", 1));
    assert!(after_one > 0);
    let after_two = table.insert(Entry::put("key", "value2", 2));
    assert!(after_two > after_one);
    assert_eq!(table.size(), after_two);

    assert_eq!(table.entry_count(), 2);
    assert_eq!(table.largest_sequence(), 2);
    assert!(table.should_flush(after_two));
    assert!(!table.should_flush(after_two + 1));
}

#[test]
fn test_concurrent_inserts_and_reads() {
    let table = Arc::new(MemTable::new(1));
    let mut handles = Vec::new();

    for t in 0..4u64 {
        let table = Arc::clone(&table);
        handles.push(thread::spawn(move || {
            for i in 0..250u64 {
                let seq = t * 1000 + i + 1;
                table.insert(Entry::put(format!("t{}-{}", t, i), "v", seq));
                assert!(table.get(format!("t{}-{}", t, i).as_bytes(), MAX_SEQUENCE).is_some());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.entry_count(), 1000);
    assert_eq!(table.largest_sequence(), 3250);
}
