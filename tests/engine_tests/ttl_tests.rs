//! Tests for TTL expiry
//!
//! These tests verify:
//! - Values are readable before their TTL elapses and absent after
//! - Compaction past the TTL removes expired values physically
//! - Deletes and handles without TTL are unaffected

use std::sync::Arc;
use std::time::Duration;

use lodekv::{Engine, IteratorMode, ManualClock};
use tempfile::TempDir;

use super::{collect, test_options, value};

const START: u64 = 1_700_000_000_000;

fn open_with_ttl(temp: &TempDir, clock: &ManualClock, ttl: Duration) -> Engine {
    let options = test_options().clock(Arc::new(clock.clone())).build();
    Engine::open_with_ttl(temp.path(), ttl, options).unwrap()
}

#[test]
fn test_value_expires_after_ttl() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(START);
    let engine = open_with_ttl(&temp, &clock, Duration::from_secs(10));

    engine.set("session", "abc").unwrap();
    clock.advance(Duration::from_secs(9));
    assert_eq!(value(&engine, "session"), Some("abc".into()));

    clock.advance(Duration::from_secs(1));
    assert_eq!(value(&engine, "session"), Some("abc".into()));

    clock.advance(Duration::from_millis(1));
    assert_eq!(value(&engine, "session"), None);
    assert!(collect(engine.iterator(IteratorMode::Start).unwrap()).is_empty());
}

#[test]
fn test_compaction_after_ttl_removes_entry() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(START);
    let engine = open_with_ttl(&temp, &clock, Duration::from_secs(60));

    engine.set("short", "lived").unwrap();
    engine.flush().unwrap();
    let stats = engine.compact_all().unwrap().unwrap();
    assert_eq!(stats.values_expired, 0);
    assert_eq!(value(&engine, "short"), Some("lived".into()));

    clock.advance(Duration::from_secs(61));
    let stats = engine.compact_all().unwrap().unwrap();
    assert_eq!(stats.values_expired, 1);
    assert_eq!(stats.entries_written, 0);
    assert_eq!(value(&engine, "short"), None);

    let levels = engine.stats().unwrap().tables_per_level;
    assert_eq!(levels.iter().sum::<usize>(), 0);
}

#[test]
fn test_expiry_is_stamped_per_write() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(START);
    let engine = open_with_ttl(&temp, &clock, Duration::from_secs(10));

    engine.set("early", "1").unwrap();
    clock.advance(Duration::from_secs(5));
    engine.set("late", "2").unwrap();
    clock.advance(Duration::from_secs(6));

    assert_eq!(value(&engine, "early"), None);
    assert_eq!(value(&engine, "late"), Some("2".into()));
}

#[test]
fn test_handle_without_ttl_keeps_values() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(START);
    {
        let options = test_options().clock(Arc::new(clock.clone())).build();
        let engine = Engine::open(temp.path(), options).unwrap();
        engine.set("forever", "yes").unwrap();
        engine.close().unwrap();
    }

    clock.advance(Duration::from_secs(3600 * 24 * 365));
    let engine = open_with_ttl(&temp, &clock, Duration::from_secs(1));
    assert_eq!(value(&engine, "forever"), Some("yes".into()));
}

#[test]
fn test_expired_values_stay_hidden_after_reopen() {
    let temp = TempDir::new().unwrap();
    let clock = ManualClock::new(START);
    {
        let engine = open_with_ttl(&temp, &clock, Duration::from_secs(1));
        engine.set("k", "v").unwrap();
    }

    clock.advance(Duration::from_secs(2));
    let engine = open_with_ttl(&temp, &clock, Duration::from_secs(1));
    assert_eq!(value(&engine, "k"), None);
}
