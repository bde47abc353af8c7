//! Tests for backup and restore
//!
//! These tests verify:
//! - A restored directory reads exactly like the source at backup time
//! - Backups are numbered, listable and purgeable
//! - Corrupted backup files fail verification and restore
//! - Engines refuse to open over an interrupted restore

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};

use lodekv::{BackupEngine, Engine, IteratorMode, LodeError};
use tempfile::TempDir;

use super::{collect, open_at, setup_temp_engine, test_options, value};

#[test]
fn test_backup_and_restore_roundtrip() {
    let (_temp, engine) = setup_temp_engine();
    let backups = TempDir::new().unwrap();

    for i in 0..100 {
        engine.set(format!("key{:03}", i), format!("value{}", i)).unwrap();
    }
    engine.flush().unwrap();
    engine.delete("key050").unwrap();
    engine.set("unflushed", "yes").unwrap();

    let info = engine.create_backup(backups.path()).unwrap();
    assert_eq!(info.id, 1);
    assert!(info.num_files >= 2);
    assert_eq!(info.last_sequence, engine.latest_sequence());

    // Writes after the backup are not part of it
    engine.set("after", "backup").unwrap();
    let expected: Vec<_> = collect(engine.iterator(IteratorMode::Start).unwrap())
        .into_iter()
        .filter(|(k, _)| k != "after")
        .collect();
    engine.close().unwrap();

    let restore = TempDir::new().unwrap();
    let restored = Engine::restore_latest_backup(backups.path(), restore.path()).unwrap();
    assert_eq!(restored.id, 1);

    let engine = open_at(restore.path());
    assert_eq!(collect(engine.iterator(IteratorMode::Start).unwrap()), expected);
    assert_eq!(value(&engine, "unflushed"), Some("yes".into()));
    assert_eq!(value(&engine, "key050"), None);
    assert_eq!(value(&engine, "after"), None);
    assert_eq!(engine.latest_sequence(), info.last_sequence);
}

#[test]
fn test_restore_replaces_existing_contents() {
    let (_temp, engine) = setup_temp_engine();
    let backups = TempDir::new().unwrap();
    engine.set("a", "from-backup").unwrap();
    engine.create_backup(backups.path()).unwrap();
    engine.close().unwrap();

    let restore = TempDir::new().unwrap();
    {
        let other = open_at(restore.path());
        other.set("a", "stale").unwrap();
        other.set("b", "stale").unwrap();
        other.flush().unwrap();
        other.set("c", "in-wal").unwrap();
        other.close().unwrap();
    }

    Engine::restore_latest_backup(backups.path(), restore.path()).unwrap();
    let engine = open_at(restore.path());
    assert_eq!(
        collect(engine.iterator(IteratorMode::Start).unwrap()),
        vec![("a".to_string(), "from-backup".to_string())]
    );
}

#[test]
fn test_restore_refused_while_target_open() {
    let (_temp, engine) = setup_temp_engine();
    let backups = TempDir::new().unwrap();
    engine.set("k", "v").unwrap();
    engine.create_backup(backups.path()).unwrap();

    let result = Engine::restore_latest_backup(backups.path(), engine.path());
    assert!(matches!(result, Err(LodeError::Locked(_))));
    assert_eq!(value(&engine, "k"), Some("v".into()));
}

#[test]
fn test_list_and_purge_backups() {
    let (_temp, engine) = setup_temp_engine();
    let backups_dir = TempDir::new().unwrap();

    for round in 0..3 {
        engine.set("round", format!("{}", round)).unwrap();
        let info = engine.create_backup(backups_dir.path()).unwrap();
        assert_eq!(info.id, round + 1);
    }

    let backups = BackupEngine::open(backups_dir.path()).unwrap();
    let ids: Vec<u64> = backups.list_backups().unwrap().iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    assert_eq!(backups.purge_old_backups(1).unwrap(), 2);
    let remaining = backups.list_backups().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, 3);
    assert!(!backups_dir.path().join("backup_000001").exists());

    // Numbering continues after the purged ids
    engine.set("round", "3").unwrap();
    assert_eq!(engine.create_backup(backups_dir.path()).unwrap().id, 4);

    // Purging with a larger keep count is a no-op
    assert_eq!(backups.purge_old_backups(10).unwrap(), 0);
}

#[test]
fn test_verify_detects_corruption() {
    let (_temp, engine) = setup_temp_engine();
    let backups_dir = TempDir::new().unwrap();
    for i in 0..50 {
        engine.set(format!("key{:02}", i), "v".repeat(64)).unwrap();
    }
    let info = engine.create_backup(backups_dir.path()).unwrap();
    engine.close().unwrap();

    let backups = BackupEngine::open(backups_dir.path()).unwrap();
    assert_eq!(backups.verify(info.id).unwrap(), info);

    let table = fs::read_dir(&info.path)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().map_or(false, |ext| ext == "sst"))
        .expect("backup holds a table");
    let mut file = OpenOptions::new().read(true).write(true).open(&table).unwrap();
    file.seek(SeekFrom::Start(16)).unwrap();
    file.write_all(&[0xFF, 0x00, 0xFF, 0x00]).unwrap();
    file.sync_all().unwrap();
    drop(file);

    assert!(matches!(backups.verify(info.id), Err(LodeError::Backup(_))));

    let restore = TempDir::new().unwrap();
    let result = Engine::restore_latest_backup(backups_dir.path(), restore.path());
    assert!(matches!(result, Err(LodeError::Backup(_))));
}

#[test]
fn test_verify_unknown_backup_fails() {
    let backups_dir = TempDir::new().unwrap();
    let backups = BackupEngine::open(backups_dir.path()).unwrap();
    assert!(matches!(backups.verify(7), Err(LodeError::Backup(_))));
}

#[test]
fn test_open_refused_during_restore() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("RESTORE_IN_PROGRESS"), b"1").unwrap();

    let result = Engine::open(temp.path(), test_options().build());
    assert!(matches!(result, Err(LodeError::InvalidArgument(_))));
}

#[test]
fn test_backup_from_read_only_handle() {
    let temp = TempDir::new().unwrap();
    let backups = TempDir::new().unwrap();
    {
        let engine = open_at(temp.path());
        engine.set("flushed", "1").unwrap();
        engine.close().unwrap();
    }

    let reader = Engine::open_for_readonly(temp.path(), test_options().build(), false).unwrap();
    let info = reader.create_backup(backups.path()).unwrap();
    assert_eq!(info.id, 1);

    let restore = TempDir::new().unwrap();
    Engine::restore_latest_backup(backups.path(), restore.path()).unwrap();
    let engine = open_at(restore.path());
    assert_eq!(value(&engine, "flushed"), Some("1".into()));
}
