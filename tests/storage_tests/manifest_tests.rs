//! Tests for the manifest file
//!
//! These tests verify:
//! - Store/load through the atomic rename path
//! - Missing manifest reads as `None`
//! - Checksum and magic validation

use std::fs;

use lodekv::dir;
use lodekv::storage::{ManifestData, TableMeta};
use tempfile::TempDir;

fn sample() -> ManifestData {
    let mut manifest = ManifestData::new(3);
    manifest.manifest_version = 4;
    manifest.log_number = 9;
    manifest.next_file_number = 12;
    manifest.last_sequence = 300;
    manifest.levels[1].push(TableMeta {
        id: 7,
        file_size: 1024,
        entry_count: 10,
        smallest_key: b"a".to_vec(),
        largest_key: b"m".to_vec(),
        smallest_sequence: 1,
        largest_sequence: 99,
    });
    manifest
}

#[test]
fn test_store_then_load() {
    let temp = TempDir::new().unwrap();
    let manifest = sample();
    manifest.store(temp.path()).unwrap();

    assert_eq!(ManifestData::load(temp.path()).unwrap(), Some(manifest));
    assert!(!temp.path().join(dir::MANIFEST_TEMP).exists());
}

#[test]
fn test_missing_manifest_is_none() {
    let temp = TempDir::new().unwrap();
    assert_eq!(ManifestData::load(temp.path()).unwrap(), None);
}

#[test]
fn test_rewrite_replaces_previous() {
    let temp = TempDir::new().unwrap();
    let mut manifest = sample();
    manifest.store(temp.path()).unwrap();

    manifest.manifest_version += 1;
    manifest.levels[1].clear();
    manifest.store(temp.path()).unwrap();

    let loaded = ManifestData::load(temp.path()).unwrap().unwrap();
    assert_eq!(loaded.manifest_version, 5);
    assert_eq!(loaded.table_count(), 0);
}

#[test]
fn test_damaged_manifest_is_corruption() {
    let temp = TempDir::new().unwrap();
    sample().store(temp.path()).unwrap();

    let path = dir::manifest_path(temp.path());
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&path, &bytes).unwrap();

    let err = ManifestData::load(temp.path()).unwrap_err();
    assert!(err.is_corruption());

    fs::write(&path, b"NOPE and then some more bytes").unwrap();
    assert!(ManifestData::load(temp.path()).unwrap_err().is_corruption());
}
