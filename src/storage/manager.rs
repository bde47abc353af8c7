//! Storage Manager
//!
//! Owns the on-disk table set and the manifest.
//!
//! ## Responsibilities
//! - Open the tables a manifest references (reusing already-open readers)
//! - Allocate file numbers shared by WAL segments and SSTables
//! - Build SSTables from sealed MemTables
//! - Persist each new version before it is published
//! - Delete replaced SSTables once nothing pins them

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dir;
use crate::error::{LodeError, Result};
use crate::memtable::MemTable;

use super::manifest::ManifestData;
use super::sstable::{SSTableBuilder, SSTableReader};
use super::version::{Version, VersionEdit};

/// Manages the storage layer
///
/// ## Concurrency:
/// - `manifest`: last persisted manifest, updated only under the engine's
///   structural lock
/// - `next_file_number`: atomic counter (lock-free)
/// - `obsolete`: replaced tables waiting for their last reader
pub struct StorageManager {
    /// Directory where the manifest and SSTables live
    data_dir: PathBuf,

    block_size: usize,

    manifest: Mutex<ManifestData>,

    next_file_number: AtomicU64,

    obsolete: Mutex<Vec<Arc<SSTableReader>>>,
}

/// Tables and manifest loaded from a directory
pub struct LoadedState {
    pub storage: StorageManager,
    pub version: Version,
}

impl StorageManager {
    /// Load the manifest at `dir` (or start an empty one) and open its tables
    pub fn open(dir: &Path, num_levels: usize, block_size: usize) -> Result<LoadedState> {
        let mut manifest = ManifestData::load(dir)?.unwrap_or_else(|| ManifestData::new(num_levels));
        if manifest.levels.len() < num_levels {
            manifest.levels.resize_with(num_levels, Vec::new);
        }

        let version = open_tables(dir, &manifest, &HashMap::new())?;

        tracing::debug!(
            dir = %dir.display(),
            tables = version.table_count(),
            manifest_version = manifest.manifest_version,
            "Loaded manifest"
        );

        let storage = Self {
            data_dir: dir.to_path_buf(),
            block_size,
            next_file_number: AtomicU64::new(manifest.next_file_number),
            manifest: Mutex::new(manifest),
            obsolete: Mutex::new(Vec::new()),
        };
        Ok(LoadedState { storage, version })
    }

    /// Snapshot of the last persisted manifest
    pub fn manifest(&self) -> ManifestData {
        self.manifest.lock().clone()
    }

    pub fn log_number(&self) -> u64 {
        self.manifest.lock().log_number
    }

    pub fn manifest_version(&self) -> u64 {
        self.manifest.lock().manifest_version
    }

    /// Adopt a manifest written by another process (secondary catch-up)
    pub(crate) fn set_manifest(&self, manifest: ManifestData) {
        self.next_file_number
            .fetch_max(manifest.next_file_number, Ordering::SeqCst);
        *self.manifest.lock() = manifest;
    }

    /// Allocate a file number
    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::SeqCst)
    }

    /// Ensure future numbers are above `number`
    pub fn mark_file_number_used(&self, number: u64) {
        self.next_file_number.fetch_max(number + 1, Ordering::SeqCst);
    }

    pub fn next_file_number(&self) -> u64 {
        self.next_file_number.load(Ordering::SeqCst)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn table_path(&self, id: u64) -> PathBuf {
        dir::table_path(&self.data_dir, id)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Write a sealed MemTable to a new L0-ready SSTable
    ///
    /// Returns `None` for an empty memtable.
    pub fn build_table(&self, memtable: &MemTable) -> Result<Option<Arc<SSTableReader>>> {
        if memtable.is_empty() {
            return Ok(None);
        }

        let id = self.new_file_number();
        let path = self.table_path(id);

        let mut builder = SSTableBuilder::new(&path, id, self.block_size)?;
        memtable.try_for_each(|entry| builder.add(&entry))?;
        builder.finish()?;

        Ok(Some(Arc::new(SSTableReader::open(&path, id)?)))
    }

    /// Persist `base + edit` and return it; nothing is published on error
    ///
    /// Tables removed by the edit move to the obsolete list.
    pub fn log_and_apply(&self, base: &Version, edit: VersionEdit, last_sequence: u64) -> Result<Version> {
        let next = base.apply(&edit);

        let mut manifest = self.manifest.lock();
        let record = ManifestData {
            manifest_version: manifest.manifest_version + 1,
            log_number: edit.log_number.unwrap_or(manifest.log_number).max(manifest.log_number),
            next_file_number: self.next_file_number(),
            last_sequence: last_sequence.max(manifest.last_sequence),
            levels: next.metas(),
        };
        record.store(&self.data_dir)?;
        *manifest = record;
        drop(manifest);

        let removed: Vec<Arc<SSTableReader>> = base
            .tables()
            .filter(|t| edit.deleted.iter().any(|(_, id)| *id == t.id()))
            .cloned()
            .collect();
        if !removed.is_empty() {
            self.obsolete.lock().extend(removed);
        }

        Ok(next)
    }

    /// Delete obsolete tables that no version or iterator still references
    ///
    /// Returns the number of files removed.
    pub fn purge_obsolete(&self) -> Result<usize> {
        let ready: Vec<Arc<SSTableReader>> = {
            let mut obsolete = self.obsolete.lock();
            let (ready, pinned): (Vec<_>, Vec<_>) = obsolete
                .drain(..)
                .partition(|t| Arc::strong_count(t) == 1);
            *obsolete = pinned;
            ready
        };

        let mut removed = 0;
        for table in ready {
            let path = table.path().to_path_buf();
            let id = table.id();
            drop(table);
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            tracing::debug!(table = id, "Deleted obsolete SSTable");
        }
        Ok(removed)
    }

    /// Obsolete tables still pinned by a reader
    pub fn pinned_obsolete(&self) -> usize {
        self.obsolete.lock().len()
    }

    /// Delete SSTables on disk that the current version does not reference
    pub fn delete_orphan_tables(&self, version: &Version) -> Result<usize> {
        let live = version.table_ids();
        let mut removed = 0;
        for id in dir::list_files(&self.data_dir, dir::FileKind::Table)? {
            self.mark_file_number_used(id);
            if !live.contains(&id) {
                fs::remove_file(self.table_path(id))?;
                tracing::info!(table = id, "Deleted orphan SSTable");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Open every table `manifest` lists, reusing readers from `existing` by id
pub fn open_tables(
    dir: &Path,
    manifest: &ManifestData,
    existing: &HashMap<u64, Arc<SSTableReader>>,
) -> Result<Version> {
    let mut levels = Vec::with_capacity(manifest.levels.len());
    for level in &manifest.levels {
        let mut tables = Vec::with_capacity(level.len());
        for meta in level {
            let reader = match existing.get(&meta.id) {
                Some(reader) => Arc::clone(reader),
                None => {
                    let reader = SSTableReader::open(&dir::table_path(dir, meta.id), meta.id)?;
                    if reader.meta() != meta {
                        return Err(LodeError::Corruption(format!(
                            "SSTable {} does not match its manifest entry",
                            meta.id
                        )));
                    }
                    Arc::new(reader)
                }
            };
            tables.push(reader);
        }
        levels.push(tables);
    }
    Ok(Version::from_levels(levels))
}
