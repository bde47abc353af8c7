//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTables, SSTables and the manifest
//! - Handle concurrent read/write access
//! - Seal and flush MemTables, schedule compactions
//! - Serve snapshot-consistent reads and iterators
//! - Manage crash recovery, read-only and secondary opens (see `open.rs`)
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
//!
//! - **Writes** are serialized by the WAL mutex: assign sequences, append
//!   the unit, insert into the active MemTable, then publish
//!   `last_sequence`. Readers never see a sequence before all of its
//!   unit is in the MemTable.
//! - **Reads** load `last_sequence` first, then clone the current
//!   [`SuperVersion`] (an `Arc` swap behind a `RwLock`), so every write at or
//!   below their cutoff is reachable from what they captured.
//! - **Flush and compaction** publish new versions under `structure_lock`;
//!   `compaction_lock` admits one compaction at a time. Lock order is
//!   WAL → compaction → structure.

mod open;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use parking_lot::{Mutex, RwLock};

use crate::backup::{BackupEngine, BackupInfo};
use crate::batch::WriteBatch;
use crate::compaction::{self, CompactionContext, CompactionStats, Retention};
use crate::config::Options;
use crate::dir::{self, DirLock, InfoLog};
use crate::entry::Entry;
use crate::error::{LodeError, Result};
use crate::iterator::{DbIterator, EntryCursor, IteratorMode, MemTableCursor};
use crate::memtable::MemTable;
use crate::snapshot::{Snapshot, SnapshotList};
use crate::storage::{SSTableCursor, StorageManager, Version, VersionEdit};
use crate::wal::{Operation, WalEntry, WalWriter};

use worker::{Job, Worker};

/// Upper bound on back-to-back automatic compactions per trigger
const MAX_AUTO_COMPACTIONS: usize = 64;

/// How an engine handle was opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenMode {
    ReadWrite,
    ReadOnly,
    Secondary { primary: PathBuf },
}

/// Point-in-time view of the sources a read consults
pub(crate) struct SuperVersion {
    pub active: Arc<MemTable>,
    /// Sealed memtables, newest first
    pub immutables: Vec<Arc<MemTable>>,
    pub version: Arc<Version>,
}

/// Counters describing an open engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub last_sequence: u64,
    pub manifest_version: u64,
    pub memtable_bytes: usize,
    pub immutable_memtables: usize,
    pub tables_per_level: Vec<usize>,
    pub bytes_per_level: Vec<u64>,
    pub open_snapshots: usize,
    /// Replaced tables still held by an iterator or snapshot view
    pub pinned_obsolete_tables: usize,
}

/// The main storage engine
///
/// ## Concurrency:
/// All methods take `&self`; share a handle across threads with `Arc<Engine>`.
pub struct Engine {
    inner: Arc<EngineInner>,
    worker: Mutex<Option<Worker>>,
}

pub(crate) struct EngineInner {
    /// Engine directory (the secondary's own directory in secondary mode)
    path: PathBuf,

    options: Options,

    mode: OpenMode,

    storage: StorageManager,

    current: RwLock<Arc<SuperVersion>>,

    /// Active WAL segment; `None` for read-only, secondary and closed handles
    wal: Mutex<Option<WalWriter>>,

    /// Highest sequence visible to readers
    last_sequence: AtomicU64,

    snapshots: Arc<SnapshotList>,

    /// Serializes manifest updates (flush and compaction apply)
    structure_lock: Mutex<()>,

    /// One compaction at a time
    compaction_lock: Mutex<()>,

    /// Background job queue while a worker runs
    jobs: Mutex<Option<Sender<Job>>>,

    closed: AtomicBool,

    info_log: Option<InfoLog>,

    dir_lock: Mutex<Option<DirLock>>,
}

impl Engine {
    fn from_inner(inner: EngineInner) -> Result<Self> {
        let inner = Arc::new(inner);
        let worker = if inner.mode == OpenMode::ReadWrite && inner.options.background_jobs {
            let worker = Worker::spawn(Arc::downgrade(&inner), Arc::new(AtomicBool::new(false)))?;
            *inner.jobs.lock() = Some(worker.sender());
            Some(worker)
        } else {
            None
        };

        let engine = Self {
            inner,
            worker: Mutex::new(worker),
        };
        if engine.inner.mode == OpenMode::ReadWrite {
            engine.inner.schedule(Job::Compact)?;
        }
        Ok(engine)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value by key
    ///
    /// Search order:
    /// 1. Active MemTable (most recent writes)
    /// 2. Sealed MemTables (newest to oldest)
    /// 3. SSTables (L0 newest to oldest, then L1+)
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.inner.ensure_open()?;
        let snapshot = self.inner.acquire_snapshot();
        let sv = self.inner.super_version();
        self.inner.read_value(&sv, key.as_ref(), snapshot.sequence())
    }

    /// Read at an explicit snapshot
    pub fn get_at(&self, snapshot: &Snapshot, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.inner.ensure_open()?;
        let sv = self.inner.super_version();
        self.inner.read_value(&sv, key.as_ref(), snapshot.sequence())
    }

    /// Look up several keys under one snapshot
    ///
    /// With `skip_missing`, absent keys are left out and the result holds
    /// only the present values in input order. Without it, the result is
    /// aligned with `keys` and absent keys are `None`.
    pub fn multi_get<K: AsRef<[u8]>>(&self, keys: &[K], skip_missing: bool) -> Result<Vec<Option<Vec<u8>>>> {
        self.inner.ensure_open()?;
        let snapshot = self.inner.acquire_snapshot();
        let sv = self.inner.super_version();

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let value = self.inner.read_value(&sv, key.as_ref(), snapshot.sequence())?;
            if value.is_some() || !skip_missing {
                out.push(value);
            }
        }
        Ok(out)
    }

    /// Ordered iterator over live pairs as of now
    pub fn iterator(&self, mode: IteratorMode<'_>) -> Result<DbIterator> {
        self.inner.ensure_open()?;
        let snapshot = self.inner.acquire_snapshot();
        self.inner.iterator_with(snapshot, mode)
    }

    /// Ordered iterator at an explicit snapshot
    pub fn iterator_at(&self, snapshot: &Snapshot, mode: IteratorMode<'_>) -> Result<DbIterator> {
        self.inner.ensure_open()?;
        self.inner.iterator_with(snapshot.duplicate(), mode)
    }

    /// Pin the current state for repeatable reads
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.inner.ensure_open()?;
        Ok(self.inner.acquire_snapshot())
    }

    /// Highest sequence visible to new reads
    pub fn latest_sequence(&self) -> u64 {
        self.inner.last_sequence.load(Ordering::Acquire)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Put a key-value pair
    pub fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.inner.ensure_writable()?;
        let op = Operation::Put {
            key: key.as_ref().to_vec(),
            value: value.as_ref().to_vec(),
            expires_at: self.inner.expiry_for_write(),
        };
        self.inner.write_ops(vec![op])
    }

    /// Alias of [`set`](Self::set)
    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.set(key, value)
    }

    /// Delete a key (inserts a tombstone)
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        self.inner.ensure_writable()?;
        let op = Operation::Delete {
            key: key.as_ref().to_vec(),
        };
        self.inner.write_ops(vec![op])
    }

    /// Apply a batch atomically; an empty batch is a no-op
    pub fn write(&self, batch: &WriteBatch) -> Result<()> {
        self.inner.ensure_writable()?;
        if batch.is_empty() {
            return Ok(());
        }
        let expires_at = self.inner.expiry_for_write();
        let ops = batch.iter().map(|op| op.to_operation(expires_at)).collect();
        self.inner.write_ops(ops)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Flush every memtable to L0 (no-op when empty)
    pub fn flush(&self) -> Result<()> {
        self.inner.ensure_writable()?;
        self.inner.flush_all()?;
        self.inner.schedule(Job::Compact)
    }

    /// Run compactions while any level is over its trigger; returns the count
    pub fn maybe_compact(&self) -> Result<usize> {
        self.inner.ensure_writable()?;
        let mut runs = 0;
        while runs < MAX_AUTO_COMPACTIONS && self.inner.compact_once(false)?.is_some() {
            runs += 1;
        }
        Ok(runs)
    }

    /// Flush, then merge every table into the bottom level
    pub fn compact_all(&self) -> Result<Option<CompactionStats>> {
        self.inner.ensure_writable()?;
        self.inner.flush_all()?;
        self.inner.compact_once(true)
    }

    /// Copy the current durable state into a new backup under `backup_dir`
    pub fn create_backup(&self, backup_dir: impl AsRef<Path>) -> Result<BackupInfo> {
        self.inner.ensure_open()?;
        if self.inner.mode == OpenMode::ReadWrite {
            self.inner.flush_all()?;
        }

        let backups = BackupEngine::open(backup_dir.as_ref())?;
        // The pinned version keeps its tables on disk while they are copied
        let (version, manifest) = {
            let _structure = self.inner.structure_lock.lock();
            let version = Arc::clone(&self.inner.super_version().version);
            let mut manifest = self.inner.storage.manifest();
            manifest.levels = version.metas();
            (version, manifest)
        };
        let info = backups.create(self.inner.storage.data_dir(), &version, manifest)?;

        tracing::info!(
            backup_id = info.id,
            files = info.num_files,
            bytes = info.size,
            "Created backup"
        );
        self.inner.log_event(format!("created backup {} ({} files)", info.id, info.num_files));
        Ok(info)
    }

    /// Restore the newest complete backup in `backup_dir` into `restore_dir`
    ///
    /// `restore_dir` must not be open by any engine.
    pub fn restore_latest_backup(
        backup_dir: impl AsRef<Path>,
        restore_dir: impl AsRef<Path>,
    ) -> Result<BackupInfo> {
        BackupEngine::open(backup_dir.as_ref())?.restore_latest(restore_dir.as_ref())
    }

    /// Stop the background worker; later flushes and compactions run inline
    pub fn cancel_all_background_work(&self, wait: bool) {
        *self.inner.jobs.lock() = None;
        if let Some(mut worker) = self.worker.lock().take() {
            worker.stop(wait);
            tracing::debug!(wait, "Cancelled background work");
        }
    }

    /// Close the engine gracefully
    ///
    /// Read-write handles flush the memtable and sync the WAL. Idempotent;
    /// any later operation fails with `Closed`.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = if self.inner.mode == OpenMode::ReadWrite {
            self.inner.flush_all()
        } else {
            Ok(())
        };

        self.cancel_all_background_work(true);

        if let Some(mut wal) = self.inner.wal.lock().take() {
            wal.sync()?;
        }
        if self.inner.mode == OpenMode::ReadWrite {
            self.inner.storage.purge_obsolete()?;
        }
        self.inner.log_event("closed");
        self.inner.dir_lock.lock().take();

        tracing::info!(path = %self.inner.path.display(), "Engine closed");
        result
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn stats(&self) -> Result<EngineStats> {
        self.inner.ensure_open()?;
        let sv = self.inner.super_version();
        let levels = sv.version.num_levels();
        Ok(EngineStats {
            last_sequence: self.latest_sequence(),
            manifest_version: self.inner.storage.manifest_version(),
            memtable_bytes: sv.active.size() + sv.immutables.iter().map(|m| m.size()).sum::<usize>(),
            immutable_memtables: sv.immutables.len(),
            tables_per_level: (0..levels).map(|l| sv.version.level(l).len()).collect(),
            bytes_per_level: (0..levels).map(|l| sv.version.level_bytes(l)).collect(),
            open_snapshots: self.inner.snapshots.len(),
            pinned_obsolete_tables: self.inner.storage.pinned_obsolete(),
        })
    }

    /// Engine directory (the secondary's own directory in secondary mode)
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Directory holding the manifest and tables read by this handle
    pub fn data_dir(&self) -> &Path {
        self.inner.storage.data_dir()
    }

    pub fn mode(&self) -> &OpenMode {
        &self.inner.mode
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // No flush: unflushed writes are recovered from the WAL on reopen.
        // The worker is joined so the directory lock is free once drop returns.
        self.cancel_all_background_work(true);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.inner.path)
            .field("mode", &self.inner.mode)
            .field("last_sequence", &self.latest_sequence())
            .finish()
    }
}

// =============================================================================
// Internals
// =============================================================================

impl EngineInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LodeError::Closed);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        match self.mode {
            OpenMode::ReadWrite => Ok(()),
            OpenMode::ReadOnly => Err(LodeError::ReadOnly("read-only")),
            OpenMode::Secondary { .. } => Err(LodeError::ReadOnly("as a secondary")),
        }
    }

    fn now_millis(&self) -> u64 {
        self.options.clock.now_millis()
    }

    fn expiry_for_write(&self) -> Option<u64> {
        self.options
            .ttl
            .map(|ttl| self.now_millis().saturating_add(ttl.as_millis() as u64))
    }

    pub(crate) fn log_event(&self, message: impl AsRef<str>) {
        if let Some(log) = &self.info_log {
            log.log(message);
        }
    }

    fn super_version(&self) -> Arc<SuperVersion> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a successor of the current super version
    fn install(&self, next: impl FnOnce(&SuperVersion) -> SuperVersion) {
        let mut current = self.current.write();
        let successor = next(&current);
        *current = Arc::new(successor);
    }

    fn acquire_snapshot(&self) -> Snapshot {
        self.snapshots
            .acquire_current(|| self.last_sequence.load(Ordering::Acquire))
    }

    // -------------------------------------------------------------------------
    // Read path
    // -------------------------------------------------------------------------

    fn lookup(sv: &SuperVersion, key: &[u8], sequence: u64) -> Result<Option<Entry>> {
        if let Some(entry) = sv.active.get(key, sequence) {
            return Ok(Some(entry));
        }
        for memtable in &sv.immutables {
            if let Some(entry) = memtable.get(key, sequence) {
                return Ok(Some(entry));
            }
        }
        sv.version.get(key, sequence)
    }

    fn read_value(&self, sv: &SuperVersion, key: &[u8], sequence: u64) -> Result<Option<Vec<u8>>> {
        let now = self.now_millis();
        Ok(Self::lookup(sv, key, sequence)?
            .filter(|e| e.live_value(now).is_some())
            .and_then(Entry::into_value))
    }

    fn iterator_with(&self, snapshot: Snapshot, mode: IteratorMode<'_>) -> Result<DbIterator> {
        let sv = self.super_version();
        let direction = mode.direction();
        let target = mode.seek_target();

        let mut cursors: Vec<Box<dyn EntryCursor>> =
            Vec::with_capacity(1 + sv.immutables.len() + sv.version.table_count());
        cursors.push(Box::new(MemTableCursor::seek(Arc::clone(&sv.active), direction, target)));
        for memtable in &sv.immutables {
            cursors.push(Box::new(MemTableCursor::seek(Arc::clone(memtable), direction, target)));
        }
        for table in sv.version.tables() {
            cursors.push(Box::new(SSTableCursor::seek(Arc::clone(table), direction, target)?));
        }

        Ok(DbIterator::new(
            cursors,
            direction,
            snapshot.sequence(),
            self.now_millis(),
            Some(snapshot),
        ))
    }

    // -------------------------------------------------------------------------
    // Write path
    // -------------------------------------------------------------------------

    /// Log and apply one unit; visible to readers only once complete
    fn write_ops(&self, ops: Vec<Operation>) -> Result<()> {
        let mut wal = self.wal.lock();
        let writer = wal.as_mut().ok_or(LodeError::Closed)?;

        let first = self.last_sequence.load(Ordering::Acquire) + 1;
        let unit = WalEntry::new(first, ops, self.now_millis());
        writer.append(&unit)?;

        let last = unit.last_sequence();
        let active = Arc::clone(&self.current.read().active);
        let mut size = active.size();
        for entry in unit.into_entries() {
            size = active.insert(entry);
        }
        self.last_sequence.store(last, Ordering::Release);

        if size < self.options.memtable_size_limit {
            return Ok(());
        }

        self.seal_active(&mut wal)?;
        drop(wal);

        let pending = self.current.read().immutables.len();
        if pending > self.options.max_immutable_memtables {
            tracing::warn!(pending, "Write stall: flushing sealed memtables inline");
            self.flush_immutables().map(|_| ())
        } else {
            self.schedule(Job::Flush)
        }
    }

    /// Seal the active memtable behind a fresh WAL segment (WAL lock held)
    fn seal_active(&self, wal: &mut Option<WalWriter>) -> Result<()> {
        let Some(old) = wal.as_mut() else {
            return Err(LodeError::Closed);
        };
        if self.current.read().active.is_empty() {
            return Ok(());
        }
        old.sync()?;

        let segment = self.storage.new_file_number();
        let writer = WalWriter::open(&dir::wal_path(&self.path, segment), self.options.wal_sync_strategy)?;
        *wal = Some(writer);

        self.install(|cur| {
            let mut immutables = Vec::with_capacity(cur.immutables.len() + 1);
            immutables.push(Arc::clone(&cur.active));
            immutables.extend(cur.immutables.iter().cloned());
            SuperVersion {
                active: Arc::new(MemTable::new(segment)),
                immutables,
                version: Arc::clone(&cur.version),
            }
        });

        tracing::debug!(wal_segment = segment, "Sealed memtable");
        Ok(())
    }

    /// Queue a job for the worker, or run it inline without one
    fn schedule(&self, job: Job) -> Result<()> {
        if let Some(sender) = self.jobs.lock().as_ref() {
            if sender.send(job).is_ok() {
                return Ok(());
            }
        }
        let never = AtomicBool::new(false);
        match job {
            Job::Flush => self.flush_immutables().and_then(|_| self.auto_compact(&never)),
            Job::Compact => self.auto_compact(&never),
            Job::Shutdown => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Flush
    // -------------------------------------------------------------------------

    /// Seal the active memtable (if not empty) and flush everything sealed
    fn flush_all(&self) -> Result<()> {
        {
            let mut wal = self.wal.lock();
            if wal.is_some() {
                self.seal_active(&mut wal)?;
            }
        }
        self.flush_immutables()?;
        Ok(())
    }

    /// Write sealed memtables to L0, oldest first; returns the number flushed
    pub(crate) fn flush_immutables(&self) -> Result<usize> {
        let _structure = self.structure_lock.lock();
        let mut flushed = 0;

        loop {
            let sv = self.super_version();
            let Some(oldest) = sv.immutables.last().cloned() else {
                break;
            };
            // Lowest segment still needed once `oldest` is durable
            let next_log = sv
                .immutables
                .iter()
                .rev()
                .nth(1)
                .map(|m| m.wal_id())
                .unwrap_or_else(|| sv.active.wal_id());

            let started = Instant::now();
            let table = self.storage.build_table(&oldest)?;
            let mut edit = VersionEdit {
                log_number: Some(next_log),
                ..Default::default()
            };
            if let Some(table) = &table {
                edit.added.push((0, Arc::clone(table)));
            }
            let version = self
                .storage
                .log_and_apply(&sv.version, edit, oldest.largest_sequence())?;

            self.install(|cur| SuperVersion {
                active: Arc::clone(&cur.active),
                immutables: cur
                    .immutables
                    .iter()
                    .filter(|m| !Arc::ptr_eq(m, &oldest))
                    .cloned()
                    .collect(),
                version: Arc::new(version),
            });
            self.delete_wal_below(next_log);

            let table_id = table.as_ref().map(|t| t.id());
            tracing::info!(
                table = ?table_id,
                entries = oldest.entry_count(),
                wal_segment = oldest.wal_id(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Flushed memtable"
            );
            self.log_event(format!(
                "flushed memtable (wal {}) to table {:?}, {} entries",
                oldest.wal_id(),
                table_id,
                oldest.entry_count()
            ));
            flushed += 1;
        }

        if flushed > 0 {
            self.storage.purge_obsolete()?;
        }
        Ok(flushed)
    }

    fn delete_wal_below(&self, log_number: u64) {
        let segments = match dir::list_files(&self.path, dir::FileKind::Wal) {
            Ok(segments) => segments,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list WAL segments");
                return;
            }
        };
        for segment in segments.into_iter().filter(|s| *s < log_number) {
            match std::fs::remove_file(dir::wal_path(&self.path, segment)) {
                Ok(()) => tracing::debug!(wal_segment = segment, "Deleted WAL segment"),
                Err(e) => {
                    tracing::warn!(wal_segment = segment, error = %e, "Failed to delete WAL segment")
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Compaction
    // -------------------------------------------------------------------------

    /// Run automatic compactions until none is needed or `cancelled` is set
    pub(crate) fn auto_compact(&self, cancelled: &AtomicBool) -> Result<()> {
        if self.options.compaction.disable_auto_compactions {
            return Ok(());
        }
        for _ in 0..MAX_AUTO_COMPACTIONS {
            if cancelled.load(Ordering::SeqCst) || self.compact_once(false)?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Pick and run one compaction (`all` merges everything to the bottom)
    fn compact_once(&self, all: bool) -> Result<Option<CompactionStats>> {
        let _compaction = self.compaction_lock.lock();
        let started = Instant::now();

        let stats = {
            let sv = self.super_version();
            let task = if all {
                compaction::pick_all(&sv.version)
            } else {
                compaction::pick(&sv.version, &self.options)
            };
            let Some(task) = task else {
                return Ok(None);
            };

            let ctx = CompactionContext {
                storage: &self.storage,
                version: &sv.version,
                options: &self.options,
                retention: Retention::new(self.snapshots.sequences(), self.now_millis()),
            };
            let (edit, stats) = compaction::run(&task, &ctx)?;

            let _structure = self.structure_lock.lock();
            let base = Arc::clone(&self.current.read().version);
            // last_sequence is unchanged by compaction
            let version = self.storage.log_and_apply(&base, edit, 0)?;
            self.install(|cur| SuperVersion {
                active: Arc::clone(&cur.active),
                immutables: cur.immutables.clone(),
                version: Arc::new(version),
            });
            self.log_event(format!(
                "compacted L{} -> L{}: {} tables in, {} out, {} entries written",
                task.level, task.output_level, stats.input_tables, stats.output_tables, stats.entries_written
            ));
            stats
        };

        self.storage.purge_obsolete()?;
        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Compaction applied");
        Ok(Some(stats))
    }
}

/// Delay between secondary catch-up attempts
pub(crate) fn catch_up_backoff(attempt: u32) -> Duration {
    Duration::from_millis(10 * u64::from(attempt + 1))
}
