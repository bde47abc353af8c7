//! Opening, recovery, destroy and secondary catch-up

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::{catch_up_backoff, Engine, EngineInner, OpenMode, SuperVersion};
use crate::config::Options;
use crate::dir::{self, DirLock, FileKind, InfoLog};
use crate::error::{LodeError, Result};
use crate::memtable::MemTable;
use crate::snapshot::SnapshotList;
use crate::storage::{open_tables, LoadedState, ManifestData, StorageManager, VersionEdit};
use crate::wal::{WalRecovery, WalWriter};

/// Attempts before a catch-up gives up on a vanished table file
const CATCH_UP_ATTEMPTS: u32 = 5;

/// WAL contents replayed into a memtable
struct Replayed {
    memtable: MemTable,
    last_sequence: u64,
    segments: Vec<u64>,
}

impl Engine {
    /// Open (or create) a read-write engine at `path`
    ///
    /// ## Recovery Process:
    /// 1. Take the directory lock
    /// 2. Load the manifest and open its tables; delete orphan tables
    /// 3. Replay WAL segments `>= log_number`, truncating torn tails
    /// 4. Flush the replayed entries to L0 and start a fresh segment
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        let started = Instant::now();

        if !path.exists() {
            if !options.create_if_missing {
                return Err(LodeError::InvalidArgument(format!(
                    "{} does not exist and create_if_missing is false",
                    path.display()
                )));
            }
            fs::create_dir_all(&path)?;
        }
        if dir::restore_in_progress(&path) {
            return Err(LodeError::InvalidArgument(format!(
                "restore in progress at {}",
                path.display()
            )));
        }

        let exists = dir::manifest_path(&path).exists();
        if exists && options.error_if_exists {
            return Err(LodeError::InvalidArgument(format!(
                "engine already exists at {}",
                path.display()
            )));
        }
        if !exists && !options.create_if_missing {
            return Err(LodeError::InvalidArgument(format!(
                "no engine at {} and create_if_missing is false",
                path.display()
            )));
        }

        let lock = DirLock::acquire(&path)?;
        let info_log = InfoLog::open(&path)?;

        let LoadedState { storage, version } =
            StorageManager::open(&path, options.compaction.num_levels, options.block_size)?;
        let orphans = storage.delete_orphan_tables(&version)?;
        let manifest = storage.manifest();

        let replayed = replay_wal(&path, &manifest, &storage, true)?;
        let last_sequence = replayed.last_sequence.max(manifest.last_sequence);

        // Recovered writes go to L0; the new segment becomes the only one needed
        let segment = storage.new_file_number();
        let writer = WalWriter::open(&dir::wal_path(&path, segment), options.wal_sync_strategy)?;
        let mut edit = VersionEdit {
            log_number: Some(segment),
            ..Default::default()
        };
        if let Some(table) = storage.build_table(&replayed.memtable)? {
            edit.added.push((0, table));
        }
        let version = storage.log_and_apply(&version, edit, last_sequence)?;
        for old in replayed.segments.iter().copied().filter(|s| *s < segment) {
            fs::remove_file(dir::wal_path(&path, old))?;
        }
        dir::sync_dir(&path)?;

        tracing::info!(
            path = %path.display(),
            recovered_entries = replayed.memtable.entry_count(),
            last_sequence,
            tables = version.table_count(),
            orphans,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Engine opened"
        );
        info_log.log(format!(
            "opened read-write: last_sequence {}, {} tables, {} recovered entries",
            last_sequence,
            version.table_count(),
            replayed.memtable.entry_count()
        ));

        let inner = EngineInner::assemble(
            path,
            options,
            OpenMode::ReadWrite,
            storage,
            SuperVersion {
                active: Arc::new(MemTable::new(segment)),
                immutables: Vec::new(),
                version: Arc::new(version),
            },
            last_sequence,
            Some(writer),
            Some(info_log),
            Some(lock),
        );
        Self::from_inner(inner)
    }

    /// Open with default options
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, Options::default())
    }

    /// Open read-write; every write through this handle expires after `ttl`
    pub fn open_with_ttl(path: impl AsRef<Path>, ttl: Duration, mut options: Options) -> Result<Self> {
        options.ttl = Some(ttl);
        Self::open(path, options)
    }

    /// Open without a lock or writer; files are never modified
    ///
    /// Unflushed WAL data is replayed into a private memtable. With
    /// `error_if_wal_exists`, any non-empty live WAL segment is an error.
    pub fn open_for_readonly(path: impl AsRef<Path>, options: Options, error_if_wal_exists: bool) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();

        let manifest = ManifestData::load(&path)?
            .ok_or_else(|| LodeError::InvalidArgument(format!("no engine at {}", path.display())))?;

        if error_if_wal_exists {
            for segment in dir::list_files(&path, FileKind::Wal)? {
                if segment >= manifest.log_number && fs::metadata(dir::wal_path(&path, segment))?.len() > 0 {
                    return Err(LodeError::InvalidArgument(format!(
                        "WAL segment {} holds unflushed data",
                        segment
                    )));
                }
            }
        }

        let LoadedState { storage, version } =
            StorageManager::open(&path, options.compaction.num_levels, options.block_size)?;
        let replayed = replay_wal(&path, &manifest, &storage, false)?;
        let last_sequence = replayed.last_sequence.max(manifest.last_sequence);

        tracing::info!(
            path = %path.display(),
            last_sequence,
            tables = version.table_count(),
            wal_entries = replayed.memtable.entry_count(),
            "Engine opened read-only"
        );

        let inner = EngineInner::assemble(
            path,
            options,
            OpenMode::ReadOnly,
            storage,
            SuperVersion {
                active: Arc::new(replayed.memtable),
                immutables: Vec::new(),
                version: Arc::new(version),
            },
            last_sequence,
            None,
            None,
            None,
        );
        Self::from_inner(inner)
    }

    /// Open a read-only view of `primary` that follows its manifest
    ///
    /// The view's own files (the info log) live under `secondary`.
    pub fn open_as_secondary(
        primary: impl AsRef<Path>,
        secondary: impl AsRef<Path>,
        options: Options,
    ) -> Result<Self> {
        options.validate()?;
        let primary = primary.as_ref().to_path_buf();
        let secondary = secondary.as_ref().to_path_buf();
        if primary == secondary {
            return Err(LodeError::InvalidArgument(
                "secondary path must differ from the primary".into(),
            ));
        }
        if !dir::manifest_path(&primary).exists() {
            return Err(LodeError::InvalidArgument(format!("no engine at {}", primary.display())));
        }

        fs::create_dir_all(&secondary)?;
        let info_log = InfoLog::open(&secondary)?;

        // The primary may delete a table between our manifest read and its open
        let LoadedState { storage, version } = retry_vanished_tables("open", || {
            StorageManager::open(&primary, options.compaction.num_levels, options.block_size)
        })?;
        let manifest = storage.manifest();

        tracing::info!(
            primary = %primary.display(),
            secondary = %secondary.display(),
            manifest_version = manifest.manifest_version,
            tables = version.table_count(),
            "Engine opened as secondary"
        );
        info_log.log(format!(
            "opened as secondary of {} at manifest version {}",
            primary.display(),
            manifest.manifest_version
        ));

        let inner = EngineInner::assemble(
            secondary,
            options,
            OpenMode::Secondary { primary },
            storage,
            SuperVersion {
                active: Arc::new(MemTable::new(0)),
                immutables: Vec::new(),
                version: Arc::new(version),
            },
            manifest.last_sequence,
            None,
            Some(info_log),
            None,
        );
        Self::from_inner(inner)
    }

    /// Delete every engine file at `path`, then the directory if empty
    ///
    /// Fails with `Locked` while an engine has the directory open.
    pub fn destroy(path: impl AsRef<Path>, _options: &Options) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(());
        }

        let lock = DirLock::acquire(path)?;
        let mut removed = 0;
        for kind in [FileKind::Wal, FileKind::Table] {
            for number in dir::list_files(path, kind)? {
                let file = match kind {
                    FileKind::Wal => dir::wal_path(path, number),
                    FileKind::Table => dir::table_path(path, number),
                };
                fs::remove_file(file)?;
                removed += 1;
            }
        }
        for name in [dir::MANIFEST_FILE, dir::MANIFEST_TEMP, dir::LOG_FILE, dir::RESTORE_MARKER] {
            remove_if_exists(&path.join(name))?;
        }
        drop(lock);
        remove_if_exists(&path.join(dir::LOCK_FILE))?;

        if let Err(e) = fs::remove_dir(path) {
            tracing::debug!(path = %path.display(), error = %e, "Directory left in place");
        }
        tracing::info!(path = %path.display(), files = removed, "Engine destroyed");
        Ok(())
    }

    /// Adopt the primary's manifest if it is newer than the one in use
    ///
    /// Returns `true` when a newer version was adopted.
    pub fn try_catch_up_with_primary(&self) -> Result<bool> {
        self.inner.ensure_open()?;
        let OpenMode::Secondary { primary } = &self.inner.mode else {
            return Err(LodeError::InvalidArgument("not a secondary".into()));
        };

        let _structure = self.inner.structure_lock.lock();
        retry_vanished_tables("catch-up", || {
            let manifest = ManifestData::load(primary)?
                .ok_or_else(|| LodeError::SecondaryCatchUp("primary manifest is missing".into()))?;
            let current = self.inner.storage.manifest_version();
            if manifest.manifest_version <= current {
                return Ok(false);
            }

            let existing: HashMap<u64, _> = self
                .inner
                .super_version()
                .version
                .tables()
                .map(|t| (t.id(), Arc::clone(t)))
                .collect();

            let version = open_tables(primary, &manifest, &existing)?;
            let (from, to) = (current, manifest.manifest_version);
            self.inner
                .last_sequence
                .fetch_max(manifest.last_sequence, Ordering::AcqRel);
            self.inner.storage.set_manifest(manifest);
            self.inner.install(|cur| SuperVersion {
                active: Arc::clone(&cur.active),
                immutables: Vec::new(),
                version: Arc::new(version),
            });
            tracing::info!(from, to, "Secondary caught up with primary");
            self.inner
                .log_event(format!("caught up from manifest version {} to {}", from, to));
            Ok(true)
        })
    }
}

/// Rerun `attempt` while it fails because a primary file was deleted under it
fn retry_vanished_tables<T>(what: &str, mut attempt: impl FnMut() -> Result<T>) -> Result<T> {
    for n in 0..CATCH_UP_ATTEMPTS {
        match attempt() {
            Err(LodeError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(attempt = n, what, "Primary file vanished, retrying");
                std::thread::sleep(catch_up_backoff(n));
            }
            other => return other,
        }
    }

    Err(LodeError::SecondaryCatchUp(format!(
        "primary tables kept changing after {} attempts ({})",
        CATCH_UP_ATTEMPTS, what
    )))
}

impl EngineInner {
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        path: PathBuf,
        options: Options,
        mode: OpenMode,
        storage: StorageManager,
        current: SuperVersion,
        last_sequence: u64,
        wal: Option<WalWriter>,
        info_log: Option<InfoLog>,
        dir_lock: Option<DirLock>,
    ) -> Self {
        Self {
            path,
            options,
            mode,
            storage,
            current: RwLock::new(Arc::new(current)),
            wal: Mutex::new(wal),
            last_sequence: AtomicU64::new(last_sequence),
            snapshots: SnapshotList::new(),
            structure_lock: Mutex::new(()),
            compaction_lock: Mutex::new(()),
            jobs: Mutex::new(None),
            closed: AtomicBool::new(false),
            info_log,
            dir_lock: Mutex::new(dir_lock),
        }
    }
}

/// Replay live WAL segments into a fresh memtable
///
/// `repair` truncates torn tails (read-write); otherwise files are untouched.
fn replay_wal(path: &Path, manifest: &ManifestData, storage: &StorageManager, repair: bool) -> Result<Replayed> {
    let memtable = MemTable::new(0);
    let mut last_sequence = manifest.last_sequence;
    let segments = dir::list_files(path, FileKind::Wal)?;

    for &segment in &segments {
        storage.mark_file_number_used(segment);
        if segment < manifest.log_number {
            continue;
        }

        let file = dir::wal_path(path, segment);
        let (units, result) = if repair {
            WalRecovery::recover(&file)?
        } else {
            WalRecovery::read(&file)?
        };
        if result.entries_corrupted > 0 || result.was_truncated {
            tracing::warn!(
                wal_segment = segment,
                corrupted = result.entries_corrupted,
                valid_bytes = result.valid_bytes,
                "WAL segment had a torn or corrupt tail"
            );
        }

        for unit in units {
            last_sequence = last_sequence.max(unit.last_sequence());
            for entry in unit.into_entries() {
                if entry.sequence > manifest.last_sequence {
                    memtable.insert(entry);
                }
            }
        }
        tracing::debug!(
            wal_segment = segment,
            entries = result.entries_recovered,
            "Replayed WAL segment"
        );
    }

    Ok(Replayed {
        memtable,
        last_sequence,
        segments,
    })
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
