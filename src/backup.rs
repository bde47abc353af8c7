//! Backup / Restore
//!
//! A backup directory holds numbered, self-contained copies of an engine:
//!
//! ```text
//! <backups>/
//!   backup_000001/
//!     MANIFEST             manifest listing exactly the copied tables
//!     NNNNNN.sst           tables (hard links when the filesystem allows)
//!     BACKUP_META          per-file sizes and CRC32s
//!   backup_000002.tmp/     in-progress backup, ignored until renamed
//! ```
//!
//! A backup becomes visible only when its directory is renamed from
//! `.tmp`, so a crash mid-backup never leaves a half backup behind.

use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::dir::{self, DirLock, FileKind};
use crate::error::{LodeError, Result};
use crate::storage::manifest::{decode_framed, encode_framed};
use crate::storage::{ManifestData, Version};

const BACKUP_META_MAGIC: &[u8; 4] = b"LDBK";
pub const BACKUP_META_FILE: &str = "BACKUP_META";
const BACKUP_PREFIX: &str = "backup_";
const TEMP_SUFFIX: &str = ".tmp";

/// Summary of one complete backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub id: u64,
    /// Creation time (unix millis)
    pub timestamp: u64,
    pub last_sequence: u64,
    pub num_files: usize,
    /// Total bytes across all files
    pub size: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupMeta {
    id: u64,
    timestamp: u64,
    last_sequence: u64,
    files: Vec<BackupFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupFile {
    name: String,
    size: u64,
    crc: u32,
}

/// Manages the backups stored under one directory
#[derive(Debug, Clone)]
pub struct BackupEngine {
    dir: PathBuf,
}

impl BackupEngine {
    /// Open (creating if needed) a backup directory
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Complete backups, oldest first
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let mut backups = Vec::new();
        for (id, complete) in self.backup_ids()? {
            if !complete {
                continue;
            }
            match self.load_meta(id) {
                Ok(meta) => backups.push(self.info(&meta)),
                Err(e) => tracing::warn!(backup_id = id, error = %e, "Skipping unreadable backup"),
            }
        }
        Ok(backups)
    }

    /// Delete all but the newest `keep` backups; returns how many were removed
    pub fn purge_old_backups(&self, keep: usize) -> Result<usize> {
        let backups = self.list_backups()?;
        let excess = backups.len().saturating_sub(keep);
        for backup in &backups[..excess] {
            fs::remove_dir_all(&backup.path)?;
            tracing::info!(backup_id = backup.id, "Purged backup");
        }
        Ok(excess)
    }

    /// Copy the tables of `version` from `source` and seal them as a new backup
    pub(crate) fn create(&self, source: &Path, version: &Version, mut manifest: ManifestData) -> Result<BackupInfo> {
        let id = self.backup_ids()?.last().map_or(1, |(id, _)| id + 1);
        let temp = self.dir.join(format!("{}{:06}{}", BACKUP_PREFIX, id, TEMP_SUFFIX));
        if temp.exists() {
            fs::remove_dir_all(&temp)?;
        }
        fs::create_dir(&temp)?;

        let mut files = Vec::with_capacity(version.table_count() + 1);
        for table in version.tables() {
            let name = file_name(table.path())?;
            let target = temp.join(&name);
            if fs::hard_link(table.path(), &target).is_err() {
                fs::copy(table.path(), &target)?;
            }
            let (size, crc) = checksum(&target)?;
            files.push(BackupFile { name, size, crc });
        }

        // A restored engine starts without WAL segments
        manifest.log_number = manifest.next_file_number;
        manifest.store(&temp)?;
        let (size, crc) = checksum(&dir::manifest_path(&temp))?;
        files.push(BackupFile {
            name: dir::MANIFEST_FILE.to_string(),
            size,
            crc,
        });

        let meta = BackupMeta {
            id,
            timestamp: now_millis(),
            last_sequence: manifest.last_sequence,
            files,
        };
        dir::write_atomic(&temp, BACKUP_META_FILE, &encode_framed(BACKUP_META_MAGIC, &meta)?)?;

        let target = self.backup_path(id);
        fs::rename(&temp, &target)?;
        dir::sync_dir(&self.dir)?;

        tracing::debug!(source = %source.display(), backup = %target.display(), "Backup sealed");
        Ok(self.info(&meta))
    }

    /// Check every file of backup `id` against its recorded size and CRC32
    pub fn verify(&self, id: u64) -> Result<BackupInfo> {
        let meta = self.load_meta(id)?;
        let root = self.backup_path(id);
        for file in &meta.files {
            verify_file(&root.join(&file.name), file)?;
        }
        Ok(self.info(&meta))
    }

    /// Restore the newest complete backup into `restore_dir`
    pub fn restore_latest(&self, restore_dir: &Path) -> Result<BackupInfo> {
        let latest = self
            .list_backups()?
            .pop()
            .ok_or_else(|| LodeError::Backup(format!("no backups in {}", self.dir.display())))?;
        self.restore(latest.id, restore_dir)
    }

    /// Replace the engine files in `restore_dir` with backup `id`
    ///
    /// ## Restore Process:
    /// 1. Verify every backup file
    /// 2. Lock `restore_dir` and write the `RESTORE_IN_PROGRESS` marker
    /// 3. Remove the previous manifest, WAL segments and tables
    /// 4. Copy and re-verify the tables, then install the manifest
    /// 5. Remove the marker
    pub fn restore(&self, id: u64, restore_dir: &Path) -> Result<BackupInfo> {
        let info = self.verify(id)?;
        let meta = self.load_meta(id)?;
        let root = self.backup_path(id);

        fs::create_dir_all(restore_dir)?;
        let _lock = DirLock::acquire(restore_dir)?;
        dir::write_atomic(restore_dir, dir::RESTORE_MARKER, &id.to_le_bytes())?;

        let mut cleared = 0;
        for name in [dir::MANIFEST_FILE, dir::MANIFEST_TEMP] {
            match fs::remove_file(restore_dir.join(name)) {
                Ok(()) => cleared += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        for number in dir::list_files(restore_dir, FileKind::Wal)? {
            fs::remove_file(dir::wal_path(restore_dir, number))?;
            cleared += 1;
        }
        for number in dir::list_files(restore_dir, FileKind::Table)? {
            fs::remove_file(dir::table_path(restore_dir, number))?;
            cleared += 1;
        }

        let mut manifest = None;
        for file in &meta.files {
            if file.name == dir::MANIFEST_FILE {
                manifest = Some(fs::read(root.join(&file.name))?);
                continue;
            }
            let target = restore_dir.join(&file.name);
            fs::copy(root.join(&file.name), &target)?;
            verify_file(&target, file)?;
        }
        let manifest =
            manifest.ok_or_else(|| LodeError::Backup(format!("backup {} has no manifest", id)))?;
        dir::write_atomic(restore_dir, dir::MANIFEST_FILE, &manifest)?;

        fs::remove_file(restore_dir.join(dir::RESTORE_MARKER))?;
        dir::sync_dir(restore_dir)?;

        tracing::info!(
            backup_id = id,
            restore_dir = %restore_dir.display(),
            files = meta.files.len(),
            cleared,
            "Restored backup"
        );
        Ok(info)
    }

    fn backup_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{}{:06}", BACKUP_PREFIX, id))
    }

    /// Backup ids found on disk, ascending, with whether each is complete
    fn backup_ids(&self) -> Result<Vec<(u64, bool)>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(rest) = name.to_str().and_then(|n| n.strip_prefix(BACKUP_PREFIX)) else {
                continue;
            };
            let (digits, complete) = match rest.strip_suffix(TEMP_SUFFIX) {
                Some(digits) => (digits, false),
                None => (rest, true),
            };
            if let Ok(id) = digits.parse::<u64>() {
                ids.push((id, complete));
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn load_meta(&self, id: u64) -> Result<BackupMeta> {
        let path = self.backup_path(id).join(BACKUP_META_FILE);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LodeError::Backup(format!("backup {} not found", id)),
            _ => LodeError::Io(e),
        })?;
        let meta: BackupMeta = decode_framed(BACKUP_META_MAGIC, &bytes)
            .map_err(|e| LodeError::Backup(format!("backup {} metadata unreadable: {}", id, e)))?;
        for file in &meta.files {
            check_backup_name(id, &file.name)?;
        }
        Ok(meta)
    }

    fn info(&self, meta: &BackupMeta) -> BackupInfo {
        BackupInfo {
            id: meta.id,
            timestamp: meta.timestamp,
            last_sequence: meta.last_sequence,
            num_files: meta.files.len(),
            size: meta.files.iter().map(|f| f.size).sum(),
            path: self.backup_path(meta.id),
        }
    }
}

fn verify_file(path: &Path, expected: &BackupFile) -> Result<()> {
    let (size, crc) = match checksum(path) {
        Ok(found) => found,
        Err(LodeError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            return Err(LodeError::Backup(format!("{} is missing", path.display())));
        }
        Err(e) => return Err(e),
    };
    if size != expected.size {
        return Err(LodeError::Backup(format!(
            "{}: size {} does not match recorded {}",
            path.display(),
            size,
            expected.size
        )));
    }
    if crc != expected.crc {
        return Err(LodeError::Backup(format!("{}: checksum mismatch", path.display())));
    }
    Ok(())
}

/// Size and CRC32 of a file
fn checksum(path: &Path) -> Result<(u64, u32)> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hasher.finalize()))
}

/// Backups hold only the manifest and bare table file names
fn check_backup_name(id: u64, name: &str) -> Result<()> {
    let path = Path::new(name);
    let bare = path.file_name().and_then(|n| n.to_str()) == Some(name);
    let table = matches!(dir::parse_file_name(path), Some((FileKind::Table, _)));
    if bare && (name == dir::MANIFEST_FILE || table) {
        return Ok(());
    }
    Err(LodeError::Backup(format!("backup {} lists unexpected file {:?}", id, name)))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| LodeError::InvalidArgument(format!("unusable file name {}", path.display())))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
