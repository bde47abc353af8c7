//! Directory Layout
//!
//! File naming inside an engine directory, the advisory lock, and the
//! append-only info log.
//!
//! ```text
//! <path>/
//! ├─ LOCK                 # Advisory exclusive lock (read-write handles)
//! ├─ LOG                  # Human-readable event log
//! ├─ MANIFEST             # Current level layout (rename-replaced)
//! ├─ 000007.log           # WAL segments
//! └─ 000008.sst           # SSTables
//! ```
//!
//! WAL segments and SSTables draw their numbers from one counter, so a file
//! number identifies exactly one file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use parking_lot::Mutex;

use crate::error::{LodeError, Result};

pub const LOCK_FILE: &str = "LOCK";
pub const LOG_FILE: &str = "LOG";
pub const MANIFEST_FILE: &str = "MANIFEST";
pub const MANIFEST_TEMP: &str = "MANIFEST.tmp";
pub const RESTORE_MARKER: &str = "RESTORE_IN_PROGRESS";

const WAL_EXT: &str = "log";
const TABLE_EXT: &str = "sst";

/// Kind of a numbered engine file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Wal,
    Table,
}

pub fn wal_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{:06}.{}", number, WAL_EXT))
}

pub fn table_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{:06}.{}", number, TABLE_EXT))
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

/// Parse a numbered engine file name
/// "000042.sst" → Some((Table, 42))
pub fn parse_file_name(path: &Path) -> Option<(FileKind, u64)> {
    let stem = path.file_stem()?.to_str()?;
    let ext = path.extension()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number = stem.parse().ok()?;
    match ext {
        WAL_EXT => Some((FileKind::Wal, number)),
        TABLE_EXT => Some((FileKind::Table, number)),
        _ => None,
    }
}

/// Numbered files of one kind, ascending
pub fn list_files(dir: &Path, kind: FileKind) -> Result<Vec<u64>> {
    let mut numbers = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some((k, n)) = parse_file_name(&path) {
            if k == kind {
                numbers.push(n);
            }
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

/// Fsync a directory so renames, creations and deletions in it are durable
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Write `data` to `dir/name` atomically via `name.tmp` + rename
pub fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> Result<()> {
    let temp = dir.join(format!("{}.tmp", name));
    {
        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&temp, dir.join(name))?;
    sync_dir(dir)
}

pub fn restore_in_progress(dir: &Path) -> bool {
    dir.join(RESTORE_MARKER).exists()
}

// =============================================================================
// Lock
// =============================================================================

/// Exclusive advisory lock on an engine directory; released on drop
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
    file: File,
}

impl DirLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LodeError::Locked(dir.to_path_buf()));
        }
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

// =============================================================================
// Info Log
// =============================================================================

/// Append-only `LOG` file with one timestamped line per event
#[derive(Debug)]
pub struct InfoLog {
    file: Mutex<File>,
}

impl InfoLog {
    pub fn open(dir: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append one line; failures are reported through tracing only
    pub fn log(&self, message: impl AsRef<str>) {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let line = format!("{} {}\n", millis, message.as_ref());
        if let Err(e) = self.file.lock().write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "Failed to append to LOG");
        }
    }
}
