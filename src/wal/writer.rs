//! WAL Writer
//!
//! Handles appending frames to a WAL segment.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::WalEntry;
use crate::config::WalSyncStrategy;
use crate::error::{LodeError, Result};

/// Writes frames to a WAL segment
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    sync_strategy: WalSyncStrategy,
    /// Frames appended since the last fsync
    uncommitted: usize,
    /// Current file length
    size: u64,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
}

impl WalWriter {
    /// Open or create a WAL file; appends go to its end
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            sync_strategy,
            uncommitted: 0,
            size,
            poisoned: false,
        })
    }

    /// Append a frame; durable on return under `EveryWrite`
    ///
    /// On failure the segment is truncated back to its previous length so
    /// the rejected frame is never replayed. If that is not possible the
    /// writer refuses every later append and sync.
    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        self.check_usable()?;
        let bytes = entry.serialize()?;

        let len_before = self.size;
        let uncommitted_before = self.uncommitted;
        if let Err(e) = self.write_frame(&bytes) {
            self.uncommitted = uncommitted_before;
            self.rollback(len_before);
            return Err(e);
        }
        Ok(())
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        self.size += bytes.len() as u64;
        self.uncommitted += 1;

        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => self.sync()?,
            WalSyncStrategy::EveryNEntries { count } => {
                if self.uncommitted >= count {
                    self.sync()?;
                }
            }
        }
        Ok(())
    }

    /// Drop buffered bytes and cut the file back to `len`
    fn rollback(&mut self, len: u64) {
        let result = OpenOptions::new().append(true).open(&self.path).and_then(|file| {
            // Discard the old buffer without flushing it
            let old = std::mem::replace(&mut self.writer, BufWriter::new(file));
            drop(old.into_parts());
            let file = self.writer.get_ref();
            file.set_len(len)?;
            file.sync_data()
        });

        match result {
            Ok(()) => {
                self.size = len;
                tracing::warn!(path = %self.path.display(), len, "Rolled back failed WAL append");
            }
            Err(e) => {
                self.poisoned = true;
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not roll back failed WAL append, segment closed for writes"
                );
            }
        }
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(LodeError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("WAL segment {} is unusable after a failed write", self.path.display()),
            )));
        }
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.check_usable()?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// True once a failed append could not be undone
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Frames written but not yet fsynced
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
