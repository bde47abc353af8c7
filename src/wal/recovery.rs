//! WAL Recovery
//!
//! Handles crash recovery by replaying a WAL segment.

use std::fs::OpenOptions;
use std::path::Path;

use super::{FrameRead, WalEntry, WalReader};
use crate::error::Result;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of units successfully recovered
    pub entries_recovered: u64,

    /// Number of complete-but-invalid frames found (recovery stops at the first)
    pub entries_corrupted: u64,

    /// Sequence number of the last recovered operation (0 if none)
    pub last_sequence: u64,

    /// Whether the log has a damaged tail (partial or corrupt frame)
    pub was_truncated: bool,

    /// Length of the valid prefix in bytes
    pub valid_bytes: u64,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid frames
    /// 2. Stop at the first torn or corrupted frame
    /// 3. Truncate the file to the valid prefix
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result) = Self::read(path)?;

        if result.was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_bytes)?;
            file.sync_all()?;
            tracing::warn!(
                path = %path.display(),
                valid_bytes = result.valid_bytes,
                corrupted = result.entries_corrupted,
                "Truncated damaged WAL tail"
            );
        }

        Ok((entries, result))
    }

    /// Read the valid prefix without modifying the file
    pub fn read(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        loop {
            match reader.read_frame()? {
                FrameRead::Entry(entry) => {
                    result.entries_recovered += 1;
                    result.last_sequence = entry.last_sequence();
                    entries.push(entry);
                }
                FrameRead::Eof => break,
                FrameRead::Truncated => {
                    result.was_truncated = true;
                    break;
                }
                FrameRead::Corrupted(reason) => {
                    tracing::debug!(path = %path.display(), %reason, "Corrupted WAL frame");
                    result.entries_corrupted += 1;
                    result.was_truncated = true;
                    break;
                }
            }
        }

        result.valid_bytes = reader.position();
        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::read(path).map(|(_, result)| result)
    }
}
