//! Error types for LodeKV
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using LodeError
pub type Result<T> = std::result::Result<T, LodeError>;

/// Unified error type for LodeKV operations
#[derive(Debug, Error)]
pub enum LodeError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("Corruption: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Write rejected: engine is opened {0}")]
    ReadOnly(&'static str),

    #[error("Engine is closed")]
    Closed,

    #[error("Directory is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    // -------------------------------------------------------------------------
    // Backup / Replication Errors
    // -------------------------------------------------------------------------
    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Secondary catch-up failed: {0}")]
    SecondaryCatchUp(String),
}

impl From<bincode::Error> for LodeError {
    fn from(e: bincode::Error) -> Self {
        LodeError::Serialization(e.to_string())
    }
}

impl LodeError {
    /// True for errors caused by on-disk data failing validation
    pub fn is_corruption(&self) -> bool {
        matches!(self, LodeError::Corruption(_) | LodeError::WalCorruption(_))
    }
}
