//! Storage Module
//!
//! Persistent storage layer: SSTables, the manifest, and the versioned view
//! that ties them together.
//!
//! ## Responsibilities
//! - Persist data to disk in sorted, checksummed blocks
//! - Point lookups and ordered scans across levels
//! - Atomic manifest rewrites
//! - Deferred deletion of replaced tables
//!
//! ## Level Layout
//! ```text
//! ┌────────────────────────────────────────┐
//! │ L0   newest ─▶ oldest, ranges overlap  │
//! ├────────────────────────────────────────┤
//! │ L1   sorted by key, disjoint           │
//! ├────────────────────────────────────────┤
//! │ ...  each level ~multiplier × larger   │
//! ├────────────────────────────────────────┤
//! │ Ln   bottom level                      │
//! └────────────────────────────────────────┘
//! ```

pub mod manifest;
pub mod sstable;

mod manager;
mod version;

pub use manager::{open_tables, LoadedState, StorageManager};
pub use manifest::ManifestData;
pub use sstable::{SSTableBuilder, SSTableCursor, SSTableReader, TableMeta};
pub use version::{Version, VersionEdit};
