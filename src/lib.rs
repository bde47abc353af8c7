//! # LodeKV
//!
//! An embedded, persistent, ordered key-value engine with:
//! - Write-Ahead Logging (WAL) for durability
//! - Crash recovery with torn-write handling
//! - Leveled compaction with TTL expiry
//! - Snapshot-consistent reads, iterators and atomic write batches
//! - Backups, read-only opens and secondary replicas
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │            (Single Writer / Multi Reader, snapshots)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTables  │
//!   │ (segments)  │          │active+sealed│
//!   └─────────────┘          └──────┬──────┘
//!                                   │ flush
//!                                   ▼
//!                           ┌─────────────┐      ┌────────────┐
//!                           │  SSTables   │◀────▶│ Compaction │
//!                           │ L0 .. Ln    │      │ (worker)   │
//!                           └──────┬──────┘      └────────────┘
//!                                  │
//!                                  ▼
//!                           ┌─────────────┐
//!                           │  MANIFEST   │
//!                           └─────────────┘
//! ```
//!
//! ## Example
//! ```no_run
//! use lodekv::{Engine, IteratorMode, WriteBatch};
//!
//! # fn main() -> lodekv::Result<()> {
//! let engine = Engine::open_default("/tmp/lodekv-demo")?;
//! engine.set("a", "1")?;
//!
//! let mut batch = WriteBatch::new();
//! batch.put("b", "2").delete("a");
//! engine.write(&batch)?;
//!
//! for pair in engine.iterator(IteratorMode::Start)? {
//!     let (key, value) = pair?;
//!     println!("{:?} = {:?}", key, value);
//! }
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod config;
pub mod error;

pub mod batch;
pub mod entry;
pub mod iterator;
pub mod memtable;
pub mod snapshot;
pub mod storage;
pub mod wal;

pub mod backup;
pub mod compaction;
pub mod dir;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use backup::{BackupEngine, BackupInfo};
pub use batch::{BatchOp, WriteBatch};
pub use clock::{Clock, ManualClock, SystemClock};
pub use compaction::CompactionStats;
pub use config::{CompactionOptions, Options, OptionsBuilder, WalSyncStrategy};
pub use engine::{Engine, EngineStats, OpenMode};
pub use error::{LodeError, Result};
pub use iterator::{DbIterator, Direction, IteratorMode};
pub use snapshot::Snapshot;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LodeKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
