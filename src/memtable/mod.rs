//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Keep every version of a key, ordered by internal key
//! - Track size for flush triggers
//! - Ordered iteration for SSTable creation
//!
//! ## Lifecycle
//! ```text
//!   active ──(size limit)──▶ sealed ──(flushed to L0)──▶ dropped
//!     │                        │
//!     └── WAL segment N ───────┘   segment N deleted once the manifest
//!                                  records the flushed table
//! ```
//!
//! ## Data Structure Choice
//! BTreeMap keyed by [`InternalKey`](crate::entry::InternalKey) wrapped in a
//! RwLock. A sealed table is never written again, so flush and cursors only
//! ever take the read lock on it.

mod table;

pub use table::MemTable;

use crate::entry::EntryValue;

/// Value side of a memtable slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemTableEntry {
    pub value: EntryValue,
    pub expires_at: Option<u64>,
}
