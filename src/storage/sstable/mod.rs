//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted multi-version storage.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "LDKV" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Blocks (variable, ~block_size each)                │
//! │   [Count: u32][Entry]...[Entry][CRC32: u32]             │
//! │   Entry layout: see `crate::entry`                      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (bincode)                                   │
//! │   one handle per data block: first key + seq, offset,   │
//! │   length; plus the table's key and sequence bounds      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   IndexOffset: u64 (8) | IndexCRC: u32 (4) | Pad (4)    │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod builder;
mod iterator;
mod reader;

use serde::{Deserialize, Serialize};

pub use builder::SSTableBuilder;
pub use iterator::SSTableCursor;
pub use reader::SSTableReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying a LodeKV SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"LDKV";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + EntryCount (8) = 14 bytes
pub(crate) const HEADER_SIZE: u64 = 14;

/// Footer size: IndexOffset (8) + IndexCRC (4) + Padding (4) = 16 bytes
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Block framing: entry count prefix (4) + CRC suffix (4)
pub(crate) const BLOCK_TRAILER_SIZE: usize = 8;

// =============================================================================
// Index
// =============================================================================

/// Location of one data block and the first internal key it holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BlockHandle {
    pub first_key: Vec<u8>,
    pub first_sequence: u64,
    pub offset: u64,
    pub len: u32,
}

/// Decoded index block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IndexBlock {
    pub blocks: Vec<BlockHandle>,
    pub largest_key: Vec<u8>,
    pub smallest_sequence: u64,
    pub largest_sequence: u64,
}

// =============================================================================
// SSTable Metadata
// =============================================================================

/// Table metadata as recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    /// File number; the file is `NNNNNN.sst`
    pub id: u64,
    pub file_size: u64,
    pub entry_count: u64,
    pub smallest_key: Vec<u8>,
    pub largest_key: Vec<u8>,
    pub smallest_sequence: u64,
    pub largest_sequence: u64,
}

impl TableMeta {
    /// Quick check if a key might be in this SSTable (range check)
    pub fn might_contain(&self, key: &[u8]) -> bool {
        key >= self.smallest_key.as_slice() && key <= self.largest_key.as_slice()
    }

    /// Whether the user-key range `[smallest, largest]` intersects this table
    pub fn overlaps(&self, smallest: &[u8], largest: &[u8]) -> bool {
        self.smallest_key.as_slice() <= largest && smallest <= self.largest_key.as_slice()
    }
}
