//! SSTable Reader
//!
//! Opens SSTable files and serves point lookups through the sparse block
//! index, which is kept in memory.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Buf;
use parking_lot::Mutex;

use crate::entry::{compare_internal, Entry};
use crate::error::{LodeError, Result};

use super::{
    BlockHandle, IndexBlock, TableMeta, BLOCK_TRAILER_SIZE, FOOTER_SIZE, HEADER_SIZE, MAGIC,
    VERSION,
};

/// Reader for one SSTable file
///
/// The file handle sits behind a mutex so a shared `Arc<SSTableReader>` can
/// serve concurrent readers.
pub struct SSTableReader {
    path: PathBuf,
    file: Mutex<File>,
    index: Vec<BlockHandle>,
    meta: TableMeta,
}

impl std::fmt::Debug for SSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableReader")
            .field("path", &self.path)
            .field("meta", &self.meta)
            .finish()
    }
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates header, footer and index checksum, and loads the index.
    pub fn open(path: &Path, id: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(corruption(path, format!("file too small ({} bytes)", file_size)));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let mut h = &header[..];

        let mut magic = [0u8; 4];
        h.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(corruption(path, format!("invalid magic {:?}", magic)));
        }
        let version = h.get_u16_le();
        if version != VERSION {
            return Err(corruption(path, format!("unsupported version {}", version)));
        }
        let entry_count = h.get_u64_le();

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;
        let mut f = &footer[..];
        let index_offset = f.get_u64_le();
        let index_crc = f.get_u32_le();

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(corruption(path, format!("index offset {} out of range", index_offset)));
        }

        let index_len = (file_size - FOOTER_SIZE - index_offset) as usize;
        let mut index_data = vec![0u8; index_len];
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_exact(&mut index_data)?;
        if crc32fast::hash(&index_data) != index_crc {
            return Err(corruption(path, "index checksum mismatch".to_string()));
        }

        let index: IndexBlock = bincode::deserialize(&index_data)
            .map_err(|e| corruption(path, format!("undecodable index: {}", e)))?;
        let smallest_key = index
            .blocks
            .first()
            .map(|b| b.first_key.clone())
            .unwrap_or_default();

        let meta = TableMeta {
            id,
            file_size,
            entry_count,
            smallest_key,
            largest_key: index.largest_key,
            smallest_sequence: index.smallest_sequence,
            largest_sequence: index.largest_sequence,
        };

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            index: index.blocks,
            meta,
        })
    }

    /// Newest version of `key` with `sequence <= snapshot`
    ///
    /// Returns tombstones and expired values unfiltered.
    pub fn get(&self, key: &[u8], snapshot: u64) -> Result<Option<Entry>> {
        if !self.meta.might_contain(key) {
            return Ok(None);
        }

        let mut block = self.block_at_or_before(key, snapshot).unwrap_or(0);
        while block < self.index.len() {
            for entry in self.read_block(block)? {
                match entry.cmp_internal(key, snapshot) {
                    Ordering::Less => continue,
                    _ if entry.key == key => return Ok(Some(entry)),
                    _ => return Ok(None),
                }
            }
            block += 1;
        }
        Ok(None)
    }

    /// Index of the last block whose first internal key is `<= (key, seq)`
    pub(crate) fn block_at_or_before(&self, key: &[u8], seq: u64) -> Option<usize> {
        let after = self.index.partition_point(|b| {
            compare_internal(&b.first_key, b.first_sequence, key, seq) != Ordering::Greater
        });
        after.checked_sub(1)
    }

    /// Read and verify one data block
    pub(crate) fn read_block(&self, block: usize) -> Result<Vec<Entry>> {
        let handle = self
            .index
            .get(block)
            .ok_or_else(|| LodeError::InvalidArgument(format!("block {} out of range", block)))?;

        let mut data = vec![0u8; handle.len as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(handle.offset))?;
            file.read_exact(&mut data)?;
        }

        if data.len() < BLOCK_TRAILER_SIZE {
            return Err(corruption(&self.path, format!("block {} too short", block)));
        }
        let (body, mut trailer) = data.split_at(data.len() - 4);
        let stored = trailer.get_u32_le();
        if crc32fast::hash(body) != stored {
            return Err(corruption(&self.path, format!("block {} checksum mismatch", block)));
        }

        let mut cursor = body;
        let count = cursor.get_u32_le() as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(Entry::decode_from(&mut cursor)?);
        }
        if !cursor.is_empty() {
            return Err(corruption(&self.path, format!("block {} has trailing bytes", block)));
        }
        Ok(entries)
    }

    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// Read every entry in order (verification, small tables)
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let mut all = Vec::with_capacity(self.meta.entry_count as usize);
        for block in 0..self.index.len() {
            all.extend(self.read_block(block)?);
        }
        Ok(all)
    }

    pub fn id(&self) -> u64 {
        self.meta.id
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.meta.entry_count
    }

    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.meta.might_contain(key)
    }
}

fn corruption(path: &Path, msg: String) -> LodeError {
    LodeError::Corruption(format!("SSTable {}: {}", path.display(), msg))
}
