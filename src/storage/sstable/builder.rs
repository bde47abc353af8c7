//! SSTable Builder
//!
//! Writes entries, in internal-key order, to a new SSTable file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BufMut;

use crate::entry::Entry;
use crate::error::{LodeError, Result};

use super::{BlockHandle, IndexBlock, TableMeta, HEADER_SIZE, MAGIC, VERSION};

/// Builder for creating new SSTables from sorted entries
pub struct SSTableBuilder {
    id: u64,
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    block_size: usize,
    /// Entries of the block being filled
    block: Vec<u8>,
    block_count: u32,
    entry_count: u64,
    /// Current write position (start of the pending block)
    current_offset: u64,
    index: Vec<BlockHandle>,
    /// Internal key of the last entry added (ordering check)
    last: Option<(Vec<u8>, u64)>,
    smallest_key: Option<Vec<u8>>,
    smallest_sequence: u64,
    largest_sequence: u64,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Writes header immediately; call `add()` in internal-key order, then
    /// `finish()` to write the index and footer.
    pub fn new(path: &Path, id: u64, block_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);

        // Entry count is patched in finish()
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            id,
            path: path.to_path_buf(),
            writer,
            block_size,
            block: Vec::with_capacity(block_size),
            block_count: 0,
            entry_count: 0,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            last: None,
            smallest_key: None,
            smallest_sequence: u64::MAX,
            largest_sequence: 0,
        })
    }

    /// Add one version (must be called in internal-key order)
    pub fn add(&mut self, entry: &Entry) -> Result<()> {
        if let Some((key, seq)) = &self.last {
            if entry.cmp_internal(key, *seq).is_le() {
                return Err(LodeError::InvalidArgument(format!(
                    "entries out of order in table {}: {:?}@{} after {:?}@{}",
                    self.id, entry.key, entry.sequence, key, seq
                )));
            }
        }

        if self.block_count == 0 {
            self.index.push(BlockHandle {
                first_key: entry.key.clone(),
                first_sequence: entry.sequence,
                offset: self.current_offset,
                len: 0,
            });
        }
        if self.smallest_key.is_none() {
            self.smallest_key = Some(entry.key.clone());
        }
        self.smallest_sequence = self.smallest_sequence.min(entry.sequence);
        self.largest_sequence = self.largest_sequence.max(entry.sequence);

        entry.encode_into(&mut self.block);
        self.block_count += 1;
        self.entry_count += 1;
        self.last = Some((entry.key.clone(), entry.sequence));

        if self.block.len() >= self.block_size {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Bytes written so far, pending block included
    pub fn estimated_size(&self) -> u64 {
        self.current_offset + self.block.len() as u64
    }

    /// User key of the last entry added
    pub fn last_key(&self) -> Option<&[u8]> {
        self.last.as_ref().map(|(k, _)| k.as_slice())
    }

    /// Write the pending block: [count][entries][crc over count + entries]
    fn flush_block(&mut self) -> Result<()> {
        if self.block_count == 0 {
            return Ok(());
        }

        let mut framed = Vec::with_capacity(self.block.len() + 8);
        framed.put_u32_le(self.block_count);
        framed.extend_from_slice(&self.block);
        let crc = crc32fast::hash(&framed);
        framed.put_u32_le(crc);

        self.writer.write_all(&framed)?;

        if let Some(handle) = self.index.last_mut() {
            handle.len = framed.len() as u32;
        }
        self.current_offset += framed.len() as u64;
        self.block.clear();
        self.block_count = 0;
        Ok(())
    }

    /// Finish building: write index block, footer, and return metadata
    pub fn finish(mut self) -> Result<TableMeta> {
        if self.entry_count == 0 {
            drop(self.writer);
            fs::remove_file(&self.path)?;
            return Err(LodeError::InvalidArgument(
                "cannot finish an SSTable with no entries".to_string(),
            ));
        }
        self.flush_block()?;

        let largest_key = self.last.take().map(|(k, _)| k).unwrap_or_default();
        let index = IndexBlock {
            blocks: std::mem::take(&mut self.index),
            largest_key: largest_key.clone(),
            smallest_sequence: self.smallest_sequence,
            largest_sequence: self.largest_sequence,
        };
        let index_bytes = bincode::serialize(&index)?;
        let index_offset = self.current_offset;
        let index_crc = crc32fast::hash(&index_bytes);

        self.writer.write_all(&index_bytes)?;

        // Footer: index_offset (8) + index_crc (4) + padding (4)
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&index_crc.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?;
        self.writer.flush()?;

        // Seek back and update entry count in header
        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(6))?;
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();

        Ok(TableMeta {
            id: self.id,
            file_size,
            entry_count: self.entry_count,
            smallest_key: self.smallest_key.unwrap_or_default(),
            largest_key,
            smallest_sequence: self.smallest_sequence,
            largest_sequence: self.largest_sequence,
        })
    }

    /// Discard a partially built table
    pub fn abandon(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        fs::remove_file(path)?;
        Ok(())
    }
}
