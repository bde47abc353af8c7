//! Manifest
//!
//! Durable record of which files make up the engine. The whole record is
//! rewritten on every change (`MANIFEST.tmp`, fsync, rename, directory fsync),
//! so a reader always sees either the old or the new version.
//!
//! ## File Format
//! ```text
//! ┌──────────┬────────────┬──────────┬──────────┬─────────────────┐
//! │Magic (4) │ Version(2) │ CRC (4)  │ Len (4)  │ bincode payload │
//! └──────────┴────────────┴──────────┴──────────┴─────────────────┘
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use bytes::{Buf, BufMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::sstable::TableMeta;
use crate::dir;
use crate::error::{LodeError, Result};

pub(crate) const MANIFEST_MAGIC: &[u8; 4] = b"LDMF";
const FORMAT_VERSION: u16 = 1;
const FRAME_HEADER: usize = 4 + 2 + 4 + 4;

/// Persisted engine layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestData {
    /// Bumped on every rewrite; secondaries adopt only newer versions
    pub manifest_version: u64,

    /// Lowest WAL segment still needed for recovery
    pub log_number: u64,

    /// Next unused file number (WAL segments and SSTables)
    pub next_file_number: u64,

    /// Highest sequence durable in the tables listed here
    pub last_sequence: u64,

    /// Tables per level; L0 newest first, deeper levels by smallest key
    pub levels: Vec<Vec<TableMeta>>,
}

impl ManifestData {
    pub fn new(num_levels: usize) -> Self {
        Self {
            manifest_version: 0,
            log_number: 0,
            next_file_number: 1,
            last_sequence: 0,
            levels: vec![Vec::new(); num_levels],
        }
    }

    pub fn table_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.levels.iter().flatten()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_framed(MANIFEST_MAGIC, self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_framed(MANIFEST_MAGIC, bytes)
    }

    /// Load `dir/MANIFEST`; `None` for a directory without one
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        match fs::read(dir::manifest_path(dir)) {
            Ok(bytes) => Self::decode(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace `dir/MANIFEST`
    pub fn store(&self, dir: &Path) -> Result<()> {
        dir::write_atomic(dir, dir::MANIFEST_FILE, &self.encode()?)
    }
}

/// Frame a serde value as `[magic][version][crc][len][bincode]`
pub(crate) fn encode_framed<T: Serialize>(magic: &[u8; 4], value: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(value)?;
    let mut out = Vec::with_capacity(FRAME_HEADER + payload.len());
    out.put_slice(magic);
    out.put_u16_le(FORMAT_VERSION);
    out.put_u32_le(crc32fast::hash(&payload));
    out.put_u32_le(payload.len() as u32);
    out.put_slice(&payload);
    Ok(out)
}

pub(crate) fn decode_framed<T: DeserializeOwned>(magic: &[u8; 4], bytes: &[u8]) -> Result<T> {
    if bytes.len() < FRAME_HEADER {
        return Err(LodeError::Corruption(format!(
            "{} file truncated: {} bytes",
            String::from_utf8_lossy(magic),
            bytes.len()
        )));
    }
    let mut buf = bytes;
    if &buf[..4] != magic {
        return Err(LodeError::Corruption(format!(
            "bad magic: expected {:?}, got {:?}",
            magic,
            &buf[..4]
        )));
    }
    buf.advance(4);
    let version = buf.get_u16_le();
    if version != FORMAT_VERSION {
        return Err(LodeError::Corruption(format!("unsupported format version {}", version)));
    }
    let crc = buf.get_u32_le();
    let len = buf.get_u32_le() as usize;
    if buf.remaining() != len {
        return Err(LodeError::Corruption(format!(
            "payload length mismatch: header says {}, found {}",
            len,
            buf.remaining()
        )));
    }
    if crc32fast::hash(buf) != crc {
        return Err(LodeError::Corruption("payload checksum mismatch".to_string()));
    }
    bincode::deserialize(buf).map_err(|e| LodeError::Corruption(format!("undecodable payload: {}", e)))
}
