//! WAL Entry definitions
//!
//! Defines the structure of individual WAL frames. One frame carries every
//! operation of a write unit, so a batch is replayed either whole or not at all.

use bytes::Buf;
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::{LodeError, Result};

/// Frame header: LSN (8) + CRC (4) + payload length (4)
pub const HEADER_SIZE: usize = 16;

/// Frames claiming a larger payload are treated as garbage
pub const MAX_PAYLOAD_SIZE: u32 = 256 * 1024 * 1024;

/// A single write unit in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Sequence number of the first operation; operation `i` gets `lsn + i`
    pub lsn: u64,

    /// The operations, in commit order
    pub operations: Vec<Operation>,

    /// Timestamp (unix millis) when the unit was committed
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        expires_at: Option<u64>,
    },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Operation {
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }
}

impl WalEntry {
    pub fn new(lsn: u64, operations: Vec<Operation>, timestamp: u64) -> Self {
        Self {
            lsn,
            operations,
            timestamp,
        }
    }

    /// Sequence number of the last operation in the unit
    pub fn last_sequence(&self) -> u64 {
        self.lsn + self.operations.len().saturating_sub(1) as u64
    }

    /// Expand the unit into versioned entries
    pub fn into_entries(self) -> impl Iterator<Item = Entry> {
        let lsn = self.lsn;
        self.operations
            .into_iter()
            .enumerate()
            .map(move |(i, op)| {
                let sequence = lsn + i as u64;
                match op {
                    Operation::Put {
                        key,
                        value,
                        expires_at,
                    } => Entry::put(key, value, sequence).with_expiry(expires_at),
                    Operation::Delete { key } => Entry::tombstone(key, sequence),
                }
            })
    }

    fn payload(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&(&self.operations, self.timestamp))?)
    }

    /// CRC over LSN, payload length and payload
    pub fn compute_crc(&self) -> Result<u32> {
        let payload = self.payload()?;
        Ok(frame_crc(self.lsn, payload.len() as u32, &payload))
    }

    pub fn serialized_size(&self) -> Result<usize> {
        Ok(HEADER_SIZE + self.payload()?.len())
    }

    /// Encode as `[lsn][crc][len][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = self.payload()?;
        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(LodeError::InvalidArgument(format!(
                "write unit of {} bytes exceeds the {} byte frame limit",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }
        let len = payload.len() as u32;
        let crc = frame_crc(self.lsn, len, &payload);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode one complete frame
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (lsn, crc, len) = parse_header(bytes)?;
        let total = HEADER_SIZE + len as usize;
        if bytes.len() < total {
            return Err(LodeError::WalCorruption(format!(
                "frame truncated: expected {} bytes, got {}",
                total,
                bytes.len()
            )));
        }
        Self::from_parts(lsn, crc, &bytes[HEADER_SIZE..total])
    }

    /// Validate the checksum and decode the payload
    pub(crate) fn from_parts(lsn: u64, crc: u32, payload: &[u8]) -> Result<Self> {
        let actual = frame_crc(lsn, payload.len() as u32, payload);
        if actual != crc {
            return Err(LodeError::WalCorruption(format!(
                "CRC mismatch at lsn {}: stored 0x{:08x}, computed 0x{:08x}",
                lsn, crc, actual
            )));
        }

        let (operations, timestamp): (Vec<Operation>, u64) = bincode::deserialize(payload)
            .map_err(|e| LodeError::WalCorruption(format!("undecodable payload: {}", e)))?;

        Ok(Self {
            lsn,
            operations,
            timestamp,
        })
    }
}

/// Split a frame header into (lsn, crc, payload_len)
pub(crate) fn parse_header(bytes: &[u8]) -> Result<(u64, u32, u32)> {
    if bytes.len() < HEADER_SIZE {
        return Err(LodeError::WalCorruption(format!(
            "incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }
    let mut header = &bytes[..HEADER_SIZE];
    let lsn = header.get_u64_le();
    let crc = header.get_u32_le();
    let len = header.get_u32_le();
    if len > MAX_PAYLOAD_SIZE {
        return Err(LodeError::WalCorruption(format!(
            "payload length {} exceeds limit",
            len
        )));
    }
    Ok((lsn, crc, len))
}

fn frame_crc(lsn: u64, len: u32, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}
