//! Entry codec
//!
//! An [`Entry`] is one version of one key: the user key, either a value or a
//! tombstone, the sequence number that wrote it and an optional expiry.
//! Versions are ordered by [`InternalKey`]: user key ascending, then sequence
//! descending, so the newest version of a key is met first.
//!
//! ## Binary Layout
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┬─────────────┬─────┬───────┐
//! │ Flags(1) │ Seq (8)  │KeyLen(4) │ValLen(4) │Expiry (8)?  │ Key │ Value │
//! └──────────┴──────────┴──────────┴──────────┴─────────────┴─────┴───────┘
//! ```
//! Flags: bit 0 = tombstone, bit 1 = expiry present. Integers little-endian.

use std::cmp::Ordering;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{LodeError, Result};

const FLAG_TOMBSTONE: u8 = 0b01;
const FLAG_EXPIRY: u8 = 0b10;

/// Fixed part of an encoded entry: flags + seq + key_len + val_len
pub const ENTRY_HEADER_SIZE: usize = 1 + 8 + 4 + 4;

/// Sequence number used as "newest possible" when seeking
pub const MAX_SEQUENCE: u64 = u64::MAX;

/// Value half of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryValue {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

/// One version of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: EntryValue,
    pub sequence: u64,
    /// Unix millis after which the value is no longer visible
    pub expires_at: Option<u64>,
}

impl Entry {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, sequence: u64) -> Self {
        Self {
            key: key.into(),
            value: EntryValue::Value(value.into()),
            sequence,
            expires_at: None,
        }
    }

    pub fn tombstone(key: impl Into<Vec<u8>>, sequence: u64) -> Self {
        Self {
            key: key.into(),
            value: EntryValue::Tombstone,
            sequence,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: Option<u64>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.value, EntryValue::Tombstone)
    }

    /// Expired entries are treated as deleted by reads and compaction
    pub fn is_expired(&self, now_millis: u64) -> bool {
        match self.expires_at {
            Some(at) => at < now_millis,
            None => false,
        }
    }

    /// The live value, if this version is neither a tombstone nor expired
    pub fn live_value(&self, now_millis: u64) -> Option<&[u8]> {
        match &self.value {
            EntryValue::Value(v) if !self.is_expired(now_millis) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Vec<u8>> {
        match self.value {
            EntryValue::Value(v) => Some(v),
            EntryValue::Tombstone => None,
        }
    }

    pub fn internal_key(&self) -> InternalKey {
        InternalKey::new(self.key.clone(), self.sequence)
    }

    /// Compare this entry's position against `(key, sequence)` in internal order
    pub fn cmp_internal(&self, key: &[u8], sequence: u64) -> Ordering {
        compare_internal(&self.key, self.sequence, key, sequence)
    }

    fn value_len(&self) -> usize {
        match &self.value {
            EntryValue::Value(v) => v.len(),
            EntryValue::Tombstone => 0,
        }
    }

    /// Approximate in-memory footprint used for flush triggers
    pub fn approximate_size(&self) -> usize {
        self.key.len() + self.value_len()
    }

    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_SIZE
            + if self.expires_at.is_some() { 8 } else { 0 }
            + self.key.len()
            + self.value_len()
    }

    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        let mut flags = 0u8;
        if self.is_tombstone() {
            flags |= FLAG_TOMBSTONE;
        }
        if self.expires_at.is_some() {
            flags |= FLAG_EXPIRY;
        }

        buf.put_u8(flags);
        buf.put_u64_le(self.sequence);
        buf.put_u32_le(self.key.len() as u32);
        buf.put_u32_le(self.value_len() as u32);
        if let Some(at) = self.expires_at {
            buf.put_u64_le(at);
        }
        buf.put_slice(&self.key);
        if let EntryValue::Value(v) = &self.value {
            buf.put_slice(v);
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decode one entry, advancing `buf` past it
    pub fn decode_from<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < ENTRY_HEADER_SIZE {
            return Err(LodeError::Corruption(format!(
                "entry header truncated: {} bytes left",
                buf.remaining()
            )));
        }

        let flags = buf.get_u8();
        if flags & !(FLAG_TOMBSTONE | FLAG_EXPIRY) != 0 {
            return Err(LodeError::Corruption(format!("unknown entry flags 0x{:02x}", flags)));
        }
        let sequence = buf.get_u64_le();
        let key_len = buf.get_u32_le() as usize;
        let val_len = buf.get_u32_le() as usize;

        let expires_at = if flags & FLAG_EXPIRY != 0 {
            if buf.remaining() < 8 {
                return Err(LodeError::Corruption("entry expiry truncated".to_string()));
            }
            Some(buf.get_u64_le())
        } else {
            None
        };

        let tombstone = flags & FLAG_TOMBSTONE != 0;
        if tombstone && val_len != 0 {
            return Err(LodeError::Corruption("tombstone carries a value".to_string()));
        }
        if buf.remaining() < key_len + val_len {
            return Err(LodeError::Corruption(format!(
                "entry body truncated: need {}, have {}",
                key_len + val_len,
                buf.remaining()
            )));
        }

        let mut key = vec![0u8; key_len];
        buf.copy_to_slice(&mut key);

        let value = if tombstone {
            EntryValue::Tombstone
        } else {
            let mut v = vec![0u8; val_len];
            buf.copy_to_slice(&mut v);
            EntryValue::Value(v)
        };

        Ok(Self {
            key,
            value,
            sequence,
            expires_at,
        })
    }
}

/// Ordering key of a version: user key ascending, sequence descending
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    pub user_key: Vec<u8>,
    pub sequence: u64,
}

impl InternalKey {
    pub fn new(user_key: impl Into<Vec<u8>>, sequence: u64) -> Self {
        Self {
            user_key: user_key.into(),
            sequence,
        }
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_internal(&self.user_key, self.sequence, &other.user_key, other.sequence)
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Internal-key comparison on borrowed parts
pub fn compare_internal(a_key: &[u8], a_seq: u64, b_key: &[u8], b_seq: u64) -> Ordering {
    match a_key.cmp(b_key) {
        Ordering::Equal => b_seq.cmp(&a_seq),
        other => other,
    }
}
