//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::MemTableEntry;
use crate::entry::{Entry, InternalKey};
use crate::error::Result;
use crate::iterator::Direction;

/// Per-slot bookkeeping counted against the size limit
const SLOT_OVERHEAD: usize = 24;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<InternalKey, MemTableEntry>>,

    /// Approximate size in bytes
    size: AtomicUsize,

    entry_count: AtomicUsize,

    /// WAL segment holding this table's writes
    wal_id: u64,

    /// Highest sequence inserted so far
    largest_sequence: AtomicU64,
}

impl MemTable {
    /// Create a new empty MemTable backed by WAL segment `wal_id`
    pub fn new(wal_id: u64) -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
            entry_count: AtomicUsize::new(0),
            wal_id,
            largest_sequence: AtomicU64::new(0),
        }
    }

    /// Insert one version; returns the new approximate size
    pub fn insert(&self, entry: Entry) -> usize {
        let added = entry.approximate_size() + SLOT_OVERHEAD;
        self.largest_sequence.fetch_max(entry.sequence, Ordering::AcqRel);

        let key = InternalKey::new(entry.key, entry.sequence);
        let slot = MemTableEntry {
            value: entry.value,
            expires_at: entry.expires_at,
        };

        let mut data = self.data.write();
        if data.insert(key, slot).is_none() {
            self.entry_count.fetch_add(1, Ordering::Relaxed);
        }
        self.size.fetch_add(added, Ordering::AcqRel) + added
    }

    /// Newest version of `key` with `sequence <= snapshot`
    ///
    /// Tombstones and expired values are returned as-is; the caller decides
    /// visibility.
    pub fn get(&self, key: &[u8], snapshot: u64) -> Option<Entry> {
        let start = InternalKey::new(key, snapshot);
        let data = self.data.read();
        let (found, slot) = data.range(start..).next()?;
        if found.user_key.as_slice() != key {
            return None;
        }
        Some(to_entry(found, slot))
    }

    /// Up to `limit` entries starting at `bound` and moving in `direction`
    ///
    /// Forward treats `bound` as a lower bound, reverse as an upper bound.
    pub fn scan(&self, bound: Bound<InternalKey>, direction: Direction, limit: usize) -> Vec<Entry> {
        let data = self.data.read();
        match direction {
            Direction::Forward => data
                .range((bound, Bound::Unbounded))
                .take(limit)
                .map(|(k, v)| to_entry(k, v))
                .collect(),
            Direction::Reverse => data
                .range((Bound::Unbounded, bound))
                .rev()
                .take(limit)
                .map(|(k, v)| to_entry(k, v))
                .collect(),
        }
    }

    /// Visit every version in internal-key order (used by flush)
    pub fn try_for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Entry) -> Result<()>,
    {
        let data = self.data.read();
        for (k, v) in data.iter() {
            f(to_entry(k, v))?;
        }
        Ok(())
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Number of versions held
    pub fn entry_count(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Check if should be sealed (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    pub fn wal_id(&self) -> u64 {
        self.wal_id
    }

    pub fn largest_sequence(&self) -> u64 {
        self.largest_sequence.load(Ordering::Acquire)
    }
}

fn to_entry(key: &InternalKey, slot: &MemTableEntry) -> Entry {
    Entry {
        key: key.user_key.clone(),
        value: slot.value.clone(),
        sequence: key.sequence,
        expires_at: slot.expires_at,
    }
}
