//! Snapshots
//!
//! A snapshot is a sequence cutoff registered with the engine so compaction
//! keeps every version it can still observe. Dropping the handle releases it.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Registry of open snapshot sequences (with a count per sequence)
#[derive(Debug, Default)]
pub struct SnapshotList {
    open: Mutex<BTreeMap<u64, usize>>,
}

impl SnapshotList {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a snapshot at `sequence`
    pub fn acquire(self: &Arc<Self>, sequence: u64) -> Snapshot {
        *self.open.lock().entry(sequence).or_insert(0) += 1;
        Snapshot {
            sequence,
            list: Arc::clone(self),
        }
    }

    /// Register a snapshot at the sequence `current` reports
    ///
    /// `current` runs under the list lock, so a compaction that captures the
    /// list never misses a snapshot whose sequence it could already see.
    pub fn acquire_current(self: &Arc<Self>, current: impl FnOnce() -> u64) -> Snapshot {
        let mut open = self.open.lock();
        let sequence = current();
        *open.entry(sequence).or_insert(0) += 1;
        Snapshot {
            sequence,
            list: Arc::clone(self),
        }
    }

    fn release(&self, sequence: u64) {
        let mut open = self.open.lock();
        if let Some(count) = open.get_mut(&sequence) {
            *count -= 1;
            if *count == 0 {
                open.remove(&sequence);
            }
        }
    }

    /// Distinct open snapshot sequences, ascending
    pub fn sequences(&self) -> Vec<u64> {
        self.open.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.open.lock().values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }
}

/// Handle to an open snapshot
#[derive(Debug)]
pub struct Snapshot {
    sequence: u64,
    list: Arc<SnapshotList>,
}

impl Snapshot {
    /// Reads through this snapshot see sequences `<= sequence()`
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Register another handle at the same sequence
    pub(crate) fn duplicate(&self) -> Snapshot {
        self.list.acquire(self.sequence)
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.list.release(self.sequence);
    }
}
