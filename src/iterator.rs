//! Iterator Engine
//!
//! Merges one cursor per source (memtables and SSTables) into a single
//! ordered stream, then collapses the versions of each user key down to the
//! one visible at the iterator's snapshot.
//!
//! ```text
//!   MemTableCursor ─┐
//!   MemTableCursor ─┤
//!   SSTableCursor  ─┼─▶ MergingCursor ──▶ DbIterator ──▶ (key, value)
//!   SSTableCursor  ─┘   (heap, raw        (newest seq <= snapshot,
//!                        versions)         tombstones/expired skipped)
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Bound;
use std::sync::Arc;

use crate::entry::{Entry, InternalKey, MAX_SEQUENCE};
use crate::error::Result;
use crate::memtable::MemTable;
use crate::snapshot::Snapshot;

/// Entries fetched from a memtable per refill
const MEMTABLE_BATCH: usize = 64;

/// Iteration direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Where an iterator starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorMode<'a> {
    /// Forward from the first key
    Start,
    /// Backward from the last key
    End,
    /// Forward from the first key `>= k`, or backward from the last key `<= k`
    From(&'a [u8], Direction),
}

impl<'a> IteratorMode<'a> {
    pub fn direction(&self) -> Direction {
        match self {
            IteratorMode::Start => Direction::Forward,
            IteratorMode::End => Direction::Reverse,
            IteratorMode::From(_, direction) => *direction,
        }
    }

    /// Internal-key seek target for this mode
    ///
    /// Forward seeks land on the newest version of `k`; reverse seeks on the
    /// oldest, so every version of `k` is still ahead of the cursor.
    pub(crate) fn seek_target(&self) -> Option<(&'a [u8], u64)> {
        match *self {
            IteratorMode::From(key, Direction::Forward) => Some((key, MAX_SEQUENCE)),
            IteratorMode::From(key, Direction::Reverse) => Some((key, 0)),
            _ => None,
        }
    }
}

// =============================================================================
// Cursors
// =============================================================================

/// A positioned stream of raw versions
pub trait EntryCursor: Send {
    /// Entry under the cursor, `None` once exhausted
    fn current(&self) -> Option<&Entry>;

    /// Step to the next entry in the cursor's direction
    fn advance(&mut self) -> Result<()>;
}

/// Cursor over a memtable
///
/// Holds no lock between steps: each refill re-seeks the map just past the
/// last entry returned.
pub struct MemTableCursor {
    table: Arc<MemTable>,
    direction: Direction,
    buffer: Vec<Entry>,
    pos: usize,
    /// Bound for the next refill
    resume: Bound<InternalKey>,
    drained: bool,
}

impl MemTableCursor {
    pub fn seek(table: Arc<MemTable>, direction: Direction, target: Option<(&[u8], u64)>) -> Self {
        let resume = match target {
            Some((key, seq)) => Bound::Included(InternalKey::new(key, seq)),
            None => Bound::Unbounded,
        };
        let mut cursor = Self {
            table,
            direction,
            buffer: Vec::new(),
            pos: 0,
            resume,
            drained: false,
        };
        cursor.refill();
        cursor
    }

    fn refill(&mut self) {
        let bound = std::mem::replace(&mut self.resume, Bound::Unbounded);
        self.buffer = self.table.scan(bound, self.direction, MEMTABLE_BATCH);
        self.pos = 0;
        if self.buffer.len() < MEMTABLE_BATCH {
            self.drained = true;
        }
        if let Some(last) = self.buffer.last() {
            self.resume = Bound::Excluded(last.internal_key());
        }
    }
}

impl EntryCursor for MemTableCursor {
    fn current(&self) -> Option<&Entry> {
        self.buffer.get(self.pos)
    }

    fn advance(&mut self) -> Result<()> {
        if self.pos < self.buffer.len() {
            self.pos += 1;
        }
        if self.pos >= self.buffer.len() && !self.drained {
            self.refill();
        }
        Ok(())
    }
}

// =============================================================================
// Merge
// =============================================================================

struct HeapEntry {
    cursor: Box<dyn EntryCursor>,
    source: usize,
    direction: Direction,
}

impl HeapEntry {
    fn head(&self) -> &Entry {
        // Only non-exhausted cursors are pushed
        self.cursor
            .current()
            .unwrap_or_else(|| unreachable!("exhausted cursor in merge heap"))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // BinaryHeap is a max-heap: the entry that should come out first must
    // compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.head(), other.head());
        let order = a.cmp_internal(&b.key, b.sequence);
        let order = match self.direction {
            Direction::Forward => order.reverse(),
            Direction::Reverse => order,
        };
        order.then_with(|| other.source.cmp(&self.source))
    }
}

/// K-way merge of cursors yielding every raw version in direction order
pub struct MergingCursor {
    heap: BinaryHeap<HeapEntry>,
}

impl MergingCursor {
    pub fn new(cursors: Vec<Box<dyn EntryCursor>>, direction: Direction) -> Self {
        let heap = cursors
            .into_iter()
            .enumerate()
            .filter(|(_, c)| c.current().is_some())
            .map(|(source, cursor)| HeapEntry {
                cursor,
                source,
                direction,
            })
            .collect();
        Self { heap }
    }

    /// Next raw version, `None` when every source is exhausted
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        let Some(mut top) = self.heap.pop() else {
            return Ok(None);
        };
        let entry = top.head().clone();
        top.cursor.advance()?;
        if top.cursor.current().is_some() {
            self.heap.push(top);
        }
        Ok(Some(entry))
    }
}

// =============================================================================
// DbIterator
// =============================================================================

/// Iterator over live `(key, value)` pairs at a fixed snapshot
///
/// Holds its sources (and through them the SSTables they read) until it is
/// exhausted, closed or dropped.
pub struct DbIterator {
    merged: Option<MergingCursor>,
    /// First version of the next user key, read ahead while grouping
    pending: Option<Entry>,
    sequence: u64,
    now_millis: u64,
    snapshot: Option<Snapshot>,
}

impl DbIterator {
    pub(crate) fn new(
        cursors: Vec<Box<dyn EntryCursor>>,
        direction: Direction,
        sequence: u64,
        now_millis: u64,
        snapshot: Option<Snapshot>,
    ) -> Self {
        Self {
            merged: Some(MergingCursor::new(cursors, direction)),
            pending: None,
            sequence,
            now_millis,
            snapshot,
        }
    }

    /// Sequence cutoff this iterator reads at
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Release sources and snapshot; later calls to `next` return `None`
    pub fn close(&mut self) {
        self.merged = None;
        self.pending = None;
        self.snapshot = None;
    }

    pub fn is_closed(&self) -> bool {
        self.merged.is_none()
    }

    fn next_live(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        loop {
            let Some(merged) = self.merged.as_mut() else {
                return Ok(None);
            };
            let first = match self.pending.take() {
                Some(entry) => entry,
                None => match merged.next_entry()? {
                    Some(entry) => entry,
                    None => {
                        self.close();
                        return Ok(None);
                    }
                },
            };

            let mut best = (first.sequence <= self.sequence).then_some(first.clone());
            loop {
                match merged.next_entry()? {
                    Some(entry) if entry.key == first.key => {
                        if entry.sequence <= self.sequence
                            && best.as_ref().map_or(true, |b| entry.sequence > b.sequence)
                        {
                            best = Some(entry);
                        }
                    }
                    Some(entry) => {
                        self.pending = Some(entry);
                        break;
                    }
                    None => break,
                }
            }

            if let Some(best) = best {
                if let Some(value) = best.live_value(self.now_millis) {
                    return Ok(Some((best.key.clone(), value.to_vec())));
                }
            }
        }
    }
}

impl Iterator for DbIterator {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_live() {
            Ok(Some(kv)) => Some(Ok(kv)),
            Ok(None) => None,
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}
