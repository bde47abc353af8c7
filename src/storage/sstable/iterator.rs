//! SSTable Iterator
//!
//! Block-at-a-time cursor over the entries of one SSTable, in either
//! direction.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::entry::Entry;
use crate::error::Result;
use crate::iterator::{Direction, EntryCursor};

use super::SSTableReader;

/// Cursor over one SSTable in internal-key order (or its reverse)
pub struct SSTableCursor {
    table: Arc<SSTableReader>,
    direction: Direction,
    /// Block currently loaded in `entries`
    block: usize,
    /// Entries of `block`, already reversed for `Direction::Reverse`
    entries: Vec<Entry>,
    pos: usize,
    done: bool,
}

impl SSTableCursor {
    /// Position a cursor
    ///
    /// With no target, starts at the first entry in `direction`. Forward with
    /// a target starts at the first entry `>= (key, seq)`; reverse starts at
    /// the last entry `<= (key, seq)`.
    pub fn seek(
        table: Arc<SSTableReader>,
        direction: Direction,
        target: Option<(&[u8], u64)>,
    ) -> Result<Self> {
        let blocks = table.block_count();
        let mut cursor = Self {
            table,
            direction,
            block: 0,
            entries: Vec::new(),
            pos: 0,
            done: true,
        };
        if blocks == 0 {
            return Ok(cursor);
        }

        let start = match (direction, target) {
            (Direction::Forward, None) => Some(0),
            (Direction::Reverse, None) => Some(blocks - 1),
            (Direction::Forward, Some((key, seq))) => {
                Some(cursor.table.block_at_or_before(key, seq).unwrap_or(0))
            }
            (Direction::Reverse, Some((key, seq))) => cursor.table.block_at_or_before(key, seq),
        };
        let Some(start) = start else {
            return Ok(cursor);
        };

        cursor.done = false;
        cursor.load(start)?;

        if let Some((key, seq)) = target {
            let skip = match direction {
                Direction::Forward => Ordering::Less,
                Direction::Reverse => Ordering::Greater,
            };
            while cursor
                .current()
                .map_or(false, |e| e.cmp_internal(key, seq) == skip)
            {
                cursor.advance()?;
            }
        }
        Ok(cursor)
    }

    fn load(&mut self, block: usize) -> Result<()> {
        self.block = block;
        self.entries = self.table.read_block(block)?;
        if self.direction == Direction::Reverse {
            self.entries.reverse();
        }
        self.pos = 0;
        Ok(())
    }

    fn next_block(&self) -> Option<usize> {
        match self.direction {
            Direction::Forward => {
                let next = self.block + 1;
                (next < self.table.block_count()).then_some(next)
            }
            Direction::Reverse => self.block.checked_sub(1),
        }
    }
}

impl EntryCursor for SSTableCursor {
    fn current(&self) -> Option<&Entry> {
        self.entries.get(self.pos)
    }

    fn advance(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.pos += 1;
        while self.pos >= self.entries.len() {
            match self.next_block() {
                Some(block) => self.load(block)?,
                None => {
                    self.entries.clear();
                    self.pos = 0;
                    self.done = true;
                    break;
                }
            }
        }
        Ok(())
    }
}
