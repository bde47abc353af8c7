//! Version
//!
//! Immutable in-memory view of the manifest: the open tables of every level.
//! A new version is built from the current one plus a [`VersionEdit`] and
//! published by swapping an `Arc`; readers keep whichever version they
//! captured.

use std::collections::HashSet;
use std::sync::Arc;

use crate::entry::Entry;
use crate::error::Result;

use super::sstable::{SSTableReader, TableMeta};

/// Open tables per level
#[derive(Debug, Clone)]
pub struct Version {
    levels: Vec<Vec<Arc<SSTableReader>>>,
}

/// Delta between two versions
#[derive(Debug, Default)]
pub struct VersionEdit {
    /// Tables to add as (level, table)
    pub added: Vec<(usize, Arc<SSTableReader>)>,

    /// Tables to remove as (level, id)
    pub deleted: Vec<(usize, u64)>,

    /// New lowest live WAL segment (flush only)
    pub log_number: Option<u64>,
}

impl Version {
    pub fn new(num_levels: usize) -> Self {
        Self {
            levels: vec![Vec::new(); num_levels],
        }
    }

    pub(crate) fn from_levels(levels: Vec<Vec<Arc<SSTableReader>>>) -> Self {
        let mut version = Self { levels };
        version.sort_levels();
        version
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Tables of one level; L0 newest first, deeper levels by smallest key
    pub fn level(&self, level: usize) -> &[Arc<SSTableReader>] {
        self.levels.get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<SSTableReader>> {
        self.levels.iter().flatten()
    }

    pub fn table_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn table_ids(&self) -> HashSet<u64> {
        self.tables().map(|t| t.id()).collect()
    }

    /// Total file bytes of one level
    pub fn level_bytes(&self, level: usize) -> u64 {
        self.level(level).iter().map(|t| t.meta().file_size).sum()
    }

    /// Deepest level holding any table
    pub fn deepest_non_empty(&self) -> Option<usize> {
        self.levels.iter().rposition(|l| !l.is_empty())
    }

    /// Table metadata per level, as persisted in the manifest
    pub fn metas(&self) -> Vec<Vec<TableMeta>> {
        self.levels
            .iter()
            .map(|l| l.iter().map(|t| t.meta().clone()).collect())
            .collect()
    }

    /// Newest version of `key` with `sequence <= snapshot`, unfiltered
    ///
    /// L0 tables may overlap and are searched newest first; deeper levels are
    /// disjoint so at most one table per level is consulted.
    pub fn get(&self, key: &[u8], snapshot: u64) -> Result<Option<Entry>> {
        for table in self.level(0) {
            if let Some(entry) = table.get(key, snapshot)? {
                return Ok(Some(entry));
            }
        }
        for level in 1..self.levels.len() {
            if let Some(table) = self.table_for_key(level, key) {
                if let Some(entry) = table.get(key, snapshot)? {
                    return Ok(Some(entry));
                }
            }
        }
        Ok(None)
    }

    fn table_for_key(&self, level: usize, key: &[u8]) -> Option<&Arc<SSTableReader>> {
        let tables = self.level(level);
        let idx = tables.partition_point(|t| t.meta().largest_key.as_slice() < key);
        tables.get(idx).filter(|t| t.might_contain(key))
    }

    /// Tables of `level` whose key range intersects `[smallest, largest]`
    pub fn overlapping(&self, level: usize, smallest: &[u8], largest: &[u8]) -> Vec<Arc<SSTableReader>> {
        self.level(level)
            .iter()
            .filter(|t| t.meta().overlaps(smallest, largest))
            .cloned()
            .collect()
    }

    /// Whether any level deeper than `level` may hold `key`
    pub fn key_may_exist_below(&self, level: usize, key: &[u8]) -> bool {
        (level + 1..self.levels.len()).any(|l| self.table_for_key(l, key).is_some())
    }

    /// Build the successor version
    pub fn apply(&self, edit: &VersionEdit) -> Version {
        let mut levels = self.levels.clone();
        for (level, id) in &edit.deleted {
            if let Some(tables) = levels.get_mut(*level) {
                tables.retain(|t| t.id() != *id);
            }
        }
        for (level, table) in &edit.added {
            if *level >= levels.len() {
                levels.resize_with(*level + 1, Vec::new);
            }
            levels[*level].push(Arc::clone(table));
        }
        Version::from_levels(levels)
    }

    fn sort_levels(&mut self) {
        for (level, tables) in self.levels.iter_mut().enumerate() {
            if level == 0 {
                tables.sort_by(|a, b| b.id().cmp(&a.id()));
            } else {
                tables.sort_by(|a, b| a.meta().smallest_key.cmp(&b.meta().smallest_key));
            }
        }
    }
}
