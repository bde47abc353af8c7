//! Compaction
//!
//! Leveled compaction: merges overlapping tables into the next level and
//! drops the versions no reader can observe any more.
//!
//! ## Picking
//! - L0 holds `level0_compaction_trigger` tables: all of L0 plus the
//!   overlapping L1 tables go to L1
//! - Li (i >= 1) exceeds its byte budget: its oldest table plus the
//!   overlapping Li+1 tables go to Li+1 (the level most over budget wins)
//! - The bottom level never compacts further down
//!
//! ## Retention
//! Open snapshots split the sequence space into stripes. Within one user
//! key, only the newest version of each stripe survives:
//!
//! ```text
//!   seq:     12   11    9    6    4    2
//!   snaps:          ▲10       ▲5
//!   stripe:   2    2    1    1    0    0
//!   kept:     ✓         ✓         ✓
//! ```
//!
//! Expired values become tombstones. A tombstone in stripe 0 is dropped when
//! no deeper level may still hold the key.

use std::sync::Arc;

use crate::config::Options;
use crate::entry::{Entry, EntryValue};
use crate::error::Result;
use crate::iterator::{Direction, EntryCursor, MergingCursor};
use crate::storage::{
    SSTableBuilder, SSTableCursor, SSTableReader, StorageManager, Version, VersionEdit,
};

/// Input tables and destination of one compaction
#[derive(Debug, Clone)]
pub struct CompactionTask {
    /// Level the compaction was picked for
    pub level: usize,

    /// Level receiving the outputs
    pub output_level: usize,

    /// Input tables as (level, table)
    pub inputs: Vec<(usize, Arc<SSTableReader>)>,
}

/// Counters reported by one compaction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub input_tables: usize,
    pub output_tables: usize,
    pub entries_read: u64,
    pub entries_written: u64,
    pub versions_dropped: u64,
    pub values_expired: u64,
    pub tombstones_dropped: u64,
}

// =============================================================================
// Picking
// =============================================================================

/// Choose the next compaction, if any level is over its trigger
pub fn pick(version: &Version, options: &Options) -> Option<CompactionTask> {
    let last_level = version.num_levels().checked_sub(1)?;

    let l0 = version.level(0);
    if !l0.is_empty() && l0.len() >= options.compaction.level0_compaction_trigger {
        let mut inputs: Vec<(usize, Arc<SSTableReader>)> =
            l0.iter().map(|t| (0, Arc::clone(t))).collect();
        let (smallest, largest) = key_range(l0.iter())?;
        inputs.extend(
            version
                .overlapping(1, &smallest, &largest)
                .into_iter()
                .map(|t| (1, t)),
        );
        return Some(CompactionTask {
            level: 0,
            output_level: 1,
            inputs,
        });
    }

    // Highest score (bytes / budget) above 1.0 wins
    let mut best: Option<(usize, f64)> = None;
    for level in 1..last_level {
        let budget = options.max_bytes_for_level(level);
        let score = version.level_bytes(level) as f64 / budget as f64;
        if score > 1.0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((level, score));
        }
    }
    let (level, _) = best?;

    let oldest = version.level(level).iter().min_by_key(|t| t.id())?;
    let meta = oldest.meta();
    let mut inputs = vec![(level, Arc::clone(oldest))];
    inputs.extend(
        version
            .overlapping(level + 1, &meta.smallest_key, &meta.largest_key)
            .into_iter()
            .map(|t| (level + 1, t)),
    );
    Some(CompactionTask {
        level,
        output_level: level + 1,
        inputs,
    })
}

/// Every table of every level merged into the bottom level
pub fn pick_all(version: &Version) -> Option<CompactionTask> {
    let bottom = version.num_levels().checked_sub(1)?;
    let inputs: Vec<(usize, Arc<SSTableReader>)> = (0..version.num_levels())
        .flat_map(|level| version.level(level).iter().map(move |t| (level, Arc::clone(t))))
        .collect();
    if inputs.is_empty() {
        return None;
    }
    Some(CompactionTask {
        level: version.deepest_non_empty().unwrap_or(0),
        output_level: bottom,
        inputs,
    })
}

fn key_range<'a>(tables: impl Iterator<Item = &'a Arc<SSTableReader>>) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut range: Option<(Vec<u8>, Vec<u8>)> = None;
    for t in tables {
        let m = t.meta();
        range = Some(match range {
            None => (m.smallest_key.clone(), m.largest_key.clone()),
            Some((lo, hi)) => (
                lo.min(m.smallest_key.clone()),
                hi.max(m.largest_key.clone()),
            ),
        });
    }
    range
}

// =============================================================================
// Retention
// =============================================================================

/// Decides which versions of one user key survive a merge
#[derive(Debug, Clone)]
pub struct Retention {
    /// Open snapshot sequences, ascending
    snapshots: Vec<u64>,
    now_millis: u64,
}

/// Result of filtering one user key's versions
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Filtered {
    pub kept: Vec<Entry>,
    pub versions_dropped: u64,
    pub values_expired: u64,
    pub tombstones_dropped: u64,
}

impl Retention {
    pub fn new(mut snapshots: Vec<u64>, now_millis: u64) -> Self {
        snapshots.sort_unstable();
        snapshots.dedup();
        Self {
            snapshots,
            now_millis,
        }
    }

    /// Number of open snapshots that cannot see `sequence`
    fn stripe(&self, sequence: u64) -> usize {
        self.snapshots.partition_point(|s| *s < sequence)
    }

    /// Filter the versions of one key, given newest first
    ///
    /// `may_exist_below` reports whether a level deeper than the output might
    /// still hold the key, in which case tombstones must be kept.
    pub fn filter(&self, versions: Vec<Entry>, may_exist_below: bool) -> Filtered {
        let mut out = Filtered::default();
        let mut last_stripe: Option<usize> = None;

        for mut entry in versions {
            let stripe = self.stripe(entry.sequence);
            if last_stripe == Some(stripe) {
                out.versions_dropped += 1;
                continue;
            }
            last_stripe = Some(stripe);

            if !entry.is_tombstone() && entry.is_expired(self.now_millis) {
                entry.value = EntryValue::Tombstone;
                entry.expires_at = None;
                out.values_expired += 1;
            }

            if entry.is_tombstone() && stripe == 0 && !may_exist_below {
                out.tombstones_dropped += 1;
                continue;
            }
            out.kept.push(entry);
        }
        out
    }
}

// =============================================================================
// Execution
// =============================================================================

/// What a compaction needs from the engine
pub struct CompactionContext<'a> {
    pub storage: &'a StorageManager,
    pub version: &'a Version,
    pub options: &'a Options,
    pub retention: Retention,
}

/// Merge the task's inputs into new tables; returns the edit to apply
///
/// Output files are written and fsynced but not yet referenced by any
/// manifest. On error they are removed.
pub fn run(task: &CompactionTask, ctx: &CompactionContext<'_>) -> Result<(VersionEdit, CompactionStats)> {
    tracing::info!(
        level = task.level,
        output_level = task.output_level,
        input_tables = task.inputs.len(),
        "Starting compaction"
    );

    let mut outputs: Vec<Arc<SSTableReader>> = Vec::new();
    let result = merge_into(task, ctx, &mut outputs);
    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            for table in outputs {
                let path = table.path().to_path_buf();
                drop(table);
                let _ = std::fs::remove_file(path);
            }
            return Err(e);
        }
    };

    let edit = VersionEdit {
        added: outputs.iter().map(|t| (task.output_level, Arc::clone(t))).collect(),
        deleted: task.inputs.iter().map(|(l, t)| (*l, t.id())).collect(),
        log_number: None,
    };

    tracing::info!(
        level = task.level,
        output_level = task.output_level,
        input_tables = stats.input_tables,
        output_tables = stats.output_tables,
        entries_read = stats.entries_read,
        entries_written = stats.entries_written,
        versions_dropped = stats.versions_dropped,
        values_expired = stats.values_expired,
        tombstones_dropped = stats.tombstones_dropped,
        "Completed compaction"
    );
    Ok((edit, stats))
}

fn merge_into(
    task: &CompactionTask,
    ctx: &CompactionContext<'_>,
    outputs: &mut Vec<Arc<SSTableReader>>,
) -> Result<CompactionStats> {
    let mut stats = CompactionStats {
        input_tables: task.inputs.len(),
        ..Default::default()
    };

    let mut cursors: Vec<Box<dyn EntryCursor>> = Vec::with_capacity(task.inputs.len());
    for (_, table) in &task.inputs {
        cursors.push(Box::new(SSTableCursor::seek(
            Arc::clone(table),
            Direction::Forward,
            None,
        )?));
    }
    let mut merged = MergingCursor::new(cursors, Direction::Forward);

    let mut writer = OutputWriter {
        storage: ctx.storage,
        target_file_size: ctx.options.target_file_size,
        builder: None,
        outputs,
    };

    let mut group: Vec<Entry> = Vec::new();
    while let Some(entry) = merged.next_entry()? {
        stats.entries_read += 1;
        if group.first().map_or(false, |g| g.key != entry.key) {
            emit_key(std::mem::take(&mut group), task, ctx, &mut writer, &mut stats)?;
        }
        group.push(entry);
    }
    if !group.is_empty() {
        emit_key(group, task, ctx, &mut writer, &mut stats)?;
    }

    writer.finish()?;
    stats.output_tables = writer.outputs.len();
    Ok(stats)
}

fn emit_key(
    versions: Vec<Entry>,
    task: &CompactionTask,
    ctx: &CompactionContext<'_>,
    writer: &mut OutputWriter<'_, '_>,
    stats: &mut CompactionStats,
) -> Result<()> {
    let below = ctx.version.key_may_exist_below(task.output_level, &versions[0].key);
    let filtered = ctx.retention.filter(versions, below);
    stats.versions_dropped += filtered.versions_dropped;
    stats.values_expired += filtered.values_expired;
    stats.tombstones_dropped += filtered.tombstones_dropped;
    stats.entries_written += filtered.kept.len() as u64;
    writer.write_key(&filtered.kept)
}

/// Rolls output tables at `target_file_size`, only between user keys
struct OutputWriter<'a, 'o> {
    storage: &'a StorageManager,
    target_file_size: u64,
    builder: Option<SSTableBuilder>,
    outputs: &'o mut Vec<Arc<SSTableReader>>,
}

impl OutputWriter<'_, '_> {
    fn write_key(&mut self, versions: &[Entry]) -> Result<()> {
        if versions.is_empty() {
            return Ok(());
        }
        if self
            .builder
            .as_ref()
            .map_or(false, |b| b.estimated_size() >= self.target_file_size)
        {
            self.finish()?;
        }
        if self.builder.is_none() {
            let id = self.storage.new_file_number();
            let path = self.storage.table_path(id);
            self.builder = Some(SSTableBuilder::new(&path, id, self.storage.block_size())?);
        }
        if let Some(builder) = self.builder.as_mut() {
            for entry in versions {
                builder.add(entry)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(builder) = self.builder.take() {
            let meta = builder.finish()?;
            let reader = SSTableReader::open(&self.storage.table_path(meta.id), meta.id)?;
            self.outputs.push(Arc::new(reader));
        }
        Ok(())
    }
}
