//! Configuration for LodeKV
//!
//! Centralized engine options with sensible defaults.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::{LodeError, Result};

/// Options for opening an engine
#[derive(Debug, Clone)]
pub struct Options {
    // -------------------------------------------------------------------------
    // Open Behavior
    // -------------------------------------------------------------------------
    /// Create the directory and an empty engine if none exists
    pub create_if_missing: bool,

    /// Fail if an engine already exists at the path
    pub error_if_exists: bool,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of the active memtable before it is sealed (in bytes)
    pub memtable_size_limit: usize,

    /// Sealed memtables allowed to wait for flush before writers flush inline
    pub max_immutable_memtables: usize,

    // -------------------------------------------------------------------------
    // SSTable Configuration
    // -------------------------------------------------------------------------
    /// Target uncompressed size of one data block (in bytes)
    pub block_size: usize,

    /// Compaction output files are cut at roughly this size (in bytes)
    pub target_file_size: u64,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    pub compaction: CompactionOptions,

    /// Run flushes and compactions on a background thread
    pub background_jobs: bool,

    // -------------------------------------------------------------------------
    // Expiry
    // -------------------------------------------------------------------------
    /// Time-to-live applied to every write made through the handle
    pub ttl: Option<Duration>,

    /// Time source for TTL
    pub clock: Arc<dyn Clock>,
}

/// Leveled compaction tuning
#[derive(Debug, Clone)]
pub struct CompactionOptions {
    /// Number of L0 tables that triggers an L0 -> L1 compaction
    pub level0_compaction_trigger: usize,

    /// Size budget of L1 (in bytes)
    pub max_bytes_for_level_base: u64,

    /// Each level may hold this many times the bytes of the previous one
    pub level_size_multiplier: u64,

    /// Total number of levels, L0 included
    pub num_levels: usize,

    /// Never schedule compactions automatically
    pub disable_auto_compactions: bool,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for CompactionOptions {
    fn default() -> Self {
        Self {
            level0_compaction_trigger: 4,
            max_bytes_for_level_base: 10 * 1024 * 1024, // 10 MB
            level_size_multiplier: 10,
            num_levels: 7,
            disable_auto_compactions: false,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 4 * 1024 * 1024, // 4 MB
            max_immutable_memtables: 4,
            block_size: 4 * 1024,
            target_file_size: 2 * 1024 * 1024,
            compaction: CompactionOptions::default(),
            background_jobs: true,
            ttl: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl Options {
    /// Create a new options builder
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Reject option combinations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memtable_size_limit == 0 {
            return Err(invalid("memtable_size_limit must be greater than zero"));
        }
        if self.max_immutable_memtables == 0 {
            return Err(invalid("max_immutable_memtables must be at least 1"));
        }
        if self.block_size == 0 {
            return Err(invalid("block_size must be greater than zero"));
        }
        if self.target_file_size == 0 {
            return Err(invalid("target_file_size must be greater than zero"));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(invalid("EveryNEntries requires a count of at least 1"));
        }
        if self.compaction.num_levels < 2 {
            return Err(invalid("num_levels must be at least 2"));
        }
        if self.compaction.level0_compaction_trigger == 0 {
            return Err(invalid("level0_compaction_trigger must be at least 1"));
        }
        if self.compaction.level_size_multiplier < 2 {
            return Err(invalid("level_size_multiplier must be at least 2"));
        }
        if self.compaction.max_bytes_for_level_base == 0 {
            return Err(invalid("max_bytes_for_level_base must be greater than zero"));
        }
        if let Some(ttl) = self.ttl {
            if ttl.is_zero() {
                return Err(invalid("ttl must be greater than zero"));
            }
        }
        Ok(())
    }

    /// Byte budget for a level (L1 and deeper)
    pub fn max_bytes_for_level(&self, level: usize) -> u64 {
        let mut bytes = self.compaction.max_bytes_for_level_base;
        for _ in 1..level {
            bytes = bytes.saturating_mul(self.compaction.level_size_multiplier);
        }
        bytes
    }
}

fn invalid(msg: &str) -> LodeError {
    LodeError::InvalidArgument(msg.to_string())
}

/// Builder for Options
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    pub fn create_if_missing(mut self, yes: bool) -> Self {
        self.options.create_if_missing = yes;
        self
    }

    pub fn error_if_exists(mut self, yes: bool) -> Self {
        self.options.error_if_exists = yes;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.options.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.options.memtable_size_limit = size;
        self
    }

    pub fn max_immutable_memtables(mut self, count: usize) -> Self {
        self.options.max_immutable_memtables = count;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.options.block_size = size;
        self
    }

    pub fn target_file_size(mut self, size: u64) -> Self {
        self.options.target_file_size = size;
        self
    }

    pub fn level0_compaction_trigger(mut self, count: usize) -> Self {
        self.options.compaction.level0_compaction_trigger = count;
        self
    }

    pub fn max_bytes_for_level_base(mut self, bytes: u64) -> Self {
        self.options.compaction.max_bytes_for_level_base = bytes;
        self
    }

    pub fn level_size_multiplier(mut self, multiplier: u64) -> Self {
        self.options.compaction.level_size_multiplier = multiplier;
        self
    }

    pub fn num_levels(mut self, levels: usize) -> Self {
        self.options.compaction.num_levels = levels;
        self
    }

    pub fn disable_auto_compactions(mut self, yes: bool) -> Self {
        self.options.compaction.disable_auto_compactions = yes;
        self
    }

    /// Run flushes/compactions on the caller's thread instead of a worker
    pub fn background_jobs(mut self, yes: bool) -> Self {
        self.options.background_jobs = yes;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = Some(ttl);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.options.clock = clock;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}
