//! Engine integration tests

mod backup_tests;
mod batch_tests;
mod engine_tests;
mod iterator_tests;
mod ttl_tests;

use std::path::Path;

use lodekv::{DbIterator, Engine, Options, OptionsBuilder};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Options with inline flush/compaction so tests are deterministic
pub fn test_options() -> OptionsBuilder {
    Options::builder().background_jobs(false)
}

pub fn open_at(path: &Path) -> Engine {
    Engine::open(path, test_options().build()).unwrap()
}

pub fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_at(temp_dir.path());
    (temp_dir, engine)
}

/// Drain an iterator into UTF-8 pairs
pub fn collect(iter: DbIterator) -> Vec<(String, String)> {
    iter.map(|pair| {
        let (k, v) = pair.unwrap();
        (String::from_utf8(k).unwrap(), String::from_utf8(v).unwrap())
    })
    .collect()
}

pub fn value(engine: &Engine, key: &str) -> Option<String> {
    engine
        .get(key)
        .unwrap()
        .map(|v| String::from_utf8(v).unwrap())
}
