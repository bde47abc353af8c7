//! WAL integration tests


use lodekv::wal::{Operation, WalEntry};

/// A put unit with one operation per key
pub fn put_unit(lsn: u64, keys: &[&str]) -> WalEntry {
    let ops = keys
        .iter()
        .map(|k| Operation::Put {
            key: k.as_bytes().to_vec(),
            value: format!("value-{}", k).into_bytes(),
            expires_at: None,
        })
        .collect();
    WalEntry::new(lsn, ops, 1_700_000_000_000)
}
