//! Write Batch
//!
//! An ordered list of puts and deletes committed as one WAL unit. Sequence
//! numbers are assigned at commit, so a batch can be built, inspected and
//! reused freely.

use crate::wal::Operation;

/// Buffered mutations applied atomically by [`Engine::write`](crate::Engine::write)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
    /// Key + value bytes buffered
    size: usize,
}

/// One buffered mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }

    /// WAL form, stamping puts with the handle's expiry
    pub(crate) fn to_operation(&self, expires_at: Option<u64>) -> Operation {
        match self {
            BatchOp::Put { key, value } => Operation::Put {
                key: key.clone(),
                value: value.clone(),
                expires_at,
            },
            BatchOp::Delete { key } => Operation::Delete { key: key.clone() },
        }
    }
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> &mut Self {
        let (key, value) = (key.as_ref().to_vec(), value.as_ref().to_vec());
        self.size += key.len() + value.len();
        self.ops.push(BatchOp::Put { key, value });
        self
    }

    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> &mut Self {
        let key = key.as_ref().to_vec();
        self.size += key.len();
        self.ops.push(BatchOp::Delete { key });
        self
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
        self.size = 0;
    }

    /// Operations in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &BatchOp> {
        self.ops.iter()
    }

    /// Approximate payload in bytes
    pub fn size_in_bytes(&self) -> usize {
        self.size
    }
}

impl<'a> IntoIterator for &'a WriteBatch {
    type Item = &'a BatchOp;
    type IntoIter = std::slice::Iter<'a, BatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
