//! The ordered key-value capability the index is written against.

use std::fmt;

use crate::error::StorageResult;

/// A key and its value.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Ordered byte-keyed storage.
///
/// Keys compare byte-lexicographically. Implementations must make each
/// method atomic with respect to the others; `write_batch` applies all of its
/// operations or none of them.
pub trait OrderedStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Returns whether it was present.
    fn delete(&self, key: &[u8]) -> StorageResult<bool>;

    /// Entries with `start <= key <= end`, ascending, at most `limit`.
    fn range(&self, start: &[u8], end: &[u8], limit: Option<usize>) -> StorageResult<Vec<KvPair>>;

    /// Entries with `start <= key <= end`, descending, at most `limit`.
    fn range_rev(
        &self,
        start: &[u8],
        end: &[u8],
        limit: Option<usize>,
    ) -> StorageResult<Vec<KvPair>>;

    /// All entries whose key starts with `prefix`, ascending.
    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>>;

    /// Removes every entry whose key starts with `prefix`. Returns the count.
    fn delete_prefix(&self, prefix: &[u8]) -> StorageResult<usize>;

    /// Applies a batch atomically.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Total number of entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One mutation in a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Ordered list of mutations applied together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
        self
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete(key.into()));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}
