use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use crate::error::StorageResult;
use crate::storage::persistence;
use crate::storage::store::{BatchOp, KvPair, OrderedStore, WriteBatch};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory ordered store with snapshot persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<Map>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            map: RwLock::new(map),
        }
    }

    /// Loads a snapshot if one exists at `path`, otherwise starts empty.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if path.exists() {
            Self::load_snapshot(path)
        } else {
            tracing::debug!("[storage] no snapshot at {}, starting empty", path.display());
            Ok(Self::new())
        }
    }

    pub fn load_snapshot(path: &Path) -> StorageResult<Self> {
        let map = persistence::read_snapshot(path)?;
        tracing::debug!(
            "[storage] loaded {} entries from {}",
            map.len(),
            path.display()
        );
        Ok(Self::from_map(map))
    }

    /// Writes the current contents to `path` atomically.
    pub fn save_snapshot(&self, path: &Path) -> StorageResult<()> {
        let map = self.map.read();
        persistence::write_snapshot(path, &map)?;
        tracing::debug!("[storage] saved {} entries to {}", map.len(), path.display());
        Ok(())
    }

    fn bounds<'a>(start: &'a [u8], end: &'a [u8]) -> (Bound<&'a [u8]>, Bound<&'a [u8]>) {
        (Bound::Included(start), Bound::Included(end))
    }
}

impl OrderedStore for MemoryStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.map.write().remove(key).is_some())
    }

    fn range(&self, start: &[u8], end: &[u8], limit: Option<usize>) -> StorageResult<Vec<KvPair>> {
        if start > end {
            return Ok(Vec::new());
        }
        let map = self.map.read();
        Ok(map
            .range::<[u8], _>(Self::bounds(start, end))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn range_rev(
        &self,
        start: &[u8],
        end: &[u8],
        limit: Option<usize>,
    ) -> StorageResult<Vec<KvPair>> {
        if start > end {
            return Ok(Vec::new());
        }
        let map = self.map.read();
        Ok(map
            .range::<[u8], _>(Self::bounds(start, end))
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>> {
        let map = self.map.read();
        Ok(map
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn delete_prefix(&self, prefix: &[u8]) -> StorageResult<usize> {
        let mut map = self.map.write();
        let keys: Vec<Vec<u8>> = map
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            map.remove(key);
        }
        Ok(keys.len())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut map = self.map.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => {
                    map.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.map.read().len()
    }
}
