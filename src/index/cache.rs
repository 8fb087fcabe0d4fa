use dashmap::{DashMap, DashSet};
use std::sync::Arc;

use crate::error::{IndexError, IndexResult};
use crate::index::CollectionIndex;
use crate::storage::OrderedStore;
use crate::types::CollectionId;

/// Lazily opened collection indexes sharing one store.
///
/// Each collection gets exactly one `CollectionIndex`, so its lock is the
/// single point that serializes writes and scans for that collection.
/// Deleted collections are retired and never reopened; ids are not reused.
#[derive(Debug)]
pub struct IndexCache {
    store: Arc<dyn OrderedStore>,
    open: DashMap<CollectionId, Arc<CollectionIndex>>,
    retired: DashSet<CollectionId>,
}

impl IndexCache {
    pub fn new(store: Arc<dyn OrderedStore>) -> Self {
        Self {
            store,
            open: DashMap::new(),
            retired: DashSet::new(),
        }
    }

    /// Returns the open index for `id`, opening it on first use.
    ///
    /// # Errors
    /// `CollectionNotFound` once `id` has been retired.
    pub fn get_or_open(&self, id: CollectionId) -> IndexResult<Arc<CollectionIndex>> {
        if let Some(index) = self.open.get(&id) {
            return Ok(index.clone());
        }
        let index = Arc::new(CollectionIndex::open(id, self.store.clone())?);
        // The entry holds the shard lock, so `retire` cannot slip in between
        // the check and the insert.
        let entry = self.open.entry(id);
        if self.retired.contains(&id) {
            return Err(IndexError::CollectionNotFound { id });
        }
        Ok(entry.or_insert(index).clone())
    }

    /// Forgets the cached index for `id`.
    pub fn evict(&self, id: CollectionId) -> Option<Arc<CollectionIndex>> {
        self.open.remove(&id).map(|(_, index)| index)
    }

    /// Evicts `id` for good. Later `get_or_open` calls fail, so a query that
    /// was already running cannot bring a deleted collection back.
    pub fn retire(&self, id: CollectionId) -> Option<Arc<CollectionIndex>> {
        self.retired.insert(id);
        self.evict(id)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn OrderedStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_same_instance_per_collection() {
        let cache = IndexCache::new(Arc::new(MemoryStore::new()));
        let id = CollectionId::new(1).unwrap();
        let a = cache.get_or_open(id).unwrap();
        let b = cache.get_or_open(id).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        cache.evict(id);
        let c = cache.get_or_open(id).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_retired_collection_is_never_reopened() {
        let cache = IndexCache::new(Arc::new(MemoryStore::new()));
        let id = CollectionId::new(4).unwrap();
        let open = cache.get_or_open(id).unwrap();

        let retired = cache.retire(id).unwrap();
        assert!(Arc::ptr_eq(&open, &retired));
        assert!(matches!(
            cache.get_or_open(id),
            Err(IndexError::CollectionNotFound { .. })
        ));
        assert!(cache.evict(id).is_none());

        let other = CollectionId::new(5).unwrap();
        assert!(cache.get_or_open(other).is_ok());
    }
}
