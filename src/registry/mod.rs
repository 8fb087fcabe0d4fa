//! Collection registry: metadata, weight and activation of every collection.
//!
//! The registry is an explicit object over an injected store handle. Rows
//! live under `r/<cid>` as JSON; the next id comes from a counter key.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{IndexError, IndexResult, StorageError};
use crate::storage::keys::{self, MetadataKey};
use crate::storage::{OrderedStore, WriteBatch};
use crate::types::{CollectionId, get_utc_timestamp};

/// Lowest weight a collection can have.
pub const MIN_WEIGHT: f32 = 0.1;

/// Highest weight a collection can have.
pub const MAX_WEIGHT: f32 = 2.0;

pub const DEFAULT_WEIGHT: f32 = 1.0;

/// Registry row for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub id: CollectionId,
    pub name: String,
    /// Score multiplier in federated search, always within `[0.1, 2.0]`
    pub weight: f32,
    /// Inactive collections are skipped by federated search
    pub active: bool,
    /// Unix seconds of the last query that returned a hit from this collection
    pub last_accessed: u64,
    pub node_count: u64,
    pub created_at: u64,
}

impl CollectionMeta {
    /// Whole days since `last_accessed`, as a fraction.
    #[must_use]
    pub fn days_since_access(&self, now: u64) -> f32 {
        now.saturating_sub(self.last_accessed) as f32 / 86_400.0
    }
}

/// Clamps into `[MIN_WEIGHT, MAX_WEIGHT]`. NaN maps to the default weight.
#[must_use]
pub fn clamp_weight(weight: f32) -> f32 {
    if weight.is_nan() {
        DEFAULT_WEIGHT
    } else {
        weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
    }
}

/// Catalog of collections.
#[derive(Debug)]
pub struct CollectionRegistry {
    store: Arc<dyn OrderedStore>,
    /// Serializes read-modify-write updates and id allocation
    write_lock: Mutex<()>,
}

impl CollectionRegistry {
    pub fn new(store: Arc<dyn OrderedStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Registers a new, active collection with the default weight.
    ///
    /// # Errors
    /// `DuplicateCollection` if the name is taken.
    pub fn create(&self, name: &str) -> IndexResult<CollectionMeta> {
        let _guard = self.write_lock.lock();
        if self.find_by_name(name)?.is_some() {
            return Err(IndexError::DuplicateCollection {
                name: name.to_string(),
            });
        }

        let counter_key = MetadataKey::CollectionCounter.key();
        let next = match self.store.get(&counter_key)? {
            Some(bytes) => {
                let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::Corrupted {
                        reason: format!("{} is not a u32", MetadataKey::CollectionCounter),
                    }
                })?;
                u32::from_le_bytes(raw)
            }
            None => 1,
        };
        let id = CollectionId::new(next).ok_or(IndexError::CollectionIdExhausted)?;
        let following = next.checked_add(1).ok_or(IndexError::CollectionIdExhausted)?;

        let now = get_utc_timestamp();
        let meta = CollectionMeta {
            id,
            name: name.to_string(),
            weight: DEFAULT_WEIGHT,
            active: true,
            last_accessed: now,
            node_count: 0,
            created_at: now,
        };

        let mut batch = WriteBatch::new();
        batch
            .put(counter_key, following.to_le_bytes().to_vec())
            .put(keys::registry_key(id), encode_meta(&meta)?);
        self.store.write_batch(batch)?;

        tracing::info!("[registry] created collection {id} '{name}'");
        Ok(meta)
    }

    /// # Errors
    /// `CollectionNotFound` on an unknown id.
    pub fn get(&self, id: CollectionId) -> IndexResult<CollectionMeta> {
        match self.store.get(&keys::registry_key(id))? {
            Some(bytes) => decode_meta(&bytes),
            None => Err(IndexError::CollectionNotFound { id }),
        }
    }

    pub fn find_by_name(&self, name: &str) -> IndexResult<Option<CollectionMeta>> {
        Ok(self.list()?.into_iter().find(|meta| meta.name == name))
    }

    /// Every collection, ascending by id.
    pub fn list(&self) -> IndexResult<Vec<CollectionMeta>> {
        self.store
            .scan_prefix(keys::REGISTRY_PREFIX)?
            .iter()
            .filter(|(key, _)| keys::parse_registry_key(key).is_some())
            .map(|(_, bytes)| decode_meta(bytes))
            .collect()
    }

    /// Collections federated search fans out to.
    pub fn list_active(&self) -> IndexResult<Vec<CollectionMeta>> {
        Ok(self.list()?.into_iter().filter(|meta| meta.active).collect())
    }

    /// Sets the weight, clamped into `[0.1, 2.0]`.
    pub fn set_weight(&self, id: CollectionId, weight: f32) -> IndexResult<CollectionMeta> {
        let clamped = clamp_weight(weight);
        if clamped != weight {
            tracing::debug!("[registry] weight {weight} for collection {id} clamped to {clamped}");
        }
        self.update(id, |meta| meta.weight = clamped)
    }

    pub fn set_active(&self, id: CollectionId, active: bool) -> IndexResult<CollectionMeta> {
        self.update(id, |meta| meta.active = active)
    }

    pub fn set_node_count(&self, id: CollectionId, node_count: u64) -> IndexResult<CollectionMeta> {
        self.update(id, |meta| meta.node_count = node_count)
    }

    /// Marks the collection as accessed now.
    pub fn touch(&self, id: CollectionId) -> IndexResult<()> {
        self.touch_at(id, get_utc_timestamp())
    }

    /// Marks the collection as accessed at `timestamp` (Unix seconds).
    pub fn touch_at(&self, id: CollectionId, timestamp: u64) -> IndexResult<()> {
        self.update(id, |meta| meta.last_accessed = timestamp)
            .map(|_| ())
    }

    /// Removes the registry row. Unknown ids are a no-op.
    ///
    /// Returns whether a row was removed.
    pub fn delete(&self, id: CollectionId) -> IndexResult<bool> {
        let _guard = self.write_lock.lock();
        let removed = self.store.delete(&keys::registry_key(id))?;
        if removed {
            tracing::info!("[registry] deleted collection {id}");
        }
        Ok(removed)
    }

    fn update(
        &self,
        id: CollectionId,
        apply: impl FnOnce(&mut CollectionMeta),
    ) -> IndexResult<CollectionMeta> {
        let _guard = self.write_lock.lock();
        let mut meta = self.get(id)?;
        apply(&mut meta);
        self.store
            .put(&keys::registry_key(id), &encode_meta(&meta)?)?;
        Ok(meta)
    }
}

fn encode_meta(meta: &CollectionMeta) -> IndexResult<Vec<u8>> {
    Ok(serde_json::to_vec(meta).map_err(StorageError::from)?)
}

fn decode_meta(bytes: &[u8]) -> IndexResult<CollectionMeta> {
    Ok(serde_json::from_slice(bytes).map_err(StorageError::from)?)
}
