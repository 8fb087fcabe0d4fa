//! Ordering-key index over the nodes of one collection.
//!
//! Every node has a record under `c/<cid>/n/<nid>` (embedding, payload and
//! its cached ordering key), and its id appears in exactly one node-id set
//! under `c/<cid>/k/<key>`. Several nodes may share a key. All mutations of
//! one collection go through a single `RwLock`, and each mutation is one
//! atomic store batch, so a scan sees a key either before or after a write.

use bincode::{Decode, Encode};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{IndexError, IndexResult, StorageError};
use crate::storage::keys;
use crate::storage::{OrderedStore, WriteBatch};
use crate::types::{CollectionId, NodeId, Payload};
use crate::vector::{
    OrderingKey, QuantizationParams, Quantizer, VectorDimension, VectorError, ordering_key,
};

/// Persisted per-collection state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionState {
    /// Bounds and strategy that produced every stored ordering key
    pub params: Option<QuantizationParams>,
    /// Length of every embedding in the collection, fixed by the first fit
    pub embedding_dimension: Option<usize>,
    pub node_count: u64,
}

#[derive(Debug, Clone, Encode, Decode)]
struct NodeRecord {
    id: u32,
    embedding: Vec<f32>,
    payload: Vec<u8>,
    key: u128,
    key_bits: u32,
}

impl NodeRecord {
    fn from_bytes(bytes: &[u8]) -> IndexResult<Self> {
        let (record, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(StorageError::from)?;
        Ok(record)
    }

    fn to_bytes(&self) -> IndexResult<Vec<u8>> {
        Ok(bincode::encode_to_vec(self, bincode::config::standard()).map_err(StorageError::from)?)
    }

    fn ordering_key(&self) -> IndexResult<OrderingKey> {
        Ok(OrderingKey::new(self.key, self.key_bits)?)
    }

    fn node_id(&self) -> IndexResult<NodeId> {
        Ok(NodeId::new(self.id).ok_or_else(|| StorageError::Corrupted {
            reason: "node record with id 0".to_string(),
        })?)
    }

    fn into_stored(self) -> IndexResult<StoredNode> {
        let key = self.ordering_key()?;
        let id = self.node_id()?;
        Ok(StoredNode {
            id,
            embedding: self.embedding,
            payload: Payload::new(self.payload),
            key,
        })
    }
}

/// A node as handed back by lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub id: NodeId,
    pub embedding: Vec<f32>,
    pub payload: Payload,
    pub key: OrderingKey,
}

/// The ordering-key index of one collection.
#[derive(Debug)]
pub struct CollectionIndex {
    id: CollectionId,
    store: Arc<dyn OrderedStore>,
    state: RwLock<CollectionState>,
}

impl CollectionIndex {
    /// Opens the index of collection `id`, loading its persisted state.
    ///
    /// # Errors
    /// `MissingQuantizationParams` when nodes exist without parameters.
    pub fn open(id: CollectionId, store: Arc<dyn OrderedStore>) -> IndexResult<Self> {
        let state = match store.get(&keys::params_key(id))? {
            Some(bytes) => {
                serde_json::from_slice::<CollectionState>(&bytes).map_err(StorageError::from)?
            }
            None => CollectionState::default(),
        };

        match &state.params {
            Some(params) => params.validate()?,
            None => {
                let prefix = keys::node_prefix(id);
                if !store.range(&prefix, &keys::prefix_end(&prefix), Some(1))?.is_empty() {
                    tracing::error!(
                        "[index] collection {id} has stored nodes but no quantization parameters"
                    );
                    return Err(IndexError::MissingQuantizationParams { collection: id });
                }
            }
        }

        Ok(Self {
            id,
            store,
            state: RwLock::new(state),
        })
    }

    #[must_use]
    pub fn id(&self) -> CollectionId {
        self.id
    }

    #[must_use]
    pub fn params(&self) -> Option<QuantizationParams> {
        self.state.read().params.clone()
    }

    #[must_use]
    pub fn state(&self) -> CollectionState {
        self.state.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.state.read().node_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fits quantization parameters from a sample of full embeddings.
    ///
    /// If nodes already exist they are re-encoded in the same batch, so no
    /// stale ordering key survives.
    ///
    /// # Errors
    /// `InvalidDimension` when sample embeddings differ in length or do not
    /// match the collection's embedding length; any fit error.
    pub fn fit(&self, quantizer: &Quantizer, sample: &[Vec<f32>]) -> IndexResult<QuantizationParams> {
        let dimension = sample_dimension(sample)?;
        let params = quantizer.fit_embeddings(sample)?;

        let mut state = self.state.write();
        if let Some(existing) = state.embedding_dimension {
            if existing != dimension {
                return Err(VectorError::InvalidDimension {
                    expected: existing,
                    actual: dimension,
                }
                .into());
            }
        }
        self.apply_params(&mut state, params.clone(), dimension)?;
        Ok(params)
    }

    /// Re-fits from every stored embedding and re-encodes all nodes.
    ///
    /// D, B and the reduction strategy stay as they are; only bounds move.
    ///
    /// # Errors
    /// `NotFitted` before the first fit, `EmptySample` for an empty collection.
    pub fn refit(&self, epsilon: f32) -> IndexResult<QuantizationParams> {
        let mut state = self.state.write();
        let current = state
            .params
            .clone()
            .ok_or(IndexError::NotFitted {
                collection: self.id,
            })?;
        let dimension = state.embedding_dimension.unwrap_or_default();

        let embeddings: Vec<Vec<f32>> = self
            .store
            .scan_prefix(&keys::node_prefix(self.id))?
            .iter()
            .map(|(_, bytes)| NodeRecord::from_bytes(bytes).map(|r| r.embedding))
            .collect::<IndexResult<_>>()?;

        let params = Quantizer::new(current.dims, current.bits, current.strategy)
            .with_epsilon(epsilon)
            .fit_embeddings(&embeddings)?;
        self.apply_params(&mut state, params.clone(), dimension)?;

        tracing::info!(
            "[index] re-fitted collection {} over {} nodes",
            self.id,
            embeddings.len()
        );
        Ok(params)
    }

    fn apply_params(
        &self,
        state: &mut CollectionState,
        params: QuantizationParams,
        dimension: usize,
    ) -> IndexResult<()> {
        let mut batch = WriteBatch::new();

        for (raw, _) in self.store.scan_prefix(&keys::index_prefix(self.id))? {
            batch.delete(raw);
        }

        // Keys are independent per node; encode them in parallel.
        let encoded = self
            .store
            .scan_prefix(&keys::node_prefix(self.id))?
            .into_par_iter()
            .map(|(raw, bytes)| {
                let mut record = NodeRecord::from_bytes(&bytes)?;
                let key = ordering_key(&record.embedding, &params)?;
                record.key = key.value();
                record.key_bits = key.bits();
                Ok((raw, record.node_id()?, key, record.to_bytes()?))
            })
            .collect::<IndexResult<Vec<_>>>()?;

        let mut sets: BTreeMap<OrderingKey, Vec<NodeId>> = BTreeMap::new();
        for (raw, node, key, record) in encoded {
            sets.entry(key).or_default().push(node);
            batch.put(raw, record);
        }
        for (key, ids) in &sets {
            batch.put(keys::index_key(self.id, key), keys::encode_node_set(ids));
        }

        let next = CollectionState {
            params: Some(params),
            embedding_dimension: Some(dimension),
            node_count: state.node_count,
        };
        batch.put(keys::params_key(self.id), encode_state(&next)?);
        self.store.write_batch(batch)?;

        tracing::debug!(
            "[index] collection {} fitted, {} keys re-encoded",
            self.id,
            sets.len()
        );
        *state = next;
        Ok(())
    }

    /// Reduces, quantizes and encodes `embedding`, then stores the node.
    ///
    /// Re-inserting an existing id replaces it and moves it to its new key.
    ///
    /// # Errors
    /// `NotFitted`, `InvalidDimension`, or any encoding error. A rejected
    /// vector leaves the index untouched.
    pub fn insert(
        &self,
        node: NodeId,
        embedding: Vec<f32>,
        payload: Payload,
    ) -> IndexResult<OrderingKey> {
        let mut state = self.state.write();
        let params = state.params.as_ref().ok_or(IndexError::NotFitted {
            collection: self.id,
        })?;
        if let Some(dimension) = state.embedding_dimension {
            VectorDimension::new(dimension)?.validate_vector(&embedding)?;
        }
        let key = ordering_key(&embedding, params)?;

        let node_key = keys::node_key(self.id, node);
        let previous = match self.store.get(&node_key)? {
            Some(bytes) => Some(NodeRecord::from_bytes(&bytes)?),
            None => None,
        };

        let mut batch = WriteBatch::new();
        let mut node_count = state.node_count;
        match &previous {
            Some(old) => {
                let old_key = old.ordering_key()?;
                if old_key != key {
                    self.remove_from_set(&mut batch, &old_key, node)?;
                    self.add_to_set(&mut batch, &key, node)?;
                }
            }
            None => {
                self.add_to_set(&mut batch, &key, node)?;
                node_count += 1;
            }
        }

        let record = NodeRecord {
            id: node.get(),
            embedding,
            payload: payload.into_bytes(),
            key: key.value(),
            key_bits: key.bits(),
        };
        batch.put(node_key, record.to_bytes()?);

        let next = CollectionState {
            node_count,
            ..state.clone()
        };
        batch.put(keys::params_key(self.id), encode_state(&next)?);
        self.store.write_batch(batch)?;
        *state = next;

        Ok(key)
    }

    /// Removes a node and its index entry (the entry too, if it empties).
    ///
    /// # Errors
    /// `NodeNotFound` for an unknown id.
    pub fn remove(&self, node: NodeId) -> IndexResult<()> {
        let mut state = self.state.write();
        let node_key = keys::node_key(self.id, node);
        let bytes = self
            .store
            .get(&node_key)?
            .ok_or(IndexError::NodeNotFound {
                collection: self.id,
                node,
            })?;
        let key = NodeRecord::from_bytes(&bytes)?.ordering_key()?;

        let mut batch = WriteBatch::new();
        self.remove_from_set(&mut batch, &key, node)?;
        batch.delete(node_key);

        let next = CollectionState {
            node_count: state.node_count.saturating_sub(1),
            ..state.clone()
        };
        batch.put(keys::params_key(self.id), encode_state(&next)?);
        self.store.write_batch(batch)?;
        *state = next;

        Ok(())
    }

    fn add_to_set(&self, batch: &mut WriteBatch, key: &OrderingKey, node: NodeId) -> IndexResult<()> {
        let entry = keys::index_key(self.id, key);
        let mut ids = match self.store.get(&entry)? {
            Some(bytes) => keys::decode_node_set(&bytes)?,
            None => Vec::new(),
        };
        ids.push(node);
        batch.put(entry, keys::encode_node_set(&ids));
        Ok(())
    }

    fn remove_from_set(
        &self,
        batch: &mut WriteBatch,
        key: &OrderingKey,
        node: NodeId,
    ) -> IndexResult<()> {
        let entry = keys::index_key(self.id, key);
        let mut ids = match self.store.get(&entry)? {
            Some(bytes) => keys::decode_node_set(&bytes)?,
            None => Vec::new(),
        };
        ids.retain(|id| *id != node);
        if ids.is_empty() {
            batch.delete(entry);
        } else {
            batch.put(entry, keys::encode_node_set(&ids));
        }
        Ok(())
    }

    /// Entries with key in `[center - radius, center + radius]`, ascending by
    /// key then node id, truncated at `limit`.
    ///
    /// An unfitted (hence empty) collection yields nothing.
    pub fn range_scan(
        &self,
        center: OrderingKey,
        radius: u128,
        limit: usize,
    ) -> IndexResult<Vec<(OrderingKey, NodeId)>> {
        let state = self.state.read();
        let Some(params) = state.params.as_ref() else {
            return Ok(Vec::new());
        };
        self.check_key_width(&center, params)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let lo = keys::index_key(self.id, &center.saturating_sub(radius));
        let hi = keys::index_key(self.id, &center.saturating_add(radius));
        let entries = self.store.range(&lo, &hi, Some(limit))?;

        let mut out = Vec::with_capacity(limit.min(entries.len() * 2));
        'entries: for (raw, value) in entries {
            let key = keys::parse_index_key(self.id, &raw, params.key_bits())?;
            for node in keys::decode_node_set(&value)? {
                if out.len() == limit {
                    break 'entries;
                }
                out.push((key, node));
            }
        }
        Ok(out)
    }

    /// The `limit` entries within `radius` of `center` that are closest to it
    /// in key distance, ties broken by key then node id.
    ///
    /// Entries inside a smaller radius always sort before entries that only
    /// a larger radius reaches, so growing the radius never drops a result.
    pub fn scan_nearest(
        &self,
        center: OrderingKey,
        radius: u128,
        limit: usize,
    ) -> IndexResult<Vec<(OrderingKey, NodeId)>> {
        let state = self.state.read();
        let Some(params) = state.params.as_ref() else {
            return Ok(Vec::new());
        };
        self.check_key_width(&center, params)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let lo = center.saturating_sub(radius);
        let hi = center.saturating_add(radius);

        // Each entry holds at least one node, so `limit` entries per side suffice.
        let mut entries = self.store.range(
            &keys::index_key(self.id, &center),
            &keys::index_key(self.id, &hi),
            Some(limit),
        )?;
        if center.value() > lo.value() {
            let below = center.saturating_sub(1);
            entries.extend(self.store.range_rev(
                &keys::index_key(self.id, &lo),
                &keys::index_key(self.id, &below),
                Some(limit),
            )?);
        }

        let mut pairs = Vec::new();
        for (raw, value) in entries {
            let key = keys::parse_index_key(self.id, &raw, params.key_bits())?;
            for node in keys::decode_node_set(&value)? {
                pairs.push((key, node));
            }
        }
        pairs.sort_by(|a, b| {
            a.0.distance(&center)
                .cmp(&b.0.distance(&center))
                .then(a.0.cmp(&b.0))
                .then(a.1.cmp(&b.1))
        });
        pairs.truncate(limit);
        Ok(pairs)
    }

    fn check_key_width(&self, key: &OrderingKey, params: &QuantizationParams) -> IndexResult<()> {
        if key.bits() != params.key_bits() {
            return Err(VectorError::InvalidKey(format!(
                "{key} has {} bits, collection {} uses {}",
                key.bits(),
                self.id,
                params.key_bits()
            ))
            .into());
        }
        Ok(())
    }

    /// Ordering key a query embedding maps to under this collection's params.
    ///
    /// # Errors
    /// `NotFitted` for a collection that has never been fitted.
    pub fn key_for(&self, embedding: &[f32]) -> IndexResult<OrderingKey> {
        let state = self.state.read();
        let params = state.params.as_ref().ok_or(IndexError::NotFitted {
            collection: self.id,
        })?;
        Ok(ordering_key(embedding, params)?)
    }

    /// Point lookup of a node record.
    pub fn get(&self, node: NodeId) -> IndexResult<Option<StoredNode>> {
        let _guard = self.state.read();
        match self.store.get(&keys::node_key(self.id, node))? {
            Some(bytes) => Ok(Some(NodeRecord::from_bytes(&bytes)?.into_stored()?)),
            None => Ok(None),
        }
    }

    /// Looks up several nodes under one read lock, skipping unknown ids.
    pub fn get_many(&self, nodes: &[NodeId]) -> IndexResult<Vec<StoredNode>> {
        let _guard = self.state.read();
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            if let Some(bytes) = self.store.get(&keys::node_key(self.id, *node))? {
                out.push(NodeRecord::from_bytes(&bytes)?.into_stored()?);
            }
        }
        Ok(out)
    }

    /// Deletes every key owned by this collection. Returns the count removed.
    pub fn destroy(&self) -> IndexResult<usize> {
        let mut state = self.state.write();
        let removed = self
            .store
            .delete_prefix(&keys::collection_prefix(self.id))?;
        *state = CollectionState::default();
        Ok(removed)
    }
}

fn encode_state(state: &CollectionState) -> IndexResult<Vec<u8>> {
    Ok(serde_json::to_vec(state).map_err(StorageError::from)?)
}

fn sample_dimension(sample: &[Vec<f32>]) -> IndexResult<usize> {
    let first = sample.first().ok_or(VectorError::EmptySample)?.len();
    if let Some(bad) = sample.iter().find(|v| v.len() != first) {
        return Err(VectorError::InvalidDimension {
            expected: first,
            actual: bad.len(),
        }
        .into());
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::vector::{BitWidth, ReducedDimensions, ReductionStrategy};

    fn cid() -> CollectionId {
        CollectionId::new(1).unwrap()
    }

    fn nid(id: u32) -> NodeId {
        NodeId::new(id).unwrap()
    }

    fn quantizer() -> Quantizer {
        Quantizer::new(
            ReducedDimensions::new(2).unwrap(),
            BitWidth::new(4).unwrap(),
            ReductionStrategy::Truncate,
        )
    }

    /// 2D index with bounds [0, 15] so coordinates quantize to themselves.
    fn grid_index() -> (Arc<MemoryStore>, CollectionIndex) {
        let store = Arc::new(MemoryStore::new());
        let index = CollectionIndex::open(cid(), store.clone()).unwrap();
        index
            .fit(&quantizer(), &[vec![0.0, 0.0], vec![15.0, 15.0]])
            .unwrap();
        (store, index)
    }

    fn key(value: u128) -> OrderingKey {
        OrderingKey::new(value, 8).unwrap()
    }

    #[test]
    fn test_range_scan_three_points() {
        let (_, index) = grid_index();
        assert_eq!(
            index.insert(nid(1), vec![0.0, 0.0], Payload::empty()).unwrap(),
            key(0x00)
        );
        assert_eq!(
            index.insert(nid(2), vec![1.0, 1.0], Payload::empty()).unwrap(),
            key(0x03)
        );
        assert_eq!(
            index.insert(nid(3), vec![15.0, 15.0], Payload::empty()).unwrap(),
            key(0xff)
        );

        let hits = index.range_scan(key(0x00), 0x05, 10).unwrap();
        assert_eq!(hits, vec![(key(0x00), nid(1)), (key(0x03), nid(2))]);

        let hits = index.range_scan(key(0x00), 0xff, 2).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_collisions_share_one_entry() {
        let (store, index) = grid_index();
        index.insert(nid(7), vec![2.0, 2.0], Payload::empty()).unwrap();
        index.insert(nid(3), vec![2.0, 2.0], Payload::empty()).unwrap();

        let center = index.key_for(&[2.0, 2.0]).unwrap();
        let hits = index.range_scan(center, 0, 10).unwrap();
        assert_eq!(hits, vec![(center, nid(3)), (center, nid(7))]);
        assert_eq!(store.scan_prefix(&keys::index_prefix(cid())).unwrap().len(), 1);

        index.remove(nid(3)).unwrap();
        assert_eq!(index.range_scan(center, 0, 10).unwrap(), vec![(center, nid(7))]);
        index.remove(nid(7)).unwrap();
        assert!(store.scan_prefix(&keys::index_prefix(cid())).unwrap().is_empty());
    }

    #[test]
    fn test_removed_node_is_never_scanned() {
        let (_, index) = grid_index();
        let k = index.insert(nid(1), vec![4.0, 9.0], Payload::empty()).unwrap();
        index.remove(nid(1)).unwrap();

        assert!(index.range_scan(k, 0xff, 100).unwrap().is_empty());
        assert!(index.get(nid(1)).unwrap().is_none());
        assert_eq!(index.len(), 0);
        assert!(matches!(
            index.remove(nid(1)),
            Err(IndexError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn test_reinsert_moves_node() {
        let (_, index) = grid_index();
        let first = index.insert(nid(1), vec![0.0, 0.0], Payload::empty()).unwrap();
        let second = index
            .insert(nid(1), vec![15.0, 15.0], Payload::new(b"v2".to_vec()))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(index.len(), 1);
        assert!(index.range_scan(first, 0, 10).unwrap().is_empty());

        let node = index.get(nid(1)).unwrap().unwrap();
        assert_eq!(node.key, second);
        assert_eq!(node.payload.as_bytes(), b"v2");
    }

    #[test]
    fn test_insert_rejects_bad_vectors() {
        let (_, index) = grid_index();
        let err = index
            .insert(nid(1), vec![1.0, 2.0, 3.0], Payload::empty())
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::Vector(VectorError::InvalidDimension {
                expected: 2,
                actual: 3
            })
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_before_fit() {
        let store = Arc::new(MemoryStore::new());
        let index = CollectionIndex::open(cid(), store).unwrap();
        assert!(matches!(
            index.insert(nid(1), vec![0.0, 0.0], Payload::empty()),
            Err(IndexError::NotFitted { .. })
        ));
        assert!(index.range_scan(key(0), 10, 10).unwrap().is_empty());
    }

    #[test]
    fn test_scan_nearest_orders_by_distance() {
        let (_, index) = grid_index();
        // keys: (2,2)=0x0c, (3,3)=0x0f, (0,0)=0x00
        index.insert(nid(1), vec![0.0, 0.0], Payload::empty()).unwrap();
        index.insert(nid(2), vec![2.0, 2.0], Payload::empty()).unwrap();
        index.insert(nid(3), vec![3.0, 3.0], Payload::empty()).unwrap();

        let hits = index.scan_nearest(key(0x0d), 0x20, 2).unwrap();
        assert_eq!(hits, vec![(key(0x0c), nid(2)), (key(0x0f), nid(3))]);

        let wider = index.scan_nearest(key(0x0d), 0xff, 3).unwrap();
        assert_eq!(wider.len(), 3);
        assert_eq!(wider[2], (key(0x00), nid(1)));
    }

    #[test]
    fn test_reopen_restores_state() {
        let (store, index) = grid_index();
        index.insert(nid(1), vec![1.0, 1.0], Payload::empty()).unwrap();
        let params = index.params().unwrap();
        drop(index);

        let reopened = CollectionIndex::open(cid(), store).unwrap();
        assert_eq!(reopened.params(), Some(params));
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.state().embedding_dimension, Some(2));
    }

    #[test]
    fn test_missing_params_is_fatal() {
        let (store, index) = grid_index();
        index.insert(nid(1), vec![1.0, 1.0], Payload::empty()).unwrap();
        store.delete(&keys::params_key(cid())).unwrap();

        let err = CollectionIndex::open(cid(), store).unwrap_err();
        assert!(matches!(err, IndexError::MissingQuantizationParams { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_refit_reencodes_every_node() {
        let (_, index) = grid_index();
        index.insert(nid(1), vec![1.0, 1.0], Payload::empty()).unwrap();
        index.insert(nid(2), vec![3.0, 3.0], Payload::empty()).unwrap();

        let params = index.refit(1e-6).unwrap();
        assert_eq!(params.mins, vec![1.0, 1.0]);
        assert_eq!(params.maxs, vec![3.0, 3.0]);

        for id in [nid(1), nid(2)] {
            let node = index.get(id).unwrap().unwrap();
            assert_eq!(node.key, index.key_for(&node.embedding).unwrap());
            assert_eq!(index.range_scan(node.key, 0, 10).unwrap(), vec![(node.key, id)]);
        }
        // old keys are gone: (1,1) used to be 0x03
        assert!(index.range_scan(key(0x03), 0, 10).unwrap().is_empty());
    }

    #[test]
    fn test_destroy_removes_everything() {
        let (store, index) = grid_index();
        index.insert(nid(1), vec![1.0, 1.0], Payload::empty()).unwrap();
        assert!(index.destroy().unwrap() >= 3);
        assert!(store.scan_prefix(&keys::collection_prefix(cid())).unwrap().is_empty());
    }

    #[test]
    fn test_scans_never_see_half_written_entries() {
        let (store, index) = grid_index();
        let index = Arc::new(index);
        let resident = index.insert(nid(3), vec![9.0, 9.0], Payload::empty()).unwrap();
        let center = index.key_for(&[2.0, 2.0]).unwrap();

        std::thread::scope(|scope| {
            let writer = index.clone();
            scope.spawn(move || {
                for _ in 0..200 {
                    writer.insert(nid(1), vec![2.0, 2.0], Payload::empty()).unwrap();
                    writer.insert(nid(2), vec![2.0, 2.0], Payload::empty()).unwrap();
                    writer.remove(nid(1)).unwrap();
                    writer.remove(nid(2)).unwrap();
                }
            });

            let reader = index.clone();
            scope.spawn(move || {
                for _ in 0..200 {
                    let colliding = reader.range_scan(center, 0, 10).unwrap();
                    let nodes: Vec<u32> = colliding.iter().map(|(_, n)| n.get()).collect();
                    assert!(
                        [vec![], vec![1], vec![1, 2], vec![2]].contains(&nodes),
                        "unexpected node set {nodes:?}"
                    );
                    assert!(colliding.iter().all(|(k, _)| *k == center));

                    let all = reader.range_scan(key(0x00), 0xff, 100).unwrap();
                    assert!(all.contains(&(resident, nid(3))));
                    assert!(all.len() <= 3);
                }
            });
        });

        let entries: usize = store
            .scan_prefix(&keys::index_prefix(cid()))
            .unwrap()
            .iter()
            .map(|(_, value)| keys::decode_node_set(value).unwrap().len())
            .sum();
        assert_eq!(index.len(), 1);
        assert_eq!(entries as u64, index.len());
    }
}
