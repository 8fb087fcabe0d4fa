//! Collection lifecycle and query entry points.
//!
//! `SpaceEngine` wires the store, the registry and the per-collection indexes
//! together. Collections are created on first import and deleted with
//! everything they own.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::{EmbeddingConfig, Settings};
use crate::error::{IndexError, IndexResult, StorageError};
use crate::index::{CollectionIndex, IndexCache, StoredNode};
use crate::registry::{CollectionMeta, CollectionRegistry};
use crate::search::{
    FederatedQuery, FederatedResponse, FederatedSearch, IndexSearcher, NeighborResult,
    NeighborSearch, SearchEvents,
};
use crate::storage::{MemoryStore, OrderedStore};
use crate::types::{CollectionId, NodeId, Payload};
use crate::vector::{
    EmbeddingGenerator, FastEmbedGenerator, GuardedEmbedding, HashEmbeddingGenerator,
    QuantizationParams, Quantizer, VectorDimension, embed_with_fallback, parse_embedding_model,
};

/// Seed for picking the fit sample, so imports are reproducible.
const FIT_SAMPLE_SEED: u64 = 0x5eed_0f_5a3f_1e;

/// One node to import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub id: NodeId,
    pub embedding: Vec<f32>,
    pub payload: Payload,
}

/// Line format of an import file.
#[derive(Debug, Deserialize)]
struct ImportLine {
    id: u32,
    embedding: Vec<f32>,
    #[serde(default)]
    payload: serde_json::Value,
}

/// What one import call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub collection: Option<CollectionId>,
    pub created: bool,
    /// Bounds were fitted from this batch
    pub fitted: bool,
    pub inserted: usize,
    /// Records rejected for a malformed vector; the index is unchanged for them
    pub rejected: Vec<(NodeId, String)>,
}

pub struct SpaceEngine {
    settings: Arc<Settings>,
    store: Arc<MemoryStore>,
    registry: Arc<CollectionRegistry>,
    indexes: Arc<IndexCache>,
    generator: OnceLock<Arc<dyn EmbeddingGenerator>>,
    events: SearchEvents,
}

impl SpaceEngine {
    /// Opens the engine over the snapshot in `settings.data_path`.
    ///
    /// A missing snapshot starts an empty store.
    pub fn open(settings: Arc<Settings>) -> IndexResult<Self> {
        settings.validate()?;
        let store = MemoryStore::open(&settings.snapshot_path())?;
        Ok(Self::with_store(settings, Arc::new(store)))
    }

    /// Engine over an existing store. The embedding model loads on first use.
    pub fn with_store(settings: Arc<Settings>, store: Arc<MemoryStore>) -> Self {
        let shared: Arc<dyn OrderedStore> = store.clone();
        Self {
            settings,
            registry: Arc::new(CollectionRegistry::new(shared.clone())),
            indexes: Arc::new(IndexCache::new(shared)),
            store,
            generator: OnceLock::new(),
            events: SearchEvents::default(),
        }
    }

    /// Uses `generator` instead of the configured model.
    #[must_use]
    pub fn with_generator(self, generator: Arc<dyn EmbeddingGenerator>) -> Self {
        let _ = self.generator.set(generator);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub fn events(&self) -> &SearchEvents {
        &self.events
    }

    /// The embedding provider, loading the configured model on first call.
    pub fn generator(&self) -> Arc<dyn EmbeddingGenerator> {
        self.generator
            .get_or_init(|| build_generator(&self.settings.embedding, &self.settings.models_dir()))
            .clone()
    }

    /// Open index of an existing collection.
    ///
    /// # Errors
    /// `CollectionNotFound` for an id the registry does not know.
    pub fn index(&self, id: CollectionId) -> IndexResult<Arc<CollectionIndex>> {
        self.registry.get(id)?;
        self.indexes.get_or_open(id)
    }

    pub fn collections(&self) -> IndexResult<Vec<CollectionMeta>> {
        self.registry.list()
    }

    /// Imports nodes into the collection named `name`, creating it if needed.
    ///
    /// The first batch of a collection fits its quantization bounds from a
    /// seeded sample of at most `fit_sample_size` embeddings. Records with a
    /// malformed vector are reported in the summary and skipped.
    pub fn import(&self, name: &str, records: Vec<ImportRecord>) -> IndexResult<ImportSummary> {
        let (meta, created) = match self.registry.find_by_name(name)? {
            Some(meta) => (meta, false),
            None => (self.registry.create(name)?, true),
        };
        let index = self.indexes.get_or_open(meta.id)?;
        let mut summary = ImportSummary {
            collection: Some(meta.id),
            created,
            ..ImportSummary::default()
        };

        if index.params().is_none() {
            let sample = self.fit_sample(&records);
            if sample.is_empty() {
                tracing::debug!("[engine] nothing to fit collection {} from", meta.id);
                return Ok(summary);
            }
            let config = &self.settings.index;
            let fitted = config.dims().and_then(|dims| {
                let quantizer = Quantizer::new(dims, config.bits()?, config.reduction)
                    .with_epsilon(config.fit_epsilon);
                index.fit(&quantizer, &sample)
            });
            if let Err(e) = fitted {
                if created {
                    self.delete_collection(meta.id)?;
                }
                return Err(e);
            }
            summary.fitted = true;
        }

        for record in records {
            match index.insert(record.id, record.embedding, record.payload) {
                Ok(_) => summary.inserted += 1,
                Err(IndexError::Vector(e)) => {
                    tracing::warn!(
                        "[engine] rejected node {} for collection {}: {e}",
                        record.id,
                        meta.id
                    );
                    summary.rejected.push((record.id, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        self.registry.set_node_count(meta.id, index.len())?;
        tracing::info!(
            "[engine] imported {} nodes into '{name}' ({} rejected)",
            summary.inserted,
            summary.rejected.len()
        );
        Ok(summary)
    }

    /// Embeddings used to fit a new collection.
    ///
    /// Only finite vectors long enough to reduce take part, and of those only
    /// the most common length (earliest on a tie). Stray lines are rejected
    /// later on insert instead of deciding the collection's dimension.
    fn fit_sample(&self, records: &[ImportRecord]) -> Vec<Vec<f32>> {
        let reducible = |record: &&ImportRecord| {
            record.embedding.len() >= self.settings.index.reduced_dimensions
                && record.embedding.iter().all(|v| v.is_finite())
        };

        let mut lengths: Vec<(usize, usize)> = Vec::new();
        for record in records.iter().filter(reducible) {
            let len = record.embedding.len();
            match lengths.iter_mut().find(|(l, _)| *l == len) {
                Some((_, count)) => *count += 1,
                None => lengths.push((len, 1)),
            }
        }
        // max_by_key keeps the last maximum, so scan in reverse for the first
        let Some(&(dimension, _)) = lengths.iter().rev().max_by_key(|(_, count)| *count) else {
            return Vec::new();
        };

        let candidates: Vec<&ImportRecord> = records
            .iter()
            .filter(reducible)
            .filter(|record| record.embedding.len() == dimension)
            .collect();

        let size = self.settings.index.fit_sample_size;
        if candidates.len() <= size {
            return candidates.iter().map(|r| r.embedding.clone()).collect();
        }

        let mut rng = StdRng::seed_from_u64(FIT_SAMPLE_SEED);
        let mut picked = rand::seq::index::sample(&mut rng, candidates.len(), size).into_vec();
        picked.sort_unstable();
        picked
            .into_iter()
            .map(|i| candidates[i].embedding.clone())
            .collect()
    }

    /// Removes one node and updates the registry's node count.
    pub fn remove_node(&self, collection: CollectionId, node: NodeId) -> IndexResult<()> {
        let index = self.index(collection)?;
        index.remove(node)?;
        self.registry.set_node_count(collection, index.len())?;
        Ok(())
    }

    pub fn get_node(&self, collection: CollectionId, node: NodeId) -> IndexResult<Option<StoredNode>> {
        self.index(collection)?.get(node)
    }

    /// Re-fits bounds from every stored embedding of a collection.
    pub fn refit(&self, collection: CollectionId) -> IndexResult<QuantizationParams> {
        self.index(collection)?
            .refit(self.settings.index.fit_epsilon)
    }

    pub fn set_weight(&self, collection: CollectionId, weight: f32) -> IndexResult<CollectionMeta> {
        self.registry.set_weight(collection, weight)
    }

    pub fn set_active(&self, collection: CollectionId, active: bool) -> IndexResult<CollectionMeta> {
        self.registry.set_active(collection, active)
    }

    /// Deletes a collection, its index and all of its nodes.
    ///
    /// The registry row goes first so no new query picks the collection up,
    /// and the index is retired so a query already in flight cannot reopen it.
    ///
    /// Unknown ids are a no-op. Returns whether a collection was removed.
    pub fn delete_collection(&self, collection: CollectionId) -> IndexResult<bool> {
        let removed = self.registry.delete(collection)?;
        let removed_keys = match self.indexes.retire(collection) {
            Some(index) => index.destroy()?,
            None => self
                .store
                .delete_prefix(&crate::storage::keys::collection_prefix(collection))?,
        };
        if removed {
            tracing::info!(
                "[engine] deleted collection {collection} and {removed_keys} stored keys"
            );
        }
        Ok(removed)
    }

    /// Embeds query text, substituting a placeholder when the provider fails.
    pub async fn embed_query(&self, text: &str) -> GuardedEmbedding {
        embed_with_fallback(self.generator(), text, self.settings.embedding.timeout()).await
    }

    /// Neighbor search in one collection. A query that returns hits touches
    /// the collection.
    pub fn search(
        &self,
        collection: CollectionId,
        query: &[f32],
        k: usize,
        cancel: &CancellationToken,
    ) -> IndexResult<NeighborResult> {
        let index = self.index(collection)?;
        let result = NeighborSearch::new(self.settings.search.clone())
            .search(&index, query, k, cancel)?;
        if !result.hits.is_empty() {
            self.registry.touch(collection)?;
        }
        Ok(result)
    }

    /// Federated search across active collections.
    pub async fn federated(
        &self,
        query: FederatedQuery,
        cancel: CancellationToken,
    ) -> IndexResult<FederatedResponse> {
        let searcher = IndexSearcher::new(
            self.indexes.clone(),
            NeighborSearch::new(self.settings.search.clone()),
        );
        FederatedSearch::new(
            self.registry.clone(),
            Arc::new(searcher),
            self.settings.federation.clone(),
        )
        .with_events(self.events.clone())
        .search(query, cancel)
        .await
    }

    /// Writes the store snapshot to `data_path`.
    pub fn save(&self) -> IndexResult<()> {
        let path = self.settings.snapshot_path();
        self.store.save_snapshot(&path)?;
        tracing::debug!("[engine] snapshot saved to {}", path.display());
        Ok(())
    }
}

/// Picks the embedding provider for `config`.
///
/// A model that fails to load is replaced by the hash generator so queries
/// still get a vector.
pub fn build_generator(config: &EmbeddingConfig, models_dir: &Path) -> Arc<dyn EmbeddingGenerator> {
    let fallback = || -> Arc<dyn EmbeddingGenerator> {
        match VectorDimension::new(config.fallback_dimension) {
            Ok(dimension) => Arc::new(HashEmbeddingGenerator::new(dimension)),
            Err(_) => Arc::new(HashEmbeddingGenerator::default()),
        }
    };
    if config.use_mock {
        return fallback();
    }

    let loaded = parse_embedding_model(&config.model)
        .and_then(|model| FastEmbedGenerator::new(model, models_dir));
    match loaded {
        Ok(generator) => Arc::new(generator),
        Err(e) => {
            tracing::warn!("[engine] embedding model unavailable, using placeholder embeddings: {e}");
            fallback()
        }
    }
}

/// Reads an import file with one JSON object per line.
///
/// Blank lines are skipped.
///
/// # Errors
/// `FileRead` on I/O failure, a storage serialization error for malformed
/// lines or node id 0.
pub fn read_import_file(path: &Path) -> IndexResult<Vec<ImportRecord>> {
    let file = std::fs::File::open(path).map_err(|source| IndexError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| IndexError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: ImportLine = serde_json::from_str(&line).map_err(|e| {
            StorageError::Serialization(format!("{}:{}: {e}", path.display(), number + 1))
        })?;
        let id = NodeId::new(parsed.id).ok_or_else(|| {
            StorageError::Serialization(format!(
                "{}:{}: node id must be non-zero",
                path.display(),
                number + 1
            ))
        })?;
        let payload = if parsed.payload.is_null() {
            Payload::empty()
        } else {
            Payload::from_json(&parsed.payload).map_err(StorageError::from)?
        };
        records.push(ImportRecord {
            id,
            embedding: parsed.embedding,
            payload,
        });
    }
    Ok(records)
}
