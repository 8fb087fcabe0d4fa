//! Federated search across every active collection.
//!
//! Each collection is searched independently and concurrently. Its scores are
//! normalized by its own best score, then multiplied by the collection weight
//! and a freshness boost that decays with time since the collection was last
//! accessed. A collection that fails or times out contributes nothing; the
//! rest of the query goes on without it.

use std::cmp::Ordering;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::FederationConfig;
use crate::error::{IndexError, IndexResult};
use crate::index::IndexCache;
use crate::registry::{CollectionMeta, CollectionRegistry};
use crate::search::neighbor::{NeighborHit, NeighborSearch};
use crate::search::progress::{SearchEvent, SearchEvents};
use crate::types::{CollectionId, NodeId, get_utc_timestamp};

/// Runs the per-collection part of a federated query.
///
/// Called from a blocking thread. Implementations should check `cancel`
/// between expensive steps.
pub trait CollectionSearcher: Send + Sync + 'static {
    fn search(
        &self,
        collection: CollectionId,
        query: &[f32],
        k: usize,
        cancel: &CancellationToken,
    ) -> IndexResult<Vec<NeighborHit>>;
}

/// Searches collections through their ordering-key indexes.
#[derive(Debug)]
pub struct IndexSearcher {
    indexes: Arc<IndexCache>,
    neighbor: NeighborSearch,
}

impl IndexSearcher {
    pub fn new(indexes: Arc<IndexCache>, neighbor: NeighborSearch) -> Self {
        Self { indexes, neighbor }
    }
}

impl CollectionSearcher for IndexSearcher {
    fn search(
        &self,
        collection: CollectionId,
        query: &[f32],
        k: usize,
        cancel: &CancellationToken,
    ) -> IndexResult<Vec<NeighborHit>> {
        let index = self.indexes.get_or_open(collection)?;
        Ok(self.neighbor.search(&index, query, k, cancel)?.hits)
    }
}

/// A federated query.
#[derive(Debug, Clone)]
pub struct FederatedQuery {
    pub embedding: Vec<f32>,
    pub k: usize,
    /// Fewer responding collections marks the response as partial
    pub min_collections: usize,
    /// Restricts the fan-out to these collections (still only active ones)
    pub collections: Option<Vec<CollectionId>>,
}

impl FederatedQuery {
    pub fn new(embedding: Vec<f32>, k: usize) -> Self {
        Self {
            embedding,
            k,
            min_collections: 1,
            collections: None,
        }
    }

    #[must_use]
    pub fn with_min_collections(mut self, min_collections: usize) -> Self {
        self.min_collections = min_collections;
        self
    }

    #[must_use]
    pub fn with_allow_list(mut self, collections: Vec<CollectionId>) -> Self {
        self.collections = Some(collections);
        self
    }

    /// Whether this query fans out to `meta`: active, and on the allow-list
    /// when there is one.
    #[must_use]
    pub fn includes(&self, meta: &CollectionMeta) -> bool {
        meta.active
            && match &self.collections {
                Some(allowed) => allowed.contains(&meta.id),
                None => true,
            }
    }
}

/// One merged hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FederatedHit {
    pub collection: CollectionId,
    pub node: NodeId,
    /// normalized × weight × freshness boost
    pub score: f32,
    /// Cosine similarity as returned by the collection
    pub similarity: f32,
}

/// Merged hits plus per-collection diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FederatedResponse {
    pub hits: Vec<FederatedHit>,
    pub responded: Vec<CollectionId>,
    pub failed: Vec<(CollectionId, String)>,
    pub timed_out: Vec<CollectionId>,
    /// Fewer than `min_collections` collections responded
    pub partial: bool,
}

/// Weight and freshness scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scoring {
    pub freshness_amplitude: f32,
    pub freshness_decay_days: f32,
}

impl Scoring {
    /// `1 + amplitude * exp(-days / decay)`
    #[must_use]
    pub fn freshness_boost(&self, days_since_access: f32) -> f32 {
        let decay = self.freshness_decay_days.max(f32::MIN_POSITIVE);
        1.0 + self.freshness_amplitude * (-days_since_access.max(0.0) / decay).exp()
    }

    #[must_use]
    pub fn final_score(&self, normalized: f32, weight: f32, days_since_access: f32) -> f32 {
        normalized * weight * self.freshness_boost(days_since_access)
    }
}

impl From<&FederationConfig> for Scoring {
    fn from(config: &FederationConfig) -> Self {
        Self {
            freshness_amplitude: config.freshness_amplitude,
            freshness_decay_days: config.freshness_decay_days,
        }
    }
}

/// Normalizes, weights and merges per-collection hits.
///
/// The result does not depend on the order of `per_collection`.
pub fn merge_hits(
    per_collection: &[(CollectionMeta, Vec<NeighborHit>)],
    k: usize,
    scoring: &Scoring,
    now: u64,
) -> Vec<FederatedHit> {
    let mut merged = Vec::new();
    for (meta, hits) in per_collection {
        let max = hits
            .iter()
            .map(|hit| hit.score)
            .fold(f32::NEG_INFINITY, f32::max);
        let days = meta.days_since_access(now);

        for hit in hits {
            let normalized = if max > 0.0 { hit.score / max } else { hit.score };
            merged.push(FederatedHit {
                collection: meta.id,
                node: hit.node,
                score: scoring.final_score(normalized, meta.weight, days),
                similarity: hit.score,
            });
        }
    }

    merged.sort_by(rank_federated);
    merged.truncate(k);
    merged
}

/// Descending score, then lower collection id, then lower node id.
fn rank_federated(a: &FederatedHit, b: &FederatedHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.collection.cmp(&b.collection))
        .then(a.node.cmp(&b.node))
}

enum Outcome {
    Hits(Vec<NeighborHit>),
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Fans a query out to active collections and merges the results.
pub struct FederatedSearch {
    registry: Arc<CollectionRegistry>,
    searcher: Arc<dyn CollectionSearcher>,
    config: FederationConfig,
    events: SearchEvents,
}

impl FederatedSearch {
    pub fn new(
        registry: Arc<CollectionRegistry>,
        searcher: Arc<dyn CollectionSearcher>,
        config: FederationConfig,
    ) -> Self {
        Self {
            registry,
            searcher,
            config,
            events: SearchEvents::default(),
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: SearchEvents) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &SearchEvents {
        &self.events
    }

    /// Runs a federated query.
    ///
    /// Zero active collections yields an empty response, not an error.
    ///
    /// # Errors
    /// `Cancelled` if `cancel` fires before the merge; partial results are
    /// discarded. Registry failures while listing collections.
    pub async fn search(
        &self,
        query: FederatedQuery,
        cancel: CancellationToken,
    ) -> IndexResult<FederatedResponse> {
        let now = get_utc_timestamp();
        let mut targets = self.registry.list_active()?;
        targets.retain(|meta| query.includes(meta));

        if targets.is_empty() || query.k == 0 {
            tracing::debug!("[federation] nothing to search");
            self.events.send(SearchEvent::Completed {
                hits: 0,
                responded: 0,
                failed: 0,
                timed_out: 0,
            });
            return Ok(FederatedResponse {
                partial: query.min_collections > 0 && targets.is_empty(),
                ..FederatedResponse::default()
            });
        }

        let embedding = Arc::new(query.embedding);
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let timeout = self.config.collection_timeout();
        let mut tasks = JoinSet::new();

        for meta in targets {
            let searcher = self.searcher.clone();
            let embedding = embedding.clone();
            let permits = permits.clone();
            let child = cancel.child_token();
            let k = query.k;
            self.events
                .send(SearchEvent::CollectionStarted { collection: meta.id });

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (meta, Outcome::Cancelled);
                };
                let id = meta.id;
                let token = child.clone();
                let blocking = tokio::task::spawn_blocking(move || {
                    searcher.search(id, &embedding, k, &token)
                });

                let outcome = tokio::select! {
                    _ = child.cancelled() => Outcome::Cancelled,
                    joined = tokio::time::timeout(timeout, blocking) => match joined {
                        Err(_) => {
                            // stop the scan thread at its next check
                            child.cancel();
                            Outcome::TimedOut
                        }
                        Ok(Err(join)) => Outcome::Failed(format!("search task failed: {join}")),
                        Ok(Ok(Err(IndexError::Cancelled))) => Outcome::Cancelled,
                        Ok(Ok(Err(e))) => {
                            if e.is_fatal() {
                                tracing::error!("[federation] collection {id}: {e}");
                            }
                            Outcome::Failed(e.to_string())
                        }
                        Ok(Ok(Ok(hits))) => Outcome::Hits(hits),
                    },
                };
                (meta, outcome)
            });
        }

        let mut per_collection = Vec::new();
        let mut response = FederatedResponse::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    tracing::debug!("[federation] cancelled, discarding partial results");
                    return Err(IndexError::Cancelled);
                }
                next = tasks.join_next() => next,
            };
            let Some(joined) = next else { break };

            let (meta, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!("[federation] collection task aborted: {e}");
                    continue;
                }
            };

            match outcome {
                Outcome::Hits(hits) => {
                    self.events.send(SearchEvent::CollectionFinished {
                        collection: meta.id,
                        hits: hits.len(),
                        best: hits.first().map(|hit| hit.node),
                    });
                    response.responded.push(meta.id);
                    per_collection.push((meta, hits));
                }
                Outcome::Failed(reason) => {
                    tracing::warn!("[federation] collection {} failed: {reason}", meta.id);
                    self.events.send(SearchEvent::CollectionFailed {
                        collection: meta.id,
                        reason: reason.clone(),
                    });
                    response.failed.push((meta.id, reason));
                }
                Outcome::TimedOut => {
                    tracing::warn!(
                        "[federation] collection {} timed out after {}ms",
                        meta.id,
                        timeout.as_millis()
                    );
                    self.events
                        .send(SearchEvent::CollectionTimedOut { collection: meta.id });
                    response.timed_out.push(meta.id);
                }
                Outcome::Cancelled => {}
            }
        }

        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        let scoring = Scoring::from(&self.config);
        response.hits = merge_hits(&per_collection, query.k, &scoring, now);

        for (meta, hits) in &per_collection {
            if hits.is_empty() {
                continue;
            }
            if let Err(e) = self.registry.touch(meta.id) {
                tracing::warn!("[federation] could not touch collection {}: {e}", meta.id);
            }
        }

        response.responded.sort();
        response.failed.sort_by_key(|(id, _)| *id);
        response.timed_out.sort();
        response.partial = response.responded.len() < query.min_collections;
        if response.partial {
            tracing::warn!(
                "[federation] only {} of the requested minimum {} collections responded",
                response.responded.len(),
                query.min_collections
            );
        }

        self.events.send(SearchEvent::Completed {
            hits: response.hits.len(),
            responded: response.responded.len(),
            failed: response.failed.len(),
            timed_out: response.timed_out.len(),
        });
        Ok(response)
    }
}
