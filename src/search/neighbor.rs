//! Approximate nearest-neighbor search over one collection.
//!
//! The query is encoded to a center key. Scans start at a small radius around
//! it and widen geometrically until at least k distinct candidates turn up.
//! Candidates are then re-ranked by cosine similarity on full embeddings.

use std::cmp::Ordering;

use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::error::{IndexError, IndexResult};
use crate::index::CollectionIndex;
use crate::types::NodeId;
use crate::vector::{OrderingKey, VectorDimension, cosine_similarity};

/// One re-ranked hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborHit {
    pub node: NodeId,
    /// Cosine similarity on full embeddings
    pub score: f32,
}

/// Result of one neighbor search, with scan diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborResult {
    pub hits: Vec<NeighborHit>,
    /// Number of times the radius grew after the first scan
    pub widenings: u32,
    /// Distinct candidates re-ranked
    pub candidates: usize,
    pub final_radius: u128,
}

/// Radius-adaptive range-scan search.
#[derive(Debug, Clone)]
pub struct NeighborSearch {
    config: SearchConfig,
}

impl NeighborSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Scan limit for a request of `k` results.
    #[must_use]
    pub fn scan_limit(&self, k: usize) -> usize {
        k.saturating_mul(self.config.candidate_multiplier)
            .max(self.config.min_scan_limit)
            .max(k)
    }

    /// Radius of the first scan for a keyspace of `key_bits` bits.
    #[must_use]
    pub fn initial_radius(&self, key_bits: u32) -> u128 {
        let keyspace = OrderingKey::max_value(key_bits);
        keyspace
            .checked_shr(self.config.initial_radius_shift)
            .unwrap_or(0)
            .max(1)
    }

    /// Up to `k` nodes ordered by descending cosine similarity.
    ///
    /// Returns every node when the collection holds fewer than `k`. An empty
    /// or never-fitted collection yields an empty result.
    ///
    /// # Errors
    /// `InvalidDimension` for a query of the wrong length, `Cancelled` if
    /// `cancel` fires; partial results are discarded.
    pub fn search(
        &self,
        index: &CollectionIndex,
        query: &[f32],
        k: usize,
        cancel: &CancellationToken,
    ) -> IndexResult<NeighborResult> {
        let state = index.state();
        let Some(params) = state.params else {
            return Ok(NeighborResult::default());
        };
        if k == 0 || state.node_count == 0 {
            return Ok(NeighborResult::default());
        }
        if let Some(dimension) = state.embedding_dimension {
            VectorDimension::new(dimension)?.validate_vector(query)?;
        }

        let center = index.key_for(query)?;
        let keyspace = OrderingKey::max_value(params.key_bits());
        let limit = self.scan_limit(k);
        let growth = u128::from(self.config.growth_factor.max(2));
        let max_widenings = self.config.max_widenings.max(1);

        let mut radius = self.initial_radius(params.key_bits());
        let mut widenings = 0;
        let candidates = loop {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            let found = index.scan_nearest(center, radius, limit)?;
            if found.len() >= k || radius >= keyspace || widenings == max_widenings {
                break found;
            }

            widenings += 1;
            // The last widening spans the whole keyspace, so sparse collections
            // still return min(k, total) nodes.
            radius = if widenings == max_widenings {
                keyspace
            } else {
                radius.saturating_mul(growth).min(keyspace)
            };
            tracing::debug!(
                "[search] collection {}: {} of {k} candidates, widening to radius {radius:#x}",
                index.id(),
                found.len()
            );
        };

        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        let ids: Vec<NodeId> = candidates.iter().map(|(_, node)| *node).collect();
        let mut hits: Vec<NeighborHit> = index
            .get_many(&ids)?
            .into_iter()
            .map(|node| NeighborHit {
                node: node.id,
                score: cosine_similarity(query, &node.embedding),
            })
            .collect();
        hits.sort_by(rank_hits);
        hits.truncate(k);

        Ok(NeighborResult {
            hits,
            widenings,
            candidates: ids.len(),
            final_radius: radius,
        })
    }
}

/// Descending score, then ascending node id.
fn rank_hits(a: &NeighborHit, b: &NeighborHit) -> Ordering {
    b.score.total_cmp(&a.score).then(a.node.cmp(&b.node))
}
