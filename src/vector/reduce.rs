//! Dimensionality reduction from full embeddings to a handful of coordinates.
//!
//! A collection picks exactly one strategy when it is created and records the
//! tag next to its quantization parameters. Both strategies are deterministic
//! and linear in the embedding length.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::vector::types::{ReducedDimensions, VectorError, VectorResult};

/// Pluggable reduction from an embedding to `dims` coordinates.
pub trait Reducer: Send + Sync {
    /// Reduces `embedding` to exactly `dims` coordinates.
    ///
    /// # Errors
    /// `InsufficientDimensions` when the embedding is shorter than `dims`,
    /// `NonFinite` when it contains NaN or infinity.
    fn reduce(&self, embedding: &[f32], dims: ReducedDimensions) -> VectorResult<Vec<f32>>;
}

/// Reduction strategies available to a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionStrategy {
    /// Keep the first D components.
    Truncate,
    /// Split into D near-equal contiguous blocks and average each.
    #[default]
    BlockAverage,
}

impl ReductionStrategy {
    /// Stable tag persisted with the collection.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Truncate => "truncate",
            Self::BlockAverage => "block_average",
        }
    }
}

impl fmt::Display for ReductionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReductionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "truncate" | "truncation" => Ok(Self::Truncate),
            "block_average" | "block-average" | "average" => Ok(Self::BlockAverage),
            other => Err(format!(
                "Unknown reduction strategy '{other}'. Expected 'truncate' or 'block_average'"
            )),
        }
    }
}

impl Reducer for ReductionStrategy {
    fn reduce(&self, embedding: &[f32], dims: ReducedDimensions) -> VectorResult<Vec<f32>> {
        let d = dims.get();
        if embedding.len() < d {
            return Err(VectorError::InsufficientDimensions {
                required: d,
                actual: embedding.len(),
            });
        }
        if let Some(pos) = embedding.iter().position(|v| !v.is_finite()) {
            return Err(VectorError::NonFinite(pos));
        }

        match self {
            Self::Truncate => Ok(embedding[..d].to_vec()),
            Self::BlockAverage => Ok(block_average(embedding, d)),
        }
    }
}

/// Block `i` covers `[i*len/d, (i+1)*len/d)`, so block sizes differ by at most one.
fn block_average(embedding: &[f32], d: usize) -> Vec<f32> {
    let len = embedding.len();
    (0..d)
        .map(|i| {
            let start = i * len / d;
            let end = (i + 1) * len / d;
            let block = &embedding[start..end];
            let sum: f64 = block.iter().map(|&v| f64::from(v)).sum();
            (sum / block.len() as f64) as f32
        })
        .collect()
}
