//! Vector layer: reduction, quantization and space-filling-curve encoding.
//!
//! An embedding travels `reduce -> quantize -> encode` to become an
//! [`OrderingKey`]. Every step is pure given the collection's
//! [`QuantizationParams`], so a node's key can always be recomputed.

mod curve;
mod embedding;
mod quantize;
mod reduce;
mod similarity;
mod types;

pub use curve::{OrderingKey, decode, encode};
pub use embedding::{
    EmbeddingGenerator, FastEmbedGenerator, GuardedEmbedding, HashEmbeddingGenerator,
    embed_with_fallback, parse_embedding_model, placeholder_embedding,
};
pub use quantize::{DEFAULT_FIT_EPSILON, QuantizationParams, Quantizer, quantize};
pub use reduce::{Reducer, ReductionStrategy};
pub use similarity::{cosine_similarity, normalize_vector};
pub use types::{
    BitWidth, MAX_BIT_WIDTH, MAX_KEY_BITS, MAX_REDUCED_DIMENSIONS, MIN_REDUCED_DIMENSIONS,
    ReducedDimensions, VECTOR_DIMENSION_384, VectorDimension, VectorError, VectorResult,
};

/// Runs the full `reduce -> quantize -> encode` pipeline for one embedding.
///
/// # Errors
/// Any reduction, quantization or encoding failure.
pub fn ordering_key(embedding: &[f32], params: &QuantizationParams) -> VectorResult<OrderingKey> {
    let reduced = params.strategy.reduce(embedding, params.dims)?;
    let coords = quantize(&reduced, params)?;
    encode(&coords, params.bits)
}
