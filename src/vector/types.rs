//! Type-safe wrappers and core types for the vector layer.
//!
//! These newtypes keep embedding lengths, reduced dimensions and bit widths
//! from being mixed up, and validate their ranges once at construction.

use thiserror::Error;

/// Default embedding length produced by the AllMiniLML6V2 model.
pub const VECTOR_DIMENSION_384: usize = 384;

/// Smallest supported number of reduced dimensions.
pub const MIN_REDUCED_DIMENSIONS: usize = 2;

/// Largest supported number of reduced dimensions.
pub const MAX_REDUCED_DIMENSIONS: usize = 8;

/// Largest supported bit width per reduced dimension.
pub const MAX_BIT_WIDTH: u32 = 16;

/// Ordering keys are held in a u128; 8 dimensions of 16 bits fill it exactly.
pub const MAX_KEY_BITS: u32 = 128;

/// Length of a full embedding vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension`. Zero is rejected.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                expected: 1,
                actual: 0,
            });
        }
        Ok(Self(dim))
    }

    /// Standard 384-dimensional embeddings.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has exactly this many components.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::InvalidDimension {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Number of dimensions of a reduced vector (D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct ReducedDimensions(usize);

impl ReducedDimensions {
    pub fn new(dims: usize) -> Result<Self, VectorError> {
        if !(MIN_REDUCED_DIMENSIONS..=MAX_REDUCED_DIMENSIONS).contains(&dims) {
            return Err(VectorError::UnsupportedReducedDimensions(dims));
        }
        Ok(Self(dims))
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }
}

impl TryFrom<usize> for ReducedDimensions {
    type Error = VectorError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ReducedDimensions> for usize {
    fn from(value: ReducedDimensions) -> Self {
        value.0
    }
}

/// Bits per quantized coordinate (B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BitWidth(u32);

impl BitWidth {
    pub fn new(bits: u32) -> Result<Self, VectorError> {
        if bits == 0 || bits > MAX_BIT_WIDTH {
            return Err(VectorError::InvalidBitWidth(bits));
        }
        Ok(Self(bits))
    }

    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Largest quantized value, `2^B - 1`.
    #[must_use]
    pub const fn max_value(&self) -> u32 {
        (1u32 << self.0) - 1
    }
}

impl TryFrom<u32> for BitWidth {
    type Error = VectorError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BitWidth> for u32 {
    fn from(value: BitWidth) -> Self {
        value.0
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    InvalidDimension { expected: usize, actual: usize },

    #[error(
        "Embedding has {actual} components but {required} reduced dimensions were requested\nSuggestion: Use fewer reduced dimensions or a larger embedding model"
    )]
    InsufficientDimensions { required: usize, actual: usize },

    #[error(
        "Unsupported reduced dimension count: {0}\nSuggestion: Choose between 2 and 8 dimensions"
    )]
    UnsupportedReducedDimensions(usize),

    #[error("Invalid bit width: {0}\nSuggestion: Use a bit width between 1 and 16")]
    InvalidBitWidth(u32),

    #[error("Quantized coordinate {value} does not fit in {bits} bits")]
    CoordinateOverflow { value: u32, bits: u32 },

    #[error("Invalid ordering key '{0}'\nSuggestion: Keys are fixed-width lowercase hex strings")]
    InvalidKey(String),

    #[error("Vector contains a non-finite value at position {0}")]
    NonFinite(usize),

    #[error("Cannot fit quantization parameters from an empty sample")]
    EmptySample,

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),
}

pub type VectorResult<T> = Result<T, VectorError>;
