//! Per-collection scalar quantization of reduced vectors.
//!
//! `fit` derives per-dimension bounds from a sample once per collection. After
//! that, `quantize` linearly maps each coordinate into `[0, 2^B - 1]`. Values
//! outside the fitted bounds are clamped, never rejected, so every vector still
//! lands somewhere on the curve.

use serde::{Deserialize, Serialize};

use crate::vector::reduce::{Reducer, ReductionStrategy};
use crate::vector::types::{BitWidth, ReducedDimensions, VectorError, VectorResult};

/// Default widening applied to degenerate (min == max) ranges.
pub const DEFAULT_FIT_EPSILON: f32 = 1e-6;

/// Quantization parameters persisted with a collection.
///
/// Everything needed to recompute a node's ordering key from its embedding:
/// the reduction tag, D, B and the per-dimension bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationParams {
    pub dims: ReducedDimensions,
    pub bits: BitWidth,
    pub strategy: ReductionStrategy,
    pub mins: Vec<f32>,
    pub maxs: Vec<f32>,
}

impl QuantizationParams {
    /// Builds params from explicit bounds.
    ///
    /// # Errors
    /// `InvalidDimension` when the bound vectors are not D long,
    /// `NonFinite` when a bound is NaN or infinite.
    pub fn new(
        dims: ReducedDimensions,
        bits: BitWidth,
        strategy: ReductionStrategy,
        mins: Vec<f32>,
        maxs: Vec<f32>,
    ) -> VectorResult<Self> {
        for bounds in [&mins, &maxs] {
            if bounds.len() != dims.get() {
                return Err(VectorError::InvalidDimension {
                    expected: dims.get(),
                    actual: bounds.len(),
                });
            }
        }
        if let Some(pos) = mins
            .iter()
            .chain(maxs.iter())
            .position(|v| !v.is_finite())
        {
            return Err(VectorError::NonFinite(pos % dims.get()));
        }

        Ok(Self {
            dims,
            bits,
            strategy,
            mins,
            maxs,
        })
    }

    /// Total key width in bits, D×B.
    #[must_use]
    pub fn key_bits(&self) -> u32 {
        self.dims.get() as u32 * self.bits.get()
    }

    /// Checks the bounds against D.
    pub fn validate(&self) -> VectorResult<()> {
        Self::new(
            self.dims,
            self.bits,
            self.strategy,
            self.mins.clone(),
            self.maxs.clone(),
        )
        .map(|_| ())
    }
}

/// Fits and applies quantization parameters.
#[derive(Debug, Clone)]
pub struct Quantizer {
    dims: ReducedDimensions,
    bits: BitWidth,
    strategy: ReductionStrategy,
    epsilon: f32,
}

impl Quantizer {
    #[must_use]
    pub fn new(dims: ReducedDimensions, bits: BitWidth, strategy: ReductionStrategy) -> Self {
        Self {
            dims,
            bits,
            strategy,
            epsilon: DEFAULT_FIT_EPSILON,
        }
    }

    /// Overrides the widening applied to degenerate ranges.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon.abs().max(f32::MIN_POSITIVE);
        self
    }

    /// Computes per-dimension bounds across a sample of reduced vectors.
    ///
    /// Dimensions whose sample range collapses to a point are widened by the
    /// configured epsilon on both sides.
    ///
    /// # Errors
    /// `EmptySample`, `InvalidDimension` for a vector that is not D long,
    /// `NonFinite` for NaN or infinite coordinates.
    pub fn fit(&self, sample: &[Vec<f32>]) -> VectorResult<QuantizationParams> {
        if sample.is_empty() {
            return Err(VectorError::EmptySample);
        }

        let d = self.dims.get();
        let mut mins = vec![f32::INFINITY; d];
        let mut maxs = vec![f32::NEG_INFINITY; d];

        for vector in sample {
            if vector.len() != d {
                return Err(VectorError::InvalidDimension {
                    expected: d,
                    actual: vector.len(),
                });
            }
            for (i, &value) in vector.iter().enumerate() {
                if !value.is_finite() {
                    return Err(VectorError::NonFinite(i));
                }
                mins[i] = mins[i].min(value);
                maxs[i] = maxs[i].max(value);
            }
        }

        for (min, max) in mins.iter_mut().zip(maxs.iter_mut()) {
            if *max - *min < self.epsilon {
                *min -= self.epsilon;
                *max += self.epsilon;
            }
        }

        QuantizationParams::new(self.dims, self.bits, self.strategy, mins, maxs)
    }

    /// Reduces full embeddings with the configured strategy, then fits.
    ///
    /// # Errors
    /// Any reduction error, plus everything [`Quantizer::fit`] returns.
    pub fn fit_embeddings(&self, embeddings: &[Vec<f32>]) -> VectorResult<QuantizationParams> {
        let reduced = embeddings
            .iter()
            .map(|embedding| self.strategy.reduce(embedding, self.dims))
            .collect::<VectorResult<Vec<_>>>()?;
        self.fit(&reduced)
    }
}

/// Maps a reduced vector onto the integer grid described by `params`.
///
/// # Errors
/// `InvalidDimension` if `vector.len() != D`, `NonFinite` for NaN input.
pub fn quantize(vector: &[f32], params: &QuantizationParams) -> VectorResult<Vec<u32>> {
    let d = params.dims.get();
    if vector.len() != d {
        return Err(VectorError::InvalidDimension {
            expected: d,
            actual: vector.len(),
        });
    }

    let max_value = f64::from(params.bits.max_value());
    vector
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            if value.is_nan() {
                return Err(VectorError::NonFinite(i));
            }
            let min = f64::from(params.mins[i]);
            let max = f64::from(params.maxs[i]);
            let range = max - min;
            let t = if range > 0.0 {
                ((f64::from(value) - min) / range).clamp(0.0, 1.0)
            } else {
                0.0
            };
            Ok((t * max_value).round() as u32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quantizer(d: usize, b: u32) -> Quantizer {
        Quantizer::new(
            ReducedDimensions::new(d).unwrap(),
            BitWidth::new(b).unwrap(),
            ReductionStrategy::Truncate,
        )
    }

    #[test]
    fn test_fit_bounds() {
        let sample = vec![vec![0.0, -1.0], vec![2.0, 1.0], vec![1.0, 0.0]];
        let params = quantizer(2, 4).fit(&sample).unwrap();
        assert_eq!(params.mins, vec![0.0, -1.0]);
        assert_eq!(params.maxs, vec![2.0, 1.0]);
        assert_eq!(params.key_bits(), 8);
    }

    #[test]
    fn test_fit_widens_degenerate_range() {
        let sample = vec![vec![0.5, 0.0], vec![0.5, 1.0]];
        let params = quantizer(2, 4).with_epsilon(0.01).fit(&sample).unwrap();
        assert!((params.mins[0] - 0.49).abs() < 1e-6);
        assert!((params.maxs[0] - 0.51).abs() < 1e-6);
        assert!(params.maxs[0] > params.mins[0]);
    }

    #[test]
    fn test_fit_errors() {
        let q = quantizer(2, 4);
        assert_eq!(q.fit(&[]), Err(VectorError::EmptySample));
        assert_eq!(
            q.fit(&[vec![1.0, 2.0, 3.0]]),
            Err(VectorError::InvalidDimension {
                expected: 2,
                actual: 3
            })
        );
        assert_eq!(
            q.fit(&[vec![1.0, f32::INFINITY]]),
            Err(VectorError::NonFinite(1))
        );
    }

    #[test]
    fn test_quantize_endpoints_and_midpoint() {
        let params = quantizer(2, 4)
            .fit(&[vec![0.0, 0.0], vec![1.0, 1.0]])
            .unwrap();
        assert_eq!(quantize(&[0.0, 1.0], &params).unwrap(), vec![0, 15]);
        assert_eq!(quantize(&[0.5, 0.5], &params).unwrap(), vec![8, 8]);
    }

    #[test]
    fn test_quantize_clamps_out_of_range() {
        let params = quantizer(2, 8)
            .fit(&[vec![0.0, 0.0], vec![1.0, 1.0]])
            .unwrap();
        assert_eq!(quantize(&[-10.0, 10.0], &params).unwrap(), vec![0, 255]);
    }

    #[test]
    fn test_quantize_preserves_order() {
        let params = quantizer(2, 8)
            .fit(&[vec![-1.0, -1.0], vec![1.0, 1.0]])
            .unwrap();
        let mut previous = 0;
        for step in 0..=20 {
            let x = -1.0 + step as f32 * 0.1;
            let q = quantize(&[x, 0.0], &params).unwrap()[0];
            assert!(q >= previous);
            previous = q;
        }
    }

    #[test]
    fn test_quantize_wrong_length() {
        let params = quantizer(3, 4)
            .fit(&[vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]])
            .unwrap();
        assert_eq!(
            quantize(&[0.5, 0.5], &params),
            Err(VectorError::InvalidDimension {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_fit_embeddings_reduces_first() {
        let params = Quantizer::new(
            ReducedDimensions::new(2).unwrap(),
            BitWidth::new(4).unwrap(),
            ReductionStrategy::BlockAverage,
        )
        .fit_embeddings(&[vec![0.0, 0.0, 2.0, 2.0], vec![1.0, 1.0, 4.0, 4.0]])
        .unwrap();
        assert_eq!(params.mins, vec![0.0, 2.0]);
        assert_eq!(params.maxs, vec![1.0, 4.0]);
        assert_eq!(params.strategy, ReductionStrategy::BlockAverage);
    }

    #[test]
    fn test_params_roundtrip_json() {
        let params = quantizer(2, 4)
            .fit(&[vec![0.0, 0.0], vec![1.0, 2.0]])
            .unwrap();
        let json = serde_json::to_string(&params).unwrap();
        let restored: QuantizationParams = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, params);
        assert!(restored.validate().is_ok());
    }
}
