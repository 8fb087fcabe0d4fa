//! Z-order (Morton) encoding of quantized coordinates into ordering keys.
//!
//! Bits are interleaved round-robin, most significant bit first: the top bit
//! of coordinate 0, then the top bit of coordinate 1, and so on down to the
//! lowest bits. Nearby points on the grid tend to get numerically close keys,
//! which is what makes neighborhood range scans useful. Points that straddle a
//! curve discontinuity can end up far apart; search widens to compensate.

use std::cmp::Ordering;
use std::fmt;

use crate::vector::types::{BitWidth, MAX_KEY_BITS, ReducedDimensions, VectorError, VectorResult};

/// A D×B-bit ordering key.
///
/// The canonical text form is zero-padded lowercase hex of `ceil(D×B / 4)`
/// digits, so byte-wise comparison of two keys of the same width matches
/// their numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderingKey {
    value: u128,
    bits: u32,
}

impl OrderingKey {
    /// Wraps a raw value. Fails if it does not fit in `bits`.
    pub fn new(value: u128, bits: u32) -> VectorResult<Self> {
        if bits == 0 || bits > MAX_KEY_BITS || value > Self::max_value(bits) {
            return Err(VectorError::InvalidKey(format!("{value:#x} ({bits} bits)")));
        }
        Ok(Self { value, bits })
    }

    /// Largest key representable in `bits`.
    #[must_use]
    pub fn max_value(bits: u32) -> u128 {
        if bits >= 128 {
            u128::MAX
        } else {
            (1u128 << bits) - 1
        }
    }

    #[must_use]
    pub fn value(&self) -> u128 {
        self.value
    }

    #[must_use]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of hex digits in the canonical form.
    #[must_use]
    pub fn hex_width(bits: u32) -> usize {
        bits.div_ceil(4) as usize
    }

    /// Canonical fixed-width hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!(
            "{:0width$x}",
            self.value,
            width = Self::hex_width(self.bits)
        )
    }

    /// Parses the canonical hex form for a key of `bits` width.
    pub fn from_hex(hex: &str, bits: u32) -> VectorResult<Self> {
        if hex.len() != Self::hex_width(bits)
            || !hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(VectorError::InvalidKey(hex.to_string()));
        }
        let value =
            u128::from_str_radix(hex, 16).map_err(|_| VectorError::InvalidKey(hex.to_string()))?;
        Self::new(value, bits)
    }

    /// Lower end of `[self - radius, self + radius]`, clamped at zero.
    #[must_use]
    pub fn saturating_sub(&self, radius: u128) -> Self {
        Self {
            value: self.value.saturating_sub(radius),
            bits: self.bits,
        }
    }

    /// Upper end of `[self - radius, self + radius]`, clamped at the key maximum.
    #[must_use]
    pub fn saturating_add(&self, radius: u128) -> Self {
        Self {
            value: self
                .value
                .saturating_add(radius)
                .min(Self::max_value(self.bits)),
            bits: self.bits,
        }
    }

    /// Absolute numeric distance between two keys.
    #[must_use]
    pub fn distance(&self, other: &Self) -> u128 {
        self.value.abs_diff(other.value)
    }
}

impl PartialOrd for OrderingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .cmp(&other.value)
            .then(self.bits.cmp(&other.bits))
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Interleaves D quantized coordinates of `bits` each into one key.
///
/// # Errors
/// `UnsupportedReducedDimensions` for an out-of-range D,
/// `CoordinateOverflow` when a coordinate needs more than `bits` bits.
pub fn encode(coords: &[u32], bits: BitWidth) -> VectorResult<OrderingKey> {
    let dims = ReducedDimensions::new(coords.len())?;
    let b = bits.get();
    if let Some(&value) = coords.iter().find(|&&c| c > bits.max_value()) {
        return Err(VectorError::CoordinateOverflow { value, bits: b });
    }

    let mut key: u128 = 0;
    for bit in (0..b).rev() {
        for &coord in coords {
            key = (key << 1) | u128::from((coord >> bit) & 1);
        }
    }

    OrderingKey::new(key, dims.get() as u32 * b)
}

/// Splits a key back into its D coordinates. Exact inverse of [`encode`].
///
/// # Errors
/// `InvalidKey` when the key width is not D×B.
pub fn decode(key: OrderingKey, dims: ReducedDimensions, bits: BitWidth) -> VectorResult<Vec<u32>> {
    let d = dims.get();
    let b = bits.get();
    if key.bits() != d as u32 * b {
        return Err(VectorError::InvalidKey(format!(
            "{key} has {} bits, expected {}",
            key.bits(),
            d as u32 * b
        )));
    }

    let mut coords = vec![0u32; d];
    let mut position = key.bits();
    for bit in (0..b).rev() {
        for coord in coords.iter_mut() {
            position -= 1;
            let value = ((key.value() >> position) & 1) as u32;
            *coord |= value << bit;
        }
    }
    Ok(coords)
}
