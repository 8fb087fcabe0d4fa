//! Identifier newtypes and the opaque node payload.
//!
//! Ids wrap `NonZeroU32` so that zero never appears as a valid identifier,
//! and serialize to fixed-width hex so stored keys sort numerically.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

/// Identifier of a collection ("project") in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionId(NonZeroU32);

impl CollectionId {
    /// Creates a new `CollectionId`. Returns `None` for zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Fixed-width hex form used inside store keys.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("{:08x}", self.0.get())
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a node within its collection.
///
/// Node ids come from the import pipeline and are only unique per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    /// Creates a new `NodeId`. Returns `None` for zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Converts to little-endian bytes for storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.get().to_le_bytes()
    }

    /// Creates from little-endian bytes. Returns `None` if the bytes encode zero.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::new(u32::from_le_bytes(bytes))
    }

    /// Fixed-width hex form used inside store keys.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("{:08x}", self.0.get())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque node payload.
///
/// The index stores these bytes next to the embedding and hands them back
/// untouched. Helpers exist for callers that keep JSON documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload(Vec<u8>);

impl Payload {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Serializes any value to a JSON payload.
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self)
    }

    /// Deserializes the payload as JSON.
    pub fn to_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Current UTC time as Unix seconds.
pub fn get_utc_timestamp() -> u64 {
    Utc::now().timestamp() as u64
}
