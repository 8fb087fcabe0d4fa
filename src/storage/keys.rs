//! Store key layout.
//!
//! Every id inside a key is fixed-width lowercase hex, so byte order of keys
//! equals numeric order of the ids and ordering keys they contain.
//!
//! ```text
//! m/<name>                         global metadata (id counters)
//! r/<cid>                          registry row (CollectionMeta, JSON)
//! c/<cid>/p                        collection state (QuantizationParams, JSON)
//! c/<cid>/k/<ordering-key-hex>     node-id set for one ordering key
//! c/<cid>/n/<nid>                  node record (bincode)
//! ```

use std::fmt;

use crate::error::{StorageError, StorageResult};
use crate::types::{CollectionId, NodeId};
use crate::vector::{OrderingKey, VectorResult};

pub const REGISTRY_PREFIX: &[u8] = b"r/";

/// Strongly-typed metadata keys to avoid string literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    /// Counter for next collection ID
    CollectionCounter,
}

impl MetadataKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectionCounter => "collection_counter",
        }
    }

    pub fn key(&self) -> Vec<u8> {
        format!("m/{}", self.as_str()).into_bytes()
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn registry_key(id: CollectionId) -> Vec<u8> {
    format!("r/{}", id.to_hex()).into_bytes()
}

/// Parses the collection id back out of a registry key.
pub fn parse_registry_key(key: &[u8]) -> Option<CollectionId> {
    let hex = std::str::from_utf8(key.strip_prefix(REGISTRY_PREFIX)?).ok()?;
    CollectionId::new(u32::from_str_radix(hex, 16).ok()?)
}

/// Everything owned by one collection.
pub fn collection_prefix(id: CollectionId) -> Vec<u8> {
    format!("c/{}/", id.to_hex()).into_bytes()
}

pub fn params_key(id: CollectionId) -> Vec<u8> {
    format!("c/{}/p", id.to_hex()).into_bytes()
}

pub fn index_prefix(id: CollectionId) -> Vec<u8> {
    format!("c/{}/k/", id.to_hex()).into_bytes()
}

pub fn index_key(id: CollectionId, key: &OrderingKey) -> Vec<u8> {
    let mut out = index_prefix(id);
    out.extend_from_slice(key.to_hex().as_bytes());
    out
}

/// Parses the ordering key back out of an index entry key.
pub fn parse_index_key(id: CollectionId, raw: &[u8], bits: u32) -> VectorResult<OrderingKey> {
    let prefix = index_prefix(id);
    let hex = raw
        .strip_prefix(prefix.as_slice())
        .and_then(|rest| std::str::from_utf8(rest).ok())
        .unwrap_or_default();
    OrderingKey::from_hex(hex, bits)
}

pub fn node_prefix(id: CollectionId) -> Vec<u8> {
    format!("c/{}/n/", id.to_hex()).into_bytes()
}

pub fn node_key(id: CollectionId, node: NodeId) -> Vec<u8> {
    format!("c/{}/n/{}", id.to_hex(), node.to_hex()).into_bytes()
}

/// Inclusive upper bound for every key starting with `prefix`.
///
/// Keys are ASCII, so appending `0xff` sorts after all of them.
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    end.push(0xff);
    end
}

/// Encodes a node-id set as concatenated little-endian u32s, ascending.
pub fn encode_node_set(ids: &[NodeId]) -> Vec<u8> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.iter().flat_map(NodeId::to_bytes).collect()
}

pub fn decode_node_set(bytes: &[u8]) -> StorageResult<Vec<NodeId>> {
    if bytes.len() % 4 != 0 {
        return Err(StorageError::Corrupted {
            reason: format!("node set of {} bytes is not a multiple of 4", bytes.len()),
        });
    }
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            NodeId::from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]).ok_or_else(|| {
                StorageError::Corrupted {
                    reason: "node set contains id 0".to_string(),
                }
            })
        })
        .collect()
}
