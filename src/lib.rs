//! Embedding-space index ordered by a space-filling curve, with federated
//! semantic search across independently indexed collections.

pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod index;
pub mod registry;
pub mod search;
pub mod storage;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use engine::{ImportRecord, ImportSummary, SpaceEngine, read_import_file};
pub use error::{IndexError, IndexResult, StorageError, StorageResult};
pub use index::{CollectionIndex, IndexCache};
pub use registry::{CollectionMeta, CollectionRegistry};
pub use search::{
    FederatedHit, FederatedQuery, FederatedResponse, FederatedSearch, NeighborHit, NeighborSearch,
    SearchEvent, SearchEvents,
};
pub use storage::{MemoryStore, OrderedStore};
pub use types::{CollectionId, NodeId, Payload};
pub use vector::{OrderingKey, QuantizationParams, Quantizer, ReductionStrategy};
