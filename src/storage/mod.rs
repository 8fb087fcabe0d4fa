//! Storage layer: the ordered key-value capability and its in-memory engine.
//!
//! Everything above this module talks to [`OrderedStore`] only. The bundled
//! [`MemoryStore`] keeps the map in memory and persists it as a snapshot file.

pub mod keys;
mod memory;
mod persistence;
mod store;

pub use memory::MemoryStore;
pub use persistence::SNAPSHOT_VERSION;
pub use store::{BatchOp, KvPair, OrderedStore, WriteBatch};
