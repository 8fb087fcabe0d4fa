//! Per-collection ordering-key index.

mod cache;
mod collection;

pub use cache::IndexCache;
pub use collection::{CollectionIndex, CollectionState, StoredNode};
