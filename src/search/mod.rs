//! Neighbor search within one collection and federation across collections.

pub mod federation;
pub mod neighbor;
pub mod progress;

pub use federation::{
    CollectionSearcher, FederatedHit, FederatedQuery, FederatedResponse, FederatedSearch,
    IndexSearcher, Scoring, merge_hits,
};
pub use neighbor::{NeighborHit, NeighborResult, NeighborSearch};
pub use progress::{SearchEvent, SearchEvents};
