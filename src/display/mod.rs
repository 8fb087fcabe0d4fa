//! Terminal output for the CLI: tables and progress bars.

pub mod progress;
pub mod tables;

pub use progress::{create_progress_bar, create_spinner, track_federation};
pub use tables::{
    create_collections_table, create_federated_table, create_neighbor_table, create_params_table,
};
