//! Table formatting for collection metadata and search hits.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};

use crate::registry::CollectionMeta;
use crate::search::{FederatedHit, NeighborResult};
use crate::types::CollectionId;
use crate::vector::QuantizationParams;

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    table
}

/// Unix seconds as `YYYY-MM-DD HH:MM`.
fn format_timestamp(seconds: u64) -> String {
    DateTime::<Utc>::from_timestamp(seconds as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

fn number(value: impl ToString) -> Cell {
    Cell::new(value.to_string()).set_alignment(CellAlignment::Right)
}

/// Management view of every collection.
pub fn create_collections_table(collections: &[CollectionMeta]) -> String {
    let mut table = new_table(&["ID", "Name", "Weight", "Active", "Nodes", "Last accessed"]);

    for meta in collections {
        let active = if meta.active {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            number(meta.id),
            Cell::new(&meta.name),
            number(format!("{:.2}", meta.weight)),
            active,
            number(meta.node_count),
            Cell::new(format_timestamp(meta.last_accessed)),
        ]);
    }

    table.to_string()
}

/// Ranked hits of a federated query.
///
/// `names` maps collection ids to display names; unknown ids print as numbers.
pub fn create_federated_table(
    hits: &[FederatedHit],
    names: &HashMap<CollectionId, String>,
) -> String {
    let mut table = new_table(&["#", "Collection", "Node", "Score", "Similarity"]);

    for (rank, hit) in hits.iter().enumerate() {
        let collection = names
            .get(&hit.collection)
            .cloned()
            .unwrap_or_else(|| hit.collection.to_string());
        table.add_row(vec![
            number(rank + 1),
            Cell::new(collection),
            number(hit.node),
            number(format!("{:.4}", hit.score)).add_attribute(Attribute::Bold),
            number(format!("{:.4}", hit.similarity)),
        ]);
    }

    table.to_string()
}

/// Ranked hits of a single-collection query.
pub fn create_neighbor_table(result: &NeighborResult) -> String {
    let mut table = new_table(&["#", "Node", "Similarity"]);
    for (rank, hit) in result.hits.iter().enumerate() {
        table.add_row(vec![
            number(rank + 1),
            number(hit.node),
            number(format!("{:.4}", hit.score)),
        ]);
    }
    table.to_string()
}

/// Fitted bounds per reduced dimension.
pub fn create_params_table(params: &QuantizationParams) -> String {
    let mut table = new_table(&["Dimension", "Min", "Max"]);
    for (dim, (min, max)) in params.mins.iter().zip(&params.maxs).enumerate() {
        table.add_row(vec![
            number(dim),
            number(format!("{min:.6}")),
            number(format!("{max:.6}")),
        ]);
    }
    table.to_string()
}
