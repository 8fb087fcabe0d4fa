#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use semspace::config::IndexConfig;
use semspace::{ImportRecord, MemoryStore, NodeId, Payload, ReductionStrategy, Settings, SpaceEngine};
use std::sync::Arc;
use tempfile::TempDir;

/// Settings with an isolated data directory and the hash embedding generator.
pub fn test_settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.data_path = dir.path().join("data");
    settings.embedding.use_mock = true;
    settings.index = IndexConfig {
        reduced_dimensions: 2,
        bit_width: 8,
        reduction: ReductionStrategy::Truncate,
        ..IndexConfig::default()
    };
    settings
}

/// Creates an in-memory engine whose snapshot goes to a temp directory.
pub fn create_test_engine() -> (SpaceEngine, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let settings = Arc::new(test_settings(&dir));
    let engine = SpaceEngine::with_store(settings, Arc::new(MemoryStore::new()));
    (engine, dir)
}

pub fn record(id: u32, embedding: &[f32]) -> ImportRecord {
    ImportRecord {
        id: NodeId::new(id).expect("non-zero node id"),
        embedding: embedding.to_vec(),
        payload: Payload::empty(),
    }
}

/// `count` random vectors of length `dim` in `[-1, 1]`, reproducible per seed.
pub fn random_records(count: u32, dim: usize, seed: u64) -> Vec<ImportRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=count)
        .map(|id| {
            let embedding: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0..=1.0)).collect();
            record(id, &embedding)
        })
        .collect()
}
