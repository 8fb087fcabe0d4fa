//! Snapshot persistence and layered configuration.

use crate::common::{random_records, test_settings};
use semspace::{MemoryStore, NodeId, Settings, SpaceEngine, StorageError};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[test]
fn test_snapshot_round_trip_keeps_search_results() {
    let dir = TempDir::new().unwrap();
    let settings = Arc::new(test_settings(&dir));
    let query: Vec<f32> = (0..8).map(|i| i as f32 / 8.0).collect();

    let before = {
        let engine = SpaceEngine::open(settings.clone()).unwrap();
        let id = engine
            .import("docs", random_records(50, 8, 3))
            .unwrap()
            .collection
            .unwrap();
        engine.set_weight(id, 1.5).unwrap();
        engine.save().unwrap();
        engine
            .search(id, &query, 5, &CancellationToken::new())
            .unwrap()
            .hits
    };

    let engine = SpaceEngine::open(settings).unwrap();
    let meta = engine.collections().unwrap().remove(0);
    assert_eq!(meta.name, "docs");
    assert_eq!(meta.weight, 1.5);
    assert_eq!(meta.node_count, 50);

    let after = engine
        .search(meta.id, &query, 5, &CancellationToken::new())
        .unwrap()
        .hits;
    assert_eq!(before, after);
    assert!(engine.get_node(meta.id, NodeId::new(50).unwrap()).unwrap().is_some());
}

#[test]
fn test_corrupt_snapshot_is_rejected() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    std::fs::create_dir_all(&settings.data_path).unwrap();
    std::fs::write(settings.snapshot_path(), b"not a snapshot at all").unwrap();

    assert!(matches!(
        MemoryStore::load_snapshot(&settings.snapshot_path()),
        Err(StorageError::Corrupted { .. })
    ));
    assert!(SpaceEngine::open(Arc::new(settings)).is_err());
}

#[test]
fn test_settings_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = Settings::init_config_file_at(dir.path(), false).unwrap();
    assert!(Settings::init_config_file_at(dir.path(), false).is_err());

    std::fs::write(
        &path,
        r#"
[search]
growth_factor = 5

[federation]
default_k = 25
"#,
    )
    .unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.search.growth_factor, 5);
    assert_eq!(settings.federation.default_k, 25);
    assert_eq!(settings.index.bit_width, 8);
    assert!(settings.validate().is_ok());
}
