//! Neighbor search through the engine: result bounds and ranking.

use crate::common::{create_test_engine, random_records, record};
use semspace::vector::cosine_similarity;
use tokio_util::sync::CancellationToken;

#[test]
fn test_result_count_bounds() {
    let (engine, _dir) = create_test_engine();
    let records = random_records(120, 16, 7);
    let id = engine.import("random", records).unwrap().collection.unwrap();

    let query: Vec<f32> = (0..16).map(|i| (i as f32 * 0.3).sin()).collect();
    for k in [1, 10, 50, 120, 500] {
        let result = engine
            .search(id, &query, k, &CancellationToken::new())
            .unwrap();
        assert!(result.hits.len() <= k, "k={k}");
        assert!(result.hits.len() >= k.min(120), "k={k}");
    }
}

#[test]
fn test_small_collection_returns_everything_ranked() {
    let (engine, _dir) = create_test_engine();
    let id = engine
        .import(
            "tiny",
            vec![
                record(1, &[1.0, 0.0, 0.0]),
                record(2, &[0.0, 1.0, 0.0]),
                record(3, &[0.7, 0.7, 0.0]),
            ],
        )
        .unwrap()
        .collection
        .unwrap();

    let result = engine
        .search(id, &[1.0, 0.1, 0.0], 10, &CancellationToken::new())
        .unwrap();
    let nodes: Vec<u32> = result.hits.iter().map(|h| h.node.get()).collect();
    assert_eq!(nodes, vec![1, 3, 2]);
}

#[test]
fn test_scores_are_true_cosine_similarity() {
    let (engine, _dir) = create_test_engine();
    let records = random_records(40, 8, 99);
    let id = engine
        .import("random", records.clone())
        .unwrap()
        .collection
        .unwrap();

    let query = records[5].embedding.clone();
    let result = engine
        .search(id, &query, 5, &CancellationToken::new())
        .unwrap();
    assert_eq!(result.hits[0].node.get(), 6);

    for hit in &result.hits {
        let stored = &records[(hit.node.get() - 1) as usize].embedding;
        assert!((hit.score - cosine_similarity(&query, stored)).abs() < 1e-6);
    }
    for pair in result.hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn test_empty_collection_is_not_an_error() {
    let (engine, _dir) = create_test_engine();
    let id = engine.import("empty", Vec::new()).unwrap().collection.unwrap();
    let result = engine
        .search(id, &[0.0, 1.0], 5, &CancellationToken::new())
        .unwrap();
    assert!(result.hits.is_empty());
}

#[test]
fn test_malformed_query_is_rejected() {
    let (engine, _dir) = create_test_engine();
    let id = engine
        .import("a", vec![record(1, &[0.0, 1.0, 2.0])])
        .unwrap()
        .collection
        .unwrap();
    let err = engine
        .search(id, &[0.0, 1.0], 5, &CancellationToken::new())
        .unwrap_err();
    assert_eq!(err.status_code(), "INVALID_DIMENSION");
}
