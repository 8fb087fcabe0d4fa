//! Federated search across collections of the same engine.

use crate::common::{create_test_engine, record};
use semspace::{CollectionId, FederatedQuery, IndexError, SearchEvent};
use tokio_util::sync::CancellationToken;

/// Far in the past, so the freshness boost is ~1.
const LONG_AGO: u64 = 0;

#[tokio::test]
async fn test_weights_decide_the_ranking() {
    let (engine, _dir) = create_test_engine();
    let heavy = engine
        .import("heavy", vec![record(1, &[1.0, 0.0]), record(2, &[0.6, 0.8])])
        .unwrap()
        .collection
        .unwrap();
    let light = engine
        .import("light", vec![record(1, &[1.0, 0.0]), record(2, &[0.6, 0.8])])
        .unwrap()
        .collection
        .unwrap();
    engine.set_weight(heavy, 2.0).unwrap();
    engine.set_weight(light, 0.5).unwrap();
    engine.registry().touch_at(heavy, LONG_AGO).unwrap();
    engine.registry().touch_at(light, LONG_AGO).unwrap();

    let response = engine
        .federated(FederatedQuery::new(vec![1.0, 0.0], 4), CancellationToken::new())
        .await
        .unwrap();

    let ranked: Vec<(CollectionId, u32)> = response
        .hits
        .iter()
        .map(|hit| (hit.collection, hit.node.get()))
        .collect();
    assert_eq!(
        ranked,
        vec![(heavy, 1), (heavy, 2), (light, 1), (light, 2)]
    );
    // normalized 0.6 in each collection: 0.6 x 2.0 vs 0.6 x 0.5
    assert!((response.hits[1].score - 1.2).abs() < 1e-3);
    assert!((response.hits[3].score - 0.3).abs() < 1e-3);
    assert!(!response.partial);
}

#[tokio::test]
async fn test_zero_active_collections_returns_empty() {
    let (engine, _dir) = create_test_engine();
    let id = engine
        .import("a", vec![record(1, &[1.0, 0.0])])
        .unwrap()
        .collection
        .unwrap();
    engine.set_active(id, false).unwrap();

    let response = engine
        .federated(FederatedQuery::new(vec![1.0, 0.0], 5), CancellationToken::new())
        .await
        .unwrap();
    assert!(response.hits.is_empty());
    assert!(response.responded.is_empty());
}

#[tokio::test]
async fn test_bad_collection_does_not_abort_the_query() {
    let (engine, _dir) = create_test_engine();
    let good = engine
        .import("good", vec![record(1, &[1.0, 0.0])])
        .unwrap()
        .collection
        .unwrap();
    // embeddings of another length: the query is malformed for this one
    let other = engine
        .import("other", vec![record(1, &[1.0, 0.0, 0.0])])
        .unwrap()
        .collection
        .unwrap();

    let response = engine
        .federated(
            FederatedQuery::new(vec![1.0, 0.0], 5).with_min_collections(2),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(response.hits.len(), 1);
    assert_eq!(response.hits[0].collection, good);
    assert_eq!(response.responded, vec![good]);
    assert_eq!(response.failed.len(), 1);
    assert_eq!(response.failed[0].0, other);
    assert!(response.partial);
}

#[tokio::test]
async fn test_allow_list_restricts_fan_out() {
    let (engine, _dir) = create_test_engine();
    let a = engine
        .import("a", vec![record(1, &[1.0, 0.0])])
        .unwrap()
        .collection
        .unwrap();
    let b = engine
        .import("b", vec![record(1, &[1.0, 0.0])])
        .unwrap()
        .collection
        .unwrap();

    let response = engine
        .federated(
            FederatedQuery::new(vec![1.0, 0.0], 5).with_allow_list(vec![b]),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(response.responded, vec![b]);
    assert!(response.hits.iter().all(|hit| hit.collection != a));
}

#[tokio::test]
async fn test_progress_events_and_touch() {
    let (engine, _dir) = create_test_engine();
    let id = engine
        .import("a", vec![record(1, &[1.0, 0.0])])
        .unwrap()
        .collection
        .unwrap();
    engine.registry().touch_at(id, LONG_AGO).unwrap();
    let mut events = engine.events().subscribe();

    engine
        .federated(FederatedQuery::new(vec![1.0, 0.0], 5), CancellationToken::new())
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(SearchEvent::CollectionStarted { .. })));
    assert!(matches!(seen.last(), Some(SearchEvent::Completed { hits: 1, .. })));
    assert!(engine.registry().get(id).unwrap().last_accessed > LONG_AGO);
}

#[tokio::test]
async fn test_cancelled_query_discards_results() {
    let (engine, _dir) = create_test_engine();
    engine
        .import("a", vec![record(1, &[1.0, 0.0])])
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = engine
        .federated(FederatedQuery::new(vec![1.0, 0.0], 5), cancel)
        .await;
    assert!(matches!(result, Err(IndexError::Cancelled)));
}
