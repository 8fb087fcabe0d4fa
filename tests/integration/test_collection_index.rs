//! Collection index: ordering keys, range scans and removal.

use semspace::storage::MemoryStore;
use semspace::vector::{
    BitWidth, OrderingKey, Quantizer, ReducedDimensions, ReductionStrategy, decode, encode,
    quantize,
};
use semspace::{CollectionId, CollectionIndex, NodeId, Payload};
use std::sync::Arc;

fn nid(id: u32) -> NodeId {
    NodeId::new(id).unwrap()
}

fn grid_index(bits: u32, upper: f32) -> CollectionIndex {
    let index =
        CollectionIndex::open(CollectionId::new(1).unwrap(), Arc::new(MemoryStore::new())).unwrap();
    let quantizer = Quantizer::new(
        ReducedDimensions::new(2).unwrap(),
        BitWidth::new(bits).unwrap(),
        ReductionStrategy::Truncate,
    );
    index
        .fit(&quantizer, &[vec![0.0, 0.0], vec![upper, upper]])
        .unwrap();
    index
}

#[test]
fn test_three_point_range_scan() {
    // Bounds [0, 15] at 4 bits: coordinates quantize to themselves
    let index = grid_index(4, 15.0);
    let k1 = index.insert(nid(1), vec![0.0, 0.0], Payload::empty()).unwrap();
    let k2 = index.insert(nid(2), vec![1.0, 1.0], Payload::empty()).unwrap();
    let k3 = index.insert(nid(3), vec![15.0, 15.0], Payload::empty()).unwrap();
    assert_eq!(k1.to_hex(), "00");
    assert_eq!(k2.to_hex(), "03");
    assert_eq!(k3.to_hex(), "ff");

    let center = OrderingKey::new(0, 8).unwrap();
    let found: Vec<NodeId> = index
        .range_scan(center, 5, 10)
        .unwrap()
        .into_iter()
        .map(|(_, node)| node)
        .collect();
    assert_eq!(found, vec![nid(1), nid(2)]);
}

#[test]
fn test_removed_node_is_never_scanned() {
    let index = grid_index(4, 15.0);
    index.insert(nid(1), vec![3.0, 3.0], Payload::empty()).unwrap();
    index.insert(nid(2), vec![3.0, 3.0], Payload::empty()).unwrap();
    index.remove(nid(1)).unwrap();

    let center = index.key_for(&[3.0, 3.0]).unwrap();
    let found = index.range_scan(center, u128::MAX, 10).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].1, nid(2));
    assert!(index.get(nid(1)).unwrap().is_none());
    assert_eq!(index.len(), 1);
}

#[test]
fn test_decode_inverts_encode_of_quantized_vectors() {
    let index = grid_index(8, 1.0);
    let params = index.params().unwrap();
    let dims = ReducedDimensions::new(2).unwrap();

    for i in 0..200u32 {
        let x = (i as f32 * 0.37).sin().abs();
        let y = (i as f32 * 0.11).cos().abs();
        let coords = quantize(&[x, y], &params).unwrap();
        let key = encode(&coords, params.bits).unwrap();
        assert_eq!(decode(key, dims, params.bits).unwrap(), coords);
    }
}

#[test]
fn test_out_of_range_values_are_clamped_not_rejected() {
    let index = grid_index(4, 15.0);
    let low = index.insert(nid(1), vec![-100.0, -100.0], Payload::empty()).unwrap();
    let high = index.insert(nid(2), vec![100.0, 100.0], Payload::empty()).unwrap();
    assert_eq!(low.to_hex(), "00");
    assert_eq!(high.to_hex(), "ff");
}

#[test]
fn test_wider_radius_only_adds_candidates() {
    let index = grid_index(8, 1.0);
    for i in 1..=60u32 {
        let x = (i as f32 * 0.7).sin().abs();
        let y = (i as f32 * 1.3).cos().abs();
        index.insert(nid(i), vec![x, y], Payload::empty()).unwrap();
    }

    let center = index.key_for(&[0.5, 0.5]).unwrap();
    let mut previous: Vec<(OrderingKey, NodeId)> = Vec::new();
    for radius in [0x10u128, 0x40, 0x100, 0x400, 0x1000, 0x10000] {
        let current = index.range_scan(center, radius, 1000).unwrap();
        for entry in &previous {
            assert!(current.contains(entry));
        }
        previous = current;
    }
    assert_eq!(previous.len(), 60);
}
