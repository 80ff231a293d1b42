// Exercises the end-to-end scenarios a tree-family index must satisfy
// regardless of which buffer it is bound to: split-on-overflow, condense
// on removal, and predicate search (scenarios 1-2).

use flashrtree::{BBox, BufferKind, IndexConfig, Predicate, SpatialIndex, TreeKind};

fn rect(a: f64, b: f64) -> BBox {
    BBox::new(vec![a, a], vec![b, b])
}

fn small_fanout(tree_kind: TreeKind) -> IndexConfig {
    IndexConfig::builder(tree_kind, BufferKind::None)
        .page_size(256)
        .dimensions(2)
        .fan_out_leaf(2, 4)
        .fan_out_internal(2, 4)
        .build()
        .unwrap()
}

#[test]
fn fifth_insert_splits_root_and_search_finds_everything() {
    let mut idx = SpatialIndex::create_in_memory(small_fanout(TreeKind::RTree)).unwrap();
    for (p, (lo, hi)) in [(1, (0.0, 1.0)), (2, (2.0, 3.0)), (3, (4.0, 5.0)), (4, (6.0, 7.0)), (5, (8.0, 9.0))] {
        idx.insert(p, rect(lo, hi)).unwrap();
    }

    let mut found = idx.search(&rect(0.0, 9.0), Predicate::Intersects).unwrap();
    found.sort_unstable();
    assert_eq!(found, vec![1, 2, 3, 4, 5]);

    let none = idx
        .search(&BBox::new(vec![2.5, 2.5], vec![2.6, 2.6]), Predicate::Intersects)
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn remove_then_equal_search_returns_nothing_and_invariants_hold() {
    let mut idx = SpatialIndex::create_in_memory(small_fanout(TreeKind::RTree)).unwrap();
    for (p, (lo, hi)) in [(1, (0.0, 1.0)), (2, (2.0, 3.0)), (3, (4.0, 5.0)), (4, (6.0, 7.0)), (5, (8.0, 9.0))] {
        idx.insert(p, rect(lo, hi)).unwrap();
    }

    assert!(idx.remove(3, &rect(4.0, 5.0)).unwrap());
    let found = idx.search(&rect(4.0, 5.0), Predicate::Equal).unwrap();
    assert!(found.is_empty());

    let mut remaining = idx.search(&rect(0.0, 9.0), Predicate::Intersects).unwrap();
    remaining.sort_unstable();
    assert_eq!(remaining, vec![1, 2, 4, 5]);
}

#[test]
fn update_moves_a_pointer_to_a_new_geometry() {
    let mut idx = SpatialIndex::create_in_memory(small_fanout(TreeKind::RTree)).unwrap();
    idx.insert(1, rect(0.0, 1.0)).unwrap();
    idx.update(1, &rect(0.0, 1.0), rect(100.0, 101.0)).unwrap();

    assert!(idx.search(&rect(0.0, 1.0), Predicate::Equal).unwrap().is_empty());
    assert_eq!(idx.search(&rect(100.0, 101.0), Predicate::Equal).unwrap(), vec![1]);
}

#[test]
fn intersects_search_matches_iff_bboxes_overlap() {
    let mut idx = SpatialIndex::create_in_memory(small_fanout(TreeKind::RTree)).unwrap();
    idx.insert(1, BBox::new(vec![0.0, 0.0], vec![5.0, 5.0])).unwrap();

    let overlapping = BBox::new(vec![4.0, 4.0], vec![6.0, 6.0]);
    let disjoint = BBox::new(vec![10.0, 10.0], vec![11.0, 11.0]);
    assert_eq!(idx.search(&overlapping, Predicate::Intersects).unwrap(), vec![1]);
    assert!(idx.search(&disjoint, Predicate::Intersects).unwrap().is_empty());
}

#[test]
fn hilbert_tree_round_trips_through_the_facade() {
    let mut idx = SpatialIndex::create_in_memory(small_fanout(TreeKind::HilbertRTree)).unwrap();
    for (p, (lo, hi)) in [(1, (0.0, 1.0)), (2, (2.0, 3.0)), (3, (4.0, 5.0)), (4, (6.0, 7.0)), (5, (8.0, 9.0)), (6, (10.0, 11.0))] {
        idx.insert(p, rect(lo, hi)).unwrap();
    }
    let mut found = idx.search(&rect(0.0, 11.0), Predicate::Intersects).unwrap();
    found.sort_unstable();
    assert_eq!(found, vec![1, 2, 3, 4, 5, 6]);
}
