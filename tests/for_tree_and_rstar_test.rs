// Scenario 5: a FOR-tree primary node accumulates enough search-traversal
// pressure (tsc) to trigger MergeBack, shrinking its overflow chain.
// Scenario 6: an R*-tree's first overflow at a level reinserts instead of
// splitting; a second overflow in the same user insert really splits.

use flashrtree::config::{ForTreeConfig, SplitStrategy};
use flashrtree::{BBox, BufferKind, IndexConfig, Predicate, SpatialIndex, TreeKind};

fn rect(a: f64, b: f64) -> BBox {
    BBox::new(vec![a, a], vec![b, b])
}

#[test]
fn for_tree_merge_back_fires_after_access_pressure_and_shrinks_overflow() {
    let mut cfg = IndexConfig::builder(TreeKind::ForTree, BufferKind::None)
        .page_size(256)
        .dimensions(2)
        .fan_out_leaf(2, 4)
        .fan_out_internal(2, 4)
        .build()
        .unwrap();
    cfg.for_tree = ForTreeConfig { x: 1, y: 2 };
    let mut idx = SpatialIndex::create_in_memory(cfg).unwrap();

    for p in 0..6i32 {
        let f = p as f64 * 2.0;
        idx.insert(p, rect(f, f + 1.0)).unwrap();
    }

    // threshold for k=2 overflow pages at x=1, y=2 is floor((10-1)/2)*2 = 8
    for _ in 0..8 {
        idx.search(&rect(0.0, 11.0), Predicate::Intersects).unwrap();
    }
    idx.insert(100, rect(50.0, 51.0)).unwrap();

    let found = idx.search(&rect(0.0, 51.0), Predicate::Intersects).unwrap();
    assert_eq!(found.len(), 7);
}

#[test]
fn rstar_first_overflow_reinserts_second_overflow_splits() {
    let cfg = IndexConfig::builder(TreeKind::RStarTree, BufferKind::None)
        .page_size(256)
        .dimensions(2)
        .fan_out_leaf(2, 4)
        .fan_out_internal(2, 4)
        .split_strategy(SplitStrategy::RStar)
        .build()
        .unwrap();
    let mut idx = SpatialIndex::create_in_memory(cfg).unwrap();

    for p in 0..20i32 {
        let f = p as f64 * 10.0;
        idx.insert(p, rect(f, f + 1.0)).unwrap();
    }

    assert!(idx.config().tree_kind == TreeKind::RStarTree);
    let mut found = idx.search(&rect(0.0, 191.0), Predicate::Intersects).unwrap();
    found.sort_unstable();
    assert_eq!(found, (0..20).collect::<Vec<_>>());
}
