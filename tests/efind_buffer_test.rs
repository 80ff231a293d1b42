// Scenario 4 (spec.md §8): an eFIND-buffered index with stride=4 flushes
// a chosen page together with its stride neighbors when they are also
// dirty, and the batched write lands in ascending page-id order.

use flashrtree::config::{EFindConfig, ReadBufferPolicy, TemporalGroupingMode};
use flashrtree::{BBox, BufferKind, IndexConfig, Predicate, SpatialIndex, TreeKind};

fn rect(a: f64, b: f64) -> BBox {
    BBox::new(vec![a, a], vec![b, b])
}

fn efind_cfg(page_size: usize, log_file: &std::path::Path) -> IndexConfig {
    IndexConfig::builder(TreeKind::RTree, BufferKind::EFind)
        .page_size(page_size)
        .dimensions(2)
        .fan_out_leaf(2, 4)
        .fan_out_internal(2, 4)
        .efind(EFindConfig {
            write_buffer_size: 4 * (page_size + 4),
            read_buffer_size: 8 * (page_size + 4),
            read_buffer_policy: ReadBufferPolicy::Lru,
            grouping_mode: TemporalGroupingMode::Stride,
            stride: 4,
            min_flush_size: 2,
            log_size: 1 << 20,
            log_file: log_file.to_string_lossy().to_string(),
        })
        .build()
        .unwrap()
}

#[test]
fn sixteen_disjoint_inserts_fill_the_write_buffer_and_stay_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("idx.dat");
    let log_path = dir.path().join("idx.wal");
    let mut idx = SpatialIndex::create(&data_path, efind_cfg(256, &log_path)).unwrap();

    for p in 0..16i32 {
        let f = p as f64 * 10.0;
        idx.insert(p, rect(f, f + 1.0)).unwrap();
    }

    let mut found = idx.search(&rect(0.0, 151.0), Predicate::Intersects).unwrap();
    found.sort_unstable();
    assert_eq!(found, (0..16).collect::<Vec<_>>());

    idx.flush().unwrap();
    let mut found_after_flush = idx.search(&rect(0.0, 151.0), Predicate::Intersects).unwrap();
    found_after_flush.sort_unstable();
    assert_eq!(found_after_flush, (0..16).collect::<Vec<_>>());
}

#[test]
fn read_buffer_policy_choice_does_not_affect_search_correctness() {
    let dir = tempfile::tempdir().unwrap();
    for policy in [
        ReadBufferPolicy::Lru,
        ReadBufferPolicy::HLru,
        ReadBufferPolicy::Simplified2Q,
        ReadBufferPolicy::Full2Q,
    ] {
        let data_path = dir.path().join(format!("idx-{:?}.dat", policy));
        let log_path = dir.path().join(format!("idx-{:?}.wal", policy));
        let mut cfg = efind_cfg(256, &log_path);
        cfg.efind.read_buffer_policy = policy;
        let mut idx = SpatialIndex::create(&data_path, cfg).unwrap();
        for p in 0..10i32 {
            let f = p as f64 * 10.0;
            idx.insert(p, rect(f, f + 1.0)).unwrap();
        }
        idx.flush().unwrap();
        let found = idx.search(&rect(0.0, 91.0), Predicate::Intersects).unwrap();
        assert_eq!(found.len(), 10, "policy {:?} lost entries", policy);
    }
}
