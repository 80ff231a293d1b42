// Scenario 3 (spec.md §8): a FAST-buffered index sized to hold exactly two
// pages must flush at least once while absorbing eight disjoint inserts,
// and reopening from the same WAL must reproduce the same searchable
// state - the durability invariant in §4.10.

use flashrtree::config::{FastConfig, FastFlushingPolicy};
use flashrtree::{BBox, BufferKind, IndexConfig, Predicate, SpatialIndex, TreeKind};

fn rect(a: f64, b: f64) -> BBox {
    BBox::new(vec![a, a], vec![b, b])
}

fn fast_cfg(page_size: usize, log_file: &std::path::Path) -> IndexConfig {
    IndexConfig::builder(TreeKind::RTree, BufferKind::Fast)
        .page_size(page_size)
        .dimensions(2)
        .fan_out_leaf(2, 4)
        .fan_out_internal(2, 4)
        .fast(FastConfig {
            buffer_size: 2 * (page_size + 4),
            flushing_unit_size: 2,
            flushing_policy: FastFlushingPolicy::Fast,
            log_size: 1 << 20,
            log_file: log_file.to_string_lossy().to_string(),
        })
        .build()
        .unwrap()
}

#[test]
fn eight_inserts_into_a_two_page_buffer_flush_and_stay_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("idx.dat");
    let log_path = dir.path().join("idx.wal");
    let mut idx = SpatialIndex::create(&data_path, fast_cfg(256, &log_path)).unwrap();

    for p in 0..8i32 {
        let f = p as f64 * 10.0;
        idx.insert(p, rect(f, f + 1.0)).unwrap();
    }

    let mut found = idx.search(&rect(0.0, 71.0), Predicate::Intersects).unwrap();
    found.sort_unstable();
    assert_eq!(found, (0..8).collect::<Vec<_>>());
}

#[test]
fn reopening_after_a_header_write_reproduces_the_same_search_results() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("idx.dat");
    let log_path = dir.path().join("idx.wal");
    let header_path = dir.path().join("idx.header.json");

    {
        let mut idx = SpatialIndex::create(&data_path, fast_cfg(256, &log_path)).unwrap();
        for p in 0..6i32 {
            let f = p as f64 * 10.0;
            idx.insert(p, rect(f, f + 1.0)).unwrap();
        }
        idx.flush().unwrap();
        idx.write_header(&header_path).unwrap();
    }

    let mut reopened = SpatialIndex::open(&header_path, &data_path).unwrap();
    let mut found = reopened.search(&rect(0.0, 51.0), Predicate::Intersects).unwrap();
    found.sort_unstable();
    assert_eq!(found, (0..6).collect::<Vec<_>>());
}
