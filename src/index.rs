//! Spatial-index façade (C10): the single entry point §4.12 and §6
//! describe, binding one `TreeKind` and one `BufferKind` to a concrete
//! `PageStore` and exposing the language-neutral create/insert/
//! remove/update/search/destroy surface. Everything below this module is
//! an implementation detail a caller never names directly.

use std::fs;
use std::path::Path;

use crate::buffer::{EFindBuffer, FastBuffer, Full2QBuffer, HLruBuffer, LruBuffer, NoBuffer, NodeBuffer, Simplified2QBuffer};
use crate::config::{BufferKind, IndexConfig, TreeKind};
use crate::error::{Error, Result};
use crate::geometry::{BBox, Predicate};
use crate::observer::{NullObserver, Observer};
use crate::page::{BlockDeviceSim, FileStore, PageStore};
use crate::tree::{ForTree, ForTreeCtx, OverflowTable, RTree, TreeCtx};
use crate::tree_info::TreeInfo;

/// Persisted alongside `IndexConfig` so a reopened index resumes from the
/// same page-allocation and height state it left off at; the overflow
/// table is only meaningful (and only present) for a FOR-tree.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Header {
    config: IndexConfig,
    info: TreeInfo,
}

enum Engine {
    RFamily(RTree),
    ForTree(ForTree, OverflowTable),
}

/// A live, bound spatial index. Owns its page store, its buffer, and the
/// small bookkeeping (`TreeInfo`, and for FOR-tree the overflow table)
/// that must outlive any single operation.
pub struct SpatialIndex {
    config: IndexConfig,
    store: Box<dyn PageStore>,
    buffer: Box<dyn NodeBuffer>,
    info: TreeInfo,
    observer: Box<dyn Observer>,
    engine: Engine,
}

fn build_buffer(config: &IndexConfig) -> Result<Box<dyn NodeBuffer>> {
    let dims = config.dimensions;
    let tree_kind = config.tree_kind;
    let page_size = config.page_size;
    Ok(match config.buffer_kind {
        BufferKind::None => Box::new(NoBuffer::new(dims, tree_kind)),
        BufferKind::Lru => Box::new(LruBuffer::new(dims, tree_kind, page_size, config.efind.read_buffer_size)),
        BufferKind::HLru => Box::new(HLruBuffer::new(dims, tree_kind, page_size, config.efind.read_buffer_size)),
        BufferKind::Simplified2Q => Box::new(Simplified2QBuffer::new(dims, tree_kind, page_size, config.efind.read_buffer_size)),
        BufferKind::Full2Q => Box::new(Full2QBuffer::new(dims, tree_kind, page_size, config.efind.read_buffer_size)),
        BufferKind::Fast => Box::new(FastBuffer::new(dims, tree_kind, page_size, &config.fast)?),
        BufferKind::EFind => Box::new(EFindBuffer::new(dims, tree_kind, page_size, &config.efind)?),
    })
}

fn build_engine(config: &IndexConfig) -> Engine {
    match config.tree_kind {
        TreeKind::ForTree => Engine::ForTree(ForTree::new(config), OverflowTable::new()),
        _ => Engine::RFamily(RTree::new(config)),
    }
}

impl SpatialIndex {
    /// Creates a brand-new index backed by a plain file, starting from an
    /// empty root page.
    pub fn create(path: impl AsRef<Path>, config: IndexConfig) -> Result<Self> {
        log::info!("creating {:?} index at {} (buffer: {:?})", config.tree_kind, path.as_ref().display(), config.buffer_kind);
        let store = FileStore::open(path, config.page_size)?;
        Self::with_store(config, Box::new(store))
    }

    /// Creates a brand-new index backed by the in-memory flash simulator,
    /// useful for tests and the benchmark harness.
    pub fn create_in_memory(config: IndexConfig) -> Result<Self> {
        let block_pages = (config.fast.buffer_size / config.page_size.max(1)).max(1);
        let store = BlockDeviceSim::new(config.page_size, block_pages);
        Self::with_store(config, Box::new(store))
    }

    fn with_store(config: IndexConfig, store: Box<dyn PageStore>) -> Result<Self> {
        let buffer = build_buffer(&config)?;
        let engine = build_engine(&config);
        Ok(Self {
            config,
            store,
            buffer,
            info: TreeInfo::new(),
            observer: Box::new(NullObserver),
            engine,
        })
    }

    /// Reopens an index from a header file previously written by
    /// [`SpatialIndex::write_header`], reusing its persisted page
    /// allocation and height state instead of starting over.
    pub fn open(header_path: impl AsRef<Path>, data_path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(header_path)?;
        let header: Header = serde_json::from_str(&raw)?;
        log::info!("reopening {:?} index from {}", header.config.tree_kind, data_path.as_ref().display());
        let store = FileStore::open(data_path, header.config.page_size)?;
        let buffer = build_buffer(&header.config)?;
        let engine = build_engine(&header.config);
        Ok(Self {
            config: header.config,
            store: Box::new(store),
            buffer,
            info: header.info,
            observer: Box::new(NullObserver),
            engine,
        })
    }

    /// Installs an observer to receive this index's operation telemetry
    /// (§9's statistics-processing hook), replacing the default no-op.
    pub fn with_observer(mut self, observer: Box<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn get_type(&self) -> (TreeKind, BufferKind) {
        (self.config.tree_kind, self.config.buffer_kind)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn insert(&mut self, pointer: i32, bbox: BBox) -> Result<()> {
        if bbox.dims() != self.config.dimensions {
            return Err(Error::InvalidConfig(format!(
                "geometry has {} dimensions, index expects {}",
                bbox.dims(),
                self.config.dimensions
            )));
        }
        let SpatialIndex { store, buffer, info, observer, engine, .. } = self;
        match engine {
            Engine::RFamily(tree) => {
                let mut ctx = TreeCtx {
                    store: &mut **store,
                    buffer: &mut **buffer,
                    info,
                    observer: &**observer,
                };
                tree.insert(&mut ctx, pointer, bbox)
            }
            Engine::ForTree(tree, overflow) => {
                let mut ctx = ForTreeCtx {
                    store: &mut **store,
                    buffer: &mut **buffer,
                    info,
                    overflow,
                    observer: &**observer,
                };
                tree.insert(&mut ctx, pointer, bbox)
            }
        }
    }

    pub fn remove(&mut self, pointer: i32, bbox: &BBox) -> Result<bool> {
        let SpatialIndex { store, buffer, info, observer, engine, .. } = self;
        match engine {
            Engine::RFamily(tree) => {
                let mut ctx = TreeCtx {
                    store: &mut **store,
                    buffer: &mut **buffer,
                    info,
                    observer: &**observer,
                };
                tree.remove(&mut ctx, pointer, bbox)
            }
            Engine::ForTree(tree, overflow) => {
                let mut ctx = ForTreeCtx {
                    store: &mut **store,
                    buffer: &mut **buffer,
                    info,
                    overflow,
                    observer: &**observer,
                };
                tree.remove(&mut ctx, pointer, bbox)
            }
        }
    }

    /// Remove-then-insert (§4.12); surfaces the removal's outcome so a
    /// caller can distinguish "moved" from "the old geometry was never
    /// there to begin with".
    pub fn update(&mut self, pointer: i32, old_bbox: &BBox, new_bbox: BBox) -> Result<bool> {
        let removed = self.remove(pointer, old_bbox)?;
        self.insert(pointer, new_bbox)?;
        Ok(removed)
    }

    pub fn search(&mut self, bbox: &BBox, predicate: Predicate) -> Result<Vec<i32>> {
        match &self.engine {
            Engine::RFamily(tree) => {
                let mut ctx = TreeCtx {
                    store: &mut *self.store,
                    buffer: &mut *self.buffer,
                    info: &mut self.info,
                    observer: &*self.observer,
                };
                tree.search(&mut ctx, bbox, predicate)
            }
            Engine::ForTree(tree, _) => {
                let overflow = match &mut self.engine {
                    Engine::ForTree(_, overflow) => overflow,
                    _ => unreachable!(),
                };
                let mut ctx = ForTreeCtx {
                    store: &mut *self.store,
                    buffer: &mut *self.buffer,
                    info: &mut self.info,
                    overflow,
                    observer: &*self.observer,
                };
                tree.search(&mut ctx, bbox, predicate)
            }
        }
    }

    /// Forces every buffered modification to durable storage.
    pub fn flush(&mut self) -> Result<()> {
        self.buffer.flush_all(&mut *self.store)?;
        self.store.sync()
    }

    /// Writes config + tree-info to `path` as JSON next to the data file,
    /// so `open` can resume without re-deriving any of it.
    pub fn write_header(&self, path: impl AsRef<Path>) -> Result<()> {
        let header = Header {
            config: self.config.clone(),
            info: self.info.clone(),
        };
        let json = serde_json::to_string_pretty(&header)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Flushes outstanding writes and drops this index's in-memory state.
    /// Does not remove the backing file; callers that want the data gone
    /// do that themselves, the same separation `FileStore` draws between
    /// "durable" and "deleted".
    pub fn destroy(mut self) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfigBuilder;

    fn cfg(tree_kind: TreeKind, buffer_kind: BufferKind) -> IndexConfig {
        IndexConfig::builder(tree_kind, buffer_kind)
            .page_size(256)
            .dimensions(2)
            .build()
            .unwrap()
    }

    fn rect(a: f64, b: f64) -> BBox {
        BBox::new(vec![a, a], vec![b, b])
    }

    #[test]
    fn rtree_round_trips_through_the_facade() {
        let mut idx = SpatialIndex::create_in_memory(cfg(TreeKind::RTree, BufferKind::None)).unwrap();
        for p in 0..5i32 {
            let f = p as f64 * 10.0;
            idx.insert(p, rect(f, f + 1.0)).unwrap();
        }
        let found = idx.search(&rect(0.0, 41.0), Predicate::Intersects).unwrap();
        assert_eq!(found.len(), 5);
        assert!(idx.remove(0, &rect(0.0, 1.0)).unwrap());
        let found = idx.search(&rect(0.0, 1.0), Predicate::Equal).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn for_tree_round_trips_through_the_facade() {
        let mut idx = SpatialIndex::create_in_memory(cfg(TreeKind::ForTree, BufferKind::None)).unwrap();
        for p in 0..6i32 {
            let f = p as f64 * 2.0;
            idx.insert(p, rect(f, f + 1.0)).unwrap();
        }
        let found = idx.search(&rect(0.0, 11.0), Predicate::Intersects).unwrap();
        assert_eq!(found.len(), 6);
    }

    #[test]
    fn fast_buffer_backed_index_survives_a_flush() {
        let mut idx = SpatialIndex::create_in_memory(cfg(TreeKind::RTree, BufferKind::Fast)).unwrap();
        for p in 0..3i32 {
            let f = p as f64 * 10.0;
            idx.insert(p, rect(f, f + 1.0)).unwrap();
        }
        idx.flush().unwrap();
        let found = idx.search(&rect(0.0, 31.0), Predicate::Intersects).unwrap();
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn insert_rejects_a_geometry_with_the_wrong_dimensionality() {
        let mut idx = SpatialIndex::create_in_memory(cfg(TreeKind::RTree, BufferKind::None)).unwrap();
        let bad = BBox::new(vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]);
        assert!(idx.insert(1, bad).is_err());
    }

    #[test]
    fn write_header_then_open_resumes_tree_info() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("idx.dat");
        let header_path = dir.path().join("idx.header.json");
        {
            let mut idx = SpatialIndex::create(&data_path, cfg(TreeKind::RTree, BufferKind::None)).unwrap();
            for p in 0..3i32 {
                let f = p as f64 * 10.0;
                idx.insert(p, rect(f, f + 1.0)).unwrap();
            }
            idx.flush().unwrap();
            idx.write_header(&header_path).unwrap();
        }
        let mut reopened = SpatialIndex::open(&header_path, &data_path).unwrap();
        let found = reopened.search(&rect(0.0, 31.0), Predicate::Intersects).unwrap();
        assert_eq!(found.len(), 3);
    }
}
