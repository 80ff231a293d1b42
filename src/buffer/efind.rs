//! eFIND buffer (C9): a delta-log write buffer backed by a separate
//! node-granular read cache, flushing by temporal grouping instead of
//! FAST's fixed flushing units (§4.11).
//!
//! Entry-level adds/modifies/removes are represented internally with the
//! same field-granular `Delta` vocabulary FAST uses - see wal.rs's module
//! doc comment for why that collapse is lossless.

use std::collections::HashMap;

use rand::seq::SliceRandom;

use crate::config::{EFindConfig, ReadBufferPolicy, TemporalGroupingMode, TreeKind};
use crate::error::{Error, Result};
use crate::geometry::BBox;
use crate::page::{Node, PageStore};

use super::standard::{Full2QBuffer, HLruBuffer, LruBuffer, Simplified2QBuffer};
use super::wal::{Delta, Status, Wal};
use super::NodeBuffer;

struct TrackedPage {
    height: i32,
    status: Status,
}

pub struct EFindBuffer {
    dims: usize,
    tree_kind: TreeKind,
    max_write_pages: usize,
    grouping_mode: TemporalGroupingMode,
    stride: usize,
    min_flush_size: usize,
    log_size: usize,
    write_buffer: HashMap<i32, TrackedPage>,
    read_buffer: Box<dyn NodeBuffer>,
    wal: Wal,
}

impl EFindBuffer {
    pub fn new(dims: usize, tree_kind: TreeKind, page_size: usize, cfg: &EFindConfig) -> Result<Self> {
        let max_write_pages = (cfg.write_buffer_size / (page_size + 4)).max(1);
        let read_buffer: Box<dyn NodeBuffer> = match cfg.read_buffer_policy {
            ReadBufferPolicy::Lru => Box::new(LruBuffer::new(dims, tree_kind, page_size, cfg.read_buffer_size)),
            ReadBufferPolicy::HLru => Box::new(HLruBuffer::new(dims, tree_kind, page_size, cfg.read_buffer_size)),
            ReadBufferPolicy::Simplified2Q => {
                Box::new(Simplified2QBuffer::new(dims, tree_kind, page_size, cfg.read_buffer_size))
            }
            ReadBufferPolicy::Full2Q => Box::new(Full2QBuffer::new(dims, tree_kind, page_size, cfg.read_buffer_size)),
        };
        let wal = Wal::open(&cfg.log_file, dims)?;
        let mut buf = Self {
            dims,
            tree_kind,
            max_write_pages,
            grouping_mode: cfg.grouping_mode,
            stride: cfg.stride.max(1),
            min_flush_size: cfg.min_flush_size.max(1),
            log_size: cfg.log_size,
            write_buffer: HashMap::new(),
            read_buffer,
            wal,
        };
        buf.recover()?;
        Ok(buf)
    }

    fn recover(&mut self) -> Result<()> {
        let recovered = self.wal.replay(self.dims, self.tree_kind)?;
        log::debug!("efind write buffer recovering {} pages from wal", recovered.len());
        for (page, status) in recovered {
            let height = match &status {
                Status::New { height, .. } | Status::Mod { height, .. } | Status::Del { height } => *height,
            };
            self.write_buffer.insert(page, TrackedPage { height, status });
        }
        Ok(())
    }

    fn materialize(&self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        match self.write_buffer.get(&page) {
            Some(TrackedPage {
                status: Status::New { node, .. },
                ..
            }) => Ok(node.clone()),
            Some(TrackedPage {
                status: Status::Mod { deltas, .. },
                ..
            }) => {
                let mut base = self.read_base(store, page, height)?;
                for d in deltas {
                    d.apply(&mut base, self.dims);
                }
                Ok(base)
            }
            Some(TrackedPage {
                status: Status::Del { .. },
                ..
            }) => Err(Error::invariant("page should not be referenced: it is deleted")),
            None => self.read_base(store, page, height),
        }
    }

    /// Reads straight from the store, bypassing the read buffer's own
    /// recency bookkeeping (which needs `&mut self`). Only used from
    /// `materialize`, itself only reached from mutable contexts.
    fn read_base(&self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        Ok(super::read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default())
    }

    fn touch_write(&mut self, store: &mut dyn PageStore) -> Result<()> {
        self.maybe_flush(store)
    }

    /// Extends the singleton `{p}` flush set along the configured temporal
    /// axes, stopping at the first gap in each direction, then pads with
    /// randomly-chosen write-buffer-resident pages if still under
    /// `min_flush_size` (§4.11).
    fn build_flush_set(&self, p: i32) -> Vec<i32> {
        let mut set: Vec<i32> = vec![p];
        let present = |id: i32| self.write_buffer.contains_key(&id) || self.read_buffer.contains(id);

        let mut extend = |step: i32| {
            let mut next = p + step;
            while present(next) {
                set.push(next);
                next += step;
            }
        };
        match self.grouping_mode {
            TemporalGroupingMode::Sequential => {
                extend(1);
                extend(-1);
            }
            TemporalGroupingMode::Stride => {
                let s = self.stride as i32;
                extend(s);
                extend(-s);
            }
            TemporalGroupingMode::SeqAndStride => {
                extend(1);
                extend(-1);
                let s = self.stride as i32;
                extend(s);
                extend(-s);
            }
        }
        set.sort_unstable();
        set.dedup();

        if set.len() < self.min_flush_size {
            let mut rng = rand::thread_rng();
            let mut candidates: Vec<i32> = self
                .write_buffer
                .keys()
                .copied()
                .filter(|id| !set.contains(id))
                .collect();
            candidates.shuffle(&mut rng);
            for id in candidates {
                if set.len() >= self.min_flush_size {
                    break;
                }
                set.push(id);
            }
            set.sort_unstable();
        }
        set
    }

    /// Flushes `pages`: write-buffer-resident pages are materialized and
    /// counted as flushed; pages only present via the read buffer (pulled
    /// in purely for grouping locality) are fetched and rewritten as-is,
    /// "forcing" them alongside their dirty neighbors (§4.11) without
    /// being removed from the write buffer's accounting, since they were
    /// never dirty there to begin with.
    fn flush_group(&mut self, store: &mut dyn PageStore, pages: &[i32]) -> Result<()> {
        if pages.is_empty() {
            return Ok(());
        }
        let page_size = store.page_size();
        let mut buf = vec![0u8; pages.len() * page_size];
        let mut flushed = Vec::with_capacity(pages.len());
        for (i, &page) in pages.iter().enumerate() {
            let slot = &mut buf[i * page_size..(i + 1) * page_size];
            match self.write_buffer.get(&page) {
                Some(TrackedPage {
                    status: Status::Del { .. },
                    ..
                }) => {
                    Node::serialize_tombstone(slot);
                    flushed.push(page);
                }
                Some(TrackedPage { height, .. }) => {
                    let height = *height;
                    let node = self.materialize(store, page, height)?;
                    node.serialize(slot, self.dims, self.tree_kind, height);
                    flushed.push(page);
                }
                None => {
                    // clean neighbor pulled in only for grouping locality
                    let node = self.read_buffer.retrieve(store, page, 0)?;
                    node.serialize(slot, self.dims, self.tree_kind, 0);
                }
            }
        }
        crate::page::write_batched(store, pages, &buf)?;
        if !flushed.is_empty() {
            self.wal.append_flush(&flushed)?;
            log::trace!("efind flushed group of {} pages ({} dirty)", pages.len(), flushed.len());
            for page in &flushed {
                self.write_buffer.remove(page);
            }
        }
        Ok(())
    }

    fn maybe_flush(&mut self, store: &mut dyn PageStore) -> Result<()> {
        if self.wal.current_size() as usize + 4096 > self.log_size {
            self.compact()?;
        }
        let mut guard = 0;
        while self.write_buffer.len() > self.max_write_pages && guard < self.max_write_pages + 1 {
            guard += 1;
            let victim = match self.write_buffer.keys().next().copied() {
                Some(p) => p,
                None => break,
            };
            let group = self.build_flush_set(victim);
            self.flush_group(store, &group)?;
        }
        Ok(())
    }

    fn compact(&mut self) -> Result<()> {
        let live: HashMap<i32, Status> = self
            .write_buffer
            .iter()
            .map(|(&p, tp)| (p, tp.status.clone()))
            .collect();
        log::debug!("efind compacting wal, {} live pages carried over", live.len());
        self.wal.compact(&live, self.dims, self.tree_kind)?;
        Ok(())
    }

    fn apply_delta(&mut self, store: &mut dyn PageStore, page: i32, height: i32, delta: Delta) -> Result<()> {
        self.wal.append_mod(page, height, &delta, self.dims)?;
        match self.write_buffer.get_mut(&page) {
            Some(TrackedPage {
                status: Status::New { node, .. },
                ..
            }) => {
                delta.apply(node, self.dims);
            }
            Some(TrackedPage {
                status: Status::Mod { deltas, .. },
                ..
            }) => {
                deltas.push(delta);
            }
            Some(TrackedPage {
                status: Status::Del { .. },
                ..
            }) => {
                return Err(Error::invariant("mutation issued against a deleted page"));
            }
            None => {
                self.write_buffer.insert(
                    page,
                    TrackedPage {
                        height,
                        status: Status::Mod {
                            height,
                            deltas: vec![delta],
                        },
                    },
                );
            }
        }
        self.touch_write(store)
    }
}

impl NodeBuffer for EFindBuffer {
    fn put_new(&mut self, store: &mut dyn PageStore, page: i32, height: i32, node: Node) -> Result<()> {
        self.wal.append_new(page, height, &node, self.dims, self.tree_kind)?;
        self.write_buffer.insert(
            page,
            TrackedPage {
                height,
                status: Status::New { height, node },
            },
        );
        self.touch_write(store)
    }

    fn mod_bbox(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        bbox: Option<BBox>,
    ) -> Result<()> {
        self.apply_delta(store, page, height, Delta::Bbox { position, bbox })
    }

    fn mod_pointer(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        pointer: i32,
    ) -> Result<()> {
        self.apply_delta(store, page, height, Delta::Pointer { position, pointer })
    }

    fn mod_lhv(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        lhv: u64,
    ) -> Result<()> {
        self.apply_delta(store, page, height, Delta::Lhv { position, lhv })
    }

    fn mod_hole(&mut self, store: &mut dyn PageStore, page: i32, height: i32, position: usize) -> Result<()> {
        self.apply_delta(store, page, height, Delta::Hole { position })
    }

    fn del_node(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<()> {
        self.wal.append_del(page, height)?;
        self.write_buffer.insert(
            page,
            TrackedPage {
                height,
                status: Status::Del { height },
            },
        );
        self.touch_write(store)
    }

    fn retrieve(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        match self.write_buffer.get(&page) {
            Some(TrackedPage {
                status: Status::New { node, .. },
                ..
            }) => Ok(node.clone()),
            Some(TrackedPage {
                status: Status::Mod { deltas, .. },
                ..
            }) => {
                let deltas = deltas.clone();
                let mut base = self.read_buffer.retrieve(store, page, height)?;
                for d in &deltas {
                    d.apply(&mut base, self.dims);
                }
                Ok(base)
            }
            Some(TrackedPage {
                status: Status::Del { .. },
                ..
            }) => Err(Error::invariant("page should not be referenced: it is deleted")),
            None => self.read_buffer.retrieve(store, page, height),
        }
    }

    fn flush_all(&mut self, store: &mut dyn PageStore) -> Result<()> {
        while !self.write_buffer.is_empty() {
            let victim = *self.write_buffer.keys().next().unwrap();
            let group = self.build_flush_set(victim);
            self.flush_group(store, &group)?;
        }
        self.read_buffer.flush_all(store)
    }

    fn notify_height_change(&mut self, new_height: i32) {
        self.read_buffer.notify_height_change(new_height);
    }

    fn contains(&self, page: i32) -> bool {
        self.write_buffer.contains_key(&page) || self.read_buffer.contains(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EFindConfig, ReadBufferPolicy, TemporalGroupingMode};
    use crate::page::{BlockDeviceSim, Entry};

    fn cfg(log_file: &std::path::Path) -> EFindConfig {
        EFindConfig {
            write_buffer_size: 4 * (64 + 4),
            read_buffer_size: 8 * (64 + 4),
            read_buffer_policy: ReadBufferPolicy::Lru,
            grouping_mode: TemporalGroupingMode::Sequential,
            stride: 4,
            min_flush_size: 2,
            log_size: 1 << 20,
            log_file: log_file.to_string_lossy().to_string(),
        }
    }

    #[test]
    fn retrieve_replays_deltas_over_read_buffer_base() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockDeviceSim::new(64, 16);
        let mut buf = EFindBuffer::new(2, TreeKind::RTree, 64, &cfg(&dir.path().join("e1.wal"))).unwrap();
        let node = Node::new(vec![Entry::new(1, BBox::new(vec![0.0, 0.0], vec![1.0, 1.0]))]);
        buf.put_new(&mut store, 10, 0, node).unwrap();
        buf.flush_all(&mut store).unwrap();
        buf.mod_bbox(&mut store, 10, 0, 0, Some(BBox::new(vec![0.0, 0.0], vec![9.0, 9.0])))
            .unwrap();
        let back = buf.retrieve(&mut store, 10, 0).unwrap();
        assert_eq!(back.entries[0].bbox.max[0], 9.0);
    }

    #[test]
    fn sequential_grouping_pulls_in_contiguous_dirty_neighbors() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockDeviceSim::new(64, 16);
        let mut buf = EFindBuffer::new(2, TreeKind::RTree, 64, &cfg(&dir.path().join("e2.wal"))).unwrap();
        for p in [4, 5, 6] {
            let node = Node::new(vec![Entry::new(p, BBox::new(vec![0.0, 0.0], vec![1.0, 1.0]))]);
            buf.write_buffer.insert(
                p,
                TrackedPage {
                    height: 0,
                    status: Status::New { height: 0, node },
                },
            );
        }
        let group = buf.build_flush_set(5);
        assert_eq!(group, vec![4, 5, 6]);
    }

    #[test]
    fn retrieving_deleted_page_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockDeviceSim::new(64, 16);
        let mut buf = EFindBuffer::new(2, TreeKind::RTree, 64, &cfg(&dir.path().join("e3.wal"))).unwrap();
        buf.del_node(&mut store, 2, 0).unwrap();
        assert!(buf.retrieve(&mut store, 2, 0).is_err());
    }

    #[test]
    fn flush_all_drains_write_buffer_and_forwards_to_read_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockDeviceSim::new(64, 16);
        let mut buf = EFindBuffer::new(2, TreeKind::RTree, 64, &cfg(&dir.path().join("e4.wal"))).unwrap();
        let node = Node::new(vec![Entry::new(1, BBox::new(vec![0.0, 0.0], vec![1.0, 1.0]))]);
        buf.put_new(&mut store, 20, 0, node).unwrap();
        buf.flush_all(&mut store).unwrap();
        assert!(buf.write_buffer.is_empty());
    }
}
