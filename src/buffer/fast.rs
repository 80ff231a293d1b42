//! FAST buffer (C8): a log-structured write-absorbing buffer that groups
//! pages into fixed-size "flushing units" and picks a unit to flush by a
//! configurable policy (§4.10).

use std::collections::HashMap;

use rand::Rng;

use crate::config::{FastConfig, FastFlushingPolicy, TreeKind};
use crate::error::{Error, Result};
use crate::geometry::BBox;
use crate::page::{Node, PageStore};

use super::wal::{Delta, Status, Wal};
use super::NodeBuffer;

struct TrackedPage {
    height: i32,
    status: Status,
    mod_count: u32,
}

pub struct FastBuffer {
    dims: usize,
    tree_kind: TreeKind,
    max_pages: usize,
    flushing_unit_size: usize,
    policy: FastFlushingPolicy,
    log_size: usize,
    pages: HashMap<i32, TrackedPage>,
    unit_of: HashMap<i32, u32>,
    units: HashMap<u32, Vec<i32>>,
    current_unit: u32,
    next_unit_id: u32,
    clock: u64,
    wal: Wal,
}

impl FastBuffer {
    pub fn new(dims: usize, tree_kind: TreeKind, page_size: usize, cfg: &FastConfig) -> Result<Self> {
        let max_pages = (cfg.buffer_size / (page_size + 4)).max(1);
        let wal = Wal::open(&cfg.log_file, dims)?;
        let mut buf = Self {
            dims,
            tree_kind,
            max_pages,
            flushing_unit_size: cfg.flushing_unit_size.max(1),
            policy: cfg.flushing_policy,
            log_size: cfg.log_size,
            pages: HashMap::new(),
            unit_of: HashMap::new(),
            units: HashMap::new(),
            current_unit: 0,
            next_unit_id: 1,
            clock: 0,
            wal,
        };
        buf.recover()?;
        Ok(buf)
    }

    /// Rebuilds the in-RAM map from the WAL, as would happen after a
    /// crash (§4.10's recovery procedure).
    fn recover(&mut self) -> Result<()> {
        let recovered = self.wal.replay(self.dims, self.tree_kind)?;
        log::debug!("fast buffer recovering {} pages from wal", recovered.len());
        for (page, status) in recovered {
            let height = match &status {
                Status::New { height, .. } | Status::Mod { height, .. } | Status::Del { height } => *height,
            };
            self.pages.insert(
                page,
                TrackedPage {
                    height,
                    status,
                    mod_count: 1,
                },
            );
            self.assign_unit(page);
        }
        Ok(())
    }

    fn assign_unit(&mut self, page: i32) {
        if self.unit_of.contains_key(&page) {
            return;
        }
        loop {
            let slot = self.units.entry(self.current_unit).or_insert_with(Vec::new);
            if slot.len() < self.flushing_unit_size {
                slot.push(page);
                self.unit_of.insert(page, self.current_unit);
                return;
            }
            self.current_unit = self.next_unit_id;
            self.next_unit_id += 1;
        }
    }

    fn touch(&mut self, page: i32) {
        self.clock += 1;
        if let Some(p) = self.pages.get_mut(&page) {
            p.mod_count += 1;
        }
    }

    /// Scalar priority for one flushing unit (§4.10): `nu` is the unit's
    /// total modification count across its pages, `ts` is a single
    /// timestamp captured once for this recompute. FAST keys the heap by
    /// `nu` alone; FAST* subtracts `ts` so recency penalizes selection.
    /// A unit with no modifications at all yields `-INT_MAX`.
    fn unit_priority(&self, unit: u32) -> i64 {
        let pages = match self.units.get(&unit) {
            Some(pages) => pages,
            None => return i64::MIN / 2,
        };
        let nu: i64 = pages.iter().map(|p| self.pages.get(p).map(|tp| tp.mod_count as i64).unwrap_or(0)).sum();
        if nu <= 0 {
            return i64::MIN / 2;
        }
        match self.policy {
            FastFlushingPolicy::FastStar => nu - self.clock as i64,
            _ => nu,
        }
    }

    fn pick_unit(&self) -> Option<u32> {
        match self.policy {
            FastFlushingPolicy::FlushAll => self.units.keys().next().copied(),
            FastFlushingPolicy::Random => {
                let ids: Vec<u32> = self.units.keys().copied().collect();
                if ids.is_empty() {
                    None
                } else {
                    let mut rng = rand::thread_rng();
                    Some(ids[rng.gen_range(0..ids.len())])
                }
            }
            FastFlushingPolicy::Fast | FastFlushingPolicy::FastStar => self
                .units
                .keys()
                .copied()
                .max_by_key(|&u| self.unit_priority(u)),
        }
    }

    fn materialize(&self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        match self.pages.get(&page) {
            Some(TrackedPage {
                status: Status::New { node, .. },
                ..
            }) => Ok(node.clone()),
            Some(TrackedPage {
                status: Status::Mod { deltas, .. },
                ..
            }) => {
                let mut base = super::read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default();
                for d in deltas {
                    d.apply(&mut base, self.dims);
                }
                Ok(base)
            }
            Some(TrackedPage {
                status: Status::Del { .. },
                ..
            }) => Err(Error::invariant("page should not be referenced: it is deleted")),
            None => Ok(super::read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default()),
        }
    }

    fn flush_unit(&mut self, store: &mut dyn PageStore, unit: u32) -> Result<()> {
        let mut page_ids = match self.units.remove(&unit) {
            Some(v) => v,
            None => return Ok(()),
        };
        page_ids.sort_unstable();
        if page_ids.is_empty() {
            return Ok(());
        }
        let page_size = store.page_size();
        let mut buf = vec![0u8; page_ids.len() * page_size];
        for (i, &page) in page_ids.iter().enumerate() {
            let height = self.pages.get(&page).map(|p| p.height).unwrap_or(0);
            match self.pages.get(&page).map(|p| &p.status) {
                Some(Status::Del { .. }) => {
                    Node::serialize_tombstone(&mut buf[i * page_size..(i + 1) * page_size]);
                }
                _ => {
                    let node = self.materialize(store, page, height)?;
                    node.serialize(&mut buf[i * page_size..(i + 1) * page_size], self.dims, self.tree_kind, height);
                }
            }
        }
        crate::page::write_batched(store, &page_ids, &buf)?;
        self.wal.append_flush(&page_ids)?;
        log::trace!("fast buffer flushed unit {} ({} pages)", unit, page_ids.len());
        for page in &page_ids {
            self.pages.remove(page);
            self.unit_of.remove(page);
        }
        Ok(())
    }

    fn maybe_flush(&mut self, store: &mut dyn PageStore) -> Result<()> {
        if self.wal.current_size() as usize + 4096 > self.log_size {
            self.compact()?;
        }
        let mut guard = 0;
        while self.pages.len() > self.max_pages && guard < self.units.len() + 1 {
            guard += 1;
            match self.pick_unit() {
                Some(u) => self.flush_unit(store, u)?,
                None => break,
            }
            if self.policy == FastFlushingPolicy::FlushAll {
                // flush-all drains every unit in one call to maybe_flush
                let rest: Vec<u32> = self.units.keys().copied().collect();
                for u in rest {
                    self.flush_unit(store, u)?;
                }
                break;
            }
        }
        Ok(())
    }

    fn compact(&mut self) -> Result<()> {
        let live: HashMap<i32, Status> = self
            .pages
            .iter()
            .map(|(&p, tp)| (p, tp.status.clone()))
            .collect();
        log::debug!("fast buffer compacting wal, {} live pages carried over", live.len());
        self.wal.compact(&live, self.dims, self.tree_kind)?;
        Ok(())
    }
}

impl NodeBuffer for FastBuffer {
    fn put_new(&mut self, store: &mut dyn PageStore, page: i32, height: i32, node: Node) -> Result<()> {
        self.wal.append_new(page, height, &node, self.dims, self.tree_kind)?;
        self.pages.insert(
            page,
            TrackedPage {
                height,
                status: Status::New { height, node },
                mod_count: 1,
            },
        );
        self.assign_unit(page);
        self.touch(page);
        self.maybe_flush(store)
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
        self.pages.insert(
            page,
            TrackedPage {
                height,
                status: Status::Del { height },
                mod_count: 1,
            },
        );
        self.assign_unit(page);
        self.touch(page);
        self.maybe_flush(store)
    }

    fn retrieve(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        self.materialize(store, page, height)
    }

    fn flush_all(&mut self, store: &mut dyn PageStore) -> Result<()> {
        let units: Vec<u32> = self.units.keys().copied().collect();
        for u in units {
            self.flush_unit(store, u)?;
        }
        Ok(())
    }
}

impl FastBuffer {
    fn apply_delta(&mut self, store: &mut dyn PageStore, page: i32, height: i32, delta: Delta) -> Result<()> {
        self.wal.append_mod(page, height, &delta, self.dims)?;
        match self.pages.get_mut(&page) {
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
                self.pages.insert(
                    page,
                    TrackedPage {
                        height,
                        status: Status::Mod {
                            height,
                            deltas: vec![delta],
                        },
                        mod_count: 0,
                    },
                );
            }
        }
        self.assign_unit(page);
        self.touch(page);
        self.maybe_flush(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{BlockDeviceSim, Entry};

    fn cfg(log_file: &std::path::Path) -> FastConfig {
        FastConfig {
            buffer_size: 2 * (64 + 4),
            flushing_unit_size: 2,
            flushing_policy: FastFlushingPolicy::Fast,
            log_size: 1 << 20,
            log_file: log_file.to_string_lossy().to_string(),
        }
    }

    #[test]
    fn flush_emits_one_flush_record_and_clears_ram() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockDeviceSim::new(64, 8);
        let mut buf = FastBuffer::new(2, TreeKind::RTree, 64, &cfg(&dir.path().join("t.wal"))).unwrap();
        for i in 0..8 {
            let node = Node::new(vec![Entry::new(i, BBox::new(vec![i as f64, i as f64], vec![i as f64 + 1.0, i as f64 + 1.0]))]);
            buf.put_new(&mut store, i, 0, node).unwrap();
        }
        assert!(buf.pages.len() <= buf.max_pages);
    }

    #[test]
    fn retrieve_replays_deltas_over_base_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockDeviceSim::new(64, 8);
        let mut buf = FastBuffer::new(2, TreeKind::RTree, 64, &cfg(&dir.path().join("t2.wal"))).unwrap();
        let node = Node::new(vec![Entry::new(9, BBox::new(vec![0.0, 0.0], vec![1.0, 1.0]))]);
        buf.put_new(&mut store, 100, 0, node).unwrap();
        buf.mod_bbox(&mut store, 100, 0, 0, Some(BBox::new(vec![0.0, 0.0], vec![5.0, 5.0])))
            .unwrap();
        let back = buf.retrieve(&mut store, 100, 0).unwrap();
        assert_eq!(back.entries[0].bbox.max[0], 5.0);
    }

    #[test]
    fn retrieving_deleted_page_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockDeviceSim::new(64, 8);
        let mut buf = FastBuffer::new(2, TreeKind::RTree, 64, &cfg(&dir.path().join("t3.wal"))).unwrap();
        buf.del_node(&mut store, 3, 0).unwrap();
        assert!(buf.retrieve(&mut store, 3, 0).is_err());
    }
}
