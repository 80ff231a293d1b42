//! Standard page-granular buffer variants (C7): LRU, HLRU, simplified-2Q,
//! full-2Q. All four cache whole node images (never deltas) and honor a
//! byte capacity counted per §4.9 as `nof_entries * (page_size + id_size[+
//! level_size])`.

use std::collections::VecDeque;

use crate::config::TreeKind;
use crate::error::Result;
use crate::geometry::BBox;
use crate::page::{Node, PageStore};

use super::{apply_bbox, apply_hole, apply_lhv, apply_pointer, read_node, write_node, write_tombstone, NodeBuffer};

const ID_SIZE: usize = 4;
const LEVEL_SIZE: usize = 4;

struct Cached {
    node: Node,
    dirty: bool,
    height: i32,
}

fn max_entries(max_capacity_bytes: usize, page_size: usize, per_entry_overhead: usize) -> usize {
    (max_capacity_bytes / (page_size + per_entry_overhead)).max(1)
}

/// Plain recency-ordered LRU cache (§4.9).
pub struct LruBuffer {
    dims: usize,
    tree_kind: TreeKind,
    capacity: usize,
    order: VecDeque<i32>,
    entries: std::collections::HashMap<i32, Cached>,
}

impl LruBuffer {
    pub fn new(dims: usize, tree_kind: TreeKind, page_size: usize, max_capacity_bytes: usize) -> Self {
        Self {
            dims,
            tree_kind,
            capacity: max_entries(max_capacity_bytes, page_size, ID_SIZE),
            order: VecDeque::new(),
            entries: std::collections::HashMap::new(),
        }
    }

    fn touch(&mut self, page: i32) {
        self.order.retain(|&p| p != page);
        self.order.push_back(page);
    }

    fn evict_if_needed(&mut self, store: &mut dyn PageStore) -> Result<()> {
        while self.entries.len() > self.capacity {
            let victim = match self.order.pop_front() {
                Some(p) => p,
                None => break,
            };
            if let Some(c) = self.entries.remove(&victim) {
                if c.dirty {
                    write_node(store, victim, self.dims, self.tree_kind, c.height, &c.node)?;
                }
            }
        }
        Ok(())
    }

    fn load_or_fetch(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        if let Some(c) = self.entries.get(&page) {
            return Ok(c.node.clone());
        }
        let node = read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default();
        self.entries.insert(
            page,
            Cached {
                node: node.clone(),
                dirty: false,
                height,
            },
        );
        self.touch(page);
        Ok(node)
    }

    fn mutate(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        f: impl FnOnce(&mut Node, usize),
    ) -> Result<()> {
        self.load_or_fetch(store, page, height)?;
        self.touch(page);
        let c = self.entries.get_mut(&page).unwrap();
        f(&mut c.node, self.dims);
        c.dirty = true;
        self.evict_if_needed(store)
    }
}

impl NodeBuffer for LruBuffer {
    fn contains(&self, page: i32) -> bool {
        self.entries.contains_key(&page)
    }

    fn put_new(&mut self, store: &mut dyn PageStore, page: i32, height: i32, node: Node) -> Result<()> {
        self.entries.insert(
            page,
            Cached {
                node,
                dirty: true,
                height,
            },
        );
        self.touch(page);
        self.evict_if_needed(store)
    }

    fn mod_bbox(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        bbox: Option<BBox>,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, _| apply_bbox(n, position, bbox))
    }

    fn mod_pointer(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        pointer: i32,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, d| apply_pointer(n, position, pointer, d))
    }

    fn mod_lhv(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        lhv: u64,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, _| apply_lhv(n, position, lhv))
    }

    fn mod_hole(&mut self, store: &mut dyn PageStore, page: i32, height: i32, position: usize) -> Result<()> {
        self.mutate(store, page, height, |n, d| apply_hole(n, position, d))
    }

    fn del_node(&mut self, store: &mut dyn PageStore, page: i32, _height: i32) -> Result<()> {
        self.entries.remove(&page);
        self.order.retain(|&p| p != page);
        write_tombstone(store, page)
    }

    fn retrieve(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        let node = self.load_or_fetch(store, page, height)?;
        self.touch(page);
        self.evict_if_needed(store)?;
        Ok(node)
    }

    fn flush_all(&mut self, store: &mut dyn PageStore) -> Result<()> {
        let ids: Vec<i32> = self.entries.keys().copied().collect();
        for id in ids {
            let (dirty, height, node) = {
                let c = self.entries.get(&id).unwrap();
                (c.dirty, c.height, c.node.clone())
            };
            if dirty {
                write_node(store, id, self.dims, self.tree_kind, height, &node)?;
                self.entries.get_mut(&id).unwrap().dirty = false;
            }
        }
        Ok(())
    }
}

/// LRU plus per-entry tree level; eviction skips entries whose level is
/// "in range" of the requested level, matching §4.9's HLRU rule.
pub struct HLruBuffer {
    dims: usize,
    tree_kind: TreeKind,
    capacity: usize,
    current_height: i32,
    order: VecDeque<i32>,
    entries: std::collections::HashMap<i32, Cached>,
}

impl HLruBuffer {
    pub fn new(dims: usize, tree_kind: TreeKind, page_size: usize, max_capacity_bytes: usize) -> Self {
        Self {
            dims,
            tree_kind,
            capacity: max_entries(max_capacity_bytes, page_size, ID_SIZE + LEVEL_SIZE),
            current_height: 0,
            order: VecDeque::new(),
            entries: std::collections::HashMap::new(),
        }
    }

    fn touch(&mut self, page: i32) {
        self.order.retain(|&p| p != page);
        self.order.push_back(page);
    }

    fn evict_if_needed(&mut self, store: &mut dyn PageStore, requested_level: i32) -> Result<()> {
        while self.entries.len() > self.capacity {
            let eligible = self.order.iter().position(|p| {
                let lvl = self.entries.get(p).map(|c| c.height).unwrap_or(0);
                lvl <= requested_level || lvl > self.current_height
            });
            let idx = eligible.unwrap_or(0);
            let victim = match self.order.remove(idx) {
                Some(p) => p,
                None => break,
            };
            if let Some(c) = self.entries.remove(&victim) {
                if c.dirty {
                    write_node(store, victim, self.dims, self.tree_kind, c.height, &c.node)?;
                }
            }
        }
        Ok(())
    }

    fn load_or_fetch(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        if let Some(c) = self.entries.get(&page) {
            return Ok(c.node.clone());
        }
        let node = read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default();
        self.entries.insert(
            page,
            Cached {
                node: node.clone(),
                dirty: false,
                height,
            },
        );
        self.touch(page);
        Ok(node)
    }

    fn mutate(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        f: impl FnOnce(&mut Node, usize),
    ) -> Result<()> {
        self.load_or_fetch(store, page, height)?;
        self.touch(page);
        let c = self.entries.get_mut(&page).unwrap();
        f(&mut c.node, self.dims);
        c.dirty = true;
        self.evict_if_needed(store, height)
    }
}

impl NodeBuffer for HLruBuffer {
    fn contains(&self, page: i32) -> bool {
        self.entries.contains_key(&page)
    }

    fn put_new(&mut self, store: &mut dyn PageStore, page: i32, height: i32, node: Node) -> Result<()> {
        self.entries.insert(
            page,
            Cached {
                node,
                dirty: true,
                height,
            },
        );
        self.touch(page);
        self.evict_if_needed(store, height)
    }

    fn mod_bbox(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        bbox: Option<BBox>,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, _| apply_bbox(n, position, bbox))
    }

    fn mod_pointer(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        pointer: i32,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, d| apply_pointer(n, position, pointer, d))
    }

    fn mod_lhv(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        lhv: u64,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, _| apply_lhv(n, position, lhv))
    }

    fn mod_hole(&mut self, store: &mut dyn PageStore, page: i32, height: i32, position: usize) -> Result<()> {
        self.mutate(store, page, height, |n, d| apply_hole(n, position, d))
    }

    fn del_node(&mut self, store: &mut dyn PageStore, page: i32, _height: i32) -> Result<()> {
        self.entries.remove(&page);
        self.order.retain(|&p| p != page);
        write_tombstone(store, page)
    }

    fn retrieve(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        let node = self.load_or_fetch(store, page, height)?;
        self.touch(page);
        self.evict_if_needed(store, height)?;
        Ok(node)
    }

    fn flush_all(&mut self, store: &mut dyn PageStore) -> Result<()> {
        let ids: Vec<i32> = self.entries.keys().copied().collect();
        for id in ids {
            let (dirty, height, node) = {
                let c = self.entries.get(&id).unwrap();
                (c.dirty, c.height, c.node.clone())
            };
            if dirty {
                write_node(store, id, self.dims, self.tree_kind, height, &node)?;
                self.entries.get_mut(&id).unwrap().dirty = false;
            }
        }
        Ok(())
    }

    fn notify_height_change(&mut self, new_height: i32) {
        self.current_height = new_height;
    }
}

/// Simplified 2Q: `Am` is a full LRU cache; `A1` holds ids only (a ghost
/// FIFO). Any access against a page not yet in `Am` writes/reads straight
/// through to disk and only registers the id in `A1` (§4.9).
pub struct Simplified2QBuffer {
    dims: usize,
    tree_kind: TreeKind,
    am_capacity: usize,
    a1_capacity: usize,
    am_order: VecDeque<i32>,
    am: std::collections::HashMap<i32, Cached>,
    a1: VecDeque<i32>,
}

impl Simplified2QBuffer {
    pub fn new(dims: usize, tree_kind: TreeKind, page_size: usize, max_capacity_bytes: usize) -> Self {
        let total = max_entries(max_capacity_bytes, page_size, ID_SIZE);
        Self {
            dims,
            tree_kind,
            am_capacity: (total / 2).max(1),
            a1_capacity: (total / 2).max(1),
            am_order: VecDeque::new(),
            am: std::collections::HashMap::new(),
            a1: VecDeque::new(),
        }
    }

    fn touch_am(&mut self, page: i32) {
        self.am_order.retain(|&p| p != page);
        self.am_order.push_back(page);
    }

    fn push_a1(&mut self, page: i32) {
        if !self.a1.contains(&page) {
            self.a1.push_back(page);
            while self.a1.len() > self.a1_capacity {
                self.a1.pop_front();
            }
        }
    }

    fn evict_am(&mut self, store: &mut dyn PageStore) -> Result<()> {
        while self.am.len() > self.am_capacity {
            let victim = match self.am_order.pop_front() {
                Some(p) => p,
                None => break,
            };
            if let Some(c) = self.am.remove(&victim) {
                if c.dirty {
                    write_node(store, victim, self.dims, self.tree_kind, c.height, &c.node)?;
                }
            }
        }
        Ok(())
    }

    fn promote(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        self.a1.retain(|&p| p != page);
        let node = read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default();
        self.am.insert(
            page,
            Cached {
                node: node.clone(),
                dirty: false,
                height,
            },
        );
        self.touch_am(page);
        self.evict_am(store)?;
        Ok(node)
    }

    fn mutate(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        f: impl FnOnce(&mut Node, usize),
    ) -> Result<()> {
        if self.am.contains_key(&page) {
            self.touch_am(page);
            let c = self.am.get_mut(&page).unwrap();
            f(&mut c.node, self.dims);
            c.dirty = true;
            return self.evict_am(store);
        }
        // A1-resident or a plain miss: write through immediately.
        let mut node = read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default();
        f(&mut node, self.dims);
        write_node(store, page, self.dims, self.tree_kind, height, &node)?;
        self.push_a1(page);
        Ok(())
    }
}

impl NodeBuffer for Simplified2QBuffer {
    fn contains(&self, page: i32) -> bool {
        self.am.contains_key(&page) || self.a1.contains(&page)
    }

    fn put_new(&mut self, store: &mut dyn PageStore, page: i32, height: i32, node: Node) -> Result<()> {
        write_node(store, page, self.dims, self.tree_kind, height, &node)?;
        self.push_a1(page);
        Ok(())
    }

    fn mod_bbox(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        bbox: Option<BBox>,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, _| apply_bbox(n, position, bbox))
    }

    fn mod_pointer(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        pointer: i32,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, d| apply_pointer(n, position, pointer, d))
    }

    fn mod_lhv(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        lhv: u64,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, _| apply_lhv(n, position, lhv))
    }

    fn mod_hole(&mut self, store: &mut dyn PageStore, page: i32, height: i32, position: usize) -> Result<()> {
        self.mutate(store, page, height, |n, d| apply_hole(n, position, d))
    }

    fn del_node(&mut self, store: &mut dyn PageStore, page: i32, _height: i32) -> Result<()> {
        self.am.remove(&page);
        self.am_order.retain(|&p| p != page);
        self.a1.retain(|&p| p != page);
        write_tombstone(store, page)
    }

    fn retrieve(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        if self.am.contains_key(&page) {
            self.touch_am(page);
            return Ok(self.am.get(&page).unwrap().node.clone());
        }
        if self.a1.contains(&page) {
            return self.promote(store, page, height);
        }
        let node = read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default();
        self.push_a1(page);
        Ok(node)
    }

    fn flush_all(&mut self, store: &mut dyn PageStore) -> Result<()> {
        let ids: Vec<i32> = self.am.keys().copied().collect();
        for id in ids {
            let (dirty, height, node) = {
                let c = self.am.get(&id).unwrap();
                (c.dirty, c.height, c.node.clone())
            };
            if dirty {
                write_node(store, id, self.dims, self.tree_kind, height, &node)?;
                self.am.get_mut(&id).unwrap().dirty = false;
            }
        }
        Ok(())
    }
}

/// Full 2Q: `Am` (LRU, with data), `A1in` (FIFO, with data), `A1out` (FIFO
/// of ids only, ghost). A hit in `A1out` promotes straight to `Am` (§4.9).
pub struct Full2QBuffer {
    dims: usize,
    tree_kind: TreeKind,
    am_capacity: usize,
    a1in_capacity: usize,
    a1out_capacity: usize,
    am_order: VecDeque<i32>,
    am: std::collections::HashMap<i32, Cached>,
    a1in_order: VecDeque<i32>,
    a1in: std::collections::HashMap<i32, Cached>,
    a1out: VecDeque<i32>,
}

impl Full2QBuffer {
    pub fn new(dims: usize, tree_kind: TreeKind, page_size: usize, max_capacity_bytes: usize) -> Self {
        let total = max_entries(max_capacity_bytes, page_size, ID_SIZE);
        let third = (total / 3).max(1);
        Self {
            dims,
            tree_kind,
            am_capacity: third,
            a1in_capacity: third,
            a1out_capacity: third,
            am_order: VecDeque::new(),
            am: std::collections::HashMap::new(),
            a1in_order: VecDeque::new(),
            a1in: std::collections::HashMap::new(),
            a1out: VecDeque::new(),
        }
    }

    fn touch_am(&mut self, page: i32) {
        self.am_order.retain(|&p| p != page);
        self.am_order.push_back(page);
    }

    fn evict_am(&mut self, store: &mut dyn PageStore) -> Result<()> {
        while self.am.len() > self.am_capacity {
            let victim = match self.am_order.pop_front() {
                Some(p) => p,
                None => break,
            };
            if let Some(c) = self.am.remove(&victim) {
                if c.dirty {
                    write_node(store, victim, self.dims, self.tree_kind, c.height, &c.node)?;
                }
            }
        }
        Ok(())
    }

    fn insert_am(&mut self, store: &mut dyn PageStore, page: i32, c: Cached) -> Result<()> {
        self.am.insert(page, c);
        self.touch_am(page);
        self.evict_am(store)
    }

    fn evict_a1in(&mut self, store: &mut dyn PageStore) -> Result<()> {
        while self.a1in.len() > self.a1in_capacity {
            let victim = match self.a1in_order.pop_front() {
                Some(p) => p,
                None => break,
            };
            if let Some(c) = self.a1in.remove(&victim) {
                if c.dirty {
                    write_node(store, victim, self.dims, self.tree_kind, c.height, &c.node)?;
                }
            }
            self.a1out.push_back(victim);
            while self.a1out.len() > self.a1out_capacity {
                self.a1out.pop_front();
            }
        }
        Ok(())
    }

    fn mutate(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        f: impl FnOnce(&mut Node, usize),
    ) -> Result<()> {
        if self.am.contains_key(&page) {
            self.touch_am(page);
            let c = self.am.get_mut(&page).unwrap();
            f(&mut c.node, self.dims);
            c.dirty = true;
            return self.evict_am(store);
        }
        if self.a1in.contains_key(&page) {
            let c = self.a1in.get_mut(&page).unwrap();
            f(&mut c.node, self.dims);
            c.dirty = true;
            return Ok(());
        }
        if self.a1out.contains(&page) {
            self.a1out.retain(|&p| p != page);
            let mut node = read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default();
            f(&mut node, self.dims);
            return self.insert_am(
                store,
                page,
                Cached {
                    node,
                    dirty: true,
                    height,
                },
            );
        }
        let mut node = read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default();
        f(&mut node, self.dims);
        self.a1in.insert(
            page,
            Cached {
                node,
                dirty: true,
                height,
            },
        );
        self.a1in_order.push_back(page);
        self.evict_a1in(store)
    }
}

impl NodeBuffer for Full2QBuffer {
    fn contains(&self, page: i32) -> bool {
        self.am.contains_key(&page) || self.a1in.contains_key(&page)
    }

    fn put_new(&mut self, store: &mut dyn PageStore, page: i32, height: i32, node: Node) -> Result<()> {
        self.a1in.insert(
            page,
            Cached {
                node,
                dirty: true,
                height,
            },
        );
        self.a1in_order.push_back(page);
        self.evict_a1in(store)
    }

    fn mod_bbox(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        bbox: Option<BBox>,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, _| apply_bbox(n, position, bbox))
    }

    fn mod_pointer(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        pointer: i32,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, d| apply_pointer(n, position, pointer, d))
    }

    fn mod_lhv(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        lhv: u64,
    ) -> Result<()> {
        self.mutate(store, page, height, |n, _| apply_lhv(n, position, lhv))
    }

    fn mod_hole(&mut self, store: &mut dyn PageStore, page: i32, height: i32, position: usize) -> Result<()> {
        self.mutate(store, page, height, |n, d| apply_hole(n, position, d))
    }

    fn del_node(&mut self, store: &mut dyn PageStore, page: i32, _height: i32) -> Result<()> {
        self.am.remove(&page);
        self.am_order.retain(|&p| p != page);
        self.a1in.remove(&page);
        self.a1in_order.retain(|&p| p != page);
        self.a1out.retain(|&p| p != page);
        write_tombstone(store, page)
    }

    fn retrieve(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        if self.am.contains_key(&page) {
            self.touch_am(page);
            return Ok(self.am.get(&page).unwrap().node.clone());
        }
        if let Some(c) = self.a1in.get(&page) {
            return Ok(c.node.clone());
        }
        if self.a1out.contains(&page) {
            self.a1out.retain(|&p| p != page);
            let node = read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default();
            self.insert_am(
                store,
                page,
                Cached {
                    node: node.clone(),
                    dirty: false,
                    height,
                },
            )?;
            return Ok(node);
        }
        let node = read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default();
        self.a1in.insert(
            page,
            Cached {
                node: node.clone(),
                dirty: false,
                height,
            },
        );
        self.a1in_order.push_back(page);
        self.evict_a1in(store)?;
        Ok(node)
    }

    fn flush_all(&mut self, store: &mut dyn PageStore) -> Result<()> {
        for ids in [
            self.am.keys().copied().collect::<Vec<_>>(),
            self.a1in.keys().copied().collect::<Vec<_>>(),
        ] {
            for id in ids {
                if let Some(c) = self.am.get(&id) {
                    if c.dirty {
                        let (height, node) = (c.height, c.node.clone());
                        write_node(store, id, self.dims, self.tree_kind, height, &node)?;
                        self.am.get_mut(&id).unwrap().dirty = false;
                    }
                } else if let Some(c) = self.a1in.get(&id) {
                    if c.dirty {
                        let (height, node) = (c.height, c.node.clone());
                        write_node(store, id, self.dims, self.tree_kind, height, &node)?;
                        self.a1in.get_mut(&id).unwrap().dirty = false;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::BlockDeviceSim;

    fn bbox(a: f64, b: f64) -> BBox {
        BBox::new(vec![a, a], vec![b, b])
    }

    #[test]
    fn lru_evicts_oldest_when_over_capacity() {
        let mut store = BlockDeviceSim::new(64, 4);
        // capacity for exactly 2 entries: 2 * (64 + 4) bytes
        let mut buf = LruBuffer::new(2, TreeKind::RTree, 64, 2 * (64 + ID_SIZE));
        for i in 0..3 {
            buf.put_new(
                &mut store,
                i,
                0,
                Node::new(vec![crate::page::Entry::new(i, bbox(0.0, 1.0))]),
            )
            .unwrap();
        }
        assert_eq!(buf.entries.len(), 2);
        assert!(!buf.entries.contains_key(&0));
    }

    #[test]
    fn hlru_notifies_height_change() {
        let mut buf = HLruBuffer::new(2, TreeKind::RTree, 64, 10 * (64 + ID_SIZE + LEVEL_SIZE));
        buf.notify_height_change(3);
        assert_eq!(buf.current_height, 3);
    }

    #[test]
    fn simplified_2q_promotes_on_second_touch() {
        let mut store = BlockDeviceSim::new(64, 4);
        let mut buf = Simplified2QBuffer::new(2, TreeKind::RTree, 64, 20 * (64 + ID_SIZE));
        buf.put_new(&mut store, 1, 0, Node::new(vec![crate::page::Entry::new(1, bbox(0.0, 1.0))]))
            .unwrap();
        assert!(buf.a1.contains(&1));
        buf.retrieve(&mut store, 1, 0).unwrap();
        assert!(buf.am.contains_key(&1));
    }

    #[test]
    fn full_2q_ghost_hit_promotes_to_am() {
        let mut store = BlockDeviceSim::new(64, 4);
        let mut buf = Full2QBuffer::new(2, TreeKind::RTree, 64, 6 * (64 + ID_SIZE));
        for i in 0..5 {
            buf.put_new(
                &mut store,
                i,
                0,
                Node::new(vec![crate::page::Entry::new(i, bbox(0.0, 1.0))]),
            )
            .unwrap();
        }
        // page 0 should have been evicted from a1in into a1out by now
        if buf.a1out.contains(&0) {
            buf.retrieve(&mut store, 0, 0).unwrap();
            assert!(buf.am.contains_key(&0));
        }
    }
}
