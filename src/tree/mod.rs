//! R-tree family core (C5): shared insert/remove/search machinery for
//! R-tree, R*-tree and Hilbert R-tree. FOR-tree (C6) is different enough
//! in shape (overflow nodes, no splitting) to live in its own module.

mod for_tree;
mod split;

pub use for_tree::{ForTree, ForTreeCtx, OverflowEntry, OverflowTable};
pub use split::split_entries;

use std::collections::HashSet;

use crate::buffer::NodeBuffer;
use crate::config::{IndexConfig, ReinsertDirection, SplitStrategy, TreeKind};
use crate::error::{Error, Result};
use crate::geometry::{BBox, Predicate};
use crate::observer::Observer;
use crate::page::{Entry, Node, PageStore};
use crate::tree_info::TreeInfo;

/// Bundles the collaborators every tree operation threads through, so the
/// recursive insert/remove/search helpers below don't carry four separate
/// parameters at every call site.
pub struct TreeCtx<'a> {
    pub store: &'a mut dyn PageStore,
    pub buffer: &'a mut dyn NodeBuffer,
    pub info: &'a mut TreeInfo,
    pub observer: &'a dyn Observer,
}

fn carries_lhv(tree_kind: TreeKind, height: i32) -> bool {
    tree_kind == TreeKind::HilbertRTree && height > 0
}

/// Interleaves the low bits of two quantized f64 coordinates into a Morton
/// code. A true Hilbert curve needs a fixed spatial extent to quantize
/// against, which this engine does not require its callers to configure;
/// Morton order keeps the same "locality-preserving 1-D ordering of a
/// bounding box center" property ChooseLeaf and the sorted-insert position
/// need, without that extra configuration surface.
fn hilbert_value(bbox: &BBox) -> u64 {
    let center = bbox.center();
    let qx = quantize(center.first().copied().unwrap_or(0.0));
    let qy = quantize(center.get(1).copied().unwrap_or(0.0));
    interleave(qx) | (interleave(qy) << 1)
}

fn quantize(v: f64) -> u32 {
    (v.to_bits() >> 32) as u32
}

fn interleave(mut x: u32) -> u64 {
    let mut result: u64 = 0;
    for i in 0..32 {
        result |= (((x & 1) as u64)) << (2 * i);
        x >>= 1;
    }
    result
}

pub struct RTree {
    dims: usize,
    tree_kind: TreeKind,
    min_leaf: usize,
    max_leaf: usize,
    min_int: usize,
    max_int: usize,
    split_strategy: SplitStrategy,
    reinsert_perc_leaf: f64,
    reinsert_perc_internal: f64,
    reinsert_direction: ReinsertDirection,
}

impl RTree {
    pub fn new(cfg: &IndexConfig) -> Self {
        Self {
            dims: cfg.dimensions,
            tree_kind: cfg.tree_kind,
            min_leaf: cfg.min_entries_leaf,
            max_leaf: cfg.max_entries_leaf,
            min_int: cfg.min_entries_int,
            max_int: cfg.max_entries_int,
            split_strategy: cfg.split_strategy,
            reinsert_perc_leaf: cfg.rstar.reinsert_perc_leaf,
            reinsert_perc_internal: cfg.rstar.reinsert_perc_internal,
            reinsert_direction: cfg.rstar.reinsert_direction,
        }
    }

    fn bounds(&self, height: i32) -> (usize, usize) {
        if height == 0 {
            (self.min_leaf, self.max_leaf)
        } else {
            (self.min_int, self.max_int)
        }
    }

    pub fn insert(&self, ctx: &mut TreeCtx, pointer: i32, bbox: BBox) -> Result<()> {
        let lhv = if self.tree_kind == TreeKind::HilbertRTree {
            Some(hilbert_value(&bbox))
        } else {
            None
        };
        let entry = Entry { pointer, bbox, lhv };
        let mut pending = vec![(entry, 0i32)];
        while let Some((entry, target_height)) = pending.pop() {
            let mut reinsert_state = HashSet::new();
            let mut spawned = Vec::new();
            let root_height = ctx.info.height;
            let sibling = self.insert_entry(
                ctx,
                ctx.info.root_page_id,
                root_height,
                target_height,
                entry,
                &mut reinsert_state,
                &mut spawned,
            )?;
            if let Some(sib) = sibling {
                self.grow_root(ctx, sib)?;
            }
            pending.extend(spawned);
        }
        Ok(())
    }

    fn grow_root(&self, ctx: &mut TreeCtx, sibling: Entry) -> Result<()> {
        let root_height = ctx.info.height;
        let old_root_page = ctx.info.root_page_id;
        let old_root = ctx.buffer.retrieve(ctx.store, old_root_page, root_height)?;
        let old_bbox = old_root.bbox_union().unwrap_or_else(|| BBox::empty(self.dims));
        let old_lhv = old_root.entries.iter().filter_map(|e| e.lhv).max();
        let new_height = root_height + 1;
        let e1 = Entry {
            pointer: old_root_page,
            bbox: old_bbox,
            lhv: if carries_lhv(self.tree_kind, new_height) {
                Some(old_lhv.unwrap_or(0))
            } else {
                None
            },
        };
        let new_root_page = ctx.info.allocate();
        ctx.buffer
            .put_new(ctx.store, new_root_page, new_height, Node::new(vec![e1, sibling]))?;
        ctx.info.root_page_id = new_root_page;
        ctx.info.update_height(new_height);
        ctx.buffer.notify_height_change(new_height);
        ctx.observer.on_split(old_root_page, new_height, new_root_page);
        log::debug!("grew root from page {} to page {} (height {})", old_root_page, new_root_page, new_height);
        Ok(())
    }

    fn insert_entry(
        &self,
        ctx: &mut TreeCtx,
        page: i32,
        height: i32,
        target_height: i32,
        entry: Entry,
        reinsert_state: &mut HashSet<i32>,
        spawned: &mut Vec<(Entry, i32)>,
    ) -> Result<Option<Entry>> {
        if height == target_height {
            return self.add_to_node(ctx, page, height, entry, reinsert_state, spawned);
        }
        let node = ctx.buffer.retrieve(ctx.store, page, height)?;
        let idx = self.choose_subtree(&node, &entry.bbox, entry.lhv);
        let child_page = node.entries[idx].pointer;
        let sibling = self.insert_entry(ctx, child_page, height - 1, target_height, entry, reinsert_state, spawned)?;
        let child_node = ctx.buffer.retrieve(ctx.store, child_page, height - 1)?;
        if let Some(child_bbox) = child_node.bbox_union() {
            ctx.buffer.mod_bbox(ctx.store, page, height, idx, Some(child_bbox))?;
        }
        match sibling {
            None => Ok(None),
            Some(sib) => self.add_to_node(ctx, page, height, sib, reinsert_state, spawned),
        }
    }

    fn choose_subtree(&self, node: &Node, bbox: &BBox, lhv: Option<u64>) -> usize {
        if self.tree_kind == TreeKind::HilbertRTree {
            let target = lhv.unwrap_or_else(|| hilbert_value(bbox));
            for (i, e) in node.entries.iter().enumerate() {
                if e.lhv.unwrap_or(u64::MAX) >= target {
                    return i;
                }
            }
            return node.entries.len() - 1;
        }
        let mut best = 0usize;
        let mut best_enl = f64::INFINITY;
        let mut best_area = f64::INFINITY;
        for (i, e) in node.entries.iter().enumerate() {
            let enl = BBox::required_expansion_area(bbox, &e.bbox);
            let area = e.bbox.area();
            if enl < best_enl || ((enl - best_enl).abs() < crate::geometry::EPSILON && area < best_area) {
                best = i;
                best_enl = enl;
                best_area = area;
            }
        }
        best
    }

    fn insert_position(&self, node: &Node, entry: &Entry, height: i32) -> usize {
        if self.tree_kind != TreeKind::HilbertRTree {
            return node.entries.len();
        }
        let target = if height > 0 {
            entry.lhv.unwrap_or(0)
        } else {
            hilbert_value(&entry.bbox)
        };
        for (i, e) in node.entries.iter().enumerate() {
            let ev = if height > 0 { e.lhv.unwrap_or(0) } else { hilbert_value(&e.bbox) };
            if ev > target {
                return i;
            }
        }
        node.entries.len()
    }

    /// Writes one entry into a node's granular buffer ops, opening a gap
    /// first when the node keeps lhv order (§4.10's hole-then-fill
    /// convention, open question resolved in DESIGN.md).
    fn node_insert_at(&self, ctx: &mut TreeCtx, page: i32, height: i32, position: usize, entry: &Entry) -> Result<()> {
        let current_len = ctx.buffer.retrieve(ctx.store, page, height)?.nofentries();
        if position < current_len {
            ctx.buffer.mod_hole(ctx.store, page, height, position)?;
        }
        ctx.buffer.mod_pointer(ctx.store, page, height, position, entry.pointer)?;
        ctx.buffer.mod_bbox(ctx.store, page, height, position, Some(entry.bbox.clone()))?;
        if carries_lhv(self.tree_kind, height) {
            ctx.buffer.mod_lhv(ctx.store, page, height, position, entry.lhv.unwrap_or(0))?;
        }
        Ok(())
    }

    fn add_to_node(
        &self,
        ctx: &mut TreeCtx,
        page: i32,
        height: i32,
        entry: Entry,
        reinsert_state: &mut HashSet<i32>,
        spawned: &mut Vec<(Entry, i32)>,
    ) -> Result<Option<Entry>> {
        let node = ctx.buffer.retrieve(ctx.store, page, height)?;
        let position = self.insert_position(&node, &entry, height);
        let (min, max) = self.bounds(height);
        self.node_insert_at(ctx, page, height, position, &entry)?;
        ctx.observer.on_node_write(page, height);
        if node.nofentries() + 1 <= max {
            return Ok(None);
        }
        if self.tree_kind == TreeKind::RStarTree && reinsert_state.insert(height) {
            return self.forced_reinsert(ctx, page, height, min, spawned);
        }
        self.split(ctx, page, height, min)
    }

    fn forced_reinsert(
        &self,
        ctx: &mut TreeCtx,
        page: i32,
        height: i32,
        _min: usize,
        spawned: &mut Vec<(Entry, i32)>,
    ) -> Result<Option<Entry>> {
        let node = ctx.buffer.retrieve(ctx.store, page, height)?;
        let center = node.bbox_union().unwrap_or_else(|| BBox::empty(self.dims)).center();
        let reference = BBox::point(&center);
        let perc = if height == 0 {
            self.reinsert_perc_leaf
        } else {
            self.reinsert_perc_internal
        };
        let remove_n = ((node.nofentries() as f64) * perc).round().max(1.0) as usize;
        let mut order: Vec<usize> = (0..node.nofentries()).collect();
        order.sort_by(|&a, &b| {
            let da = node.entries[a].bbox.center_distance(&reference);
            let db = node.entries[b].bbox.center_distance(&reference);
            db.partial_cmp(&da).unwrap()
        });
        let (to_remove, to_keep): (Vec<usize>, Vec<usize>) = match self.reinsert_direction {
            ReinsertDirection::Far => (order[..remove_n].to_vec(), order[remove_n..].to_vec()),
            ReinsertDirection::Close => {
                let n = order.len();
                let split = n - remove_n;
                (order[split..].to_vec(), order[..split].to_vec())
            }
        };
        let kept: Vec<Entry> = to_keep.iter().map(|&i| node.entries[i].clone()).collect();
        ctx.buffer.put_new(ctx.store, page, height, Node::new(kept))?;
        ctx.observer.on_reinsert(to_remove.len(), height);
        for i in to_remove {
            spawned.push((node.entries[i].clone(), height));
        }
        Ok(None)
    }

    fn split(&self, ctx: &mut TreeCtx, page: i32, height: i32, min: usize) -> Result<Option<Entry>> {
        let node = ctx.buffer.retrieve(ctx.store, page, height)?;
        let (a, b) = if self.tree_kind == TreeKind::HilbertRTree {
            hilbert_positional_split(node.entries.clone(), min)
        } else {
            split_entries(node.entries.clone(), self.split_strategy, min, self.dims)
        };
        let node_a = Node::new(a);
        let node_b = Node::new(b);
        let new_page = ctx.info.allocate();
        ctx.buffer.put_new(ctx.store, page, height, node_a)?;
        ctx.buffer.put_new(ctx.store, new_page, height, node_b.clone())?;
        ctx.observer.on_split(page, height, new_page);
        log::trace!("split page {} into {} and {} at height {}", page, page, new_page, height);
        let sib_bbox = node_b.bbox_union().unwrap_or_else(|| BBox::empty(self.dims));
        let sib_lhv = node_b.entries.iter().filter_map(|e| e.lhv).max();
        Ok(Some(Entry {
            pointer: new_page,
            bbox: sib_bbox,
            lhv: if carries_lhv(self.tree_kind, height) {
                Some(sib_lhv.unwrap_or(0))
            } else {
                None
            },
        }))
    }

    pub fn remove(&self, ctx: &mut TreeCtx, pointer: i32, bbox: &BBox) -> Result<bool> {
        let root_height = ctx.info.height;
        let mut stack = Vec::new();
        let found = self.find_leaf(ctx, ctx.info.root_page_id, root_height, pointer, bbox, &mut stack)?;
        if !found {
            return Ok(false);
        }
        let mut reinsert_queue = Vec::new();
        self.condense_tree(ctx, stack, &mut reinsert_queue)?;
        self.collapse_root(ctx)?;
        for (entry, height) in reinsert_queue {
            self.insert_entry_top(ctx, entry, height)?;
        }
        Ok(true)
    }

    fn insert_entry_top(&self, ctx: &mut TreeCtx, entry: Entry, target_height: i32) -> Result<()> {
        let mut pending = vec![(entry, target_height)];
        while let Some((entry, h)) = pending.pop() {
            let mut reinsert_state = HashSet::new();
            let mut spawned = Vec::new();
            let root_height = ctx.info.height;
            let sibling = self.insert_entry(ctx, ctx.info.root_page_id, root_height, h, entry, &mut reinsert_state, &mut spawned)?;
            if let Some(sib) = sibling {
                self.grow_root(ctx, sib)?;
            }
            pending.extend(spawned);
        }
        Ok(())
    }

    /// Descends every child whose bbox contains the target point, using an
    /// explicit stack (§4.6). Records `(page, height, entry_index)` for
    /// every level visited on the path to the matching leaf entry.
    fn find_leaf(
        &self,
        ctx: &mut TreeCtx,
        page: i32,
        height: i32,
        pointer: i32,
        bbox: &BBox,
        stack: &mut Vec<(i32, i32, usize)>,
    ) -> Result<bool> {
        let node = ctx.buffer.retrieve(ctx.store, page, height)?;
        if height == 0 {
            for (i, e) in node.entries.iter().enumerate() {
                if e.pointer == pointer && e.bbox.equal(bbox) {
                    stack.push((page, height, i));
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        for (i, e) in node.entries.iter().enumerate() {
            if e.bbox.contains(bbox) || e.bbox.intersects(bbox) {
                stack.push((page, height, i));
                if self.find_leaf(ctx, e.pointer, height - 1, pointer, bbox, stack)? {
                    return Ok(true);
                }
                stack.pop();
            }
        }
        Ok(false)
    }

    /// Removes the leaf entry at the top of `stack`, then walks back up
    /// tightening or detaching nodes that fall under `min_entries` (§4.6).
    fn condense_tree(&self, ctx: &mut TreeCtx, mut stack: Vec<(i32, i32, usize)>, reinsert_queue: &mut Vec<(Entry, i32)>) -> Result<()> {
        let (leaf_page, leaf_height, leaf_idx) = stack.pop().unwrap();
        ctx.buffer.mod_bbox(ctx.store, leaf_page, leaf_height, leaf_idx, None)?;
        let mut removed_pages: HashSet<i32> = HashSet::new();
        let mut shrunk_page = leaf_page;
        let mut shrunk_height = leaf_height;

        while let Some((page, height, idx)) = stack.pop() {
            let (min, _) = self.bounds(shrunk_height);
            let shrunk_node = ctx.buffer.retrieve(ctx.store, shrunk_page, shrunk_height)?;
            if shrunk_node.nofentries() < min && shrunk_page != ctx.info.root_page_id {
                // detach: free the underflowed node, queue its live entries
                // for reinsertion at their original height, unless they
                // still reference a page already queued for removal.
                let reinsert_height = (shrunk_height - 1).max(0);
                for e in &shrunk_node.entries {
                    if !removed_pages.contains(&e.pointer) {
                        reinsert_queue.push((e.clone(), reinsert_height));
                    }
                }
                ctx.buffer.del_node(ctx.store, shrunk_page, shrunk_height)?;
                ctx.info.free(shrunk_page);
                removed_pages.insert(shrunk_page);
                ctx.buffer.mod_bbox(ctx.store, page, height, idx, None)?;
            } else if let Some(new_bbox) = shrunk_node.bbox_union() {
                let parent_node = ctx.buffer.retrieve(ctx.store, page, height)?;
                let unchanged = parent_node
                    .entries
                    .get(idx)
                    .map_or(false, |e| e.bbox.equal(&new_bbox));
                if !unchanged {
                    ctx.buffer.mod_bbox(ctx.store, page, height, idx, Some(new_bbox))?;
                } else {
                    break;
                }
            }
            shrunk_page = page;
            shrunk_height = height;
        }
        Ok(())
    }

    /// If the root has exactly one child and height > 0, collapse it:
    /// free the root page, promote the child to root, decrement height.
    fn collapse_root(&self, ctx: &mut TreeCtx) -> Result<()> {
        loop {
            if ctx.info.height == 0 {
                return Ok(());
            }
            let root = ctx.buffer.retrieve(ctx.store, ctx.info.root_page_id, ctx.info.height)?;
            if root.nofentries() != 1 {
                return Ok(());
            }
            let only_child = root.entries[0].pointer;
            let old_root_page = ctx.info.root_page_id;
            ctx.info.root_page_id = only_child;
            ctx.info.update_height(ctx.info.height - 1);
            ctx.buffer.notify_height_change(ctx.info.height);
            ctx.buffer.del_node(ctx.store, old_root_page, ctx.info.height + 1)?;
            ctx.info.free(old_root_page);
        }
    }

    pub fn search(&self, ctx: &mut TreeCtx, bbox: &BBox, predicate: Predicate) -> Result<Vec<i32>> {
        let mut out = Vec::new();
        let root_height = ctx.info.height;
        self.search_rec(ctx, ctx.info.root_page_id, root_height, bbox, predicate, &mut out)?;
        ctx.observer.on_search_result(out.len());
        Ok(out)
    }

    fn search_rec(&self, ctx: &mut TreeCtx, page: i32, height: i32, bbox: &BBox, predicate: Predicate, out: &mut Vec<i32>) -> Result<()> {
        let node = ctx.buffer.retrieve(ctx.store, page, height)?;
        if height == 0 {
            for e in &node.entries {
                if e.bbox.check_predicate(bbox, predicate) {
                    out.push(e.pointer);
                }
            }
            return Ok(());
        }
        for e in &node.entries {
            if e.bbox.intersects(bbox) {
                self.search_rec(ctx, e.pointer, height - 1, bbox, predicate, out)?;
            }
        }
        Ok(())
    }
}

/// Hilbert R-tree's positional split: entries are already lhv-ordered
/// (or, at leaf level, ordered by the just-computed Hilbert value of each
/// entry's center); the overflowing node splits at the midpoint rather
/// than by any of the area-based strategies in `split.rs`.
fn hilbert_positional_split(entries: Vec<Entry>, min_entries: usize) -> (Vec<Entry>, Vec<Entry>) {
    let n = entries.len();
    let mid = (n / 2).max(min_entries).min(n - min_entries);
    let mut iter = entries.into_iter();
    let a: Vec<Entry> = (&mut iter).take(mid).collect();
    let b: Vec<Entry> = iter.collect();
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::NoBuffer;
    use crate::config::{BufferKind, IndexConfig};
    use crate::page::BlockDeviceSim;

    fn new_ctx_parts(dims: usize, tree_kind: TreeKind) -> (BlockDeviceSim, Box<dyn NodeBuffer>, TreeInfo) {
        let store = BlockDeviceSim::new(256, 8);
        let buffer: Box<dyn NodeBuffer> = Box::new(NoBuffer::new(dims, tree_kind));
        let info = TreeInfo::new();
        (store, buffer, info)
    }

    fn cfg(tree_kind: TreeKind) -> IndexConfig {
        IndexConfig::builder(tree_kind, BufferKind::None)
            .page_size(256)
            .dimensions(2)
            .fan_out_leaf(2, 4)
            .fan_out_internal(2, 4)
            .build()
            .unwrap()
    }

    fn rect(a: f64, b: f64) -> BBox {
        BBox::new(vec![a, a], vec![b, b])
    }

    #[test]
    fn insert_five_rects_splits_root_and_grows_height() {
        let cfg = cfg(TreeKind::RTree);
        let tree = RTree::new(&cfg);
        let (mut store, mut buffer, mut info) = new_ctx_parts(2, TreeKind::RTree);
        let observer = crate::observer::NullObserver;
        let mut ctx = TreeCtx {
            store: &mut store,
            buffer: &mut *buffer,
            info: &mut info,
            observer: &observer,
        };
        for (p, (lo, hi)) in [(1, (0.0, 1.0)), (2, (2.0, 3.0)), (3, (4.0, 5.0)), (4, (6.0, 7.0)), (5, (8.0, 9.0))] {
            tree.insert(&mut ctx, p, rect(lo, hi)).unwrap();
        }
        assert_eq!(ctx.info.height, 1);
        let found = tree.search(&mut ctx, &rect(0.0, 9.0), Predicate::Intersects).unwrap();
        let mut found = found;
        found.sort_unstable();
        assert_eq!(found, vec![1, 2, 3, 4, 5]);
        let none = tree.search(&mut ctx, &BBox::new(vec![2.5, 2.5], vec![2.6, 2.6]), Predicate::Intersects).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn remove_then_search_equal_finds_nothing() {
        let cfg = cfg(TreeKind::RTree);
        let tree = RTree::new(&cfg);
        let (mut store, mut buffer, mut info) = new_ctx_parts(2, TreeKind::RTree);
        let observer = crate::observer::NullObserver;
        let mut ctx = TreeCtx {
            store: &mut store,
            buffer: &mut *buffer,
            info: &mut info,
            observer: &observer,
        };
        for (p, (lo, hi)) in [(1, (0.0, 1.0)), (2, (2.0, 3.0)), (3, (4.0, 5.0)), (4, (6.0, 7.0)), (5, (8.0, 9.0))] {
            tree.insert(&mut ctx, p, rect(lo, hi)).unwrap();
        }
        let removed = tree.remove(&mut ctx, 3, &rect(4.0, 5.0)).unwrap();
        assert!(removed);
        let found = tree.search(&mut ctx, &rect(4.0, 5.0), Predicate::Equal).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn rstar_second_overflow_in_same_insert_splits() {
        let mut cfg = cfg(TreeKind::RStarTree);
        cfg.split_strategy = SplitStrategy::RStar;
        let tree = RTree::new(&cfg);
        let (mut store, mut buffer, mut info) = new_ctx_parts(2, TreeKind::RStarTree);
        let observer = crate::observer::NullObserver;
        let mut ctx = TreeCtx {
            store: &mut store,
            buffer: &mut *buffer,
            info: &mut info,
            observer: &observer,
        };
        for p in 0..20i32 {
            let f = p as f64 * 10.0;
            tree.insert(&mut ctx, p, rect(f, f + 1.0)).unwrap();
        }
        assert!(ctx.info.height >= 1);
    }

    #[test]
    fn hilbert_insert_keeps_leaf_entries_lhv_ordered_by_center() {
        let cfg = cfg(TreeKind::HilbertRTree);
        let tree = RTree::new(&cfg);
        let (mut store, mut buffer, mut info) = new_ctx_parts(2, TreeKind::HilbertRTree);
        let observer = crate::observer::NullObserver;
        let mut ctx = TreeCtx {
            store: &mut store,
            buffer: &mut *buffer,
            info: &mut info,
            observer: &observer,
        };
        for (p, (lo, hi)) in [(1, (0.0, 1.0)), (2, (2.0, 3.0)), (3, (4.0, 5.0))] {
            tree.insert(&mut ctx, p, rect(lo, hi)).unwrap();
        }
        let found = tree.search(&mut ctx, &rect(0.0, 5.0), Predicate::Intersects).unwrap();
        assert_eq!(found.len(), 3);
    }
}
