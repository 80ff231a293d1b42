//! FOR-tree core (C6): a second flash-aware strategy expressed at the tree
//! layer, tolerating overflow instead of splitting on the spot.
//!
//! A *primary node* (P-node) keeps its own page id for its whole life;
//! entries that do not fit are chained onto *overflow nodes* (O-nodes)
//! reachable only through the [`OverflowTable`], never through a parent
//! entry. Access pressure (`tsc`, a per-P-node search-traversal counter)
//! eventually triggers **MergeBack**, which rewrites `P ∪ its O-nodes`
//! into a fresh P plus the minimum number of O-nodes the remaining
//! entries need. Any O-node that MergeBack could not fold back into P is
//! promoted to a first-class sibling entry in P's parent — the same
//! structural role a split's sibling plays in `tree::RTree` — which is
//! how this tree still grows in height under sustained overflow pressure
//! (§4.8, §9's AdjustTree note).

use std::collections::HashMap;

use crate::buffer::NodeBuffer;
use crate::config::{ForTreeConfig, IndexConfig};
use crate::error::Result;
use crate::geometry::{union_all, BBox};
use crate::observer::Observer;
use crate::page::{Entry, Node, PageStore};
use crate::tree_info::TreeInfo;

/// Per-primary-node overflow bookkeeping (§3's overflow-node table).
#[derive(Debug, Clone, Default)]
pub struct OverflowEntry {
    /// Number of overflow nodes currently chained off this primary node.
    pub k: u32,
    /// Count of searches that have traversed this primary's overflow chain.
    pub tsc: u32,
    pub overflow_pages: Vec<i32>,
}

/// Maps a primary node's page id to its overflow chain. Owned by the
/// façade alongside `TreeInfo`, the way `TreeInfo` owns the free-page
/// stack — neither the buffer nor the page store knows this table exists.
#[derive(Debug, Clone, Default)]
pub struct OverflowTable {
    map: HashMap<i32, OverflowEntry>,
}

impl OverflowTable {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    pub fn get(&self, primary: i32) -> Option<&OverflowEntry> {
        self.map.get(&primary)
    }

    fn entry_mut(&mut self, primary: i32) -> &mut OverflowEntry {
        self.map.entry(primary).or_insert_with(OverflowEntry::default)
    }

    fn take(&mut self, primary: i32) -> OverflowEntry {
        self.map.remove(&primary).unwrap_or_default()
    }

    fn bump_tsc(&mut self, primary: i32) {
        if let Some(e) = self.map.get_mut(&primary) {
            e.tsc += 1;
        }
    }

    pub fn overflow_page_count(&self, primary: i32) -> usize {
        self.map.get(&primary).map(|e| e.overflow_pages.len()).unwrap_or(0)
    }
}

pub struct ForTreeCtx<'a> {
    pub store: &'a mut dyn PageStore,
    pub buffer: &'a mut dyn NodeBuffer,
    pub info: &'a mut TreeInfo,
    pub overflow: &'a mut OverflowTable,
    pub observer: &'a dyn Observer,
}

/// An entry plus the physical page/position it currently lives at, needed
/// because ChooseNode and AdjustTree must write back to whichever
/// physical node (primary or a specific overflow page) actually holds the
/// entry, not just to the logical P-node (§4.8).
struct Located {
    page: i32,
    position: usize,
    entry: Entry,
}

pub struct ForTree {
    dims: usize,
    min_leaf: usize,
    max_leaf: usize,
    min_int: usize,
    max_int: usize,
    x: u32,
    y: u32,
}

impl ForTree {
    pub fn new(cfg: &IndexConfig) -> Self {
        let ForTreeConfig { x, y } = cfg.for_tree;
        Self {
            dims: cfg.dimensions,
            min_leaf: cfg.min_entries_leaf,
            max_leaf: cfg.max_entries_leaf,
            min_int: cfg.min_entries_int,
            max_int: cfg.max_entries_int,
            x,
            y,
        }
    }

    fn bounds(&self, height: i32) -> (usize, usize) {
        if height == 0 {
            (self.min_leaf, self.max_leaf)
        } else {
            (self.min_int, self.max_int)
        }
    }

    /// Merge-back fires once `tsc(P) >= floor((5k-1)/2) * (y/x)` (§4.8).
    fn merge_back_threshold(&self, k: u32) -> f64 {
        (((5 * k as i64 - 1) / 2) as f64) * (self.y as f64 / self.x as f64)
    }

    fn located_entries(&self, ctx: &mut ForTreeCtx, page: i32, height: i32) -> Result<Vec<Located>> {
        let mut out = Vec::new();
        let primary = ctx.buffer.retrieve(ctx.store, page, height)?;
        for (i, e) in primary.entries.into_iter().enumerate() {
            out.push(Located { page, position: i, entry: e });
        }
        let overflow_pages = ctx.overflow.get(page).map(|o| o.overflow_pages.clone()).unwrap_or_default();
        for op in overflow_pages {
            let onode = ctx.buffer.retrieve(ctx.store, op, height)?;
            for (i, e) in onode.entries.into_iter().enumerate() {
                out.push(Located { page: op, position: i, entry: e });
            }
        }
        Ok(out)
    }

    fn effective_bbox(&self, ctx: &mut ForTreeCtx, page: i32, height: i32) -> Result<BBox> {
        let located = self.located_entries(ctx, page, height)?;
        Ok(union_all(located.iter().map(|l| &l.entry.bbox)).unwrap_or_else(|| BBox::empty(self.dims)))
    }

    fn choose_node(&self, located: &[Located], bbox: &BBox) -> usize {
        let mut best = 0usize;
        let mut best_enl = f64::INFINITY;
        let mut best_area = f64::INFINITY;
        for (i, l) in located.iter().enumerate() {
            let enl = BBox::required_expansion_area(bbox, &l.entry.bbox);
            let area = l.entry.bbox.area();
            if enl < best_enl || ((enl - best_enl).abs() < crate::geometry::EPSILON && area < best_area) {
                best = i;
                best_enl = enl;
                best_area = area;
            }
        }
        best
    }

    fn node_append(&self, ctx: &mut ForTreeCtx, page: i32, height: i32, position: usize, entry: &Entry) -> Result<()> {
        ctx.buffer.mod_pointer(ctx.store, page, height, position, entry.pointer)?;
        ctx.buffer.mod_bbox(ctx.store, page, height, position, Some(entry.bbox.clone()))?;
        Ok(())
    }

    pub fn insert(&self, ctx: &mut ForTreeCtx, pointer: i32, bbox: BBox) -> Result<()> {
        let entry = Entry::new(pointer, bbox);
        let root_height = ctx.info.height;
        let promoted = self.insert_entry(ctx, ctx.info.root_page_id, root_height, entry)?;
        self.absorb_at_root(ctx, promoted)
    }

    /// Descends to a leaf, adding `entry` there; every level on the way
    /// back up absorbs any sibling promoted by the level below via
    /// `add_element`, which may itself promote further (§4.8).
    fn insert_entry(&self, ctx: &mut ForTreeCtx, page: i32, height: i32, entry: Entry) -> Result<Vec<Entry>> {
        if height == 0 {
            return self.add_element(ctx, page, height, entry);
        }
        let located = self.located_entries(ctx, page, height)?;
        let idx = self.choose_node(&located, &entry.bbox);
        let chosen_page = located[idx].page;
        let chosen_position = located[idx].position;
        let child_page = located[idx].entry.pointer;
        let promoted_from_child = self.insert_entry(ctx, child_page, height - 1, entry)?;
        let child_bbox = self.effective_bbox(ctx, child_page, height - 1)?;
        ctx.buffer
            .mod_bbox(ctx.store, chosen_page, height, chosen_position, Some(child_bbox))?;
        let mut promoted_here = Vec::new();
        for sib in promoted_from_child {
            promoted_here.extend(self.add_element(ctx, page, height, sib)?);
        }
        Ok(promoted_here)
    }

    /// AddElement (§4.8): place `entry` in the primary node if it has
    /// room; else the first overflow node with room; else a fresh
    /// overflow node. Every placement re-checks the merge-back trigger.
    fn add_element(&self, ctx: &mut ForTreeCtx, page: i32, height: i32, entry: Entry) -> Result<Vec<Entry>> {
        let node = ctx.buffer.retrieve(ctx.store, page, height)?;
        let (_min, max) = self.bounds(height);
        if node.nofentries() < max {
            self.node_append(ctx, page, height, node.nofentries(), &entry)?;
            ctx.observer.on_node_write(page, height);
            return Ok(Vec::new());
        }
        let overflow_pages = ctx.overflow.get(page).map(|o| o.overflow_pages.clone()).unwrap_or_default();
        for op in overflow_pages {
            let onode = ctx.buffer.retrieve(ctx.store, op, height)?;
            if onode.nofentries() < max {
                self.node_append(ctx, op, height, onode.nofentries(), &entry)?;
                ctx.observer.on_node_write(op, height);
                return self.maybe_merge_back(ctx, page, height);
            }
        }
        let new_page = ctx.info.allocate();
        ctx.buffer.put_new(ctx.store, new_page, height, Node::new(vec![entry]))?;
        {
            let oe = ctx.overflow.entry_mut(page);
            oe.overflow_pages.push(new_page);
            oe.k += 1;
        }
        ctx.observer.on_node_write(new_page, height);
        self.maybe_merge_back(ctx, page, height)
    }

    fn maybe_merge_back(&self, ctx: &mut ForTreeCtx, page: i32, height: i32) -> Result<Vec<Entry>> {
        let k = match ctx.overflow.get(page) {
            Some(o) if o.k > 0 => o.k,
            _ => return Ok(Vec::new()),
        };
        let tsc = ctx.overflow.get(page).map(|o| o.tsc).unwrap_or(0);
        if (tsc as f64) < self.merge_back_threshold(k) {
            return Ok(Vec::new());
        }
        self.merge_back(ctx, page, height)
    }

    /// MergeBack (§4.8): rewrites `P ∪ O-nodes` into a fresh P and the
    /// minimum number of chunks the remaining entries need, one chunk per
    /// physical page, reusing existing overflow page ids before freeing
    /// any surplus. The primary keeps its own page id and position in its
    /// parent; every other chunk comes back out as a promoted sibling
    /// entry for the caller to place at this level, clearing this
    /// primary's overflow-table entry entirely.
    fn merge_back(&self, ctx: &mut ForTreeCtx, page: i32, height: i32) -> Result<Vec<Entry>> {
        let primary = ctx.buffer.retrieve(ctx.store, page, height)?;
        let oe = ctx.overflow.take(page);
        let mut all_entries = primary.entries;
        for op in &oe.overflow_pages {
            let onode = ctx.buffer.retrieve(ctx.store, *op, height)?;
            all_entries.extend(onode.entries);
        }
        let (_, max) = self.bounds(height);
        let chunk_size = max.max(1);
        let mut chunks: Vec<Vec<Entry>> = all_entries.chunks(chunk_size).map(|c| c.to_vec()).collect();
        if chunks.is_empty() {
            chunks.push(Vec::new());
        }
        let new_primary_entries = chunks.remove(0);
        ctx.buffer.put_new(ctx.store, page, height, Node::new(new_primary_entries))?;

        let mut promoted = Vec::new();
        let mut reuse = oe.overflow_pages.into_iter();
        for chunk in chunks {
            let target_page = match reuse.next() {
                Some(p) => p,
                None => ctx.info.allocate(),
            };
            let bbox = union_all(chunk.iter().map(|e| &e.bbox)).unwrap_or_else(|| BBox::empty(self.dims));
            ctx.buffer.put_new(ctx.store, target_page, height, Node::new(chunk))?;
            promoted.push(Entry::new(target_page, bbox));
        }
        let mut freed = 0usize;
        for leftover in reuse {
            ctx.buffer.del_node(ctx.store, leftover, height)?;
            ctx.info.free(leftover);
            freed += 1;
        }
        ctx.observer.on_merge_back(page, freed);
        log::debug!("merge-back on page {} freed {} overflow pages, promoted {}", page, freed, promoted.len());
        Ok(promoted)
    }

    /// Wraps the root over `promoted` entries one at a time: each is first
    /// offered to the current root via `add_element` (so it only grows
    /// height when the root itself cannot absorb it), matching how a
    /// cascading merge-back at the top level ultimately grows the tree
    /// (§4.8, §9).
    fn absorb_at_root(&self, ctx: &mut ForTreeCtx, promoted: Vec<Entry>) -> Result<()> {
        let mut pending = promoted;
        while let Some(entry) = pending.pop() {
            let root_height = ctx.info.height;
            let more = self.add_element(ctx, ctx.info.root_page_id, root_height, entry)?;
            if !more.is_empty() {
                self.grow_root(ctx, more)?;
            }
        }
        Ok(())
    }

    fn grow_root(&self, ctx: &mut ForTreeCtx, promoted: Vec<Entry>) -> Result<()> {
        if promoted.is_empty() {
            return Ok(());
        }
        let root_height = ctx.info.height;
        let old_root_page = ctx.info.root_page_id;
        let old_bbox = self.effective_bbox(ctx, old_root_page, root_height)?;
        let new_height = root_height + 1;
        let mut entries = vec![Entry::new(old_root_page, old_bbox)];
        entries.extend(promoted);
        let new_root_page = ctx.info.allocate();
        ctx.buffer.put_new(ctx.store, new_root_page, new_height, Node::new(entries))?;
        ctx.info.root_page_id = new_root_page;
        ctx.info.update_height(new_height);
        ctx.buffer.notify_height_change(new_height);
        ctx.observer.on_split(old_root_page, new_height, new_root_page);
        Ok(())
    }

    pub fn search(&self, ctx: &mut ForTreeCtx, bbox: &BBox, predicate: crate::geometry::Predicate) -> Result<Vec<i32>> {
        let mut out = Vec::new();
        let root_height = ctx.info.height;
        self.search_rec(ctx, ctx.info.root_page_id, root_height, bbox, predicate, &mut out)?;
        ctx.observer.on_search_result(out.len());
        Ok(out)
    }

    fn search_rec(
        &self,
        ctx: &mut ForTreeCtx,
        page: i32,
        height: i32,
        bbox: &BBox,
        predicate: crate::geometry::Predicate,
        out: &mut Vec<i32>,
    ) -> Result<()> {
        if ctx.overflow.get(page).map(|o| !o.overflow_pages.is_empty()).unwrap_or(false) {
            ctx.overflow.bump_tsc(page);
        }
        let located = self.located_entries(ctx, page, height)?;
        if height == 0 {
            for l in &located {
                if l.entry.bbox.check_predicate(bbox, predicate) {
                    out.push(l.entry.pointer);
                }
            }
            return Ok(());
        }
        for l in &located {
            if l.entry.bbox.intersects(bbox) {
                self.search_rec(ctx, l.entry.pointer, height - 1, bbox, predicate, out)?;
            }
        }
        Ok(())
    }

    pub fn remove(&self, ctx: &mut ForTreeCtx, pointer: i32, bbox: &BBox) -> Result<bool> {
        let root_height = ctx.info.height;
        let mut stack: Vec<(i32, i32)> = Vec::new();
        let found = self.find_leaf(ctx, ctx.info.root_page_id, root_height, pointer, bbox, &mut stack)?;
        if !found {
            return Ok(false);
        }
        self.adjust_after_remove(ctx, stack)?;
        Ok(true)
    }

    /// Descends every child whose bbox contains or intersects the target,
    /// recording `(page, height)` of every logical P-node on the path.
    /// The leaf's matching physical entry is removed in place before
    /// returning.
    fn find_leaf(
        &self,
        ctx: &mut ForTreeCtx,
        page: i32,
        height: i32,
        pointer: i32,
        bbox: &BBox,
        stack: &mut Vec<(i32, i32)>,
    ) -> Result<bool> {
        let located = self.located_entries(ctx, page, height)?;
        if height == 0 {
            for l in &located {
                if l.entry.pointer == pointer && l.entry.bbox.equal(bbox) {
                    ctx.buffer.mod_bbox(ctx.store, l.page, height, l.position, None)?;
                    stack.push((page, height));
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        for l in &located {
            if l.entry.bbox.contains(bbox) || l.entry.bbox.intersects(bbox) {
                stack.push((page, height));
                if self.find_leaf(ctx, l.entry.pointer, height - 1, pointer, bbox, stack)? {
                    return Ok(true);
                }
                stack.pop();
            }
        }
        Ok(false)
    }

    /// CondenseTree's FOR-tree analogue (§4.8): walking back up, a P-node
    /// without overflow that has underflowed is detached and its live
    /// entries reinserted; a P-node with overflow instead runs MergeBack
    /// on its reduced entry set regardless of the access-pressure
    /// threshold, since removal may let everything fold back into fewer
    /// physical pages.
    fn adjust_after_remove(&self, ctx: &mut ForTreeCtx, mut stack: Vec<(i32, i32)>) -> Result<()> {
        let mut reinsert_queue: Vec<Entry> = Vec::new();
        let mut removed_pages: std::collections::HashSet<i32> = std::collections::HashSet::new();

        while let Some((page, height)) = stack.pop() {
            let has_overflow = ctx.overflow.get(page).map(|o| o.k > 0).unwrap_or(false);
            if has_overflow {
                let primary = ctx.buffer.retrieve(ctx.store, page, height)?;
                let oe = ctx.overflow.take(page);
                let mut all_entries = primary.entries;
                for op in &oe.overflow_pages {
                    let onode = ctx.buffer.retrieve(ctx.store, *op, height)?;
                    all_entries.extend(onode.entries);
                }
                let (_, max) = self.bounds(height);
                let chunk_size = max.max(1);
                let mut chunks: Vec<Vec<Entry>> = all_entries.chunks(chunk_size).map(|c| c.to_vec()).collect();
                if chunks.is_empty() {
                    chunks.push(Vec::new());
                }
                let new_primary_entries = chunks.remove(0);
                ctx.buffer.put_new(ctx.store, page, height, Node::new(new_primary_entries))?;
                let mut reuse = oe.overflow_pages.into_iter();
                for chunk in chunks {
                    let target_page = match reuse.next() {
                        Some(p) => p,
                        None => ctx.info.allocate(),
                    };
                    ctx.buffer.put_new(ctx.store, target_page, height, Node::new(chunk))?;
                    let re = ctx.overflow.entry_mut(page);
                    re.overflow_pages.push(target_page);
                    re.k += 1;
                }
                for leftover in reuse {
                    ctx.buffer.del_node(ctx.store, leftover, height)?;
                    ctx.info.free(leftover);
                }
            } else if page != ctx.info.root_page_id {
                let node = ctx.buffer.retrieve(ctx.store, page, height)?;
                let (min, _) = self.bounds(height);
                if node.nofentries() < min {
                    for e in &node.entries {
                        if !removed_pages.contains(&e.pointer) {
                            reinsert_queue.push(e.clone());
                        }
                    }
                    ctx.buffer.del_node(ctx.store, page, height)?;
                    ctx.info.free(page);
                    removed_pages.insert(page);
                }
            }
            if let Some(&(parent_page, parent_height)) = stack.last() {
                if removed_pages.contains(&page) {
                    self.remove_parent_entry_for(ctx, parent_page, parent_height, page)?;
                } else {
                    let new_bbox = self.effective_bbox(ctx, page, height)?;
                    self.update_parent_entry_bbox(ctx, parent_page, parent_height, page, new_bbox)?;
                }
            }
        }
        self.collapse_root(ctx)?;
        for entry in reinsert_queue {
            let root_height = ctx.info.height;
            let promoted = self.insert_entry(ctx, ctx.info.root_page_id, root_height, entry)?;
            self.absorb_at_root(ctx, promoted)?;
        }
        Ok(())
    }

    fn update_parent_entry_bbox(&self, ctx: &mut ForTreeCtx, parent_page: i32, parent_height: i32, child_page: i32, bbox: BBox) -> Result<()> {
        let located = self.located_entries(ctx, parent_page, parent_height)?;
        if let Some(l) = located.iter().find(|l| l.entry.pointer == child_page) {
            ctx.buffer.mod_bbox(ctx.store, l.page, parent_height, l.position, Some(bbox))?;
        }
        Ok(())
    }

    fn remove_parent_entry_for(&self, ctx: &mut ForTreeCtx, parent_page: i32, parent_height: i32, child_page: i32) -> Result<()> {
        let located = self.located_entries(ctx, parent_page, parent_height)?;
        if let Some(l) = located.iter().find(|l| l.entry.pointer == child_page) {
            ctx.buffer.mod_bbox(ctx.store, l.page, parent_height, l.position, None)?;
        }
        Ok(())
    }

    fn collapse_root(&self, ctx: &mut ForTreeCtx) -> Result<()> {
        loop {
            if ctx.info.height == 0 {
                return Ok(());
            }
            let root = ctx.buffer.retrieve(ctx.store, ctx.info.root_page_id, ctx.info.height)?;
            if root.nofentries() != 1 || ctx.overflow.get(ctx.info.root_page_id).map(|o| o.k > 0).unwrap_or(false) {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::NoBuffer;
    use crate::config::{BufferKind, ForTreeConfig, IndexConfig, TreeKind};
    use crate::geometry::Predicate;
    use crate::page::BlockDeviceSim;

    fn cfg(x: u32, y: u32, max: usize) -> IndexConfig {
        let mut cfg = IndexConfig::builder(TreeKind::ForTree, BufferKind::None)
            .page_size(256)
            .dimensions(2)
            .fan_out_leaf(2, max)
            .fan_out_internal(2, max)
            .build()
            .unwrap();
        cfg.for_tree = ForTreeConfig { x, y };
        cfg
    }

    fn rect(a: f64, b: f64) -> BBox {
        BBox::new(vec![a, a], vec![b, b])
    }

    fn new_ctx_parts() -> (BlockDeviceSim, Box<dyn NodeBuffer>, TreeInfo, OverflowTable) {
        (
            BlockDeviceSim::new(256, 8),
            Box::new(NoBuffer::new(2, TreeKind::ForTree)),
            TreeInfo::new(),
            OverflowTable::new(),
        )
    }

    #[test]
    fn insert_past_fanout_attaches_overflow_node_instead_of_splitting() {
        let cfg = cfg(1, 2, 4);
        let tree = ForTree::new(&cfg);
        let (mut store, mut buffer, mut info, mut overflow) = new_ctx_parts();
        let observer = crate::observer::NullObserver;
        let mut ctx = ForTreeCtx {
            store: &mut store,
            buffer: &mut *buffer,
            info: &mut info,
            overflow: &mut overflow,
            observer: &observer,
        };
        for p in 0..6i32 {
            let f = p as f64 * 2.0;
            tree.insert(&mut ctx, p, rect(f, f + 1.0)).unwrap();
        }
        assert_eq!(ctx.info.height, 0);
        assert!(ctx.overflow.overflow_page_count(ctx.info.root_page_id) >= 1);
        let found = tree.search(&mut ctx, &rect(0.0, 11.0), Predicate::Intersects).unwrap();
        assert_eq!(found.len(), 6);
    }

    #[test]
    fn merge_back_triggers_after_enough_searches_and_shrinks_overflow_count() {
        let cfg = cfg(1, 2, 4);
        let tree = ForTree::new(&cfg);
        let (mut store, mut buffer, mut info, mut overflow) = new_ctx_parts();
        let observer = crate::observer::NullObserver;
        let mut ctx = ForTreeCtx {
            store: &mut store,
            buffer: &mut *buffer,
            info: &mut info,
            overflow: &mut overflow,
            observer: &observer,
        };
        for p in 0..6i32 {
            let f = p as f64 * 2.0;
            tree.insert(&mut ctx, p, rect(f, f + 1.0)).unwrap();
        }
        let root = ctx.info.root_page_id;
        assert!(ctx.overflow.overflow_page_count(root) >= 1);
        // threshold for k=2 overflow pages at x=1,y=2 is floor((10-1)/2)*2 = 8
        for _ in 0..8 {
            tree.search(&mut ctx, &rect(0.0, 11.0), Predicate::Intersects).unwrap();
        }
        tree.insert(&mut ctx, 100, rect(50.0, 51.0)).unwrap();
        assert_eq!(ctx.overflow.overflow_page_count(root), 0);
        let found = tree.search(&mut ctx, &rect(0.0, 51.0), Predicate::Intersects).unwrap();
        assert_eq!(found.len(), 7);
    }

    #[test]
    fn remove_then_search_equal_finds_nothing() {
        let cfg = cfg(1, 2, 4);
        let tree = ForTree::new(&cfg);
        let (mut store, mut buffer, mut info, mut overflow) = new_ctx_parts();
        let observer = crate::observer::NullObserver;
        let mut ctx = ForTreeCtx {
            store: &mut store,
            buffer: &mut *buffer,
            info: &mut info,
            overflow: &mut overflow,
            observer: &observer,
        };
        for p in 0..4i32 {
            let f = p as f64 * 2.0;
            tree.insert(&mut ctx, p, rect(f, f + 1.0)).unwrap();
        }
        let removed = tree.remove(&mut ctx, 2, &rect(4.0, 5.0)).unwrap();
        assert!(removed);
        let found = tree.search(&mut ctx, &rect(4.0, 5.0), Predicate::Equal).unwrap();
        assert!(found.is_empty());
    }
}
