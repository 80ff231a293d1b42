//! Page-level buffer managers (C7/C8/C9) behind one trait.
//!
//! The tree layer (C5/C6) never touches a `PageStore` directly once a
//! buffer is bound; it calls the granular operations below exactly as
//! listed in §4.10, and every buffer kind - from a plain pass-through to
//! FAST and eFIND - answers to the same surface. Per Design Note 9, the
//! buffer choice is a field on the façade, not a subtype of the tree.

mod efind;
mod fast;
mod standard;
mod wal;

pub use efind::EFindBuffer;
pub use fast::FastBuffer;
pub use standard::{Full2QBuffer, HLruBuffer, LruBuffer, Simplified2QBuffer};

use crate::config::TreeKind;
use crate::error::Result;
use crate::geometry::BBox;
use crate::page::{Node, PageStore};

/// Operations the tree layer issues against whatever buffer an index is
/// bound to (§4.10's vocabulary, generalized to every buffer kind).
pub trait NodeBuffer {
    /// Installs a brand-new node at `page` (the node did not previously
    /// exist at this page id).
    fn put_new(&mut self, store: &mut dyn PageStore, page: i32, height: i32, node: Node) -> Result<()>;

    /// Sets (or, if `bbox` is `None`, removes) the entry at `position`'s
    /// bounding box.
    fn mod_bbox(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        bbox: Option<BBox>,
    ) -> Result<()>;

    /// Sets the entry at `position`'s pointer. If `position` equals the
    /// node's current entry count, a zero-bbox placeholder entry is
    /// created first (§4.10).
    fn mod_pointer(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        pointer: i32,
    ) -> Result<()>;

    /// Sets the entry at `position`'s largest-Hilbert-value (Hilbert trees
    /// only).
    fn mod_lhv(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        lhv: u64,
    ) -> Result<()>;

    /// Opens a gap at `position`, shifting later entries one slot to the
    /// right (Hilbert trees only, to keep the lhv-sorted insert in order).
    fn mod_hole(&mut self, store: &mut dyn PageStore, page: i32, height: i32, position: usize) -> Result<()>;

    /// Marks `page` as deleted. The page id must be freed by the caller
    /// (tree-info, not the buffer, owns the free list).
    fn del_node(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<()>;

    /// Materializes the current node at `page`.
    fn retrieve(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node>;

    /// Forces every pending modification to durable storage.
    fn flush_all(&mut self, store: &mut dyn PageStore) -> Result<()>;

    /// Called when the tree's height changes, so height-aware eviction
    /// policies (HLRU) can re-evaluate their eligible set (§4.11).
    fn notify_height_change(&mut self, _new_height: i32) {}

    /// Whether `page` currently has a cached image, without fetching it.
    /// eFIND's temporal grouping uses this to pull clean-but-cached
    /// neighbors into a flush set for the "force node in read buffer"
    /// rewrite (§4.11).
    fn contains(&self, _page: i32) -> bool {
        false
    }
}

pub(crate) fn apply_pointer(node: &mut Node, position: usize, pointer: i32, dims: usize) {
    if position == node.entries.len() {
        node.entries
            .push(crate::page::Entry::new(pointer, BBox::empty(dims)));
    } else {
        node.entries[position].pointer = pointer;
    }
}

pub(crate) fn apply_bbox(node: &mut Node, position: usize, bbox: Option<BBox>) {
    match bbox {
        Some(b) => node.entries[position].bbox = b,
        None => {
            node.entries.remove(position);
        }
    }
}

pub(crate) fn apply_lhv(node: &mut Node, position: usize, lhv: u64) {
    node.entries[position].lhv = Some(lhv);
}

pub(crate) fn apply_hole(node: &mut Node, position: usize, dims: usize) {
    node.entries
        .insert(position, crate::page::Entry::new(0, BBox::empty(dims)));
}

pub(crate) fn read_node(
    store: &mut dyn PageStore,
    page: i32,
    dims: usize,
    tree_kind: TreeKind,
    height: i32,
) -> Result<Option<Node>> {
    let page_size = store.page_size();
    let mut buf = vec![0u8; page_size];
    store.read_page(page, &mut buf)?;
    Ok(Node::deserialize(&buf, dims, tree_kind, height))
}

pub(crate) fn write_node(
    store: &mut dyn PageStore,
    page: i32,
    dims: usize,
    tree_kind: TreeKind,
    height: i32,
    node: &Node,
) -> Result<()> {
    let page_size = store.page_size();
    let mut buf = vec![0u8; page_size];
    node.serialize(&mut buf, dims, tree_kind, height);
    store.write_pages(&[page], &buf, 1)
}

pub(crate) fn write_tombstone(store: &mut dyn PageStore, page: i32) -> Result<()> {
    let page_size = store.page_size();
    let mut buf = vec![0u8; page_size];
    Node::serialize_tombstone(&mut buf);
    store.write_pages(&[page], &buf, 1)
}

/// Direct pass-through: every operation reads-modifies-writes the backing
/// store immediately. This is `BufferKind::None` - the baseline every other
/// variant is measured against.
pub struct NoBuffer {
    dims: usize,
    tree_kind: TreeKind,
}

impl NoBuffer {
    pub fn new(dims: usize, tree_kind: TreeKind) -> Self {
        Self { dims, tree_kind }
    }

    fn load(&self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        Ok(read_node(store, page, self.dims, self.tree_kind, height)?.unwrap_or_default())
    }
}

impl NodeBuffer for NoBuffer {
    fn put_new(&mut self, store: &mut dyn PageStore, page: i32, height: i32, node: Node) -> Result<()> {
        write_node(store, page, self.dims, self.tree_kind, height, &node)
    }

    fn mod_bbox(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        bbox: Option<BBox>,
    ) -> Result<()> {
        let mut node = self.load(store, page, height)?;
        apply_bbox(&mut node, position, bbox);
        write_node(store, page, self.dims, self.tree_kind, height, &node)
    }

    fn mod_pointer(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        pointer: i32,
    ) -> Result<()> {
        let mut node = self.load(store, page, height)?;
        apply_pointer(&mut node, position, pointer, self.dims);
        write_node(store, page, self.dims, self.tree_kind, height, &node)
    }

    fn mod_lhv(
        &mut self,
        store: &mut dyn PageStore,
        page: i32,
        height: i32,
        position: usize,
        lhv: u64,
    ) -> Result<()> {
        let mut node = self.load(store, page, height)?;
        apply_lhv(&mut node, position, lhv);
        write_node(store, page, self.dims, self.tree_kind, height, &node)
    }

    fn mod_hole(&mut self, store: &mut dyn PageStore, page: i32, height: i32, position: usize) -> Result<()> {
        let mut node = self.load(store, page, height)?;
        apply_hole(&mut node, position, self.dims);
        write_node(store, page, self.dims, self.tree_kind, height, &node)
    }

    fn del_node(&mut self, store: &mut dyn PageStore, page: i32, _height: i32) -> Result<()> {
        write_tombstone(store, page)
    }

    fn retrieve(&mut self, store: &mut dyn PageStore, page: i32, height: i32) -> Result<Node> {
        self.load(store, page, height)
    }

    fn flush_all(&mut self, _store: &mut dyn PageStore) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::BlockDeviceSim;

    #[test]
    fn no_buffer_round_trips_writes_through_immediately() {
        let mut store = BlockDeviceSim::new(256, 4);
        let mut buf = NoBuffer::new(2, TreeKind::RTree);
        let node = Node::new(vec![crate::page::Entry::new(
            7,
            BBox::new(vec![0.0, 0.0], vec![1.0, 1.0]),
        )]);
        buf.put_new(&mut store, 3, 0, node.clone()).unwrap();
        let back = buf.retrieve(&mut store, 3, 0).unwrap();
        assert_eq!(back, node);
    }
}
