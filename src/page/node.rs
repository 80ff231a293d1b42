//! Node codec (C2).
//!
//! A node is the in-RAM form of whatever is stored in one page: an ordered
//! array of entries plus the count. `serialize`/`deserialize` are the only
//! place that knows the on-disk byte layout from §6; everything above this
//! module (tree algorithms, buffers) works with `Node`/`Entry` values.

use crate::config::TreeKind;
use crate::geometry::BBox;

/// `nofentries` value written for a page holding no live node (§4.2, §6).
pub const TOMBSTONE: u32 = 0xFFFF_FFFF;

/// One entry in a node. `pointer` is an external object id in a leaf, or a
/// child page id in an internal node. `lhv` is only ever `Some` for Hilbert
/// R-tree internal entries (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub pointer: i32,
    pub bbox: BBox,
    pub lhv: Option<u64>,
}

impl Entry {
    pub fn new(pointer: i32, bbox: BBox) -> Self {
        Self {
            pointer,
            bbox,
            lhv: None,
        }
    }

    pub fn with_lhv(pointer: i32, bbox: BBox, lhv: u64) -> Self {
        Self {
            pointer,
            bbox,
            lhv: Some(lhv),
        }
    }
}

/// One page's worth of entries. Leaf/internal is not tagged on the node
/// itself; it is implied by the height at which the page is visited (height
/// 0 is always a leaf), matching §3.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub entries: Vec<Entry>,
}

impl Node {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn nofentries(&self) -> usize {
        self.entries.len()
    }

    /// Union of every entry's bbox, used by AdjustTree to recompute a
    /// parent's bbox after a child node changes (§4.5).
    pub fn bbox_union(&self) -> Option<BBox> {
        crate::geometry::union_all(self.entries.iter().map(|e| &e.bbox))
    }

    fn carries_lhv(tree_kind: TreeKind, height: i32) -> bool {
        tree_kind == TreeKind::HilbertRTree && height > 0
    }

    /// Bytes needed to store `nofentries` entries of this shape (§4.2).
    pub fn byte_size(dims: usize, tree_kind: TreeKind, height: i32, nofentries: usize) -> usize {
        let entry_size = Self::entry_size(dims, tree_kind, height);
        4 + nofentries * entry_size
    }

    pub fn entry_size(dims: usize, tree_kind: TreeKind, height: i32) -> usize {
        let base = 4 + 2 * dims * 8;
        if Self::carries_lhv(tree_kind, height) {
            base + 8
        } else {
            base
        }
    }

    /// Serializes `self` into `buf`, which must be at least `byte_size(..)`
    /// long; unused tail bytes are left untouched (callers pad pages with
    /// zeroes before reuse).
    pub fn serialize(&self, buf: &mut [u8], dims: usize, tree_kind: TreeKind, height: i32) {
        let has_lhv = Self::carries_lhv(tree_kind, height);
        let mut off = 0usize;
        buf[off..off + 4].copy_from_slice(&(self.entries.len() as u32).to_le_bytes());
        off += 4;
        for e in &self.entries {
            buf[off..off + 4].copy_from_slice(&e.pointer.to_le_bytes());
            off += 4;
            for i in 0..dims {
                buf[off..off + 8].copy_from_slice(&e.bbox.min[i].to_le_bytes());
                off += 8;
            }
            for i in 0..dims {
                buf[off..off + 8].copy_from_slice(&e.bbox.max[i].to_le_bytes());
                off += 8;
            }
            if has_lhv {
                let lhv = e.lhv.unwrap_or(0);
                buf[off..off + 8].copy_from_slice(&lhv.to_le_bytes());
                off += 8;
            }
        }
    }

    /// Serializes a tombstone page (`nofentries == 0xFFFFFFFF`).
    pub fn serialize_tombstone(buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&TOMBSTONE.to_le_bytes());
    }

    /// Deserializes a page buffer. Returns `None` for a tombstone page;
    /// callers treat that as "no live node at this page" (§4.2).
    pub fn deserialize(buf: &[u8], dims: usize, tree_kind: TreeKind, height: i32) -> Option<Node> {
        let has_lhv = Self::carries_lhv(tree_kind, height);
        let mut off = 0usize;
        let nofentries = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        if nofentries == TOMBSTONE {
            return None;
        }
        let mut entries = Vec::with_capacity(nofentries as usize);
        for _ in 0..nofentries {
            let pointer = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
            let mut min = vec![0.0f64; dims];
            for i in 0..dims {
                min[i] = f64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
                off += 8;
            }
            let mut max = vec![0.0f64; dims];
            for i in 0..dims {
                max[i] = f64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
                off += 8;
            }
            let lhv = if has_lhv {
                let v = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
                off += 8;
                Some(v)
            } else {
                None
            };
            entries.push(Entry {
                pointer,
                bbox: BBox::new(min, max),
                lhv,
            });
        }
        Some(Node { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(a: f64, b: f64) -> BBox {
        BBox::new(vec![a, a], vec![b, b])
    }

    #[test]
    fn round_trips_a_leaf_node() {
        let node = Node::new(vec![Entry::new(1, bbox(0.0, 1.0)), Entry::new(2, bbox(2.0, 3.0))]);
        let size = Node::byte_size(2, TreeKind::RTree, 0, node.nofentries());
        let mut buf = vec![0u8; size];
        node.serialize(&mut buf, 2, TreeKind::RTree, 0);
        let back = Node::deserialize(&buf, 2, TreeKind::RTree, 0).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn round_trips_a_hilbert_internal_node_with_lhv() {
        let node = Node::new(vec![
            Entry::with_lhv(10, bbox(0.0, 1.0), 5),
            Entry::with_lhv(11, bbox(2.0, 3.0), 42),
        ]);
        let size = Node::byte_size(2, TreeKind::HilbertRTree, 1, node.nofentries());
        let mut buf = vec![0u8; size];
        node.serialize(&mut buf, 2, TreeKind::HilbertRTree, 1);
        let back = Node::deserialize(&buf, 2, TreeKind::HilbertRTree, 1).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn tombstone_deserializes_to_none() {
        let mut buf = vec![0u8; 64];
        Node::serialize_tombstone(&mut buf);
        assert!(Node::deserialize(&buf, 2, TreeKind::RTree, 0).is_none());
    }
}
