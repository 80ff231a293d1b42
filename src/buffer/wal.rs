//! Write-ahead log shared by the FAST and eFIND buffers (§4.10, §4.11, §6).
//!
//! Record framing is `u64 prev_offset | u8 tag | body`, matching the
//! on-disk format both buffers use; only the body's interpretation
//! (§6's per-tag payload) differs by tag, not the framing. A
//! backwards-walking recovery pass would shadow pages already covered by
//! a later FLUSH record; we reconstruct the identical final state with one
//! forward pass instead - a FLUSH record simply removes its listed pages
//! from the in-progress map exactly as it would during live flushing -
//! which is equivalent for the durability invariant in §4.11 and
//! considerably simpler to implement correctly.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::TreeKind;
use crate::error::Result;
use crate::geometry::BBox;
use crate::page::Node;

const TAG_NEW: u8 = 0;
const TAG_MOD: u8 = 1;
const TAG_DEL: u8 = 2;
const TAG_FLUSH: u8 = 3;

const KIND_BBOX: u8 = 0;
const KIND_POINTER: u8 = 1;
const KIND_LHV: u8 = 2;
const KIND_HOLE: u8 = 3;

/// A single entry-level or node-level delta against a page's node image,
/// shared by FAST's field-granular deltas and eFIND's entry-granular
/// deltas (§4.10, §4.11): an eFIND "add/modify/remove one entry" collapses
/// to a `Pointer` delta followed by a `Bbox` delta (add/modify) or a single
/// `Bbox(None)` delta (remove), so both buffers replay through the same
/// `apply` routine.
#[derive(Debug, Clone)]
pub enum Delta {
    Bbox { position: usize, bbox: Option<BBox> },
    Pointer { position: usize, pointer: i32 },
    Lhv { position: usize, lhv: u64 },
    Hole { position: usize },
}

impl Delta {
    pub fn apply(&self, node: &mut Node, dims: usize) {
        match self {
            Delta::Bbox { position, bbox } => super::apply_bbox(node, *position, bbox.clone()),
            Delta::Pointer { position, pointer } => super::apply_pointer(node, *position, *pointer, dims),
            Delta::Lhv { position, lhv } => super::apply_lhv(node, *position, *lhv),
            Delta::Hole { position } => super::apply_hole(node, *position, dims),
        }
    }

    fn encode(&self, dims: usize, buf: &mut Vec<u8>) {
        match self {
            Delta::Bbox { position, bbox } => {
                buf.push(KIND_BBOX);
                buf.extend_from_slice(&(*position as u32).to_le_bytes());
                match bbox {
                    Some(b) => {
                        buf.push(1);
                        for i in 0..dims {
                            buf.extend_from_slice(&b.min[i].to_le_bytes());
                        }
                        for i in 0..dims {
                            buf.extend_from_slice(&b.max[i].to_le_bytes());
                        }
                    }
                    None => buf.push(0),
                }
            }
            Delta::Pointer { position, pointer } => {
                buf.push(KIND_POINTER);
                buf.extend_from_slice(&(*position as u32).to_le_bytes());
                buf.extend_from_slice(&pointer.to_le_bytes());
            }
            Delta::Lhv { position, lhv } => {
                buf.push(KIND_LHV);
                buf.extend_from_slice(&(*position as u32).to_le_bytes());
                buf.extend_from_slice(&lhv.to_le_bytes());
            }
            Delta::Hole { position } => {
                buf.push(KIND_HOLE);
                buf.extend_from_slice(&(*position as u32).to_le_bytes());
            }
        }
    }

    fn decode(buf: &[u8], off: &mut usize, dims: usize) -> Delta {
        let kind = buf[*off];
        *off += 1;
        let position = u32::from_le_bytes(buf[*off..*off + 4].try_into().unwrap()) as usize;
        *off += 4;
        match kind {
            KIND_BBOX => {
                let present = buf[*off];
                *off += 1;
                if present == 1 {
                    let mut min = vec![0.0; dims];
                    for v in min.iter_mut() {
                        *v = f64::from_le_bytes(buf[*off..*off + 8].try_into().unwrap());
                        *off += 8;
                    }
                    let mut max = vec![0.0; dims];
                    for v in max.iter_mut() {
                        *v = f64::from_le_bytes(buf[*off..*off + 8].try_into().unwrap());
                        *off += 8;
                    }
                    Delta::Bbox {
                        position,
                        bbox: Some(BBox::new(min, max)),
                    }
                } else {
                    Delta::Bbox { position, bbox: None }
                }
            }
            KIND_POINTER => {
                let pointer = i32::from_le_bytes(buf[*off..*off + 4].try_into().unwrap());
                *off += 4;
                Delta::Pointer { position, pointer }
            }
            KIND_LHV => {
                let lhv = u64::from_le_bytes(buf[*off..*off + 8].try_into().unwrap());
                *off += 8;
                Delta::Lhv { position, lhv }
            }
            _ => Delta::Hole { position },
        }
    }
}

#[derive(Debug, Clone)]
pub enum WalRecord {
    New { page: i32, height: i32, node: Node },
    Mod { page: i32, height: i32, delta: Delta },
    Del { page: i32, height: i32 },
    Flush { pages: Vec<i32> },
}

/// In-memory reconstruction of the write buffer's page-status map, used
/// both by live operation (absorbing mutations) and by WAL recovery
/// (replaying records into a fresh instance of the same structure).
#[derive(Debug, Clone)]
pub enum Status {
    New { height: i32, node: Node },
    Mod { height: i32, deltas: Vec<Delta> },
    Del { height: i32 },
}

pub struct Wal {
    path: PathBuf,
    file: File,
    size: u64,
    last_offset: Option<u64>,
    dims: usize,
}

impl Wal {
    /// `dims` is needed only to skip (not decode) a MOD/BBOX record's
    /// variable-length payload during the tail-offset scan below; it plays
    /// no part in the on-disk format itself (§6's WAL record format has no
    /// dims field of its own).
    pub fn open(path: impl AsRef<Path>, dims: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        let size = file.metadata()?.len();
        let mut wal = Self {
            path,
            file,
            size,
            last_offset: None,
            dims,
        };
        if size > 0 {
            // recover the tail pointer by scanning forward once; each
            // record is self-describing so this is a single linear pass.
            wal.last_offset = wal.scan_last_offset()?;
        }
        Ok(wal)
    }

    fn scan_last_offset(&mut self) -> Result<Option<u64>> {
        let mut buf = Vec::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut buf)?;
        let mut off = 0usize;
        let mut last = None;
        while off < buf.len() {
            let record_start = off;
            off += 8; // prev_offset
            let tag = buf[off];
            off += 1;
            off += Self::skip_body(&buf, off, tag, self.dims);
            last = Some(record_start as u64);
        }
        Ok(last)
    }

    fn skip_body(buf: &[u8], mut off: usize, tag: u8, dims: usize) -> usize {
        let start = off;
        match tag {
            TAG_NEW => {
                off += 8; // page + height
                let n = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                off += 4;
                // caller doesn't know dims here; New bodies are only
                // skipped during tail-scan, where we just need byte length.
                // Entry size was embedded by the writer right after nofentries
                // as a u32 for exactly this purpose.
                let entry_size = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
                off += 4;
                off += n as usize * entry_size;
            }
            TAG_MOD => {
                off += 8; // page + height
                let kind = buf[off];
                off += 1;
                off += 4; // position
                match kind {
                    KIND_BBOX => {
                        let present = buf[off];
                        off += 1;
                        if present == 1 {
                            off += 2 * dims * 8;
                        }
                    }
                    KIND_POINTER => off += 4,
                    KIND_LHV => off += 8,
                    _ => {}
                }
            }
            TAG_DEL => off += 8,
            TAG_FLUSH => {
                let n = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                off += 4;
                off += n as usize * 4;
            }
            _ => {}
        }
        off - start
    }

    fn append_raw(&mut self, tag: u8, body: &[u8]) -> Result<u64> {
        let offset = self.size;
        let prev = self.last_offset.unwrap_or(u64::MAX);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&prev.to_le_bytes())?;
        self.file.write_all(&[tag])?;
        self.file.write_all(body)?;
        self.file.flush()?;
        self.size += 9 + body.len() as u64;
        self.last_offset = Some(offset);
        Ok(offset)
    }

    pub fn append_new(&mut self, page: i32, height: i32, node: &Node, dims: usize, tree_kind: TreeKind) -> Result<u64> {
        let mut body = Vec::new();
        body.extend_from_slice(&page.to_le_bytes());
        body.extend_from_slice(&height.to_le_bytes());
        body.extend_from_slice(&(node.nofentries() as u32).to_le_bytes());
        let entry_size = Node::entry_size(dims, tree_kind, height) as u32;
        body.extend_from_slice(&entry_size.to_le_bytes());
        let mut node_bytes = vec![0u8; node.nofentries() * entry_size as usize];
        node.serialize(&mut node_bytes, dims, tree_kind, height);
        body.extend_from_slice(&node_bytes);
        self.append_raw(TAG_NEW, &body)
    }

    pub fn append_mod(&mut self, page: i32, height: i32, delta: &Delta, dims: usize) -> Result<u64> {
        let mut body = Vec::new();
        body.extend_from_slice(&page.to_le_bytes());
        body.extend_from_slice(&height.to_le_bytes());
        delta.encode(dims, &mut body);
        self.append_raw(TAG_MOD, &body)
    }

    pub fn append_del(&mut self, page: i32, height: i32) -> Result<u64> {
        let mut body = Vec::new();
        body.extend_from_slice(&page.to_le_bytes());
        body.extend_from_slice(&height.to_le_bytes());
        self.append_raw(TAG_DEL, &body)
    }

    pub fn append_flush(&mut self, pages: &[i32]) -> Result<u64> {
        let mut body = Vec::new();
        body.extend_from_slice(&(pages.len() as u32).to_le_bytes());
        for p in pages {
            body.extend_from_slice(&p.to_le_bytes());
        }
        self.append_raw(TAG_FLUSH, &body)
    }

    pub fn current_size(&self) -> u64 {
        self.size
    }

    /// Parses every record in file order. Each record's body is
    /// self-describing (the node's own entry count, or the flush list's
    /// own length), so this is a single linear pass independent of the
    /// `prev_offset` chain.
    pub fn read_all(&mut self, dims: usize, tree_kind: TreeKind) -> Result<Vec<WalRecord>> {
        let mut buf = Vec::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut buf)?;
        let mut off = 0usize;
        let mut out = Vec::new();
        while off < buf.len() {
            off += 8; // prev_offset, unused during forward decode
            let tag = buf[off];
            off += 1;
            match tag {
                TAG_NEW => {
                    let page = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                    off += 4;
                    let height = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                    off += 4;
                    let n = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                    off += 4;
                    let entry_size = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
                    off += 4;
                    let node_len = n as usize * entry_size;
                    let node_bytes = &buf[off..off + node_len];
                    let mut full = vec![0u8; 4];
                    full[0..4].copy_from_slice(&n.to_le_bytes());
                    full.extend_from_slice(node_bytes);
                    let node = Node::deserialize(&full, dims, tree_kind, height).unwrap_or_default();
                    off += node_len;
                    out.push(WalRecord::New { page, height, node });
                }
                TAG_MOD => {
                    let page = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                    off += 4;
                    let height = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                    off += 4;
                    let delta = Delta::decode(&buf, &mut off, dims);
                    out.push(WalRecord::Mod { page, height, delta });
                }
                TAG_DEL => {
                    let page = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                    off += 4;
                    let height = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                    off += 4;
                    out.push(WalRecord::Del { page, height });
                }
                TAG_FLUSH => {
                    let n = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                    off += 4;
                    let mut pages = Vec::with_capacity(n as usize);
                    for _ in 0..n {
                        pages.push(i32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
                        off += 4;
                    }
                    out.push(WalRecord::Flush { pages });
                }
                _ => break,
            }
        }
        Ok(out)
    }

    /// Replays the full log into a page-status map (§4.10's "replaying the
    /// WAL against an empty state equals the current in-RAM buffer state").
    pub fn replay(&mut self, dims: usize, tree_kind: TreeKind) -> Result<HashMap<i32, Status>> {
        let records = self.read_all(dims, tree_kind)?;
        let mut map: HashMap<i32, Status> = HashMap::new();
        for r in records {
            match r {
                WalRecord::New { page, height, node } => {
                    map.insert(page, Status::New { height, node });
                }
                WalRecord::Mod { page, height, delta } => {
                    match map.get_mut(&page) {
                        Some(Status::New { node, .. }) => delta.apply(node, dims),
                        Some(Status::Mod { deltas, .. }) => deltas.push(delta),
                        _ => {
                            map.insert(
                                page,
                                Status::Mod {
                                    height,
                                    deltas: vec![delta],
                                },
                            );
                        }
                    }
                }
                WalRecord::Del { page, height } => {
                    map.insert(page, Status::Del { height });
                }
                WalRecord::Flush { pages } => {
                    for p in pages {
                        map.remove(&p);
                    }
                }
            }
        }
        Ok(map)
    }

    /// Rewrites the log to hold exactly one record per page still present
    /// in `live`, discarding everything already covered by a FLUSH. The
    /// old file is replaced atomically via rename, matching §4.10's
    /// compaction rule (simplified to a single consolidated record per
    /// live page instead of replaying granular history - see DESIGN.md).
    pub fn compact(&mut self, live: &HashMap<i32, Status>, dims: usize, tree_kind: TreeKind) -> Result<usize> {
        let dropped = {
            let all = self.read_all(dims, tree_kind)?;
            all.len()
        };
        let tmp_path = self.path.with_extension("wal.compact");
        {
            let mut new_wal = Wal::open(&tmp_path, dims)?;
            for (&page, status) in live.iter() {
                match status {
                    Status::New { height, node } => {
                        new_wal.append_new(page, *height, node, dims, tree_kind)?;
                    }
                    Status::Mod { height, deltas } => {
                        for d in deltas {
                            new_wal.append_mod(page, *height, d, dims)?;
                        }
                    }
                    Status::Del { height } => {
                        new_wal.append_del(page, *height)?;
                    }
                }
            }
        }
        fs::rename(&tmp_path, &self.path)?;
        *self = Wal::open(&self.path, dims)?;
        Ok(dropped.saturating_sub(live.len()))
    }

    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.size = 0;
        self.last_offset = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Entry;

    #[test]
    fn replays_new_then_mod_into_expected_node() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::open(&path, 2).unwrap();
        let node = Node::new(vec![Entry::new(1, BBox::new(vec![0.0, 0.0], vec![1.0, 1.0]))]);
        wal.append_new(5, 0, &node, 2, TreeKind::RTree).unwrap();
        wal.append_mod(
            5,
            0,
            &Delta::Bbox {
                position: 0,
                bbox: Some(BBox::new(vec![0.0, 0.0], vec![2.0, 2.0])),
            },
            2,
        )
        .unwrap();
        let map = wal.replay(2, TreeKind::RTree).unwrap();
        match map.get(&5).unwrap() {
            Status::New { node, .. } => assert_eq!(node.entries[0].bbox.max[0], 2.0),
            _ => panic!("expected New status"),
        }
    }

    #[test]
    fn flush_record_clears_covered_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::open(&path, 2).unwrap();
        let node = Node::new(vec![Entry::new(1, BBox::new(vec![0.0, 0.0], vec![1.0, 1.0]))]);
        wal.append_new(5, 0, &node, 2, TreeKind::RTree).unwrap();
        wal.append_flush(&[5]).unwrap();
        let map = wal.replay(2, TreeKind::RTree).unwrap();
        assert!(!map.contains_key(&5));
    }

    #[test]
    fn reopening_recovers_tail_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wal");
        {
            let mut wal = Wal::open(&path, 2).unwrap();
            wal.append_del(1, 0).unwrap();
        }
        let wal2 = Wal::open(&path, 2).unwrap();
        assert!(wal2.last_offset.is_some());
    }
}
