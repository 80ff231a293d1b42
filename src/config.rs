//! Layered configuration surface for a spatial index instance.
//!
//! A plain, `serde`-serializable struct built through a validating
//! builder, so a header file can be written once at index creation and
//! reloaded on reopen instead of being re-derived from scattered
//! constructor args.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeKind {
    RTree,
    RStarTree,
    HilbertRTree,
    ForTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferKind {
    None,
    Lru,
    HLru,
    Simplified2Q,
    Full2Q,
    Fast,
    EFind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    Exponential,
    Quadratic,
    Linear,
    Greene,
    AngTan,
    RStar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoAccessMode {
    Normal,
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    Disk,
    FlashSim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FastFlushingPolicy {
    FlushAll,
    Random,
    Fast,
    FastStar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadBufferPolicy {
    Lru,
    HLru,
    Simplified2Q,
    Full2Q,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalGroupingMode {
    Sequential,
    Stride,
    SeqAndStride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReinsertDirection {
    Far,
    Close,
}

/// R*-tree specific tuning knobs (§4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RStarConfig {
    pub reinsert_perc_leaf: f64,
    pub reinsert_perc_internal: f64,
    pub reinsert_direction: ReinsertDirection,
    pub max_neighbors_to_examine: usize,
}

impl Default for RStarConfig {
    fn default() -> Self {
        Self {
            reinsert_perc_leaf: 0.30,
            reinsert_perc_internal: 0.30,
            reinsert_direction: ReinsertDirection::Far,
            max_neighbors_to_examine: 32,
        }
    }
}

/// FOR-tree specific tuning knobs (§4.8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForTreeConfig {
    /// Numerator tuning constant in the merge-back trigger `tsc >= floor((5k-1)/2) * (y/x)`.
    pub x: u32,
    pub y: u32,
}

impl Default for ForTreeConfig {
    fn default() -> Self {
        Self { x: 1, y: 2 }
    }
}

/// FAST buffer tuning (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastConfig {
    pub buffer_size: usize,
    pub flushing_unit_size: usize,
    pub flushing_policy: FastFlushingPolicy,
    pub log_size: usize,
    pub log_file: String,
}

impl Default for FastConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1 << 20,
            flushing_unit_size: 4,
            flushing_policy: FastFlushingPolicy::Fast,
            log_size: 1 << 22,
            log_file: "fast.wal".to_string(),
        }
    }
}

/// eFIND buffer tuning (§4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EFindConfig {
    pub write_buffer_size: usize,
    pub read_buffer_size: usize,
    pub read_buffer_policy: ReadBufferPolicy,
    pub grouping_mode: TemporalGroupingMode,
    pub stride: usize,
    pub min_flush_size: usize,
    pub log_size: usize,
    pub log_file: String,
}

impl Default for EFindConfig {
    fn default() -> Self {
        Self {
            write_buffer_size: 1 << 20,
            read_buffer_size: 1 << 20,
            read_buffer_policy: ReadBufferPolicy::Lru,
            grouping_mode: TemporalGroupingMode::SeqAndStride,
            stride: 4,
            min_flush_size: 4,
            log_size: 1 << 22,
            log_file: "efind.wal".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub tree_kind: TreeKind,
    pub buffer_kind: BufferKind,

    pub page_size: usize,
    pub dimensions: usize,
    pub io_access: IoAccessMode,
    pub storage_kind: StorageKind,

    pub min_entries_leaf: usize,
    pub max_entries_leaf: usize,
    pub min_entries_int: usize,
    pub max_entries_int: usize,

    pub split_strategy: SplitStrategy,
    pub rstar: RStarConfig,
    pub for_tree: ForTreeConfig,
    pub fast: FastConfig,
    pub efind: EFindConfig,
}

impl IndexConfig {
    pub fn builder(tree_kind: TreeKind, buffer_kind: BufferKind) -> IndexConfigBuilder {
        IndexConfigBuilder::new(tree_kind, buffer_kind)
    }

    /// Bytes needed to store an internal-node entry for this config's tree kind.
    pub fn int_entry_size(&self) -> usize {
        let bbox = 2 * self.dimensions * std::mem::size_of::<f64>();
        let base = std::mem::size_of::<u32>() + bbox;
        if self.tree_kind == TreeKind::HilbertRTree {
            base + std::mem::size_of::<u64>()
        } else {
            base
        }
    }

    pub fn leaf_entry_size(&self) -> usize {
        std::mem::size_of::<u32>() + 2 * self.dimensions * std::mem::size_of::<f64>()
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 || (self.page_size & (self.page_size - 1)) != 0 {
            return Err(Error::InvalidConfig(format!(
                "page_size must be a power of two, got {}",
                self.page_size
            )));
        }
        if self.dimensions == 0 {
            return Err(Error::InvalidConfig("dimensions must be >= 1".into()));
        }
        if self.min_entries_leaf == 0 || self.min_entries_leaf > self.max_entries_leaf / 2 + 1 {
            return Err(Error::InvalidConfig(
                "min_entries_leaf must be in (0, max_entries_leaf/2]".into(),
            ));
        }
        if self.min_entries_int == 0 || self.min_entries_int > self.max_entries_int / 2 + 1 {
            return Err(Error::InvalidConfig(
                "min_entries_int must be in (0, max_entries_int/2]".into(),
            ));
        }
        if self.max_entries_leaf < 4 || self.max_entries_int < 4 {
            return Err(Error::InvalidConfig(
                "max_entries must be at least 4 for a split to make sense".into(),
            ));
        }
        match self.buffer_kind {
            BufferKind::Fast => {
                if self.fast.buffer_size < self.page_size {
                    return Err(Error::InvalidConfig(
                        "FAST buffer_size must hold at least one page".into(),
                    ));
                }
            }
            BufferKind::EFind => {
                if self.efind.write_buffer_size < self.leaf_entry_size() {
                    return Err(Error::InvalidConfig(
                        "eFIND write_buffer_size must hold at least one entry delta".into(),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

pub struct IndexConfigBuilder {
    cfg: IndexConfig,
}

impl IndexConfigBuilder {
    pub fn new(tree_kind: TreeKind, buffer_kind: BufferKind) -> Self {
        Self {
            cfg: IndexConfig {
                tree_kind,
                buffer_kind,
                page_size: 4096,
                dimensions: 2,
                io_access: IoAccessMode::Normal,
                storage_kind: StorageKind::Disk,
                min_entries_leaf: 2,
                max_entries_leaf: 5,
                min_entries_int: 2,
                max_entries_int: 5,
                split_strategy: if tree_kind == TreeKind::RStarTree {
                    SplitStrategy::RStar
                } else {
                    SplitStrategy::Quadratic
                },
                rstar: RStarConfig::default(),
                for_tree: ForTreeConfig::default(),
                fast: FastConfig::default(),
                efind: EFindConfig::default(),
            },
        }
    }

    pub fn page_size(mut self, v: usize) -> Self {
        self.cfg.page_size = v;
        self
    }

    pub fn dimensions(mut self, v: usize) -> Self {
        self.cfg.dimensions = v;
        self
    }

    pub fn io_access(mut self, v: IoAccessMode) -> Self {
        self.cfg.io_access = v;
        self
    }

    pub fn storage_kind(mut self, v: StorageKind) -> Self {
        self.cfg.storage_kind = v;
        self
    }

    pub fn fan_out_leaf(mut self, min: usize, max: usize) -> Self {
        self.cfg.min_entries_leaf = min;
        self.cfg.max_entries_leaf = max;
        self
    }

    pub fn fan_out_internal(mut self, min: usize, max: usize) -> Self {
        self.cfg.min_entries_int = min;
        self.cfg.max_entries_int = max;
        self
    }

    pub fn split_strategy(mut self, v: SplitStrategy) -> Self {
        self.cfg.split_strategy = v;
        self
    }

    pub fn rstar(mut self, v: RStarConfig) -> Self {
        self.cfg.rstar = v;
        self
    }

    pub fn for_tree(mut self, v: ForTreeConfig) -> Self {
        self.cfg.for_tree = v;
        self
    }

    pub fn fast(mut self, v: FastConfig) -> Self {
        self.cfg.fast = v;
        self
    }

    pub fn efind(mut self, v: EFindConfig) -> Self {
        self.cfg.efind = v;
        self
    }

    pub fn build(self) -> Result<IndexConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = IndexConfig::builder(TreeKind::RTree, BufferKind::None)
            .build()
            .unwrap();
        assert_eq!(cfg.page_size, 4096);
    }

    #[test]
    fn rejects_non_power_of_two_page_size() {
        let err = IndexConfig::builder(TreeKind::RTree, BufferKind::None)
            .page_size(100)
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = IndexConfig::builder(TreeKind::HilbertRTree, BufferKind::EFind)
            .build()
            .unwrap();
        let json = cfg.to_json().unwrap();
        let back = IndexConfig::from_json(&json).unwrap();
        assert_eq!(back.tree_kind, TreeKind::HilbertRTree);
    }
}
