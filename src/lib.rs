//! A flash-aware spatial index storage engine: an R-tree family (R-tree,
//! R*-tree, Hilbert R-tree, FOR-tree) paired with interchangeable
//! page-level buffer managers, including the two flash-aware write
//! absorbers this crate is built around - FAST (merge-on-flush) and eFIND
//! (delta-log with temporal write grouping).
//!
//! [`SpatialIndex`] is the single entry point: bind a tree kind and a
//! buffer kind at construction, then `insert`/`remove`/`update`/`search`.
//! Everything below that module - node codec, bounding-box algebra,
//! buffer internals, the write-ahead log - is an implementation detail a
//! caller never names directly.

pub mod buffer;
pub mod config;
pub mod error;
pub mod geometry;
pub mod index;
mod log;
pub mod observer;
pub mod page;
pub mod tree;
pub mod tree_info;

pub use config::{BufferKind, IndexConfig, IndexConfigBuilder, SplitStrategy, TreeKind};
pub use error::{Error, Result};
pub use geometry::{BBox, Geometry, Predicate};
pub use index::SpatialIndex;
pub use log::init_log;
pub use observer::{NullObserver, Observer};
