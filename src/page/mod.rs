mod node;
mod store;

pub use node::{Entry, Node, TOMBSTONE};
pub use store::{write_batched, BlockDeviceSim, FileStore, PageStore};
