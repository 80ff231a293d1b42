//! Thin observability seam.
//!
//! A large family of global counters (visited nodes, splits, merge-backs,
//! flushes, ...) could easily end up as process-wide statics incremented
//! from deep inside the tree and buffer algorithms behind a compile-time
//! flag. Instead every event is a callback on a trait, so no statistics
//! state leaks into algorithmic code, and a caller who wants no
//! observability at all pays nothing beyond a vtable call that does
//! nothing.

/// Events fired by the tree and buffer layers.
///
/// Implementors should not panic or perform I/O that can fail; this is a
/// best-effort telemetry seam, not part of the operation's correctness.
pub trait Observer {
    fn on_node_read(&self, _page_id: i32, _height: i32) {}
    fn on_node_write(&self, _page_id: i32, _height: i32) {}
    fn on_node_delete(&self, _page_id: i32, _height: i32) {}
    fn on_split(&self, _page_id: i32, _height: i32, _new_page_id: i32) {}
    fn on_reinsert(&self, _count: usize, _height: i32) {}
    fn on_merge_back(&self, _primary_page_id: i32, _freed_overflow_pages: usize) {}
    fn on_buffer_hit(&self, _page_id: i32) {}
    fn on_buffer_miss(&self, _page_id: i32) {}
    fn on_evict(&self, _page_id: i32) {}
    fn on_flush(&self, _flushed_pages: &[i32]) {}
    fn on_wal_append(&self, _bytes: usize) {}
    fn on_wal_compact(&self, _records_dropped: usize) {}
    fn on_search_result(&self, _count: usize) {}
}

/// Default observer: every callback is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_observer_never_panics() {
        let o = NullObserver;
        o.on_split(1, 0, 2);
        o.on_merge_back(1, 3);
        o.on_flush(&[1, 2, 3]);
    }
}
