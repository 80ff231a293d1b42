//! Tree-info registry (C4).
//!
//! Tracks page allocation and the tree's current height. Page 0 always
//! holds the root; new pages are handed out from the free list before the
//! monotone counter is advanced.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeInfo {
    pub root_page_id: i32,
    pub height: i32,
    empty_pages: Vec<i32>,
    last_allocated_id: i32,
}

impl TreeInfo {
    /// A fresh tree: root lives at page 0, height 0 (a single leaf), the
    /// next page handed out is page 1.
    pub fn new() -> Self {
        Self {
            root_page_id: 0,
            height: 0,
            empty_pages: Vec::new(),
            last_allocated_id: 1,
        }
    }

    /// Pops from the free list if non-empty, else extends the monotone
    /// counter (§4.4).
    pub fn allocate(&mut self) -> i32 {
        if let Some(id) = self.empty_pages.pop() {
            id
        } else {
            let id = self.last_allocated_id;
            self.last_allocated_id += 1;
            id
        }
    }

    /// Returns `page_id` to the free list. Callers must ensure no live
    /// node entry still references it (§3's ownership invariant).
    pub fn free(&mut self, page_id: i32) {
        self.empty_pages.push(page_id);
    }

    pub fn update_height(&mut self, new_height: i32) {
        self.height = new_height;
    }

    pub fn is_free(&self, page_id: i32) -> bool {
        self.empty_pages.contains(&page_id)
    }

    pub fn free_page_count(&self) -> usize {
        self.empty_pages.len()
    }
}

impl Default for TreeInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_monotonically_when_free_list_empty() {
        let mut info = TreeInfo::new();
        assert_eq!(info.allocate(), 1);
        assert_eq!(info.allocate(), 2);
    }

    #[test]
    fn prefers_reusing_freed_pages() {
        let mut info = TreeInfo::new();
        let a = info.allocate();
        let _b = info.allocate();
        info.free(a);
        assert_eq!(info.allocate(), a);
    }

    #[test]
    fn free_and_live_sets_are_disjoint_by_construction() {
        let mut info = TreeInfo::new();
        let a = info.allocate();
        assert!(!info.is_free(a));
        info.free(a);
        assert!(info.is_free(a));
    }
}
