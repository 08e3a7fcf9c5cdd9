//! # Tree Adapters
//!
//! In-page index operations, decoupled from the buffer pool. An adapter
//! receives full page images (header included) from its caller and
//! mutates them in place; it never fetches, pins, or allocates pages
//! itself. The version manager owns all pool traffic.
//!
//! ## The Adapter Seam
//!
//! [`TreeAdapter`] is the seam between the copy-on-write traversal and
//! the physical node format. The B+-tree implementation lives in this
//! module; a trie adapter would implement the same trait with a different
//! payload layout, without the version manager noticing.
//!
//! Nodes carry no parent pointers: a copy-on-write shadow of a child
//! must not require rewriting the child's siblings, so parent context
//! exists only on the traversal stack during an update.
//!
//! ## Split Semantics
//!
//! - Leaves split copy-up: the promoted key is the first key of the new
//!   right node and remains present in it.
//! - Interior nodes split lift-up: the median moves to the parent and is
//!   not duplicated in either half.
//!
//! ```text
//!        leaf split (copy-up)             interior split (lift-up)
//!   [1 2 3 4] → [1 2] [3 4]           [1 2 3 4 5] → [1 2] 3 [4 5]
//!               promote 3                           promote 3
//! ```

mod adapter;
mod interior;
mod leaf;

pub use adapter::{split_and_insert_interior, split_and_insert_leaf, BTreeAdapter};
pub use interior::{InteriorHeader, InteriorNode, InteriorNodeMut};
pub use leaf::{LeafEntry, LeafHeader, LeafNode, LeafNodeMut, SearchResult};

use eyre::Result;

use crate::types::{Key, PageId, Value, INVALID_PAGE_ID};

/// Outcome of a node split, propagated to the parent level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitResult {
    pub did_split: bool,
    pub left: PageId,
    pub right: PageId,
    pub promoted_key: Key,
}

impl SplitResult {
    pub fn none() -> Self {
        Self {
            did_split: false,
            left: INVALID_PAGE_ID,
            right: INVALID_PAGE_ID,
            promoted_key: 0,
        }
    }
}

/// In-page operations the version manager needs from an index node
/// format. Implementations are pure with respect to the pool: they only
/// read and write the page images passed in.
pub trait TreeAdapter: Send + Sync {
    fn is_leaf(&self, page: &[u8]) -> Result<bool>;
    fn key_count(&self, page: &[u8]) -> Result<u32>;

    fn init_leaf(&self, page: &mut [u8]) -> Result<()>;
    fn init_interior(&self, page: &mut [u8]) -> Result<()>;

    /// For an interior node: the child to descend into for `key`.
    fn find_child(&self, page: &[u8], key: Key) -> Result<PageId>;

    /// For an interior node: the smallest separator strictly greater than
    /// `key`, which lower-bounds every key to the right of the descent
    /// path. `None` when `key` falls in the rightmost subtree. Snapshot
    /// scans use this to resume from the next leaf without sibling
    /// pointers.
    fn next_separator(&self, page: &[u8], key: Key) -> Result<Option<Key>>;

    /// Insert or overwrite in a leaf. `Ok(false)` means the node is full
    /// and must be split.
    fn apply_update_to_leaf(&self, page: &mut [u8], key: Key, value: &Value) -> Result<bool>;

    /// Insert a promoted separator and its right child into an interior
    /// node. `Ok(false)` means the node is full and must be split.
    fn insert_into_interior(&self, page: &mut [u8], key: Key, right_child: PageId) -> Result<bool>;

    /// Rewire the first occurrence of `old_child` to `new_child`; the
    /// copy-on-write write a shadowed parent relies on. `Ok(false)` when
    /// `old_child` is not present.
    fn update_child_pointer(
        &self,
        page: &mut [u8],
        old_child: PageId,
        new_child: PageId,
    ) -> Result<bool>;

    /// Move the upper half of `full` into the freshly allocated `empty`
    /// page and report the promoted key. Both pages carry their own IDs
    /// in their headers.
    fn split_node(&self, full: &mut [u8], empty: &mut [u8]) -> Result<SplitResult>;

    /// Initialize `page` as an interior root with one separator and two
    /// children.
    fn create_new_root(
        &self,
        page: &mut [u8],
        left_child: PageId,
        right_child: PageId,
        key: Key,
    ) -> Result<()>;

    /// Point lookup inside a leaf.
    fn leaf_lookup(&self, page: &[u8], key: Key) -> Result<Option<Value>>;

    /// The right sibling recorded in a leaf. Splits keep this chained for
    /// the pages of one shadowed path, but a shadowed leaf's left
    /// neighbor is never re-linked under path-copying, so the pointer
    /// goes stale across versions. Snapshot scans must not follow it;
    /// they re-descend from the version root instead.
    fn leaf_next(&self, page: &[u8]) -> Result<PageId>;

    /// All entries of a leaf in key order, copied out so the caller can
    /// release the page.
    fn leaf_entries(&self, page: &[u8]) -> Result<Vec<(Key, Value)>>;

    /// Advisory: whether the node's key range is provably disjoint from
    /// the query range. May return false negatives, never false
    /// positives: `true` requires that no key under this node can fall in
    /// `[query_min, query_max]`.
    fn should_skip(&self, page: &[u8], query_min: Key, query_max: Key) -> Result<bool>;

    /// Recompute the advisory statistics after a mutation.
    fn update_statistics(&self, page: &mut [u8]) -> Result<()>;
}
