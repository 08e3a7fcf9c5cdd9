//! # B+Tree Adapter
//!
//! [`BTreeAdapter`] is the B+-tree implementation of the [`TreeAdapter`]
//! seam. Every operation works on one full page image handed over by the
//! caller; the adapter never touches the buffer pool, which is what
//! makes it safe to run against shadow pages mid copy-on-write.

use eyre::{ensure, Result};

use crate::storage::PageHeader;
use crate::tree::interior::{InteriorNode, InteriorNodeMut};
use crate::tree::leaf::{LeafNode, LeafNodeMut};
use crate::tree::{SplitResult, TreeAdapter};
use crate::types::{Key, PageId, Value};

/// Stateless; all state lives in the pages themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct BTreeAdapter;

impl BTreeAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl TreeAdapter for BTreeAdapter {
    fn is_leaf(&self, page: &[u8]) -> Result<bool> {
        Ok(PageHeader::from_bytes(page)?.is_leaf())
    }

    fn key_count(&self, page: &[u8]) -> Result<u32> {
        Ok(PageHeader::from_bytes(page)?.key_count())
    }

    fn init_leaf(&self, page: &mut [u8]) -> Result<()> {
        LeafNodeMut::init(page)?;
        Ok(())
    }

    fn init_interior(&self, page: &mut [u8]) -> Result<()> {
        InteriorNodeMut::init(page)?;
        Ok(())
    }

    fn find_child(&self, page: &[u8], key: Key) -> Result<PageId> {
        InteriorNode::from_page(page)?.find_child(key)
    }

    fn next_separator(&self, page: &[u8], key: Key) -> Result<Option<Key>> {
        Ok(InteriorNode::from_page(page)?.next_separator(key))
    }

    fn apply_update_to_leaf(&self, page: &mut [u8], key: Key, value: &Value) -> Result<bool> {
        Ok(LeafNodeMut::from_page(page)?.insert(key, value))
    }

    fn insert_into_interior(&self, page: &mut [u8], key: Key, right_child: PageId) -> Result<bool> {
        Ok(InteriorNodeMut::from_page(page)?.insert(key, right_child))
    }

    fn update_child_pointer(
        &self,
        page: &mut [u8],
        old_child: PageId,
        new_child: PageId,
    ) -> Result<bool> {
        Ok(InteriorNodeMut::from_page(page)?.replace_child(old_child, new_child))
    }

    fn split_node(&self, full: &mut [u8], empty: &mut [u8]) -> Result<SplitResult> {
        let full_header = PageHeader::from_bytes(full)?;
        let left = full_header.page_id();
        let right = PageHeader::from_bytes(empty)?.page_id();
        let leaf = full_header.is_leaf();

        let promoted_key = if leaf {
            let mut right_node = LeafNodeMut::init(empty)?;
            LeafNodeMut::from_page(full)?.split_into(&mut right_node)
        } else {
            let mut right_node = InteriorNodeMut::init(empty)?;
            InteriorNodeMut::from_page(full)?.split_into(&mut right_node)
        };

        Ok(SplitResult {
            did_split: true,
            left,
            right,
            promoted_key,
        })
    }

    fn create_new_root(
        &self,
        page: &mut [u8],
        left_child: PageId,
        right_child: PageId,
        key: Key,
    ) -> Result<()> {
        let mut root = InteriorNodeMut::init(page)?;
        root.set_root_entries(left_child, right_child, key);
        Ok(())
    }

    fn leaf_lookup(&self, page: &[u8], key: Key) -> Result<Option<Value>> {
        Ok(LeafNode::from_page(page)?.lookup(key))
    }

    fn leaf_next(&self, page: &[u8]) -> Result<PageId> {
        Ok(LeafNode::from_page(page)?.next_leaf())
    }

    fn leaf_entries(&self, page: &[u8]) -> Result<Vec<(Key, Value)>> {
        let node = LeafNode::from_page(page)?;
        Ok(node
            .entries()
            .iter()
            .map(|entry| (entry.key(), *entry.value()))
            .collect())
    }

    fn should_skip(&self, page: &[u8], query_min: Key, query_max: Key) -> Result<bool> {
        let header = PageHeader::from_bytes(page)?;
        if !header.is_leaf() {
            // Separator extremes do not bound the subtree: children[0]
            // holds keys below keys[0] and the rightmost child holds keys
            // at or above the last separator. Never prune on them.
            return Ok(false);
        }
        if header.key_count() == 0 {
            return Ok(true);
        }
        let node = LeafNode::from_page(page)?;
        Ok(node.max_key() < query_min || node.min_key() > query_max)
    }

    fn update_statistics(&self, page: &mut [u8]) -> Result<()> {
        if PageHeader::from_bytes(page)?.is_leaf() {
            LeafNodeMut::from_page(page)?.update_statistics();
        } else {
            InteriorNodeMut::from_page(page)?.update_statistics();
        }
        Ok(())
    }
}

/// Splits `full` into `empty` and then routes `(key, right_child)` into
/// whichever half owns the key. Used by the version manager when a
/// promoted separator lands in a full interior node.
pub fn split_and_insert_interior(
    adapter: &dyn TreeAdapter,
    full: &mut [u8],
    empty: &mut [u8],
    key: Key,
    right_child: PageId,
) -> Result<SplitResult> {
    let split = adapter.split_node(full, empty)?;
    let target = if key < split.promoted_key { full } else { empty };
    let inserted = adapter.insert_into_interior(target, key, right_child)?;
    ensure!(inserted, "interior node still full after split");
    adapter.update_statistics(target)?;
    Ok(split)
}

/// Splits a full leaf and then routes `(key, value)` into the correct
/// half. Used by the version manager when a leaf overflows.
pub fn split_and_insert_leaf(
    adapter: &dyn TreeAdapter,
    full: &mut [u8],
    empty: &mut [u8],
    key: Key,
    value: &Value,
) -> Result<SplitResult> {
    let split = adapter.split_node(full, empty)?;
    let target = if key < split.promoted_key { full } else { empty };
    let inserted = adapter.apply_update_to_leaf(target, key, value)?;
    ensure!(inserted, "leaf still full after split");
    adapter.update_statistics(target)?;
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LEAF_MAX_KEYS, PAGE_SIZE, RECORD_SIZE};

    fn record(tag: u8) -> Value {
        let mut v = [0u8; RECORD_SIZE];
        v[0] = tag;
        v
    }

    fn page_with_id(id: PageId) -> Box<[u8; PAGE_SIZE]> {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        PageHeader::from_bytes_mut(data.as_mut_slice())
            .unwrap()
            .set_page_id(id);
        data
    }

    #[test]
    fn adapter_discriminates_node_kinds() {
        let adapter = BTreeAdapter::new();
        let mut leaf = page_with_id(1);
        let mut interior = page_with_id(2);
        adapter.init_leaf(leaf.as_mut_slice()).unwrap();
        adapter.init_interior(interior.as_mut_slice()).unwrap();

        assert!(adapter.is_leaf(leaf.as_slice()).unwrap());
        assert!(!adapter.is_leaf(interior.as_slice()).unwrap());
    }

    #[test]
    fn split_result_carries_both_page_ids() {
        let adapter = BTreeAdapter::new();
        let mut full = page_with_id(5);
        let mut empty = page_with_id(6);
        adapter.init_leaf(full.as_mut_slice()).unwrap();

        for key in 0..LEAF_MAX_KEYS as u64 {
            assert!(adapter
                .apply_update_to_leaf(full.as_mut_slice(), key, &record(0))
                .unwrap());
        }
        let split = adapter
            .split_node(full.as_mut_slice(), empty.as_mut_slice())
            .unwrap();

        assert!(split.did_split);
        assert_eq!(split.left, 5);
        assert_eq!(split.right, 6);
        assert_eq!(split.promoted_key, LEAF_MAX_KEYS as u64 / 2);
        assert_eq!(adapter.leaf_next(full.as_slice()).unwrap(), 6);
    }

    #[test]
    fn split_and_insert_leaf_routes_low_keys_left() {
        let adapter = BTreeAdapter::new();
        let mut full = page_with_id(1);
        let mut empty = page_with_id(2);
        adapter.init_leaf(full.as_mut_slice()).unwrap();

        // Even keys fill the node; the odd key 1 must land in the left half.
        for key in 0..LEAF_MAX_KEYS as u64 {
            adapter
                .apply_update_to_leaf(full.as_mut_slice(), key * 2, &record(0))
                .unwrap();
        }
        let split =
            split_and_insert_leaf(&adapter, full.as_mut_slice(), empty.as_mut_slice(), 1, &record(7))
                .unwrap();

        assert!(1 < split.promoted_key);
        assert_eq!(
            adapter.leaf_lookup(full.as_slice(), 1).unwrap().unwrap()[0],
            7
        );
        assert!(adapter.leaf_lookup(empty.as_slice(), 1).unwrap().is_none());
    }

    #[test]
    fn create_new_root_wires_two_children() {
        let adapter = BTreeAdapter::new();
        let mut root = page_with_id(9);
        adapter
            .create_new_root(root.as_mut_slice(), 3, 4, 500)
            .unwrap();

        assert!(!adapter.is_leaf(root.as_slice()).unwrap());
        assert_eq!(adapter.key_count(root.as_slice()).unwrap(), 1);
        assert_eq!(adapter.find_child(root.as_slice(), 10).unwrap(), 3);
        assert_eq!(adapter.find_child(root.as_slice(), 500).unwrap(), 4);
    }

    #[test]
    fn update_child_pointer_reports_missing_children() {
        let adapter = BTreeAdapter::new();
        let mut root = page_with_id(9);
        adapter
            .create_new_root(root.as_mut_slice(), 3, 4, 500)
            .unwrap();

        assert!(adapter
            .update_child_pointer(root.as_mut_slice(), 3, 30)
            .unwrap());
        assert!(!adapter
            .update_child_pointer(root.as_mut_slice(), 3, 99)
            .unwrap());
        assert_eq!(adapter.find_child(root.as_slice(), 10).unwrap(), 30);
    }

    #[test]
    fn should_skip_prunes_disjoint_ranges() {
        let adapter = BTreeAdapter::new();
        let mut leaf = page_with_id(1);
        adapter.init_leaf(leaf.as_mut_slice()).unwrap();
        for key in [100u64, 200, 300] {
            adapter
                .apply_update_to_leaf(leaf.as_mut_slice(), key, &record(0))
                .unwrap();
        }
        adapter.update_statistics(leaf.as_mut_slice()).unwrap();

        assert!(adapter.should_skip(leaf.as_slice(), 400, 500).unwrap());
        assert!(adapter.should_skip(leaf.as_slice(), 0, 50).unwrap());
        assert!(!adapter.should_skip(leaf.as_slice(), 150, 250).unwrap());
    }

    #[test]
    fn should_skip_never_prunes_interior_nodes() {
        let adapter = BTreeAdapter::new();
        let mut root = page_with_id(9);
        adapter
            .create_new_root(root.as_mut_slice(), 3, 4, 500)
            .unwrap();
        adapter.update_statistics(root.as_mut_slice()).unwrap();

        // The outer children hold keys outside the separator range, so
        // even a query disjoint from the separators must not be pruned.
        assert!(!adapter.should_skip(root.as_slice(), 0, 10).unwrap());
        assert!(!adapter.should_skip(root.as_slice(), 900, 1000).unwrap());
    }

    #[test]
    fn next_separator_is_none_in_the_rightmost_subtree() {
        let adapter = BTreeAdapter::new();
        let mut root = page_with_id(9);
        adapter
            .create_new_root(root.as_mut_slice(), 3, 4, 500)
            .unwrap();

        assert_eq!(adapter.next_separator(root.as_slice(), 10).unwrap(), Some(500));
        assert_eq!(adapter.next_separator(root.as_slice(), 500).unwrap(), None);
    }
}
