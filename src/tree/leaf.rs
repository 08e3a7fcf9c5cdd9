//! # B+Tree Leaf Node Implementation
//!
//! Leaf nodes store the actual key/record pairs in sorted order. A leaf
//! records its right sibling in `next_leaf`; splits keep the link
//! correct among the pages of one shadowed path, but copy-on-write never
//! re-links a shadowed leaf's left neighbor, so readers treat the link
//! as a hint and snapshot scans re-descend from the root instead.
//!
//! ## Page Layout
//!
//! Keys and values are fixed width, so a leaf is a flat entry array
//! rather than a slotted page:
//!
//! ```text
//! +---------------------------+
//! | PageHeader (20 bytes)     |  is_leaf = 1, key_count = N
//! +---------------------------+
//! | LeafHeader (32 bytes)     |  next_leaf + advisory statistics
//! +---------------------------+
//! | LeafEntry[0]  (72 bytes)  |  key (u64 LE) + encoded record (64 B)
//! | LeafEntry[1]              |
//! | ...                       |
//! | LeafEntry[55]             |
//! +---------------------------+
//! ```
//!
//! ## Leaf Header (32 bytes, at payload offset 0)
//!
//! ```text
//! Offset  Size  Field      Description
//! ------  ----  ---------  -------------------------------------
//! 0       4     next_leaf  right sibling page ID, -1 at the end
//! 4       4     reserved
//! 8       8     min_key    advisory: smallest key in the node
//! 16      8     max_key    advisory: largest key in the node
//! 24      4     density    advisory: key_count / capacity
//! 28      4     reserved
//! ```
//!
//! The statistics fields are advisory range-pruning hints; readers must
//! not rely on them for correctness.
//!
//! ## Insertion
//!
//! An insert of an existing key overwrites its record in place, even in a
//! full node. A new key is placed at its sorted position; a full node
//! signals overflow by returning `false`, and the caller splits.
//!
//! ## Splitting
//!
//! `split_into` moves the upper half of the entries to an empty right
//! sibling, chains the sibling into the leaf list, and returns the right
//! node's first key for the parent (copy-up semantics).

use eyre::{ensure, Result};
use zerocopy::little_endian::{F32, I32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{LEAF_ENTRY_SIZE, LEAF_HEADER_SIZE, LEAF_MAX_KEYS, PAGE_HEADER_SIZE, PAGE_SIZE, RECORD_SIZE};
use crate::storage::PageHeader;
use crate::types::{Key, PageId, Value, INVALID_PAGE_ID};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct LeafHeader {
    next_leaf: I32,
    reserved: [u8; 4],
    min_key: U64,
    max_key: U64,
    density: F32,
    reserved2: [u8; 4],
}

impl LeafHeader {
    zerocopy_accessors! {
        next_leaf: i32,
        min_key: u64,
        max_key: u64,
        density: f32,
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct LeafEntry {
    key: U64,
    value: [u8; RECORD_SIZE],
}

impl LeafEntry {
    pub fn key(&self) -> Key {
        self.key.get()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Outcome of a key search inside one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found(usize),
    /// Key absent; the payload is the sorted insertion position.
    NotFound(usize),
}

const ENTRIES_END: usize = LEAF_HEADER_SIZE + LEAF_MAX_KEYS * LEAF_ENTRY_SIZE;

#[derive(Debug)]
pub struct LeafNode<'a> {
    page: &'a PageHeader,
    header: &'a LeafHeader,
    entries: &'a [LeafEntry],
}

pub struct LeafNodeMut<'a> {
    page: &'a mut PageHeader,
    header: &'a mut LeafHeader,
    entries: &'a mut [LeafEntry],
}

impl<'a> LeafNode<'a> {
    pub fn from_page(data: &'a [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        let page = PageHeader::from_bytes(data)?;
        ensure!(page.is_leaf(), "expected a leaf page, got an interior page");

        let payload = &data[PAGE_HEADER_SIZE..];
        let header = LeafHeader::ref_from_bytes(&payload[..LEAF_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read LeafHeader: {:?}", e))?;
        let entries = <[LeafEntry]>::ref_from_bytes(&payload[LEAF_HEADER_SIZE..ENTRIES_END])
            .map_err(|e| eyre::eyre!("failed to read leaf entries: {:?}", e))?;

        Ok(Self {
            page,
            header,
            entries,
        })
    }

    pub fn key_count(&self) -> usize {
        self.page.key_count() as usize
    }

    pub fn next_leaf(&self) -> PageId {
        self.header.next_leaf()
    }

    pub fn min_key(&self) -> Key {
        self.header.min_key()
    }

    pub fn max_key(&self) -> Key {
        self.header.max_key()
    }

    pub fn density(&self) -> f32 {
        self.header.density()
    }

    pub fn key_at(&self, index: usize) -> Result<Key> {
        ensure!(
            index < self.key_count(),
            "entry index {} out of bounds (key_count={})",
            index,
            self.key_count()
        );
        Ok(self.entries[index].key())
    }

    pub fn value_at(&self, index: usize) -> Result<&'a Value> {
        ensure!(
            index < self.key_count(),
            "entry index {} out of bounds (key_count={})",
            index,
            self.key_count()
        );
        Ok(&self.entries[index].value)
    }

    pub fn search(&self, key: Key) -> SearchResult {
        let used = &self.entries[..self.key_count()];
        match used.binary_search_by_key(&key, LeafEntry::key) {
            Ok(i) => SearchResult::Found(i),
            Err(i) => SearchResult::NotFound(i),
        }
    }

    pub fn lookup(&self, key: Key) -> Option<Value> {
        match self.search(key) {
            SearchResult::Found(i) => Some(self.entries[i].value),
            SearchResult::NotFound(_) => None,
        }
    }

    /// Entries in key order, for scans.
    pub fn entries(&self) -> &'a [LeafEntry] {
        &self.entries[..self.page.key_count() as usize]
    }
}

impl<'a> LeafNodeMut<'a> {
    /// Reinterprets `data` as a leaf without changing its contents.
    pub fn from_page(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        let (head, payload) = data.split_at_mut(PAGE_HEADER_SIZE);
        let page = PageHeader::from_bytes_mut(head)?;
        ensure!(page.is_leaf(), "expected a leaf page, got an interior page");

        let (header_bytes, rest) = payload.split_at_mut(LEAF_HEADER_SIZE);
        let header = LeafHeader::mut_from_bytes(header_bytes)
            .map_err(|e| eyre::eyre!("failed to read LeafHeader: {:?}", e))?;
        let entries =
            <[LeafEntry]>::mut_from_bytes(&mut rest[..LEAF_MAX_KEYS * LEAF_ENTRY_SIZE])
                .map_err(|e| eyre::eyre!("failed to read leaf entries: {:?}", e))?;

        Ok(Self {
            page,
            header,
            entries,
        })
    }

    /// Clears the payload and initializes an empty leaf. The page header's
    /// `page_id` and `creation_version` are left untouched.
    pub fn init(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        data[PAGE_HEADER_SIZE..].fill(0);

        let header = PageHeader::from_bytes_mut(data)?;
        header.set_is_leaf(true);
        header.set_key_count(0);

        let leaf = Self::from_page(data)?;
        leaf.header.set_next_leaf(INVALID_PAGE_ID);
        Ok(leaf)
    }

    pub fn key_count(&self) -> usize {
        self.page.key_count() as usize
    }

    pub fn next_leaf(&self) -> PageId {
        self.header.next_leaf()
    }

    pub fn set_next_leaf(&mut self, page_id: PageId) {
        self.header.set_next_leaf(page_id);
    }

    fn search(&self, key: Key) -> SearchResult {
        let used = &self.entries[..self.key_count()];
        match used.binary_search_by_key(&key, LeafEntry::key) {
            Ok(i) => SearchResult::Found(i),
            Err(i) => SearchResult::NotFound(i),
        }
    }

    /// Inserts or overwrites `key`. Returns `false` when the key is new
    /// and the node is full, signaling that the caller must split.
    pub fn insert(&mut self, key: Key, value: &Value) -> bool {
        let count = self.key_count();
        match self.search(key) {
            SearchResult::Found(i) => {
                self.entries[i].value = *value;
                true
            }
            SearchResult::NotFound(_) if count == LEAF_MAX_KEYS => false,
            SearchResult::NotFound(pos) => {
                self.entries.copy_within(pos..count, pos + 1);
                self.entries[pos] = LeafEntry {
                    key: U64::new(key),
                    value: *value,
                };
                self.page.set_key_count(count as u32 + 1);
                true
            }
        }
    }

    /// Moves the upper half of this (full) leaf into `right`, chains
    /// `right` into the leaf list, and returns the promoted key: the
    /// first key of the right node.
    pub fn split_into(&mut self, right: &mut LeafNodeMut<'_>) -> Key {
        let count = self.key_count();
        let mid = count / 2;
        let moved = count - mid;

        right.entries[..moved].copy_from_slice(&self.entries[mid..count]);
        right.page.set_key_count(moved as u32);
        self.page.set_key_count(mid as u32);

        right.header.set_next_leaf(self.header.next_leaf());
        self.header.set_next_leaf(right.page.page_id());

        self.update_statistics();
        right.update_statistics();

        right.entries[0].key()
    }

    /// Recomputes the advisory min/max/density fields.
    pub fn update_statistics(&mut self) {
        let count = self.key_count();
        if count == 0 {
            self.header.set_min_key(0);
            self.header.set_max_key(0);
            self.header.set_density(0.0);
            return;
        }
        self.header.set_min_key(self.entries[0].key());
        self.header.set_max_key(self.entries[count - 1].key());
        self.header.set_density(count as f32 / LEAF_MAX_KEYS as f32);
    }
}
