//! # Page Header Layout
//!
//! Every 4096-byte page begins with a 20-byte header; node payloads start
//! at byte 20. The header is the only part of a page the storage layer
//! interprets; payload bytes belong to the tree adapters above.
//!
//! ## Page Header Layout (20 bytes)
//!
//! ```text
//! Offset  Size  Field             Description
//! ------  ----  ----------------  ----------------------------------------
//! 0       4     page_id           i32 LE; -1 marks an invalid/deleted slot
//! 4       8     creation_version  u64 LE; version that created this page
//! 12      4     key_count         u32 LE; entries in the node payload
//! 16      1     is_leaf           1 for leaf nodes, 0 for interior nodes
//! 17      3     reserved          zero
//! ```
//!
//! ## Zero-Copy Access
//!
//! The `PageHeader` struct uses `zerocopy` for safe transmutation from raw
//! frame bytes. Disk I/O always transfers the whole frame starting at the
//! header, so the typed view makes it impossible to hand the payload
//! pointer to the disk manager by mistake:
//!
//! ```text
//! let header = PageHeader::from_bytes(&frame[..PAGE_HEADER_SIZE])?;
//! ```
//!
//! A page read from past the file's high-water mark is all zeros; a zeroed
//! header (`page_id == 0`, everything else zero) is valid and simply
//! describes an untouched page 0 image.

use eyre::{ensure, Result};
use zerocopy::little_endian::{I32, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{INTERIOR_MAX_KEYS, LEAF_MAX_KEYS, PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::types::{PageId, Version, INVALID_PAGE_ID, INVALID_VERSION};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageHeader {
    page_id: I32,
    creation_version: U64,
    key_count: U32,
    is_leaf: u8,
    reserved: [u8; 3],
}

impl PageHeader {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id: I32::new(page_id),
            creation_version: U64::new(INVALID_VERSION),
            key_count: U32::new(0),
            is_leaf: 0,
            reserved: [0; 3],
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= PAGE_HEADER_SIZE,
            "buffer too small for PageHeader: {} < {}",
            data.len(),
            PAGE_HEADER_SIZE
        );

        Self::ref_from_bytes(&data[..PAGE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read PageHeader: {:?}", e))
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= PAGE_HEADER_SIZE,
            "buffer too small for PageHeader: {} < {}",
            data.len(),
            PAGE_HEADER_SIZE
        );

        Self::mut_from_bytes(&mut data[..PAGE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read PageHeader: {:?}", e))
    }

    zerocopy_accessors! {
        page_id: i32,
        creation_version: u64,
        key_count: u32,
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf != 0
    }

    pub fn set_is_leaf(&mut self, is_leaf: bool) {
        self.is_leaf = is_leaf as u8;
    }

    pub fn is_valid(&self) -> bool {
        self.page_id() != INVALID_PAGE_ID
    }
}

/// Convenience for stamping a freshly copied or allocated page.
pub fn stamp_header(frame: &mut [u8], page_id: PageId, creation_version: Version) -> Result<()> {
    let header = PageHeader::from_bytes_mut(frame)?;
    header.set_page_id(page_id);
    header.set_creation_version(creation_version);
    Ok(())
}

/// Checks that a full page image is internally consistent: correct size,
/// a sane page ID, and a key count within the capacity of its node kind.
/// An all-zero page is valid (it is what reads past EOF produce).
pub fn validate_page(data: &[u8]) -> Result<()> {
    ensure!(
        data.len() == PAGE_SIZE,
        "invalid page size: {} != {}",
        data.len(),
        PAGE_SIZE
    );

    let header = PageHeader::from_bytes(data)?;

    ensure!(
        header.page_id() >= INVALID_PAGE_ID,
        "invalid page id {}",
        header.page_id()
    );

    let capacity = if header.is_leaf() {
        LEAF_MAX_KEYS
    } else {
        INTERIOR_MAX_KEYS
    };
    ensure!(
        header.key_count() as usize <= capacity,
        "key_count {} exceeds node capacity {}",
        header.key_count(),
        capacity
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_header_size_is_20_bytes() {
        assert_eq!(std::mem::size_of::<PageHeader>(), PAGE_HEADER_SIZE);
    }

    #[test]
    fn page_header_new_initializes_fields() {
        let header = PageHeader::new(7);

        assert_eq!(header.page_id(), 7);
        assert_eq!(header.creation_version(), INVALID_VERSION);
        assert_eq!(header.key_count(), 0);
        assert!(!header.is_leaf());
    }

    #[test]
    fn page_header_from_bytes_zero_copy() {
        let mut data = [0u8; PAGE_HEADER_SIZE];
        data[..4].copy_from_slice(&5i32.to_le_bytes());
        data[4..12].copy_from_slice(&9u64.to_le_bytes());
        data[12..16].copy_from_slice(&3u32.to_le_bytes());
        data[16] = 1;

        let header = PageHeader::from_bytes(&data).unwrap();

        assert_eq!(header.page_id(), 5);
        assert_eq!(header.creation_version(), 9);
        assert_eq!(header.key_count(), 3);
        assert!(header.is_leaf());
    }

    #[test]
    fn page_header_from_bytes_too_small() {
        let data = [0u8; 8];
        let result = PageHeader::from_bytes(&data);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("buffer too small"));
    }

    #[test]
    fn page_header_from_bytes_mut_modifies_in_place() {
        let mut data = [0u8; PAGE_SIZE];

        {
            let header = PageHeader::from_bytes_mut(&mut data).unwrap();
            header.set_page_id(42);
            header.set_is_leaf(true);
            header.set_key_count(11);
        }

        assert_eq!(&data[..4], &42i32.to_le_bytes());
        assert_eq!(data[16], 1);
        assert_eq!(&data[12..16], &11u32.to_le_bytes());
    }

    #[test]
    fn invalid_marker_round_trips() {
        let mut data = [0u8; PAGE_SIZE];
        let header = PageHeader::from_bytes_mut(&mut data).unwrap();
        header.set_page_id(INVALID_PAGE_ID);

        assert!(!PageHeader::from_bytes(&data).unwrap().is_valid());
    }

    #[test]
    fn validate_page_rejects_wrong_size() {
        let data = [0u8; 100];
        let result = validate_page(&data);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("invalid page size"));
    }

    #[test]
    fn validate_page_zeroed_is_valid() {
        let data = [0u8; PAGE_SIZE];
        assert!(validate_page(&data).is_ok());
    }

    #[test]
    fn validate_page_rejects_overfull_leaf() {
        let mut data = [0u8; PAGE_SIZE];
        let header = PageHeader::from_bytes_mut(&mut data).unwrap();
        header.set_is_leaf(true);
        header.set_key_count(LEAF_MAX_KEYS as u32 + 1);

        assert!(validate_page(&data).is_err());
    }
}
