//! # chronodb Configuration Constants
//!
//! This module centralizes all configuration constants, grouping interdependent
//! values together and documenting their relationships. Constants that depend
//! on each other are co-located to prevent mismatch bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> PAGE_HEADER_SIZE (20 bytes, fixed on-disk prefix)
//!       │
//!       ├─> PAGE_PAYLOAD_SIZE (derived: PAGE_SIZE - PAGE_HEADER_SIZE)
//!       │
//!       ├─> LEAF_MAX_KEYS
//!       │     Leaf capacity is derived from the payload size, the leaf
//!       │     header, and the fixed entry size. Changing RECORD_SIZE
//!       │     changes leaf fan-out.
//!       │
//!       └─> INTERIOR_MAX_KEYS
//!             Interior capacity is bounded by the payload size; an
//!             interior node stores N keys and N + 1 child page IDs.
//!
//! RECORD_SIZE (64 bytes)
//!       │
//!       └─> LEAF_ENTRY_SIZE (derived: KEY_SIZE + RECORD_SIZE)
//!
//! DEFAULT_POOL_SIZE (64 frames)
//!       │
//!       └─> Must exceed the deepest copy-on-write path (tree depth plus
//!           two split pages plus the new root), or an update can exhaust
//!           the pool mid-traversal.
//! ```
//!
//! ## Critical Invariants
//!
//! These invariants are enforced by compile-time assertions at the bottom
//! of this module:
//!
//! 1. `PAGE_PAYLOAD_SIZE == PAGE_SIZE - PAGE_HEADER_SIZE`
//! 2. The leaf layout (header + entries) fits in the payload
//! 3. The interior layout (header + keys + children) fits in the payload
//!
//! ## Usage
//!
//! Import constants from this module rather than defining them locally:
//!
//! ```ignore
//! use chronodb::config::{PAGE_SIZE, LEAF_MAX_KEYS};
//! ```

/// Size of a page in bytes. Page `i` occupies the byte range
/// `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)` in the backing file.
pub const PAGE_SIZE: usize = 4096;

/// Size of the on-disk page header stored at the start of every page.
pub const PAGE_HEADER_SIZE: usize = 20;

/// Bytes available to node payloads after the page header.
pub const PAGE_PAYLOAD_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Size of an encoded log record, the fixed value type of the index.
pub const RECORD_SIZE: usize = 64;

/// Size of an index key (a millisecond timestamp encoded as `u64`).
pub const KEY_SIZE: usize = 8;

/// Maximum bytes of a resource name in an encoded record.
pub const RESOURCE_NAME_LEN: usize = 32;

/// Maximum bytes of an event type in an encoded record.
pub const EVENT_TYPE_LEN: usize = 16;

/// Size of the leaf-specific header at the start of a leaf payload.
pub const LEAF_HEADER_SIZE: usize = 32;

/// Size of one leaf entry: key followed by the encoded record.
pub const LEAF_ENTRY_SIZE: usize = KEY_SIZE + RECORD_SIZE;

/// Number of entries a leaf node can hold.
pub const LEAF_MAX_KEYS: usize = (PAGE_PAYLOAD_SIZE - LEAF_HEADER_SIZE) / LEAF_ENTRY_SIZE;

/// Size of the interior-specific header at the start of an interior payload.
pub const INTERIOR_HEADER_SIZE: usize = 24;

/// Number of separator keys an interior node can hold. An interior node
/// with N keys carries N + 1 child page IDs.
pub const INTERIOR_MAX_KEYS: usize = 256;

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// How many times `DiskManager::open` retries before giving up. The retry
/// window absorbs transient OS-level locks on the backing file.
pub const OPEN_RETRY_LIMIT: u32 = 10;

/// Delay between open retries, in milliseconds.
pub const OPEN_RETRY_DELAY_MS: u64 = 100;

const _: () = assert!(PAGE_PAYLOAD_SIZE == PAGE_SIZE - PAGE_HEADER_SIZE);

const _: () = assert!(
    LEAF_HEADER_SIZE + LEAF_MAX_KEYS * LEAF_ENTRY_SIZE <= PAGE_PAYLOAD_SIZE,
    "leaf layout exceeds page payload"
);

const _: () = assert!(
    INTERIOR_HEADER_SIZE + INTERIOR_MAX_KEYS * KEY_SIZE + (INTERIOR_MAX_KEYS + 1) * 4
        <= PAGE_PAYLOAD_SIZE,
    "interior layout exceeds page payload"
);

const _: () = assert!(LEAF_MAX_KEYS >= 2, "a leaf must hold at least two entries to split");
