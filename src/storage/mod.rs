//! # Storage Module
//!
//! The page-granularity storage core: a disk manager over a single
//! backing file, a bounded buffer pool with pin/unpin accounting, and the
//! LRU replacer the pool consults for eviction candidates.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  Upper layers (tree adapter, version │
//! │  manager), via the PagePool trait    │
//! ├──────────────────────────────────────┤
//! │  BufferPool                          │
//! │   frames / page table / free list    │
//! │   └── LruReplacer (victim choice)    │
//! ├──────────────────────────────────────┤
//! │  DiskManager                         │
//! │   whole-page I/O at id * PAGE_SIZE   │
//! └──────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - A pinned page is never evicted; a dirty frame is written back before
//!   its slot is reused.
//! - The byte at offset `page_id * PAGE_SIZE` is either the last flushed
//!   content or zero: reads of never-written pages produce zero pages.
//! - Disk transfers always cover the whole frame, header included.
//! - Fetch after delete re-reads the backing file rather than returning
//!   stale cached bytes.
//!
//! ## Module Organization
//!
//! - `page`: the 20-byte page header as a zerocopy view
//! - `disk`: file-backed page I/O, monotonic allocation, flush counting
//! - `replacer`: strict-LRU eviction candidates
//! - `pool`: frames, page table, free list, pin guards

mod disk;
mod page;
mod pool;
mod replacer;

pub use disk::DiskManager;
pub use page::{stamp_header, validate_page, PageHeader};
pub use pool::{BufferPool, Frame, PagePool, PageRef};
pub use replacer::LruReplacer;

pub use crate::config::{PAGE_HEADER_SIZE, PAGE_PAYLOAD_SIZE, PAGE_SIZE};
