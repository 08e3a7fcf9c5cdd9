//! # chronodb - Versioned Log-Record Storage Engine
//!
//! chronodb is the storage core of a small embedded database that indexes
//! append-mostly log records: timestamped events about named resources.
//! It persists fixed-size pages to a single file, caches them in a
//! bounded pool, and layers copy-on-write versioning on top so that every
//! committed snapshot stays readable while new versions are built.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  VersionManager                     │  CoW inserts, commit/abort,
//! │                                     │  snapshot reads
//! ├──────────────────┬──────────────────┤
//! │  TreeAdapter     │  PagePool trait  │  in-page B+tree ops /
//! │  (B+tree nodes)  │                  │  pin-granularity page access
//! ├──────────────────┴──────────────────┤
//! │  BufferPool + LruReplacer           │  frames, page table,
//! │                                     │  pin/dirty accounting
//! ├─────────────────────────────────────┤
//! │  DiskManager                        │  whole-page file I/O
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use chronodb::{BufferPool, BTreeAdapter, DiskManager, LogRecord, VersionManager};
//!
//! let disk = Arc::new(DiskManager::open("./events.db")?);
//! let pool = Arc::new(BufferPool::with_default_size(disk));
//! let manager = VersionManager::new(pool, Box::new(BTreeAdapter::new()));
//!
//! let record = LogRecord::new(1_700_000_000_000, 42, "vm-node-42", "START");
//! let v = manager.create_version();
//! manager.apply_update(v, 0, record.key(), &record.encode())?;
//! manager.commit_version(v);
//!
//! let hit = manager.lookup(v, record.key())?;
//! ```
//!
//! ## Guarantees
//!
//! - A page pinned by a caller is never evicted, and a dirty frame is
//!   written back before its slot is reused.
//! - The on-disk byte range of a page holds either its last flushed
//!   content or zeros.
//! - A copy-on-write update never modifies a page reachable from a
//!   committed version, and a failed update leaves the committed version
//!   set unchanged.
//!
//! ## Module Overview
//!
//! - [`storage`]: disk manager, buffer pool, LRU replacer, page header
//! - [`tree`]: in-page B+tree node operations behind the adapter seam
//! - [`version`]: copy-on-write version coordination and snapshot reads
//! - [`record`] / [`ingest`]: log record encoding and CSV ingestion
//! - [`config`]: layout constants and pool defaults

#[macro_use]
mod macros;

pub mod config;
pub mod ingest;
pub mod record;
pub mod storage;
pub mod tree;
pub mod types;
pub mod version;

pub use record::LogRecord;
pub use storage::{BufferPool, DiskManager, LruReplacer, PageHeader, PagePool, PageRef};
pub use tree::{BTreeAdapter, SplitResult, TreeAdapter};
pub use types::{
    FrameId, Key, PageId, Value, Version, VersionInfo, INVALID_PAGE_ID, INVALID_VERSION,
};
pub use version::VersionManager;
