//! # Buffer Pool
//!
//! The sole gateway between upper layers and the disk manager. The pool
//! owns a fixed array of page frames for the process lifetime and hands
//! out pinned references; a page visible to a caller is never evicted,
//! and a dirty frame is always written back before its slot is reused.
//!
//! ## Structure
//!
//! ```text
//! BufferPool
//! ├── frames: [Frame; pool_size]      fixed buffers + pin/dirty metadata
//! ├── page_table: page_id → frame_id  pages currently resident
//! ├── free_list: frames holding no page (FIFO)
//! └── replacer: LRU over unpinned frames
//! ```
//!
//! Every frame is in exactly one of three states: on the free list,
//! mapped in the page table (and additionally in the replacer once its
//! pin count reaches zero), or mid-swap under the pool latch.
//!
//! ## Frame Lifecycle
//!
//! ```text
//!             new_page / fetch_page
//!   FREE  ─────────────────────────►  PINNED (pin > 0)
//!    ▲                                    │
//!    │                                    │ unpin (pin == 0)
//!    │                                    ▼
//!    │                                 UNPINNED-IN-LRU
//!    │ delete_page                        │
//!    │                                    │ victim() + write-back if dirty
//!    └──── reset, return to free list ◄───┘
//! ```
//!
//! ## Pin Guards
//!
//! [`fetch_page`](BufferPool::fetch_page) and
//! [`new_page`](BufferPool::new_page) return a [`PageRef`] guard that
//! keeps the frame pinned. Dropping the guard unpins; mutable access
//! through the guard marks the frame dirty. The dirty bit is sticky: it
//! is OR-ed in and only a flush clears it.
//!
//! ## Disk Transfer Rule
//!
//! Reads and writes always move the entire frame starting at the page
//! header, never the payload alone. The frame type only exposes the full
//! 4096-byte buffer, so a header-skipping transfer cannot be expressed.
//!
//! ## Locking
//!
//! One latch covers the page table and free list for the whole body of
//! every operation; nothing yields it mid-flight. Lock ordering is
//! pool latch → replacer latch → disk latch, never reversed. Pin counts
//! and dirty bits are atomics so pin guards can mark dirty without
//! re-entering the latch.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use eyre::{ensure, Result};
use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::{DEFAULT_POOL_SIZE, PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::storage::disk::DiskManager;
use crate::storage::page::PageHeader;
use crate::storage::replacer::LruReplacer;
use crate::types::{FrameId, PageId, INVALID_PAGE_ID};

/// One slot of the pool: a page-sized buffer plus out-of-band metadata.
/// The metadata is never persisted.
pub struct Frame {
    data: UnsafeCell<Box<[u8; PAGE_SIZE]>>,
    pin_count: AtomicU32,
    dirty: AtomicBool,
}

// SAFETY: Frame hands out references to its buffer only through the pool,
// which guarantees that a frame is either private to one thread (mid-swap
// under the pool latch) or pinned, in which case mutation is governed by
// the upper layer's copy-on-write discipline. The metadata is atomic.
unsafe impl Send for Frame {}
unsafe impl Sync for Frame {}

impl Frame {
    fn new() -> Self {
        Self {
            data: UnsafeCell::new(Box::new([0u8; PAGE_SIZE])),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn unpin(&self) -> u32 {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unpin called on unpinned frame");
        prev - 1
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// # Safety
    ///
    /// The caller must guarantee no concurrent mutable access: either the
    /// pool latch is held and the frame is unmapped, or the frame is
    /// pinned and the upper layer excludes writers.
    unsafe fn bytes(&self) -> &[u8; PAGE_SIZE] {
        &*self.data.get()
    }

    /// # Safety
    ///
    /// The caller must guarantee exclusive access: either the pool latch
    /// is held and the frame is unmapped, or the caller holds the only
    /// mutable pin guard for this frame.
    #[allow(clippy::mut_from_ref)]
    unsafe fn bytes_mut(&self) -> &mut [u8; PAGE_SIZE] {
        &mut *self.data.get()
    }

    /// Page ID recorded in the frame's header prefix. Only meaningful for
    /// frames that currently hold a page; called under the pool latch.
    fn header_page_id(&self) -> PageId {
        // SAFETY: a 4-byte read of the header prefix under the pool latch;
        // the frame is unpinned (victim) or mapped, never mid-swap.
        let bytes = unsafe { self.bytes() };
        PageId::from_le_bytes(bytes[..4].try_into().expect("slice is 4 bytes"))
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("pin_count", &self.pin_count())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// The capability set the pool exposes to upper layers. The version
/// manager talks to storage exclusively through this trait.
pub trait PagePool: Send + Sync {
    /// Pins the page, reading it from disk if absent. Returns `None` when
    /// every frame is pinned.
    fn fetch_page(&self, page_id: PageId) -> Result<Option<PageRef<'_>>>;

    /// Allocates a fresh page ID and pins a zeroed frame for it, already
    /// marked dirty so teardown persists at least the header. Returns
    /// `None` when every frame is pinned.
    fn new_page(&self) -> Result<Option<PageRef<'_>>>;

    /// Releases one pin, OR-ing `is_dirty` into the frame's dirty bit.
    /// Returns `false` if the page is not resident or not pinned.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool;

    /// Writes the page's full frame to disk and clears its dirty bit.
    /// Returns `false` if the page is not resident.
    fn flush_page(&self, page_id: PageId) -> Result<bool>;

    /// Writes every dirty resident page to disk; returns how many were
    /// written.
    fn flush_all(&self) -> Result<usize>;
}

/// A pinned page. The frame cannot be evicted while this guard lives;
/// dropping it releases the pin. Mutable access marks the frame dirty.
pub struct PageRef<'a> {
    pool: &'a dyn PagePool,
    frame: &'a Frame,
    page_id: PageId,
}

impl<'a> PageRef<'a> {
    pub(crate) fn new(pool: &'a dyn PagePool, frame: &'a Frame, page_id: PageId) -> Self {
        Self {
            pool,
            frame,
            page_id,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// The full frame, header included.
    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        // SAFETY: the frame is pinned while this guard exists, so the pool
        // will not evict or reset it. Concurrent mutation through another
        // pin is excluded by the copy-on-write discipline of the layer
        // that shares pages across threads.
        unsafe { self.frame.bytes() }
    }

    /// Mutable view of the full frame; marks the frame dirty.
    pub fn data_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        self.frame.mark_dirty();
        // SAFETY: `&mut self` makes this the only access through this
        // guard, and the pinning/CoW rules above exclude other writers.
        unsafe { self.frame.bytes_mut() }
    }

    /// The node payload after the page header.
    pub fn payload(&self) -> &[u8] {
        &self.data()[PAGE_HEADER_SIZE..]
    }

    /// Mutable node payload; marks the frame dirty.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data_mut()[PAGE_HEADER_SIZE..]
    }

    pub fn header(&self) -> &PageHeader {
        PageHeader::from_bytes(self.data()).expect("frame prefix holds a page header")
    }

    /// Mutable header view; marks the frame dirty.
    pub fn header_mut(&mut self) -> &mut PageHeader {
        PageHeader::from_bytes_mut(self.data_mut()).expect("frame prefix holds a page header")
    }

    /// Marks the frame dirty without touching the bytes.
    pub fn mark_dirty(&self) {
        self.frame.mark_dirty();
    }

    pub fn is_dirty(&self) -> bool {
        self.frame.is_dirty()
    }
}

impl Drop for PageRef<'_> {
    fn drop(&mut self) {
        // The dirty bit was set directly on the frame, so the unpin itself
        // carries no extra dirt.
        self.pool.unpin_page(self.page_id, false);
    }
}

impl fmt::Debug for PageRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRef")
            .field("page_id", &self.page_id)
            .field("pin_count", &self.frame.pin_count())
            .field("dirty", &self.frame.is_dirty())
            .finish()
    }
}

#[derive(Debug)]
struct PoolTables {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

pub struct BufferPool {
    disk: Arc<DiskManager>,
    frames: Box<[Frame]>,
    replacer: LruReplacer,
    tables: Mutex<PoolTables>,
}

impl BufferPool {
    pub fn new(pool_size: usize, disk: Arc<DiskManager>) -> Self {
        let frames: Box<[Frame]> = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list: VecDeque<FrameId> = (0..pool_size as FrameId).collect();

        Self {
            disk,
            frames,
            replacer: LruReplacer::new(pool_size),
            tables: Mutex::new(PoolTables {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
            }),
        }
    }

    pub fn with_default_size(disk: Arc<DiskManager>) -> Self {
        Self::new(DEFAULT_POOL_SIZE, disk)
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    /// Pin count of a resident page, or `None` if the page is not in the
    /// pool.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let tables = self.tables.lock();
        let fid = *tables.page_table.get(&page_id)?;
        Some(self.frames[fid as usize].pin_count())
    }

    /// Whether a resident page is dirty; `false` for absent pages.
    pub fn is_dirty(&self, page_id: PageId) -> bool {
        let tables = self.tables.lock();
        tables
            .page_table
            .get(&page_id)
            .map(|&fid| self.frames[fid as usize].is_dirty())
            .unwrap_or(false)
    }

    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<PageRef<'_>>> {
        ensure!(page_id >= 0, "cannot fetch invalid page id {}", page_id);

        let mut tables = self.tables.lock();

        if let Some(&fid) = tables.page_table.get(&page_id) {
            let frame = &self.frames[fid as usize];
            frame.pin();
            self.replacer.pin(fid);
            return Ok(Some(PageRef::new(self, frame, page_id)));
        }

        let Some(fid) = self.find_free_frame(&mut tables)? else {
            return Ok(None);
        };
        let frame = &self.frames[fid as usize];

        // SAFETY: the frame is unmapped and the pool latch is held, so no
        // other thread can reach it.
        let buf = unsafe { frame.bytes_mut() };
        buf.fill(0);
        if let Err(e) = self.disk.read_page(page_id, buf) {
            tables.free_list.push_back(fid);
            return Err(e);
        }
        PageHeader::from_bytes_mut(buf.as_mut_slice())
            .expect("frame prefix holds a page header")
            .set_page_id(page_id);

        frame.pin();
        frame.clear_dirty();
        tables.page_table.insert(page_id, fid);
        self.replacer.pin(fid);
        trace!(page_id, frame_id = fid, "fetched page from disk");

        Ok(Some(PageRef::new(self, frame, page_id)))
    }

    pub fn new_page(&self) -> Result<Option<PageRef<'_>>> {
        let mut tables = self.tables.lock();

        let Some(fid) = self.find_free_frame(&mut tables)? else {
            return Ok(None);
        };
        let frame = &self.frames[fid as usize];

        let page_id = match self.disk.allocate_page() {
            Ok(id) => id,
            Err(e) => {
                tables.free_list.push_back(fid);
                return Err(e);
            }
        };

        // SAFETY: the frame is unmapped and the pool latch is held.
        let buf = unsafe { frame.bytes_mut() };
        buf.fill(0);
        PageHeader::from_bytes_mut(buf.as_mut_slice())
            .expect("frame prefix holds a page header")
            .set_page_id(page_id);

        frame.pin();
        // New pages start dirty so teardown flushes at least the header.
        frame.mark_dirty();
        tables.page_table.insert(page_id, fid);
        self.replacer.pin(fid);
        trace!(page_id, frame_id = fid, "allocated new page");

        Ok(Some(PageRef::new(self, frame, page_id)))
    }

    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let tables = self.tables.lock();

        let Some(&fid) = tables.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[fid as usize];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.mark_dirty();
        }
        if frame.unpin() == 0 {
            self.replacer.unpin(fid);
        }
        true
    }

    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let tables = self.tables.lock();

        let Some(&fid) = tables.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[fid as usize];

        // SAFETY: the pool latch is held and pinned writers are excluded
        // by the upper layer while a flush is requested.
        let buf = unsafe { frame.bytes() };
        self.disk.write_page(page_id, buf)?;
        frame.clear_dirty();

        Ok(true)
    }

    pub fn flush_all(&self) -> Result<usize> {
        let tables = self.tables.lock();

        let mut flushed = 0;
        for (&page_id, &fid) in tables.page_table.iter() {
            let frame = &self.frames[fid as usize];
            if !frame.is_dirty() {
                continue;
            }
            // SAFETY: as in flush_page.
            let buf = unsafe { frame.bytes() };
            self.disk.write_page(page_id, buf)?;
            frame.clear_dirty();
            flushed += 1;
        }

        if flushed > 0 {
            debug!(flushed, "flushed dirty pages");
        }
        Ok(flushed)
    }

    /// Drops a page from the pool, returning its frame to the free list.
    /// Absent pages succeed as a no-op; pinned pages refuse. The on-disk
    /// bytes are left as-is, so a deleted ID must not be fetched again
    /// before being rewritten.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut tables = self.tables.lock();

        let Some(&fid) = tables.page_table.get(&page_id) else {
            return true;
        };
        let frame = &self.frames[fid as usize];
        if frame.pin_count() > 0 {
            return false;
        }

        self.replacer.pin(fid);
        tables.page_table.remove(&page_id);

        // SAFETY: the frame is now unmapped, unpinned, and the latch is
        // held.
        let buf = unsafe { frame.bytes_mut() };
        buf.fill(0);
        PageHeader::from_bytes_mut(buf.as_mut_slice())
            .expect("frame prefix holds a page header")
            .set_page_id(INVALID_PAGE_ID);
        frame.clear_dirty();

        tables.free_list.push_back(fid);
        debug!(page_id, frame_id = fid, "deleted page from pool");
        true
    }

    /// Pops a frame from the free list, or evicts the LRU victim after
    /// writing it back if dirty. `None` means every frame is pinned.
    fn find_free_frame(&self, tables: &mut PoolTables) -> Result<Option<FrameId>> {
        if let Some(fid) = tables.free_list.pop_front() {
            return Ok(Some(fid));
        }

        let Some(fid) = self.replacer.victim() else {
            return Ok(None);
        };
        let frame = &self.frames[fid as usize];
        let old_page_id = frame.header_page_id();

        if frame.is_dirty() {
            // SAFETY: victims have pin_count == 0 and the latch is held.
            let buf = unsafe { frame.bytes() };
            if let Err(e) = self.disk.write_page(old_page_id, buf) {
                // Leave the frame dirty and evictable so a retry or
                // teardown tries again.
                self.replacer.unpin(fid);
                return Err(e);
            }
            frame.clear_dirty();
            trace!(page_id = old_page_id, frame_id = fid, "flushed dirty victim");
        }

        if old_page_id != INVALID_PAGE_ID {
            tables.page_table.remove(&old_page_id);
        }
        Ok(Some(fid))
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            warn!(error = %e, "flush failed during pool teardown");
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("BufferPool")
            .field("pool_size", &self.frames.len())
            .field("resident", &tables.page_table.len())
            .field("free", &tables.free_list.len())
            .field("evictable", &self.replacer.size())
            .finish()
    }
}

impl PagePool for BufferPool {
    fn fetch_page(&self, page_id: PageId) -> Result<Option<PageRef<'_>>> {
        BufferPool::fetch_page(self, page_id)
    }

    fn new_page(&self) -> Result<Option<PageRef<'_>>> {
        BufferPool::new_page(self)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        BufferPool::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        BufferPool::flush_page(self, page_id)
    }

    fn flush_all(&self) -> Result<usize> {
        BufferPool::flush_all(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_pool(pool_size: usize) -> (tempfile::TempDir, BufferPool) {
        let dir = tempdir().unwrap();
        let disk = Arc::new(DiskManager::open(dir.path().join("pool.db")).unwrap());
        (dir, BufferPool::new(pool_size, disk))
    }

    #[test]
    fn new_page_hands_out_sequential_ids() {
        let (_dir, pool) = open_pool(4);

        let p0 = pool.new_page().unwrap().unwrap();
        let p1 = pool.new_page().unwrap().unwrap();

        assert_eq!(p0.page_id(), 0);
        assert_eq!(p1.page_id(), 1);
    }

    #[test]
    fn new_page_starts_pinned_and_dirty() {
        let (_dir, pool) = open_pool(4);

        let page = pool.new_page().unwrap().unwrap();

        assert_eq!(pool.pin_count(page.page_id()), Some(1));
        assert!(page.is_dirty());
    }

    #[test]
    fn guard_drop_releases_the_pin() {
        let (_dir, pool) = open_pool(4);

        let page = pool.new_page().unwrap().unwrap();
        let id = page.page_id();
        drop(page);

        assert_eq!(pool.pin_count(id), Some(0));
    }

    #[test]
    fn fetch_of_resident_page_shares_the_frame() {
        let (_dir, pool) = open_pool(4);

        let mut page = pool.new_page().unwrap().unwrap();
        let id = page.page_id();
        page.payload_mut()[0] = 0x5A;

        let again = pool.fetch_page(id).unwrap().unwrap();
        assert_eq!(pool.pin_count(id), Some(2));
        assert_eq!(again.payload()[0], 0x5A);
    }

    #[test]
    fn unpin_page_is_false_for_absent_or_unpinned_pages() {
        let (_dir, pool) = open_pool(4);

        assert!(!pool.unpin_page(99, false));

        let page = pool.new_page().unwrap().unwrap();
        let id = page.page_id();
        drop(page);

        assert!(!pool.unpin_page(id, false));
    }

    #[test]
    fn dirty_bit_is_sticky_across_unpins() {
        let (_dir, pool) = open_pool(4);

        let page = pool.new_page().unwrap().unwrap();
        let id = page.page_id();
        drop(page);
        pool.flush_page(id).unwrap();
        assert!(!pool.is_dirty(id));

        let page = pool.fetch_page(id).unwrap().unwrap();
        page.mark_dirty();
        drop(page);
        assert!(pool.is_dirty(id));

        // A clean unpin must not clear the bit.
        let page = pool.fetch_page(id).unwrap().unwrap();
        drop(page);
        assert!(pool.is_dirty(id));
    }

    #[test]
    fn pool_returns_none_when_all_frames_pinned() {
        let (_dir, pool) = open_pool(3);

        let _a = pool.new_page().unwrap().unwrap();
        let _b = pool.new_page().unwrap().unwrap();
        let _c = pool.new_page().unwrap().unwrap();

        assert!(pool.new_page().unwrap().is_none());
        assert!(pool.fetch_page(999).unwrap().is_none());
    }

    #[test]
    fn unpinning_one_frame_unblocks_allocation() {
        let (_dir, pool) = open_pool(2);

        let a = pool.new_page().unwrap().unwrap();
        let _b = pool.new_page().unwrap().unwrap();
        assert!(pool.new_page().unwrap().is_none());

        drop(a);
        assert!(pool.new_page().unwrap().is_some());
    }

    #[test]
    fn eviction_writes_dirty_page_back() {
        let (_dir, pool) = open_pool(1);

        let mut page = pool.new_page().unwrap().unwrap();
        let id = page.page_id();
        page.payload_mut()[..4].copy_from_slice(b"data");
        drop(page);

        // Evict page `id` by allocating into the only frame.
        let flushes_before = pool.disk().num_flushes();
        let other = pool.new_page().unwrap().unwrap();
        assert_ne!(other.page_id(), id);
        drop(other);
        assert!(pool.disk().num_flushes() > flushes_before);

        let back = pool.fetch_page(id).unwrap().unwrap();
        assert_eq!(&back.payload()[..4], b"data");
    }

    #[test]
    fn delete_page_refuses_while_pinned() {
        let (_dir, pool) = open_pool(4);

        let page = pool.new_page().unwrap().unwrap();
        let id = page.page_id();

        assert!(!pool.delete_page(id));
        drop(page);
        assert!(pool.delete_page(id));
    }

    #[test]
    fn delete_page_of_absent_page_is_a_no_op() {
        let (_dir, pool) = open_pool(4);
        assert!(pool.delete_page(123));
    }

    #[test]
    fn deleted_frame_is_reusable() {
        let (_dir, pool) = open_pool(1);

        let page = pool.new_page().unwrap().unwrap();
        let id = page.page_id();
        drop(page);
        assert!(pool.delete_page(id));

        // The single frame must be free again.
        let next = pool.new_page().unwrap().unwrap();
        assert_eq!(pool.pin_count(next.page_id()), Some(1));
    }

    #[test]
    fn flush_all_clears_every_dirty_bit() {
        let (_dir, pool) = open_pool(8);

        let mut ids = Vec::new();
        for _ in 0..5 {
            let page = pool.new_page().unwrap().unwrap();
            ids.push(page.page_id());
        }

        let flushed = pool.flush_all().unwrap();
        assert_eq!(flushed, 5);
        for id in ids {
            assert!(!pool.is_dirty(id));
        }
    }

    #[test]
    fn header_carries_the_page_id_after_fetch() {
        let (_dir, pool) = open_pool(2);

        let page = pool.new_page().unwrap().unwrap();
        let id = page.page_id();
        drop(page);
        pool.flush_page(id).unwrap();

        // Force out, then back in.
        let _filler = pool.new_page().unwrap().unwrap();
        let other = pool.new_page().unwrap().unwrap();
        drop(other);

        let back = pool.fetch_page(id).unwrap().unwrap();
        assert_eq!(back.header().page_id(), id);
    }
}
