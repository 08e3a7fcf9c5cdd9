//! # Disk Manager
//!
//! A page-addressed block device over a single file. Page `i` occupies the
//! byte range `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)`; there is no
//! superblock and no magic bytes.
//!
//! ## Contract
//!
//! - Reads never fail for "page not yet written": a read at or past EOF
//!   yields an all-zero page, and a short read is zero-filled to the page
//!   boundary. The file's high-water mark moves only on writes.
//! - Writes transfer exactly one whole page and count toward
//!   [`DiskManager::num_flushes`]; a short write is an error.
//! - Page IDs allocate monotonically from 0 and are never reused. The
//!   allocator does not extend the file; extension happens implicitly on
//!   the first write at that offset.
//! - `next_page_id` is not persisted. Reopening a file restarts the
//!   counter at 0; the layer above is responsible for not re-allocating
//!   IDs that still hold live data.
//!
//! ## Concurrency
//!
//! One mutex covers the file handle, the allocation counter, and the
//! flush counter. The buffer pool acquires this latch last in the
//! pool → replacer → disk ordering.
//!
//! ## Open Retries
//!
//! Opening tolerates a brief window of transient OS-level locks on the
//! backing file (antivirus scans, a previous handle mid-close) by
//! retrying up to [`OPEN_RETRY_LIMIT`] times with a fixed delay.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{bail, ensure, Result, WrapErr};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{OPEN_RETRY_DELAY_MS, OPEN_RETRY_LIMIT, PAGE_SIZE};
use crate::types::PageId;

#[derive(Debug)]
struct DiskIo {
    file: File,
    next_page_id: PageId,
    num_flushes: u64,
}

#[derive(Debug)]
pub struct DiskManager {
    io: Mutex<DiskIo>,
    path: PathBuf,
}

impl DiskManager {
    /// Opens (creating if absent) the backing file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_with_retries(&path)?;

        Ok(Self {
            io: Mutex::new(DiskIo {
                file,
                next_page_id: 0,
                num_flushes: 0,
            }),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole page into `buf`. Offsets at or past EOF yield a
    /// zero page; a short read zero-fills the tail.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        ensure!(page_id >= 0, "cannot read invalid page id {}", page_id);
        let offset = page_id as u64 * PAGE_SIZE as u64;

        let mut io = self.io.lock();

        let file_len = io
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?
            .len();
        if offset >= file_len {
            buf.fill(0);
            return Ok(());
        }

        io.file
            .seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek to page {}", page_id))?;

        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = io
                .file
                .read(&mut buf[filled..])
                .wrap_err_with(|| format!("failed to read page {}", page_id))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled < PAGE_SIZE {
            buf[filled..].fill(0);
        }

        Ok(())
    }

    /// Writes the whole page and flushes it to the OS. Each successful
    /// call increments the flush counter.
    pub fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        ensure!(page_id >= 0, "cannot write invalid page id {}", page_id);
        let offset = page_id as u64 * PAGE_SIZE as u64;

        let mut io = self.io.lock();

        io.file
            .seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek to page {}", page_id))?;
        io.file
            .write_all(buf)
            .wrap_err_with(|| format!("failed to write page {}", page_id))?;
        io.file
            .flush()
            .wrap_err_with(|| format!("failed to flush page {}", page_id))?;

        io.num_flushes += 1;
        Ok(())
    }

    /// Returns the next page ID and advances the counter. The file is not
    /// extended until the page is first written.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut io = self.io.lock();

        let page_id = io.next_page_id;
        let Some(next) = io.next_page_id.checked_add(1) else {
            bail!("page id space exhausted at {}", io.next_page_id);
        };
        io.next_page_id = next;

        Ok(page_id)
    }

    /// Number of successful `write_page` calls since open.
    pub fn num_flushes(&self) -> u64 {
        self.io.lock().num_flushes
    }

    /// Highest page ID handed out so far, plus one.
    pub fn allocated_pages(&self) -> PageId {
        self.io.lock().next_page_id
    }
}

fn open_with_retries(path: &Path) -> Result<File> {
    let mut attempts = 0;
    loop {
        match OpenOptions::new().read(true).write(true).create(true).open(path) {
            Ok(file) => {
                debug!(path = %path.display(), "opened backing file");
                return Ok(file);
            }
            Err(e) if attempts < OPEN_RETRY_LIMIT => {
                attempts += 1;
                warn!(
                    path = %path.display(),
                    attempt = attempts,
                    error = %e,
                    "open failed, retrying"
                );
                std::thread::sleep(Duration::from_millis(OPEN_RETRY_DELAY_MS));
            }
            Err(e) => {
                return Err(e).wrap_err_with(|| {
                    format!(
                        "failed to open backing file '{}' after {} retries",
                        path.display(),
                        OPEN_RETRY_LIMIT
                    )
                });
            }
        }
    }
}
