//! # Version Manager
//!
//! Coordinates copy-on-write updates over the index. A logical insert
//! under an in-progress version shadows every node on the path from the
//! root to the affected leaf; pages reachable from committed versions are
//! never written to, so every committed snapshot stays readable forever.
//!
//! ## Copy-on-Write Traversal
//!
//! ```text
//!   base version 3                 version 4 (in progress)
//!
//!        [R]                            [R']      ← shadow of R
//!       /   \                          /   \
//!     [A]   [B]         insert k     [A]   [B']   ← shadow of B
//!           / \          ─────►            / \
//!         [C] [D]                        [C] [D'] ← shadow of D, holds k
//! ```
//!
//! `R'`, `B'`, and `D'` are freshly allocated pages; `A` and `C` are
//! shared with version 3 untouched. Splits allocate one more page per
//! overflowing level and bubble their promoted key upward; if the root
//! itself splits, a new root is allocated and the tree grows one level.
//!
//! ## Lifecycle
//!
//! ```text
//! create_version() ──> in progress ──> commit_version() ──> committed
//!                          │                                    │
//!                          └──> abort_version()                 └──> snapshot
//!                                 (shadow pages leaked,              readable via
//!                                  no committed reference)           lookup/scan
//! ```
//!
//! A commit is atomic at the root-publish step: the version either
//! appears in the committed sequence with its new root or it does not
//! exist. An aborted or failed update leaks its shadow page IDs on disk
//! (page IDs are monotonic and never reclaimed), but no committed version
//! references them.
//!
//! ## Repeated Updates in One Version
//!
//! The second and later updates of an in-progress version start from the
//! version's own staged root rather than the base version, so a version
//! accumulates all of its updates into one tree.
//!
//! ## Pin Discipline
//!
//! Base pages are held pinned for the duration of the descent (parent
//! context lives only on the traversal stack) and released clean; shadow
//! pages are released dirty. Pin guards release automatically when an
//! update unwinds with an error, so a failed update leaves the pool
//! consistent and the committed version set unchanged.

use std::sync::Arc;
use std::time::SystemTime;

use eyre::{bail, ensure, eyre, Result};
use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::storage::{stamp_header, PagePool, PageRef};
use crate::tree::{split_and_insert_interior, split_and_insert_leaf, TreeAdapter};
use crate::types::{Key, PageId, Value, Version, VersionInfo, INVALID_PAGE_ID, INVALID_VERSION};

type ShadowList = SmallVec<[PageId; 16]>;

#[derive(Debug)]
struct PendingVersion {
    base: Version,
    staged_root: PageId,
    shadow_pages: ShadowList,
}

#[derive(Debug)]
struct VersionTable {
    next_version: Version,
    committed: Vec<VersionInfo>,
    pending: HashMap<Version, PendingVersion>,
}

/// What one level of the copy-on-write descent hands to its parent: the
/// node's replacement page, plus a promoted separator if it split.
struct CowStep {
    page_id: PageId,
    split: Option<(Key, PageId)>,
}

pub struct VersionManager {
    pool: Arc<dyn PagePool>,
    adapter: Box<dyn TreeAdapter>,
    table: Mutex<VersionTable>,
}

impl VersionManager {
    pub fn new(pool: Arc<dyn PagePool>, adapter: Box<dyn TreeAdapter>) -> Self {
        Self {
            pool,
            adapter,
            table: Mutex::new(VersionTable {
                next_version: 1,
                committed: Vec::new(),
                pending: HashMap::new(),
            }),
        }
    }

    /// Starts a new in-progress version and returns its ID.
    pub fn create_version(&self) -> Version {
        let mut table = self.table.lock();
        let version = table.next_version;
        table.next_version += 1;
        table.pending.insert(
            version,
            PendingVersion {
                base: INVALID_VERSION,
                staged_root: INVALID_PAGE_ID,
                shadow_pages: ShadowList::new(),
            },
        );
        trace!(version, "created version");
        version
    }

    /// Applies one logical insert under `version`, reading from
    /// `base_version`'s snapshot (or this version's own staged tree once
    /// it has one). No page visible to a committed version is modified.
    pub fn apply_update(
        &self,
        version: Version,
        base_version: Version,
        key: Key,
        value: &Value,
    ) -> Result<()> {
        let start_root = {
            let table = self.table.lock();
            let pending = table
                .pending
                .get(&version)
                .ok_or_else(|| eyre!("version {} is not in progress", version))?;
            if pending.staged_root != INVALID_PAGE_ID {
                pending.staged_root
            } else if base_version == INVALID_VERSION {
                INVALID_PAGE_ID
            } else {
                let root = committed_root(&table, base_version);
                ensure!(
                    root != INVALID_PAGE_ID || committed_exists(&table, base_version),
                    "base version {} is not committed",
                    base_version
                );
                root
            }
        };

        let mut shadows = ShadowList::new();
        let new_root = if start_root == INVALID_PAGE_ID {
            self.first_leaf(version, key, value, &mut shadows)?
        } else {
            let step = self.cow_descend(version, start_root, key, value, &mut shadows)?;
            match step.split {
                None => step.page_id,
                Some((promoted, sibling)) => {
                    let mut root = need_frame(self.pool.new_page()?)?;
                    let root_id = root.page_id();
                    self.adapter
                        .create_new_root(root.data_mut(), step.page_id, sibling, promoted)?;
                    root.header_mut().set_creation_version(version);
                    shadows.push(root_id);
                    trace!(version, root_id, "root split, tree grew one level");
                    root_id
                }
            }
        };

        let mut table = self.table.lock();
        let pending = table
            .pending
            .get_mut(&version)
            .ok_or_else(|| eyre!("version {} was aborted mid-update", version))?;
        pending.base = base_version;
        pending.staged_root = new_root;
        pending.shadow_pages.extend(shadows);
        Ok(())
    }

    /// Publishes the version's staged root, making the snapshot visible
    /// to readers. A version with no staged updates commits as an alias
    /// of its base snapshot. Returns `false` for unknown versions.
    pub fn commit_version(&self, version: Version) -> bool {
        let mut table = self.table.lock();
        let Some(pending) = table.pending.remove(&version) else {
            warn!(version, "commit of a version that is not in progress");
            return false;
        };

        let root_page_id = if pending.staged_root != INVALID_PAGE_ID {
            pending.staged_root
        } else {
            committed_root(&table, pending.base)
        };

        table.committed.push(VersionInfo {
            version,
            root_page_id,
            committed_at: SystemTime::now(),
        });
        debug!(
            version,
            root_page_id,
            shadow_pages = pending.shadow_pages.len(),
            "committed version"
        );
        true
    }

    /// Discards an in-progress version. Its shadow pages stay allocated
    /// on disk but nothing references them.
    pub fn abort_version(&self, version: Version) {
        let mut table = self.table.lock();
        if let Some(pending) = table.pending.remove(&version) {
            debug!(
                version,
                leaked_pages = pending.shadow_pages.len(),
                "aborted version"
            );
        }
    }

    /// Root page of a committed version, or `None` if no such version
    /// was committed.
    pub fn root_for_version(&self, version: Version) -> Option<PageId> {
        let table = self.table.lock();
        table
            .committed
            .iter()
            .rev()
            .find(|info| info.version == version)
            .map(|info| info.root_page_id)
    }

    /// The most recently committed version.
    pub fn latest_version(&self) -> Option<Version> {
        self.table.lock().committed.last().map(|info| info.version)
    }

    /// The committed versions in commit order.
    pub fn versions(&self) -> Vec<VersionInfo> {
        self.table.lock().committed.clone()
    }

    /// Point read against a committed snapshot.
    pub fn lookup(&self, version: Version, key: Key) -> Result<Option<Value>> {
        let Some(root) = self.root_for_version(version) else {
            bail!("version {} is not committed", version);
        };
        if root == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut page_id = root;
        loop {
            let page = need_frame(self.pool.fetch_page(page_id)?)?;
            if self.adapter.is_leaf(page.data())? {
                return self.adapter.leaf_lookup(page.data(), key);
            }
            page_id = self.adapter.find_child(page.data(), key)?;
        }
    }

    /// Range read against a committed snapshot: up to `limit` entries
    /// with keys `>= start_key`, in key order.
    ///
    /// Leaf sibling pointers are never followed here. Path-copying only
    /// shadows the root-to-leaf path, so the left neighbor of a shadowed
    /// leaf keeps pointing at the pre-shadow page; the chain is stale the
    /// moment a later version rewrites any leaf. Each leaf is reached by
    /// a fresh descent from the version root instead, resuming at the
    /// smallest separator to the right of the previous descent path.
    pub fn scan_from(
        &self,
        version: Version,
        start_key: Key,
        limit: usize,
    ) -> Result<Vec<(Key, Value)>> {
        let Some(root) = self.root_for_version(version) else {
            bail!("version {} is not committed", version);
        };
        let mut out = Vec::new();
        if root == INVALID_PAGE_ID || limit == 0 {
            return Ok(out);
        }

        let mut cursor = start_key;
        loop {
            // Descend to the leaf covering `cursor`. Every separator
            // strictly above the cursor lower-bounds the keys right of
            // the path; deeper levels tighten the bound.
            let mut page_id = root;
            let mut right_bound: Option<Key> = None;
            let entries = loop {
                let page = need_frame(self.pool.fetch_page(page_id)?)?;
                if self.adapter.is_leaf(page.data())? {
                    break self.adapter.leaf_entries(page.data())?;
                }
                if let Some(sep) = self.adapter.next_separator(page.data(), cursor)? {
                    right_bound = Some(sep);
                }
                page_id = self.adapter.find_child(page.data(), cursor)?;
            };

            for (key, value) in entries {
                if key >= cursor {
                    out.push((key, value));
                    if out.len() == limit {
                        return Ok(out);
                    }
                }
            }

            // Everything below the bound lived in this leaf. Without a
            // bound this was the rightmost leaf and the scan is done.
            match right_bound {
                Some(next) => cursor = next,
                None => return Ok(out),
            }
        }
    }

    /// Builds the first leaf of a previously empty tree.
    fn first_leaf(
        &self,
        version: Version,
        key: Key,
        value: &Value,
        shadows: &mut ShadowList,
    ) -> Result<PageId> {
        let mut leaf = need_frame(self.pool.new_page()?)?;
        let leaf_id = leaf.page_id();

        self.adapter.init_leaf(leaf.data_mut())?;
        leaf.header_mut().set_creation_version(version);
        let inserted = self.adapter.apply_update_to_leaf(leaf.data_mut(), key, value)?;
        ensure!(inserted, "freshly initialized leaf rejected an insert");
        self.adapter.update_statistics(leaf.data_mut())?;

        shadows.push(leaf_id);
        trace!(version, leaf_id, "created first leaf");
        Ok(leaf_id)
    }

    /// One level of the recursive copy-on-write descent. Fetches the base
    /// page, recurses into the child that owns `key`, then shadows this
    /// node so the child's replacement (and any promoted separator) can
    /// be wired in without touching the base page.
    fn cow_descend(
        &self,
        version: Version,
        page_id: PageId,
        key: Key,
        value: &Value,
        shadows: &mut ShadowList,
    ) -> Result<CowStep> {
        let base = need_frame(self.pool.fetch_page(page_id)?)?;

        if self.adapter.is_leaf(base.data())? {
            let mut shadow = self.shadow_of(version, &base, shadows)?;
            drop(base);

            if self.adapter.apply_update_to_leaf(shadow.data_mut(), key, value)? {
                self.adapter.update_statistics(shadow.data_mut())?;
                return Ok(CowStep {
                    page_id: shadow.page_id(),
                    split: None,
                });
            }

            let mut sibling = need_frame(self.pool.new_page()?)?;
            sibling.header_mut().set_creation_version(version);
            shadows.push(sibling.page_id());
            let split = split_and_insert_leaf(
                self.adapter.as_ref(),
                shadow.data_mut(),
                sibling.data_mut(),
                key,
                value,
            )?;
            return Ok(CowStep {
                page_id: split.left,
                split: Some((split.promoted_key, split.right)),
            });
        }

        let child = self.adapter.find_child(base.data(), key)?;
        let step = self.cow_descend(version, child, key, value, shadows)?;

        let mut shadow = self.shadow_of(version, &base, shadows)?;
        drop(base);

        let rewired =
            self.adapter
                .update_child_pointer(shadow.data_mut(), child, step.page_id)?;
        ensure!(
            rewired,
            "child {} missing from its parent during copy-on-write",
            child
        );

        if let Some((promoted, sibling_id)) = step.split {
            if !self
                .adapter
                .insert_into_interior(shadow.data_mut(), promoted, sibling_id)?
            {
                let mut sibling = need_frame(self.pool.new_page()?)?;
                sibling.header_mut().set_creation_version(version);
                shadows.push(sibling.page_id());
                let split = split_and_insert_interior(
                    self.adapter.as_ref(),
                    shadow.data_mut(),
                    sibling.data_mut(),
                    promoted,
                    sibling_id,
                )?;
                return Ok(CowStep {
                    page_id: split.left,
                    split: Some((split.promoted_key, split.right)),
                });
            }
        }

        self.adapter.update_statistics(shadow.data_mut())?;
        Ok(CowStep {
            page_id: shadow.page_id(),
            split: None,
        })
    }

    /// Allocates a shadow page carrying a byte-for-byte copy of `base`,
    /// restamped with its own page ID and this version.
    fn shadow_of<'p>(
        &'p self,
        version: Version,
        base: &PageRef<'_>,
        shadows: &mut ShadowList,
    ) -> Result<PageRef<'p>> {
        let mut shadow = need_frame(self.pool.new_page()?)?;
        let shadow_id = shadow.page_id();

        shadow.data_mut().copy_from_slice(base.data());
        stamp_header(shadow.data_mut(), shadow_id, version)?;

        shadows.push(shadow_id);
        trace!(base = base.page_id(), shadow = shadow_id, "shadowed page");
        Ok(shadow)
    }
}

impl std::fmt::Debug for VersionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.lock();
        f.debug_struct("VersionManager")
            .field("next_version", &table.next_version)
            .field("committed", &table.committed.len())
            .field("pending", &table.pending.len())
            .finish()
    }
}

fn need_frame<T>(page: Option<T>) -> Result<T> {
    page.ok_or_else(|| eyre!("buffer pool exhausted: every frame is pinned"))
}

fn committed_root(table: &VersionTable, version: Version) -> PageId {
    table
        .committed
        .iter()
        .rev()
        .find(|info| info.version == version)
        .map(|info| info.root_page_id)
        .unwrap_or(INVALID_PAGE_ID)
}

fn committed_exists(table: &VersionTable, version: Version) -> bool {
    table.committed.iter().any(|info| info.version == version)
}
