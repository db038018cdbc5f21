// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! `TempStore`: the only surface other components use.
//!
//! Keeps the metadata index and the blob directory consistent without a
//! shared transaction, using a fixed ordering:
//!
//! ```text
//! create : index row ──→ blob       (crash in between → dangling row)
//! remove : blob      ──→ index row  (crash in between → dangling row)
//! read   : index row + blob must both exist, else "not found"
//! ```
//!
//! A dangling row is never served and is cleaned up by the next `remove` or
//! GC pass. Orphan blobs (no row) can only come from writers racing a removal
//! of their own handle; `reconcile` deletes them.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::storage::blob::BlobStore;
use crate::storage::handle::FileHandle;
use crate::storage::index::{Entry, MetadataIndex, WILDCARD_MIME};

pub const INDEX_FILE: &str = "tempstorage.db";

/// What `stat` reports for a live handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStat {
    pub display_name: Option<String>,
    pub mime_type: String,
    pub size: u64,
}

/// Outcome of a [`TempStore::reconcile`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Blob files without an index row, deleted by this pass.
    pub orphan_blobs_removed: usize,
    /// Index rows without a blob. Left in place for `remove` / GC.
    pub dangling_rows: usize,
}

pub struct TempStore {
    base_path: PathBuf,
    index: MetadataIndex,
    blobs: BlobStore,
}

impl TempStore {
    /// Open (or create) a store rooted at `base_path`.
    pub fn open(base_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_path)?;
        let index = MetadataIndex::open(&base_path.join(INDEX_FILE))?;
        let blobs = BlobStore::open(base_path)?;
        info!(base_path = ?base_path, "Temporary store opened");
        Ok(Self {
            base_path: base_path.to_path_buf(),
            index,
            blobs,
        })
    }

    /// Create an empty file and return its handle.
    ///
    /// A missing or empty `mime_type` is recorded as `*/*`.
    pub fn create(&self, display_name: Option<&str>, mime_type: Option<&str>) -> Result<FileHandle> {
        self.create_at(display_name, mime_type, Utc::now())
    }

    /// Like [`create`](Self::create) with an explicit creation time.
    pub fn create_at(
        &self,
        display_name: Option<&str>,
        mime_type: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<FileHandle> {
        let mime = mime_type.filter(|m| !m.is_empty()).unwrap_or(WILDCARD_MIME);

        let handle = self
            .index
            .insert(display_name, mime, created_at)
            .map_err(|e| StoreError::CreationFailed(e.to_string()))?;

        if let Err(e) = self.blobs.materialize(handle) {
            // The row is unreachable either way; GC reclaims it if this fails.
            if let Err(undo) = self.index.delete(handle) {
                warn!(handle = %handle, error = %undo, "Failed to roll back index row");
            }
            return Err(StoreError::CreationFailed(e.to_string()));
        }

        debug!(handle = %handle, name = ?display_name, mime, "File created");
        Ok(handle)
    }

    /// Name, mime type and size of a live handle.
    pub fn stat(&self, handle: FileHandle) -> Result<Option<FileStat>> {
        let Some(entry) = self.index.lookup(handle)? else {
            return Ok(None);
        };
        match self.blobs.size_of(handle)? {
            Some(size) => Ok(Some(FileStat {
                display_name: entry.display_name,
                mime_type: entry.mime_type,
                size,
            })),
            None => {
                warn!(handle = %handle, "Index row without blob, treating as not found");
                Ok(None)
            }
        }
    }

    /// Mime type of `handle`, or `*/*` if it does not resolve.
    pub fn mime_type(&self, handle: FileHandle) -> Result<String> {
        Ok(self
            .stat(handle)?
            .map(|s| s.mime_type)
            .unwrap_or_else(|| WILDCARD_MIME.to_string()))
    }

    pub fn open_for_read(&self, handle: FileHandle) -> Result<Option<File>> {
        if self.index.lookup(handle)?.is_none() {
            return Ok(None);
        }
        let file = self.blobs.open_for_read(handle)?;
        if file.is_none() {
            warn!(handle = %handle, "Index row without blob, treating as not found");
        }
        Ok(file)
    }

    /// Open the blob of a live handle for writing, truncating it.
    ///
    /// Fails with `NotFound` when the handle has no row, so a write can never
    /// leave a blob the index does not know about.
    pub fn open_for_write(&self, handle: FileHandle) -> Result<File> {
        if self.index.lookup(handle)?.is_none() {
            return Err(StoreError::NotFound(handle.to_string()));
        }
        self.blobs.open_for_write(handle)
    }

    /// Entries are immutable; delete and recreate instead.
    pub fn update(&self, _handle: FileHandle) -> Result<()> {
        Err(StoreError::UnsupportedOperation("update"))
    }

    /// Remove `handle`. Returns `true` if it was live.
    pub fn remove(&self, handle: FileHandle) -> Result<bool> {
        let had_blob = self.blobs.destroy(handle)?;
        let had_row = self.index.delete(handle)?;
        if had_blob != had_row {
            warn!(handle = %handle, had_blob, had_row, "Removed inconsistent entry");
        }
        debug!(handle = %handle, removed = had_row, "File removed");
        Ok(had_row)
    }

    /// Remove every entry `predicate` accepts; returns how many were removed.
    ///
    /// Each entry is removed blob-then-row on its own. A failure stops the
    /// batch; entries already removed stay removed.
    pub fn remove_matching<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&Entry) -> bool,
    {
        let mut removed = 0;
        for entry in self.index.entries()?.iter().filter(|e| predicate(e)) {
            if self.remove(entry.handle)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every entry created strictly before `now - ttl`.
    ///
    /// The index lock is held only while selecting and while deleting each
    /// row, never across blob deletion. An entry that cannot be removed is
    /// logged and skipped, and is retried by the next pass; the returned count
    /// covers only entries actually removed.
    pub fn collect_garbage(&self, now: DateTime<Utc>, ttl: Duration) -> Result<usize> {
        let Some(threshold) = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
        else {
            return Ok(0);
        };

        let mut removed = 0;
        let mut failed = 0;
        for handle in self.index.select_older_than(threshold)? {
            match self.remove(handle) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    // Left for the next pass; the rest of the batch goes on.
                    warn!(handle = %handle, error = %e, "Failed to collect expired file");
                    failed += 1;
                }
            }
        }

        if removed > 0 || failed > 0 {
            info!(removed, failed, threshold = %threshold, "Expired files collected");
        }
        Ok(removed)
    }

    /// [`collect_garbage`](Self::collect_garbage) against the current time.
    pub fn cleanup(&self, ttl: Duration) -> Result<usize> {
        self.collect_garbage(Utc::now(), ttl)
    }

    /// Delete blobs that have no index row and count rows that have no blob.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for handle in self.blobs.handles()? {
            if self.index.lookup(handle)?.is_none() && self.blobs.destroy(handle)? {
                warn!(handle = %handle, "Deleted orphan blob");
                report.orphan_blobs_removed += 1;
            }
        }

        for entry in self.index.entries()? {
            if self.blobs.size_of(entry.handle)?.is_none() {
                report.dangling_rows += 1;
            }
        }

        if report != ReconcileReport::default() {
            info!(
                orphan_blobs_removed = report.orphan_blobs_removed,
                dangling_rows = report.dangling_rows,
                "Store reconciled"
            );
        }
        Ok(report)
    }

    /// All live index entries, oldest handle first.
    pub fn list(&self) -> Result<Vec<Entry>> {
        self.index.entries()
    }

    /// Number of index entries.
    pub fn len(&self) -> Result<usize> {
        self.index.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.index.is_empty()
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
