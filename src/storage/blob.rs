// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Blob store: one plain file per handle under `base_path/temp/`.
//!
//! ```text
//! base_path/
//!   temp/
//!     1
//!     2
//!     …
//! ```
//!
//! The file name is the handle id and nothing else, so the location of a blob
//! can be derived from its handle without consulting the index. There is no
//! lock here: callers working on different handles never touch the same file.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::storage::handle::FileHandle;

pub const BLOB_DIR: &str = "temp";

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open the blob directory under `base_path`, creating it if needed.
    pub fn open(base_path: &Path) -> Result<Self> {
        let root = base_path.join(BLOB_DIR);
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Where the blob for `handle` lives.
    pub fn location(&self, handle: FileHandle) -> PathBuf {
        self.root.join(handle.to_string())
    }

    /// Create an empty blob for `handle`, truncating any leftover file.
    pub fn materialize(&self, handle: FileHandle) -> Result<()> {
        let path = self.location(handle);
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!(handle = %handle, path = ?path, "Blob materialized");
        Ok(())
    }

    /// Open the blob for reading, or `None` if it does not exist.
    ///
    /// Anything at the location that is not a regular file counts as absent.
    pub fn open_for_read(&self, handle: FileHandle) -> Result<Option<File>> {
        let file = match File::open(self.location(handle)) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !file.metadata()?.is_file() {
            return Ok(None);
        }
        Ok(Some(file))
    }

    /// Open the blob for writing from the start, creating it if needed.
    pub fn open_for_write(&self, handle: FileHandle) -> Result<File> {
        let f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.location(handle))?;
        Ok(f)
    }

    /// Size of the blob in bytes, or `None` if it does not exist or is not a
    /// regular file.
    pub fn size_of(&self, handle: FileHandle) -> Result<Option<u64>> {
        match std::fs::metadata(self.location(handle)) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the blob. Returns `false` if there was nothing to delete.
    pub fn destroy(&self, handle: FileHandle) -> Result<bool> {
        match std::fs::remove_file(self.location(handle)) {
            Ok(()) => {
                debug!(handle = %handle, "Blob destroyed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Handles of every blob on disk. Files whose names are not handles are
    /// skipped.
    pub fn handles(&self) -> Result<Vec<FileHandle>> {
        let mut handles = Vec::new();
        for dir_entry in std::fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let name = dir_entry.file_name();
            if let Some(handle) = name.to_str().and_then(|n| n.parse::<FileHandle>().ok()) {
                handles.push(handle);
            }
        }
        handles.sort();
        Ok(handles)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
