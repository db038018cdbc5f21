// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Metadata index: maps handle → (display name, mime type, creation time).
//!
//! The index is a single SQLite table and owns handle allocation. Handles come
//! from an `AUTOINCREMENT` primary key, so SQLite persists the high-water mark
//! in `sqlite_sequence` and a deleted handle is never handed out again, not
//! even after a restart. The index never touches blob bytes.
//!
//! ## Schema history
//!
//! ```text
//! v1: files(id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, time INTEGER)
//! v2: + mime TEXT DEFAULT '*/*'
//! ```
//!
//! `time` is the creation time in Unix milliseconds.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::storage::handle::FileHandle;

pub const SCHEMA_VERSION: i64 = 2;

/// Mime type reported when none was recorded.
pub const WILDCARD_MIME: &str = "*/*";

/// Metadata about a single stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub handle: FileHandle,
    pub display_name: Option<String>,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

/// Durable handle table. All access is serialised through one mutex.
pub struct MetadataIndex {
    conn: Mutex<Connection>,
}

impl MetadataIndex {
    /// Open (or create) the index database at `path`, migrating it to the
    /// current schema.
    pub fn open(path: &Path) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migrate(&mut conn)?;

        info!(path = ?path, schema = SCHEMA_VERSION, "Metadata index opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Allocate a fresh handle and persist its entry.
    pub fn insert(
        &self,
        display_name: Option<&str>,
        mime_type: &str,
        created_at: DateTime<Utc>,
    ) -> Result<FileHandle> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO files (name, mime, time) VALUES (?1, ?2, ?3)",
            params![display_name, mime_type, created_at.timestamp_millis()],
        )?;
        Ok(FileHandle::new(conn.last_insert_rowid()))
    }

    pub fn lookup(&self, handle: FileHandle) -> Result<Option<Entry>> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                "SELECT id, name, mime, time FROM files WHERE id = ?1",
                params![handle.id()],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Delete the entry for `handle`. Returns `false` if there was none.
    pub fn delete(&self, handle: FileHandle) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM files WHERE id = ?1", params![handle.id()])?;
        Ok(deleted > 0)
    }

    /// Handles of every entry created strictly before `threshold`.
    ///
    /// The rows are read under the lock; the returned iterator holds no lock.
    /// Rows without a creation time predate the time column and always match.
    pub fn select_older_than(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<impl Iterator<Item = FileHandle>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id FROM files WHERE time IS NULL OR time < ?1 ORDER BY id")?;
        let handles = stmt
            .query_map(params![threshold.timestamp_millis()], |row| {
                row.get::<_, i64>(0).map(FileHandle::new)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(handles.into_iter())
    }

    /// All live entries in allocation order.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, name, mime, time FROM files ORDER BY id")?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Number of live entries.
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let mime: Option<String> = row.get(2)?;
    let millis: Option<i64> = row.get(3)?;
    Ok(Entry {
        handle: FileHandle::new(row.get(0)?),
        display_name: row.get(1)?,
        mime_type: mime
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| WILDCARD_MIME.to_string()),
        created_at: millis
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_default(),
    })
}

/// Bring the schema up to [`SCHEMA_VERSION`], one step at a time.
///
/// The v2 step adds `mime` with a column default, so rows written under v1
/// read back as `*/*` and inserts are never blocked on a missing column.
fn migrate(conn: &mut Connection) -> Result<()> {
    let found: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Err(StoreError::SchemaVersion {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    if found == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    if found < 1 {
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                time INTEGER
            );",
        )?;
    }
    if found < 2 {
        tx.execute_batch("ALTER TABLE files ADD COLUMN mime TEXT DEFAULT '*/*';")?;
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    info!(from = found, to = SCHEMA_VERSION, "Metadata index schema upgraded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    fn open_index(dir: &TempDir) -> MetadataIndex {
        MetadataIndex::open(&dir.path().join("index.db")).unwrap()
    }

    #[test]
    fn insert_and_lookup() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir);
        let now = Utc::now();

        let h = index.insert(Some("notes.txt"), "text/plain", now).unwrap();
        let entry = index.lookup(h).unwrap().expect("entry");

        assert_eq!(entry.display_name.as_deref(), Some("notes.txt"));
        assert_eq!(entry.mime_type, "text/plain");
        assert_eq!(entry.created_at.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn lookup_unknown_is_none() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir);
        assert_eq!(index.lookup(FileHandle::new(99)).unwrap(), None);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir);
        let h = index.insert(None, WILDCARD_MIME, Utc::now()).unwrap();

        assert!(index.delete(h).unwrap());
        assert!(!index.delete(h).unwrap());
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn handles_never_reused_across_reopen() {
        let dir = TempDir::new().unwrap();
        let last = {
            let index = open_index(&dir);
            let a = index.insert(None, WILDCARD_MIME, Utc::now()).unwrap();
            let b = index.insert(None, WILDCARD_MIME, Utc::now()).unwrap();
            index.delete(a).unwrap();
            index.delete(b).unwrap();
            b
        };

        let index = open_index(&dir);
        let next = index.insert(None, WILDCARD_MIME, Utc::now()).unwrap();
        assert!(next > last, "{next} should be newer than {last}");
    }

    #[test]
    fn select_older_than_is_strict() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir);
        let base = Utc::now();

        let old = index.insert(None, WILDCARD_MIME, base - TimeDelta::seconds(10)).unwrap();
        let edge = index.insert(None, WILDCARD_MIME, base).unwrap();
        let _new = index.insert(None, WILDCARD_MIME, base + TimeDelta::seconds(10)).unwrap();

        let selected: Vec<_> = index.select_older_than(base).unwrap().collect();
        assert_eq!(selected, vec![old]);
        assert!(!selected.contains(&edge));
    }

    #[test]
    fn upgrades_v1_schema_with_wildcard_mime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE files (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT,
                    time INTEGER
                );
                INSERT INTO files (name, time) VALUES ('legacy.bin', 1000);
                INSERT INTO files (name, time) VALUES (NULL, 2000);
                PRAGMA user_version = 1;",
            )
            .unwrap();
        }

        let index = MetadataIndex::open(&path).unwrap();
        let entries = index.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.mime_type == WILDCARD_MIME));
        assert_eq!(entries[0].display_name.as_deref(), Some("legacy.bin"));

        // New inserts keep allocating past the legacy rows.
        let h = index.insert(Some("new.pdf"), "application/pdf", Utc::now()).unwrap();
        assert_eq!(h.id(), 3);
        assert_eq!(index.lookup(h).unwrap().unwrap().mime_type, "application/pdf");
    }

    #[test]
    fn rejects_newer_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("PRAGMA user_version = 9;").unwrap();
        }

        assert!(matches!(
            MetadataIndex::open(&path),
            Err(StoreError::SchemaVersion { found: 9, .. })
        ));
    }
}
