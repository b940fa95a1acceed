//! SQLite blob backend.
//!
//! One table per database file:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS files (
//!     path        TEXT PRIMARY KEY NOT NULL,
//!     parent      TEXT,
//!     compression TEXT DEFAULT NULL,
//!     data        BLOB NOT NULL
//! );
//! ```
//!
//! `parent` is informational only (it makes the table easy to browse by
//! folder). Writes always compress with zlib; reads also accept raw rows
//! with a NULL tag. The connection closes when the store is dropped.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info};

use super::RecordStore;
use crate::addressing::parent_of;
use crate::codec::{self, Compression};
use crate::config::StorageConfig;
use crate::error::{Result, WorldError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS files (
    path        TEXT PRIMARY KEY NOT NULL,
    parent      TEXT,
    compression TEXT DEFAULT NULL,
    data        BLOB NOT NULL
);";

/// A stored row as-is, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// `parent` column.
    pub parent: Option<String>,
    /// `compression` column.
    pub compression: Option<String>,
    /// Stored bytes.
    pub data: Vec<u8>,
}

/// Handle to one open blob database.
pub struct BlobStore {
    conn: Connection,
    path: PathBuf,
    compression_level: u32,
    size_hint: usize,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("path", &self.path)
            .field("compression_level", &self.compression_level)
            .finish_non_exhaustive()
    }
}

impl BlobStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Config`] for invalid settings,
    /// [`WorldError::StoreOpen`] if the file cannot be opened, and
    /// [`WorldError::Database`] if configuring it fails.
    pub fn open<P: AsRef<Path>>(path: P, config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&path, flags).map_err(|source| {
            WorldError::StoreOpen {
                path: path.clone(),
                source,
            }
        })?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch(&format!(
            "PRAGMA synchronous = {};",
            config.synchronous.to_ascii_uppercase()
        ))?;
        conn.busy_timeout(std::time::Duration::from_millis(u64::from(
            config.busy_timeout_ms,
        )))?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), wal = config.wal_mode, "Blob store opened");

        Ok(Self {
            conn,
            path,
            compression_level: config.compression_level,
            size_hint: config.decompress_size_hint.max(1),
        })
    }

    /// Database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a transaction is currently open on this connection.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Abandon the open transaction.
    ///
    /// # Errors
    /// Returns [`WorldError::Database`] if no transaction is open.
    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }

    /// Number of stored rows.
    ///
    /// # Errors
    /// Returns [`WorldError::Database`] on SQLite failures.
    pub fn row_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// All keys, sorted.
    ///
    /// # Errors
    /// Returns [`WorldError::Database`] on SQLite failures.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT path FROM files ORDER BY path")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    /// The row under `key` without decoding it.
    ///
    /// # Errors
    /// Returns [`WorldError::Database`] on SQLite failures.
    pub fn raw_row(&self, key: &str) -> Result<Option<RawRow>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT parent, compression, data FROM files WHERE path = ?1")?;
        let row = stmt
            .query_row(params![key], |row| {
                Ok(RawRow {
                    parent: row.get(0)?,
                    compression: row.get(1)?,
                    data: row.get(2)?,
                })
            })
            .optional()?;
        Ok(row)
    }
}

impl RecordStore for BlobStore {
    fn exists(&self, key: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM files WHERE path = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();

        let mut stmt = self
            .conn
            .prepare_cached("SELECT compression, data FROM files WHERE path = ?1")?;
        let row: Option<(Option<String>, Vec<u8>)> = stmt
            .query_row(params![key], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((tag, data)) = row else {
            return Ok(None);
        };

        let compression = Compression::from_tag(tag.as_deref(), key)?;
        let stored = data.len();
        let decoded = codec::decode(compression, data, self.size_hint)?;

        debug!(
            key,
            stored,
            bytes = decoded.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Read blob record"
        );
        Ok(Some(decoded))
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let start = Instant::now();

        let packed = codec::compress(data, self.compression_level)?;
        self.conn.execute(
            "INSERT INTO files (path, parent, compression, data)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
                parent = excluded.parent,
                compression = excluded.compression,
                data = excluded.data",
            params![key, parent_of(key), Compression::Zlib.tag(), packed],
        )?;

        debug!(
            key,
            bytes = data.len(),
            stored = packed.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Wrote blob record"
        );
        Ok(())
    }

    fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION;")?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store =
            BlobStore::open(dir.path().join("map.sqlite3"), &StorageConfig::default()).expect("open");
        (dir, store)
    }

    #[test]
    fn rows_are_compressed_with_parent() {
        let (_dir, store) = open_temp();
        let payload = br#"{"ter":"t_grass"}"#.repeat(20);
        store.write("maps/0.0.0/0.0.0.map", &payload).expect("write");

        let row = store.raw_row("maps/0.0.0/0.0.0.map").expect("row").expect("present");
        assert_eq!(row.parent.as_deref(), Some("maps/0.0.0"));
        assert_eq!(row.compression.as_deref(), Some("zlib"));
        assert!(row.data.len() < payload.len());
        assert_eq!(store.read("maps/0.0.0/0.0.0.map").expect("read"), Some(payload));
    }

    #[test]
    fn upsert_keeps_one_row() {
        let (_dir, store) = open_temp();
        store.write("o.0.0", b"first").expect("write");
        store.write("o.0.0", b"second").expect("write");
        assert_eq!(store.row_count().expect("count"), 1);
        assert_eq!(store.read("o.0.0").expect("read").as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn raw_rows_pass_through() {
        let (_dir, store) = open_temp();
        store
            .conn
            .execute(
                "INSERT INTO files (path, parent, compression, data) VALUES ('o.1.1', '', NULL, ?1)",
                params![b"plain bytes".to_vec()],
            )
            .expect("insert");
        assert_eq!(store.read("o.1.1").expect("read").as_deref(), Some(&b"plain bytes"[..]));
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let (_dir, store) = open_temp();
        store
            .conn
            .execute(
                "INSERT INTO files (path, parent, compression, data) VALUES ('o.2.2', '', 'lzma', ?1)",
                params![b"??".to_vec()],
            )
            .expect("insert");
        let err = store.read("o.2.2").expect_err("unknown tag");
        assert!(matches!(err, WorldError::UnknownCompression { ref tag, .. } if tag == "lzma"));
    }

    #[test]
    fn exists_and_keys() {
        let (_dir, store) = open_temp();
        assert!(!store.exists("o.0.0").expect("exists"));
        store.write("o.0.0", b"x").expect("write");
        store.write("maps/0.0.0/1.1.0.map", b"y").expect("write");
        assert!(store.exists("o.0.0").expect("exists"));
        assert_eq!(
            store.keys().expect("keys"),
            vec!["maps/0.0.0/1.1.0.map".to_string(), "o.0.0".to_string()]
        );
    }

    #[test]
    fn transactions_bracket_writes() {
        let (dir, store) = open_temp();
        store.begin().expect("begin");
        assert!(store.in_transaction());
        store.write("o.0.0", b"x").expect("write");
        store.commit().expect("commit");
        assert!(!store.in_transaction());
        drop(store);

        let reopened =
            BlobStore::open(dir.path().join("map.sqlite3"), &StorageConfig::default()).expect("open");
        assert!(reopened.exists("o.0.0").expect("exists"));
    }

    #[test]
    fn uncommitted_writes_roll_back_on_drop() {
        let (dir, store) = open_temp();
        store.begin().expect("begin");
        store.write("o.0.0", b"x").expect("write");
        drop(store);

        let reopened =
            BlobStore::open(dir.path().join("map.sqlite3"), &StorageConfig::default()).expect("open");
        assert!(!reopened.exists("o.0.0").expect("exists"));
    }

    #[test]
    fn commit_without_begin_fails() {
        let (_dir, store) = open_temp();
        assert!(matches!(store.commit(), Err(WorldError::Database(_))));
    }

    #[test]
    fn invalid_settings_are_rejected_before_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StorageConfig {
            synchronous: "NORMAL; DROP TABLE files".to_string(),
            ..StorageConfig::default()
        };
        let path = dir.path().join("map.sqlite3");
        let err = BlobStore::open(&path, &config).expect_err("bad pragma value");
        assert!(matches!(err, WorldError::Config(_)));
        assert!(!path.exists());
    }

    #[test]
    fn open_in_missing_folder_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = BlobStore::open(dir.path().join("no/such/dir/map.sqlite3"), &StorageConfig::default())
            .expect_err("missing folder");
        assert!(matches!(err, WorldError::StoreOpen { .. }));
    }
}
