//! Record stores: the two interchangeable persistence backends.
//!
//! - [`LooseFileStore`] keeps each record as a plain file under the world
//!   folder (save format V1).
//! - [`BlobStore`] keeps each record as a zlib-compressed row in a
//!   single-table SQLite database (save format V2).
//!
//! Both speak [`RecordStore`]; callers hand serialization to a writer or
//! reader callback through [`write_with`] and [`read_with`].

use std::io::{Read, Write};

use crate::error::{Result, WorldError};

pub mod blob;
pub mod loose;

pub use blob::BlobStore;
pub use loose::LooseFileStore;

/// Keyed byte storage.
pub trait RecordStore {
    /// Whether a record exists under `key`.
    ///
    /// # Errors
    /// Backend failure.
    fn exists(&self, key: &str) -> Result<bool>;

    /// The decoded bytes stored under `key`, or `None`.
    ///
    /// # Errors
    /// Backend or codec failure.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `data` under `key`, replacing any previous record.
    ///
    /// # Errors
    /// Backend or codec failure.
    fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Open a transaction. A no-op for backends without one.
    ///
    /// # Errors
    /// Backend failure.
    fn begin(&self) -> Result<()>;

    /// Commit the open transaction. A no-op for backends without one.
    ///
    /// # Errors
    /// Backend failure.
    fn commit(&self) -> Result<()>;

    /// Short human-readable location for logs.
    fn describe(&self) -> String;
}

/// Serialize through `writer` into memory, then store the bytes.
///
/// # Errors
/// Whatever `writer` returns, or a backend failure.
pub fn write_with<S, F>(store: &S, key: &str, writer: F) -> Result<()>
where
    S: RecordStore + ?Sized,
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let mut buf = Vec::new();
    writer(&mut buf)?;
    store.write(key, &buf)
}

/// Load the record under `key` and hand it to `reader`.
///
/// Returns `Ok(false)` for a missing record when `optional`, and
/// [`WorldError::NotFound`] otherwise. Errors from `reader` pass through
/// untouched.
///
/// # Errors
/// Backend failure, a missing mandatory record, or a `reader` error.
pub fn read_with<S, F>(store: &S, key: &str, reader: F, optional: bool) -> Result<bool>
where
    S: RecordStore + ?Sized,
    F: FnOnce(&mut dyn Read) -> Result<()>,
{
    match store.read(key)? {
        Some(bytes) => {
            reader(&mut bytes.as_slice())?;
            Ok(true)
        }
        None if optional => Ok(false),
        None => Err(WorldError::NotFound(format!("{} in {}", key, store.describe()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores(dir: &std::path::Path) -> Vec<Box<dyn RecordStore>> {
        vec![
            Box::new(LooseFileStore::new(dir.join("loose"))),
            Box::new(
                BlobStore::open(dir.join("blob.sqlite3"), &crate::config::StorageConfig::default())
                    .expect("open"),
            ),
        ]
    }

    #[test]
    fn callbacks_round_trip_on_both_backends() {
        let dir = tempfile::tempdir().expect("tempdir");
        for store in stores(dir.path()) {
            write_with(store.as_ref(), "maps/0.0.0/0.0.0.map", |w| {
                w.write_all(br#"{"ter":"t_grass"}"#)?;
                Ok(())
            })
            .expect("write");

            let mut out = String::new();
            let found = read_with(
                store.as_ref(),
                "maps/0.0.0/0.0.0.map",
                |r| {
                    r.read_to_string(&mut out)?;
                    Ok(())
                },
                true,
            )
            .expect("read");
            assert!(found, "{}", store.describe());
            assert_eq!(out, r#"{"ter":"t_grass"}"#);
        }
    }

    #[test]
    fn missing_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        for store in stores(dir.path()) {
            let found = read_with(store.as_ref(), "o.9.9", |_| Ok(()), true).expect("optional");
            assert!(!found);
            let err = read_with(store.as_ref(), "o.9.9", |_| Ok(()), false).expect_err("mandatory");
            assert!(matches!(err, WorldError::NotFound(_)));
        }
    }

    #[test]
    fn reader_errors_pass_through() {
        let dir = tempfile::tempdir().expect("tempdir");
        for store in stores(dir.path()) {
            store.write("o.0.0", b"garbage").expect("write");
            let err = read_with(
                store.as_ref(),
                "o.0.0",
                |_| Err(WorldError::Serialization("bad overmap".to_string())),
                true,
            )
            .expect_err("reader fails");
            assert!(matches!(err, WorldError::Serialization(ref m) if m == "bad overmap"));
        }
    }
}
