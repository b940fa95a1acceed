//! Loose-file backend: one file per record under a root folder.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::RecordStore;
use crate::error::Result;

/// Suffix of the scratch file a write goes through before the rename.
const TMP_SUFFIX: &str = ".tmp";

/// Records as plain files. Keys are `/`-separated paths relative to `root`.
#[derive(Debug, Clone)]
pub struct LooseFileStore {
    root: PathBuf,
}

impl LooseFileStore {
    /// A store rooted at `root`. Nothing is created until the first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root folder.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for `key`.
    #[must_use]
    pub fn path_of(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(key.split('/').filter(|part| !part.is_empty()));
        path
    }

    /// Create the folder `key` names, and its parents.
    ///
    /// # Errors
    /// I/O failure.
    pub fn ensure_dir(&self, key: &str) -> Result<()> {
        std::fs::create_dir_all(self.path_of(key))?;
        Ok(())
    }
}

impl RecordStore for LooseFileStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_of(key).is_file())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_of(key)) {
            Ok(bytes) => {
                debug!(key, bytes = bytes.len(), "Read loose record");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_of(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = path.clone().into_os_string();
        tmp.push(TMP_SUFFIX);
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;
        debug!(key, bytes = data.len(), "Wrote loose record");
        Ok(())
    }

    fn begin(&self) -> Result<()> {
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
