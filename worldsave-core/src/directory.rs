//! The folder of worlds: create, list, open, delete and convert.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::WorldsaveConfig;
use crate::error::{Result, WorldError};
use crate::migration::{MigrationReport, migrate_v1_to_v2};
use crate::store::BlobStore;
use crate::world::World;
use crate::world_info::{OPTIONS_FILE, SaveFormat, WorldInfo};

/// Suffix of the folder a V1 world is kept under after conversion.
pub const BACKUP_SUFFIX: &str = ".v1-backup";
/// Suffix of the folder a conversion writes into before it is swapped in.
pub const STAGING_SUFFIX: &str = ".v2-tmp";

/// All worlds under one root folder.
#[derive(Debug, Clone)]
pub struct WorldDirectory {
    root: PathBuf,
    config: WorldsaveConfig,
}

impl WorldDirectory {
    /// Worlds under `root`. Nothing is touched until the first operation.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, config: WorldsaveConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Root folder.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &WorldsaveConfig {
        &self.config
    }

    fn folder(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Whether a world named `name` exists.
    #[must_use]
    pub fn world_exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.folder(name).join(OPTIONS_FILE).is_file()
    }

    /// Create a world. `format` defaults to the configured one.
    ///
    /// # Errors
    /// Invalid or duplicate name, or I/O and database failures.
    pub fn create_world(&self, name: &str, format: Option<SaveFormat>) -> Result<WorldInfo> {
        validate_name(name)?;
        self.config.storage.validate()?;
        let folder = self.folder(name);
        if folder.exists() {
            return Err(WorldError::WorldExists(name.to_string()));
        }
        let format = format.unwrap_or(self.config.storage.default_format);
        let info = WorldInfo::new(name, format, &self.config.world_defaults);
        info.save(&folder)?;
        if format == SaveFormat::V2 {
            BlobStore::open(WorldInfo::map_db_path(&folder), &self.config.storage)?;
        }
        info!(world = name, format = %format, "World created");
        Ok(info)
    }

    /// Names of all worlds, sorted.
    ///
    /// # Errors
    /// I/O failure reading the root folder.
    pub fn list_worlds(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.world_exists(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load a world's metadata.
    ///
    /// # Errors
    /// [`WorldError::WorldNotFound`] or a metadata read failure.
    pub fn get_world(&self, name: &str) -> Result<WorldInfo> {
        if !self.world_exists(name) {
            return Err(WorldError::WorldNotFound(name.to_string()));
        }
        WorldInfo::load(&self.folder(name))
    }

    /// Open a storage session for a world.
    ///
    /// # Errors
    /// See [`WorldDirectory::get_world`] and [`World::open`].
    pub fn open_world(&self, name: &str) -> Result<World> {
        let info = self.get_world(name)?;
        World::open(info, self.folder(name), &self.config.storage)
    }

    /// Delete a world and everything in its folder.
    ///
    /// # Errors
    /// [`WorldError::WorldNotFound`] or an I/O failure.
    pub fn delete_world(&self, name: &str) -> Result<()> {
        if !self.world_exists(name) {
            return Err(WorldError::WorldNotFound(name.to_string()));
        }
        std::fs::remove_dir_all(self.folder(name))?;
        info!(world = name, "World deleted");
        Ok(())
    }

    /// Convert a V1 world to V2.
    ///
    /// The world is migrated into a `<name>.v2-tmp` staging folder. Only when
    /// that succeeds is the original renamed to `<name>.v1-backup` and the
    /// staging folder renamed to `<name>`. On failure the staging folder is
    /// removed and the V1 world stays exactly as it was.
    ///
    /// # Errors
    /// [`WorldError::Migration`] if the world is already V2 or a backup
    /// exists, or whatever the migration or the folder swap raises.
    pub fn convert_world(&self, name: &str) -> Result<MigrationReport> {
        let mut info = self.get_world(name)?;
        if info.world_save_format != SaveFormat::V1 {
            return Err(WorldError::Migration(format!(
                "world '{name}' is already {}",
                info.world_save_format
            )));
        }
        let folder = self.folder(name);
        let backup = self.root.join(format!("{name}{BACKUP_SUFFIX}"));
        if backup.exists() {
            return Err(WorldError::Migration(format!(
                "backup folder {} already exists",
                backup.display()
            )));
        }
        let staging = self.root.join(format!("{name}{STAGING_SUFFIX}"));
        if staging.exists() {
            warn!(world = name, staging = %staging.display(), "Removing leftover staging folder");
            std::fs::remove_dir_all(&staging)?;
        }

        let migrated = migrate_v1_to_v2(&folder, &staging, &self.config.storage).and_then(|report| {
            info.world_save_format = SaveFormat::V2;
            info.save(&staging)?;
            Ok(report)
        });
        let report = match migrated {
            Ok(report) => report,
            Err(e) => {
                warn!(world = name, error = %e, "World conversion failed; V1 world left in place");
                if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                    warn!(staging = %staging.display(), error = %cleanup, "Could not remove staging folder");
                }
                return Err(e);
            }
        };

        std::fs::rename(&folder, &backup)?;
        if let Err(e) = std::fs::rename(&staging, &folder) {
            warn!(world = name, error = %e, "Could not move converted world into place; restoring V1 folder");
            std::fs::rename(&backup, &folder)?;
            return Err(e.into());
        }

        info!(
            world = name,
            map_rows = report.map_rows(),
            players = report.player_rows.len(),
            "World converted to V2"
        );
        Ok(report)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.starts_with('.') {
        "name starts with '.'"
    } else if name.contains(['/', '\\']) {
        "name contains a path separator"
    } else if name.ends_with(BACKUP_SUFFIX) || name.ends_with(STAGING_SUFFIX) {
        "name is reserved for conversion folders"
    } else {
        return Ok(());
    };
    Err(WorldError::InvalidWorldName {
        name: name.to_string(),
        reason,
    })
}
