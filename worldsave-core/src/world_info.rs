//! Descriptive metadata for one world.
//!
//! Stored inside the world folder as two JSON files:
//!
//! - `worldoptions.json`: array of `{info, default, name, value}` records.
//!   The reserved `WORLD_SAVE_FORMAT` record holds the backend format.
//! - `mods.json`: array of active extension ids, load order preserved.
//!
//! The known saves are not stored; they are rebuilt from the `<save>.sav`
//! files present in the folder.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::addressing::{MAP_DB_FILE, player_db_file};
use crate::error::{Result, WorldError};
use crate::save_id::SaveId;

/// Options file name.
pub const OPTIONS_FILE: &str = "worldoptions.json";
/// Active extension list file name.
pub const MODS_FILE: &str = "mods.json";
/// Extension of the per-character save file that marks a known save.
pub const SAVE_FILE_EXT: &str = ".sav";
/// Reserved option record holding the save format.
pub const SAVE_FORMAT_OPTION: &str = "WORLD_SAVE_FORMAT";

/// Storage backend a world uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveFormat {
    /// Loose files under the world folder.
    V1,
    /// Compressed blobs in SQLite databases.
    V2,
}

impl SaveFormat {
    /// Canonical string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "V1",
            Self::V2 => "V2",
        }
    }

    /// Parse `V1`/`V2`, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "V1" => Some(Self::V1),
            "V2" => Some(Self::V2),
            _ => None,
        }
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One per-world option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldOption {
    /// Current value.
    pub value: String,
    /// Value the world was seeded with.
    pub default: String,
    /// Free-form description.
    pub info: String,
}

/// On-disk shape of one option record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OptionRecord {
    #[serde(default)]
    info: String,
    #[serde(default)]
    default: String,
    name: String,
    value: String,
}

/// Metadata for one world.
///
/// `world_save_format` and `world_saves` must match what is actually on
/// disk; the owner keeps them in sync.
#[derive(Debug, Clone)]
pub struct WorldInfo {
    /// Unique name, also the folder name.
    pub world_name: String,
    /// Option name to option.
    pub world_options: BTreeMap<String, WorldOption>,
    /// Known saves, in discovery order, without duplicates.
    world_saves: Vec<SaveId>,
    /// Backend format.
    pub world_save_format: SaveFormat,
    /// Active extensions in load order.
    pub active_mod_order: Vec<String>,
}

impl WorldInfo {
    /// A fresh world seeded from `defaults`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        format: SaveFormat,
        defaults: &BTreeMap<String, String>,
    ) -> Self {
        let world_options = defaults
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    WorldOption {
                        value: value.clone(),
                        default: value.clone(),
                        info: String::new(),
                    },
                )
            })
            .collect();
        Self {
            world_name: name.into(),
            world_options,
            world_saves: Vec::new(),
            world_save_format: format,
            active_mod_order: Vec::new(),
        }
    }

    /// Known saves.
    #[must_use]
    pub fn world_saves(&self) -> &[SaveId] {
        &self.world_saves
    }

    /// Record a save. Returns `false` if it was already known.
    pub fn add_save(&mut self, save: SaveId) -> bool {
        if self.has_save(&save) {
            return false;
        }
        self.world_saves.push(save);
        true
    }

    /// Whether `save` is known.
    #[must_use]
    pub fn has_save(&self, save: &SaveId) -> bool {
        self.world_saves.contains(save)
    }

    /// Current value of an option.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&str> {
        self.world_options.get(name).map(|o| o.value.as_str())
    }

    /// Override an option. Unknown options are added with the value as default.
    pub fn set_option(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.world_options
            .entry(name.to_string())
            .and_modify(|o| o.value.clone_from(&value))
            .or_insert_with(|| WorldOption {
                default: value.clone(),
                value,
                info: String::new(),
            });
    }

    /// Whether any active extension needs the optional scripting capability.
    pub fn needs_scripting<F: Fn(&str) -> bool>(&self, requires_scripting: F) -> bool {
        self.active_mod_order.iter().any(|m| requires_scripting(m))
    }

    /// This world's folder under `worlds_root`.
    #[must_use]
    pub fn folder_path(&self, worlds_root: &Path) -> PathBuf {
        worlds_root.join(&self.world_name)
    }

    /// Path of the shared map database inside `folder`.
    #[must_use]
    pub fn map_db_path(folder: &Path) -> PathBuf {
        folder.join(MAP_DB_FILE)
    }

    /// Path of `save`'s player database inside `folder`.
    #[must_use]
    pub fn player_db_path(folder: &Path, save: &SaveId) -> PathBuf {
        folder.join(player_db_file(save))
    }

    /// Read metadata from `folder`.
    ///
    /// # Errors
    /// Returns [`WorldError::Io`] if the options file is unreadable and
    /// [`WorldError::Serialization`] if either file is malformed.
    pub fn load(folder: &Path) -> Result<Self> {
        let world_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| WorldError::WorldNotFound(folder.display().to_string()))?;

        let records: Vec<OptionRecord> =
            serde_json::from_slice(&std::fs::read(folder.join(OPTIONS_FILE))?)?;

        let mut world_save_format = None;
        let mut world_options = BTreeMap::new();
        for record in records {
            if record.name == SAVE_FORMAT_OPTION {
                world_save_format = Some(SaveFormat::parse(&record.value).ok_or_else(|| {
                    WorldError::Serialization(format!(
                        "unknown {SAVE_FORMAT_OPTION} '{}'",
                        record.value
                    ))
                })?);
                continue;
            }
            world_options.insert(
                record.name,
                WorldOption {
                    value: record.value,
                    default: record.default,
                    info: record.info,
                },
            );
        }
        let world_save_format = world_save_format.unwrap_or_else(|| {
            if Self::map_db_path(folder).exists() {
                SaveFormat::V2
            } else {
                SaveFormat::V1
            }
        });

        let mods_path = folder.join(MODS_FILE);
        let active_mod_order = if mods_path.exists() {
            serde_json::from_slice(&std::fs::read(&mods_path)?)?
        } else {
            Vec::new()
        };

        let mut info = Self {
            world_name,
            world_options,
            world_saves: Vec::new(),
            world_save_format,
            active_mod_order,
        };
        for save in scan_saves(folder)? {
            info.add_save(save);
        }

        debug!(
            world = %info.world_name,
            format = %info.world_save_format,
            saves = info.world_saves.len(),
            "Loaded world metadata"
        );
        Ok(info)
    }

    /// Write metadata into `folder`, creating it if needed.
    ///
    /// # Errors
    /// Returns [`WorldError::Io`] on write failure.
    pub fn save(&self, folder: &Path) -> Result<()> {
        std::fs::create_dir_all(folder)?;

        let mut records: Vec<OptionRecord> = self
            .world_options
            .iter()
            .map(|(name, o)| OptionRecord {
                info: o.info.clone(),
                default: o.default.clone(),
                name: name.clone(),
                value: o.value.clone(),
            })
            .collect();
        records.push(OptionRecord {
            info: "Storage backend used by this world".to_string(),
            default: SaveFormat::V1.as_str().to_string(),
            name: SAVE_FORMAT_OPTION.to_string(),
            value: self.world_save_format.as_str().to_string(),
        });

        std::fs::write(
            folder.join(OPTIONS_FILE),
            serde_json::to_vec_pretty(&records)?,
        )?;
        std::fs::write(
            folder.join(MODS_FILE),
            serde_json::to_vec_pretty(&self.active_mod_order)?,
        )?;
        Ok(())
    }
}

/// Saves present in `folder`, sorted by name.
fn scan_saves(folder: &Path) -> Result<Vec<SaveId>> {
    let mut saves = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(SAVE_FILE_EXT)) else {
            continue;
        };
        match SaveId::from_encoded(stem) {
            Ok(save) => saves.push(save),
            Err(e) => warn!(file = %stem, error = %e, "Skipping undecodable save file"),
        }
    }
    saves.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(saves)
}
