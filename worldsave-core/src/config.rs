//! Configuration for the world storage layer.
//!
//! Loadable from a `worldsave.toml` file. Every field has a default, so an
//! empty document is a valid configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::world_info::SaveFormat;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldsaveConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Backend and codec settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-world option defaults used to seed new worlds.
    #[serde(default)]
    pub world_defaults: BTreeMap<String, String>,
}

impl WorldsaveConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `WorldError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::WorldError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Format given to newly created worlds.
    #[serde(default = "default_format")]
    pub default_format: SaveFormat,
    /// zlib compression level, 0-9.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    /// Retry map quadrant reads under the thousands-separator filename
    /// produced by very old saves.
    #[serde(default = "default_true")]
    pub legacy_filename_fallback: bool,
    /// Value for `PRAGMA synchronous`.
    #[serde(default = "default_synchronous")]
    pub synchronous: String,
    /// Use WAL journaling instead of the rollback journal.
    #[serde(default)]
    pub wal_mode: bool,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
    /// First decompression buffer is this many times the compressed size.
    #[serde(default = "default_size_hint")]
    pub decompress_size_hint: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            compression_level: default_compression_level(),
            legacy_filename_fallback: true,
            synchronous: default_synchronous(),
            wal_mode: false,
            busy_timeout_ms: default_busy_timeout(),
            decompress_size_hint: default_size_hint(),
        }
    }
}

impl StorageConfig {
    /// Check ranges that serde cannot express.
    ///
    /// # Errors
    /// Returns `WorldError::Config` describing the first bad field.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.compression_level > 9 {
            return Err(crate::WorldError::Config(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        let sync = self.synchronous.to_ascii_uppercase();
        if !matches!(sync.as_str(), "OFF" | "NORMAL" | "FULL" | "EXTRA") {
            return Err(crate::WorldError::Config(format!(
                "synchronous must be OFF, NORMAL, FULL or EXTRA, got {}",
                self.synchronous
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_format() -> SaveFormat { SaveFormat::V2 }
fn default_compression_level() -> u32 { 6 }
fn default_synchronous() -> String { "NORMAL".to_string() }
fn default_busy_timeout() -> u32 { 5000 }
fn default_size_hint() -> usize { 4 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let config = WorldsaveConfig::from_toml("").expect("parse");
        assert_eq!(config.storage.default_format, SaveFormat::V2);
        assert_eq!(config.storage.compression_level, 6);
        assert!(config.storage.legacy_filename_fallback);
        assert!(config.world_defaults.is_empty());
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn parses_sections() {
        let config = WorldsaveConfig::from_toml(
            r#"
            [storage]
            default_format = "V1"
            compression_level = 9
            wal_mode = true

            [world_defaults]
            CITY_SIZE = "8"
            SPAWN_DENSITY = "1.0"
            "#,
        )
        .expect("parse");
        assert_eq!(config.storage.default_format, SaveFormat::V1);
        assert_eq!(config.storage.compression_level, 9);
        assert!(config.storage.wal_mode);
        assert_eq!(config.world_defaults.get("CITY_SIZE").map(String::as_str), Some("8"));
        config.storage.validate().expect("valid");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(WorldsaveConfig::from_toml("[storage]\ndefault_format = \"V3\"").is_err());

        let mut storage = StorageConfig::default();
        storage.compression_level = 12;
        assert!(storage.validate().is_err());

        let mut storage = StorageConfig::default();
        storage.synchronous = "sometimes".to_string();
        assert!(storage.validate().is_err());
    }
}
