//! Error types for the world save-data layer.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all storage operations.
#[derive(Error, Debug)]
pub enum WorldError {
    /// SQLite engine or statement failure. The engine's own text is kept.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The blob store file could not be opened or created.
    #[error("Failed to open blob store at {path}: {source}")]
    StoreOpen {
        /// Database file that failed to open.
        path: PathBuf,
        /// Underlying engine error.
        source: rusqlite::Error,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The compression codec reported a failure.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A stored row carries a compression tag this build does not know.
    #[error("Unknown compression '{tag}' for record {key}")]
    UnknownCompression {
        /// Record key.
        key: String,
        /// The unrecognized tag.
        tag: String,
    },

    /// A mandatory record was absent.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// `start_save_tx` was called while a transaction was already open.
    #[error("Save transaction already open (started {elapsed:?} ago)")]
    TransactionAlreadyOpen {
        /// Time since the open transaction began.
        elapsed: Duration,
    },

    /// `commit_save_tx` was called with no open transaction.
    #[error("No save transaction is open")]
    NoTransactionOpen,

    /// The player database cannot be closed while a save transaction uses it.
    #[error("Player database for save '{save}' is part of an open save transaction")]
    PlayerDbBusy {
        /// Save the player database belongs to.
        save: String,
    },

    /// The player database was opened for a different save than the active one.
    #[error("Player database opened for save '{opened}' but active save is '{active}'")]
    SaveIdentityChanged {
        /// Save the player database belongs to.
        opened: String,
        /// Save currently active in the session.
        active: String,
    },

    /// A player-scoped operation ran with no active save.
    #[error("No active save identifier")]
    NoActiveSave,

    /// An encoded save identifier could not be decoded.
    #[error("Invalid save identifier '{token}': {reason}")]
    InvalidSaveId {
        /// Offending token.
        token: String,
        /// Why it failed.
        reason: String,
    },

    /// Metadata serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A world with the given name already exists.
    #[error("World already exists: {0}")]
    WorldExists(String),

    /// No world with the given name exists.
    #[error("World not found: {0}")]
    WorldNotFound(String),

    /// The world name cannot be used as a folder name.
    #[error("Invalid world name '{name}': {reason}")]
    InvalidWorldName {
        /// Rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Migration preconditions were not met.
    #[error("Migration refused: {0}")]
    Migration(String),
}

impl From<serde_json::Error> for WorldError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, WorldError>;
