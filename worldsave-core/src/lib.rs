//! # worldsave-core
//!
//! World save-data storage for a turn-based survival roguelike.
//!
//! A world's map quadrants, overmap terrain and per-character data are opaque
//! byte streams. This crate decides where each stream lives and moves it there:
//!
//! - **V1**: loose files under the world folder.
//! - **V2**: zlib-compressed rows in `map.sqlite3` (shared data) and one
//!   `<save>.sqlite3` per character.
//!
//! [`World`] is the session object gameplay code talks to; it brackets saves
//! with [`World::start_save_tx`] / [`World::commit_save_tx`].
//! [`WorldDirectory`] manages the set of worlds, and
//! [`migration::migrate_v1_to_v2`] converts a world between formats.
//!
//! All operations block the calling thread. Two processes must not open the
//! same world at once.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod addressing;
pub mod codec;
pub mod config;
pub mod coords;
pub mod directory;
pub mod error;
pub mod migration;
pub mod save_id;
pub mod store;
pub mod world;
pub mod world_info;

pub use config::WorldsaveConfig;
pub use coords::{OvermapCoord, Tripoint};
pub use directory::WorldDirectory;
pub use error::{Result, WorldError};
pub use save_id::SaveId;
pub use world::{ActiveSaveContext, World};
pub use world_info::{SaveFormat, WorldInfo};
