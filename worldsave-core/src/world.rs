//! Live storage session for one world.
//!
//! A [`World`] owns the world's [`WorldInfo`], the loose-file store rooted at
//! the world folder and, for V2 worlds, the shared `map.sqlite3` handle plus a
//! lazily opened per-player database. Each domain accessor computes an
//! [`Address`] and dispatches once to the backend the world's format selects.
//!
//! Player-scoped records belong to the save held by the session's
//! [`ActiveSaveContext`]. The player database remembers which save it was
//! opened for; touching it after the active save changed is an error until
//! the owner calls [`World::close_player_db`].

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::addressing::{self, Address};
use crate::config::StorageConfig;
use crate::coords::{OvermapCoord, Tripoint};
use crate::error::{Result, WorldError};
use crate::save_id::SaveId;
use crate::store::{BlobStore, LooseFileStore, RecordStore, read_with, write_with};
use crate::world_info::{SaveFormat, WorldInfo};

/// The save whose player-scoped data the session reads and writes.
#[derive(Debug, Clone, Default)]
pub struct ActiveSaveContext {
    save: Option<SaveId>,
}

impl ActiveSaveContext {
    /// No active save.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with `save` active.
    #[must_use]
    pub fn with_save(save: SaveId) -> Self {
        Self { save: Some(save) }
    }

    /// The active save, if any.
    #[must_use]
    pub fn current(&self) -> Option<&SaveId> {
        self.save.as_ref()
    }

    /// The active save.
    ///
    /// # Errors
    /// Returns [`WorldError::NoActiveSave`] if none is set.
    pub fn require(&self) -> Result<&SaveId> {
        self.save.as_ref().ok_or(WorldError::NoActiveSave)
    }

    /// Make `save` active.
    pub fn set(&mut self, save: SaveId) {
        self.save = Some(save);
    }

    /// Clear the active save.
    pub fn clear(&mut self) {
        self.save = None;
    }
}

/// Timing of committed save transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    /// Transactions committed in this session.
    pub committed: u64,
    /// Duration of the most recent one.
    pub last: Option<Duration>,
    /// Sum of all durations.
    pub total: Duration,
}

#[derive(Debug)]
struct PlayerDb {
    save: SaveId,
    store: BlobStore,
}

/// An open world.
#[derive(Debug)]
pub struct World {
    info: WorldInfo,
    folder: PathBuf,
    storage: StorageConfig,
    active: ActiveSaveContext,
    loose: LooseFileStore,
    map_db: Option<BlobStore>,
    player_db: Option<PlayerDb>,
    save_tx_start: Option<Instant>,
    stats: SaveStats,
}

impl World {
    /// Open a session over `folder`, creating the folder if needed.
    ///
    /// V2 worlds open (and thereby create) `map.sqlite3` immediately.
    ///
    /// # Errors
    /// Invalid storage settings, folder creation failure, or blob store
    /// open failure.
    pub fn open(info: WorldInfo, folder: impl Into<PathBuf>, storage: &StorageConfig) -> Result<Self> {
        storage.validate()?;
        let folder = folder.into();
        std::fs::create_dir_all(&folder)?;

        let map_db = match info.world_save_format {
            SaveFormat::V2 => Some(BlobStore::open(WorldInfo::map_db_path(&folder), storage)?),
            SaveFormat::V1 => None,
        };

        info!(
            world = %info.world_name,
            format = %info.world_save_format,
            folder = %folder.display(),
            "World opened"
        );

        Ok(Self {
            loose: LooseFileStore::new(&folder),
            info,
            folder,
            storage: storage.clone(),
            active: ActiveSaveContext::new(),
            map_db,
            player_db: None,
            save_tx_start: None,
            stats: SaveStats::default(),
        })
    }

    /// Open with `save` already active.
    ///
    /// # Errors
    /// See [`World::open`].
    pub fn open_as(
        info: WorldInfo,
        folder: impl Into<PathBuf>,
        storage: &StorageConfig,
        save: SaveId,
    ) -> Result<Self> {
        let mut world = Self::open(info, folder, storage)?;
        world.active.set(save);
        Ok(world)
    }

    /// World metadata.
    #[must_use]
    pub fn info(&self) -> &WorldInfo {
        &self.info
    }

    /// Mutable world metadata. The caller keeps it consistent with disk.
    pub fn info_mut(&mut self) -> &mut WorldInfo {
        &mut self.info
    }

    /// World folder.
    #[must_use]
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Backend format.
    #[must_use]
    pub fn format(&self) -> SaveFormat {
        self.info.world_save_format
    }

    /// The active save context.
    #[must_use]
    pub fn active_save(&self) -> &ActiveSaveContext {
        &self.active
    }

    /// Change the active save. An already open player database stays bound
    /// to its save and refuses further use until closed.
    pub fn set_active_save(&mut self, save: SaveId) {
        self.active.set(save);
    }

    /// Save transaction statistics.
    #[must_use]
    pub fn save_stats(&self) -> SaveStats {
        self.stats
    }

    /// Whether a save transaction is open.
    #[must_use]
    pub fn is_save_tx_open(&self) -> bool {
        self.save_tx_start.is_some()
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    fn world_route<'a>(&'a self, addr: &'a Address) -> (&'a dyn RecordStore, &'a str) {
        match &self.map_db {
            Some(db) => (db as &dyn RecordStore, addr.key.as_str()),
            None => (&self.loose as &dyn RecordStore, addr.path.as_str()),
        }
    }

    fn player_route<'a>(&'a mut self, addr: &'a Address) -> Result<(&'a dyn RecordStore, &'a str)> {
        match self.info.world_save_format {
            SaveFormat::V2 => Ok((self.player_db()? as &dyn RecordStore, addr.key.as_str())),
            SaveFormat::V1 => Ok((&self.loose as &dyn RecordStore, addr.path.as_str())),
        }
    }

    /// The player database for the active save, opening it on first use.
    fn player_db(&mut self) -> Result<&BlobStore> {
        let active = self.active.require()?.clone();
        let db = match self.player_db.take() {
            Some(db) if db.save == active => db,
            Some(db) => {
                let opened = db.save.name().to_string();
                self.player_db = Some(db);
                return Err(WorldError::SaveIdentityChanged {
                    opened,
                    active: active.name().to_string(),
                });
            }
            None => {
                let store = BlobStore::open(WorldInfo::player_db_path(&self.folder, &active), &self.storage)?;
                if self.save_tx_start.is_some() {
                    store.begin()?;
                }
                debug!(save = %active, "Player database opened");
                PlayerDb { save: active, store }
            }
        };
        Ok(&self.player_db.insert(db).store)
    }

    /// Close the player database so a different save can be made active.
    ///
    /// # Errors
    /// Returns [`WorldError::PlayerDbBusy`] while a save transaction is open.
    pub fn close_player_db(&mut self) -> Result<()> {
        if self.save_tx_start.is_some() {
            if let Some(db) = &self.player_db {
                return Err(WorldError::PlayerDbBusy {
                    save: db.save.name().to_string(),
                });
            }
        }
        if let Some(db) = self.player_db.take() {
            debug!(save = %db.save, "Player database closed");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Map quadrants
    // ------------------------------------------------------------------

    /// Read the map quadrant at `p`. `Ok(false)` if it was never written.
    ///
    /// # Errors
    /// Backend failure or whatever `reader` returns.
    pub fn read_map_quadrant<F>(&self, p: Tripoint, reader: F) -> Result<bool>
    where
        F: FnOnce(&mut dyn Read) -> Result<()>,
    {
        let addr = addressing::map_quadrant(p);
        if self.map_db.is_none() && self.storage.legacy_filename_fallback {
            if let Some(legacy) = &addr.legacy_path {
                if !self.loose.exists(&addr.path)? && self.loose.exists(legacy)? {
                    warn!(quadrant = %p, path = %legacy, "Reading map quadrant from legacy file name");
                    return read_with(&self.loose, legacy, reader, true);
                }
            }
        }
        let (store, key) = self.world_route(&addr);
        read_with(store, key, reader, true)
    }

    /// Write the map quadrant at `p`.
    ///
    /// # Errors
    /// Backend failure or whatever `writer` returns.
    pub fn write_map_quadrant<F>(&self, p: Tripoint, writer: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        let addr = addressing::map_quadrant(p);
        let (store, key) = self.world_route(&addr);
        write_with(store, key, writer)
    }

    /// Whether the map quadrant at `p` has been saved.
    ///
    /// # Errors
    /// Backend failure.
    pub fn map_quadrant_exists(&self, p: Tripoint) -> Result<bool> {
        let addr = addressing::map_quadrant(p);
        let (store, key) = self.world_route(&addr);
        store.exists(key)
    }

    // ------------------------------------------------------------------
    // Overmap terrain
    // ------------------------------------------------------------------

    /// Whether terrain for overmap `om` has been saved.
    ///
    /// # Errors
    /// Backend failure.
    pub fn overmap_exists(&self, om: OvermapCoord) -> Result<bool> {
        let addr = addressing::overmap_terrain(om);
        let (store, key) = self.world_route(&addr);
        store.exists(key)
    }

    /// Read terrain for overmap `om`.
    ///
    /// # Errors
    /// Backend failure or whatever `reader` returns.
    pub fn read_overmap<F>(&self, om: OvermapCoord, reader: F) -> Result<bool>
    where
        F: FnOnce(&mut dyn Read) -> Result<()>,
    {
        let addr = addressing::overmap_terrain(om);
        let (store, key) = self.world_route(&addr);
        read_with(store, key, reader, true)
    }

    /// Write terrain for overmap `om`.
    ///
    /// # Errors
    /// Backend failure or whatever `writer` returns.
    pub fn write_overmap<F>(&self, om: OvermapCoord, writer: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        let addr = addressing::overmap_terrain(om);
        let (store, key) = self.world_route(&addr);
        write_with(store, key, writer)
    }

    // ------------------------------------------------------------------
    // Player-scoped
    // ------------------------------------------------------------------

    /// Read the active save's visibility data for overmap `om`.
    ///
    /// # Errors
    /// No active save, identity mismatch, backend failure, or a `reader` error.
    pub fn read_overmap_visibility<F>(&mut self, om: OvermapCoord, reader: F) -> Result<bool>
    where
        F: FnOnce(&mut dyn Read) -> Result<()>,
    {
        let addr = addressing::overmap_visibility(om, self.active.require()?);
        let (store, key) = self.player_route(&addr)?;
        read_with(store, key, reader, true)
    }

    /// Write the active save's visibility data for overmap `om`.
    ///
    /// # Errors
    /// No active save, identity mismatch, backend failure, or a `writer` error.
    pub fn write_overmap_visibility<F>(&mut self, om: OvermapCoord, writer: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        let addr = addressing::overmap_visibility(om, self.active.require()?);
        let (store, key) = self.player_route(&addr)?;
        write_with(store, key, writer)
    }

    /// Read the active save's memory region at `p`.
    ///
    /// # Errors
    /// No active save, identity mismatch, backend failure, or a `reader` error.
    pub fn read_player_mm_quad<F>(&mut self, p: Tripoint, reader: F) -> Result<bool>
    where
        F: FnOnce(&mut dyn Read) -> Result<()>,
    {
        let addr = addressing::memory_region(p, self.active.require()?);
        let (store, key) = self.player_route(&addr)?;
        read_with(store, key, reader, true)
    }

    /// Write the active save's memory region at `p`.
    ///
    /// # Errors
    /// No active save, identity mismatch, backend failure, or a `writer` error.
    pub fn write_player_mm_quad<F>(&mut self, p: Tripoint, writer: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        let addr = addressing::memory_region(p, self.active.require()?);
        let (store, key) = self.player_route(&addr)?;
        write_with(store, key, writer)
    }

    // ------------------------------------------------------------------
    // Plain files (always loose)
    // ------------------------------------------------------------------

    /// Whether `path` (relative to the world folder) exists as a file.
    ///
    /// # Errors
    /// I/O failure.
    pub fn file_exists(&self, path: &str) -> Result<bool> {
        self.loose.exists(path)
    }

    /// Read a world-relative file.
    ///
    /// # Errors
    /// I/O failure, a missing mandatory file, or a `reader` error.
    pub fn read_from_file<F>(&self, path: &str, reader: F, optional: bool) -> Result<bool>
    where
        F: FnOnce(&mut dyn Read) -> Result<()>,
    {
        read_with(&self.loose, path, reader, optional)
    }

    /// Write a world-relative file.
    ///
    /// # Errors
    /// I/O failure or a `writer` error.
    pub fn write_to_file<F>(&self, path: &str, writer: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        write_with(&self.loose, path, writer)
    }

    /// Create a world-relative folder.
    ///
    /// # Errors
    /// I/O failure.
    pub fn assure_dir_exist(&self, path: &str) -> Result<()> {
        self.loose.ensure_dir(path)
    }

    /// Whether the active save's `<save><suffix>` file exists.
    ///
    /// # Errors
    /// No active save or I/O failure.
    pub fn player_file_exists(&self, suffix: &str) -> Result<bool> {
        let path = addressing::player_file(self.active.require()?, suffix);
        self.loose.exists(&path)
    }

    /// Read the active save's `<save><suffix>` file.
    ///
    /// # Errors
    /// No active save, I/O failure, a missing mandatory file, or a `reader` error.
    pub fn read_from_player_file<F>(&self, suffix: &str, reader: F, optional: bool) -> Result<bool>
    where
        F: FnOnce(&mut dyn Read) -> Result<()>,
    {
        let path = addressing::player_file(self.active.require()?, suffix);
        read_with(&self.loose, &path, reader, optional)
    }

    /// Write the active save's `<save><suffix>` file.
    ///
    /// # Errors
    /// No active save, I/O failure, or a `writer` error.
    pub fn write_to_player_file<F>(&self, suffix: &str, writer: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        let path = addressing::player_file(self.active.require()?, suffix);
        write_with(&self.loose, &path, writer)
    }

    // ------------------------------------------------------------------
    // Save transactions
    // ------------------------------------------------------------------

    /// Begin a save. Opens a database transaction on every open handle.
    ///
    /// # Errors
    /// Returns [`WorldError::TransactionAlreadyOpen`] if one is in flight,
    /// or a database error from `BEGIN`.
    pub fn start_save_tx(&mut self) -> Result<()> {
        if let Some(start) = self.save_tx_start {
            return Err(WorldError::TransactionAlreadyOpen {
                elapsed: start.elapsed(),
            });
        }
        if let Some(db) = &self.map_db {
            db.begin()?;
        }
        if let Some(player) = &self.player_db {
            if let Err(e) = player.store.begin() {
                if let Some(db) = &self.map_db {
                    db.rollback()?;
                }
                return Err(e);
            }
        }
        self.save_tx_start = Some(Instant::now());
        debug!(world = %self.info.world_name, "Save transaction started");
        Ok(())
    }

    /// Finish a save, committing every open handle. Returns the elapsed time.
    ///
    /// If a `COMMIT` fails while its transaction is still pending (for
    /// example `SQLITE_BUSY`), the save stays open and the call can be
    /// retried; handles that already committed are skipped on the retry.
    /// If the engine rolled the transaction back instead, the save is
    /// abandoned: remaining handles are rolled back and the session is
    /// ready for a new [`World::start_save_tx`].
    ///
    /// # Errors
    /// Returns [`WorldError::NoTransactionOpen`] without a matching
    /// [`World::start_save_tx`], or a database error from `COMMIT`.
    pub fn commit_save_tx(&mut self) -> Result<Duration> {
        let start = self.save_tx_start.ok_or(WorldError::NoTransactionOpen)?;

        let mut failure = None;
        for db in self.open_handles() {
            if !db.in_transaction() {
                continue;
            }
            if let Err(e) = db.commit() {
                failure = Some((e, db.in_transaction(), db.path().to_path_buf()));
                break;
            }
        }

        if let Some((e, still_pending, path)) = failure {
            if still_pending {
                warn!(
                    world = %self.info.world_name,
                    path = %path.display(),
                    error = %e,
                    "Commit failed; save transaction left open for retry"
                );
            } else {
                self.abandon_save_tx();
                error!(
                    world = %self.info.world_name,
                    path = %path.display(),
                    error = %e,
                    "Commit failed and was rolled back; save abandoned"
                );
            }
            return Err(e);
        }

        self.save_tx_start = None;
        let elapsed = start.elapsed();

        self.stats.committed += 1;
        self.stats.last = Some(elapsed);
        self.stats.total += elapsed;

        info!(
            world = %self.info.world_name,
            elapsed_ms = elapsed.as_millis(),
            "Save committed"
        );
        Ok(elapsed)
    }

    /// Open database handles, map database first.
    fn open_handles(&self) -> impl Iterator<Item = &BlobStore> {
        self.map_db
            .iter()
            .chain(self.player_db.iter().map(|player| &player.store))
    }

    /// Roll back whatever is still pending and forget the save.
    fn abandon_save_tx(&mut self) {
        for db in self.open_handles() {
            if db.in_transaction() {
                if let Err(e) = db.rollback() {
                    warn!(path = %db.path().display(), error = %e, "Rollback failed");
                }
            }
        }
        self.save_tx_start = None;
    }
}

impl Drop for World {
    fn drop(&mut self) {
        if let Some(start) = self.save_tx_start {
            error!(
                world = %self.info.world_name,
                open_for_ms = start.elapsed().as_millis(),
                "World closed with a save transaction still open; uncommitted data is discarded"
            );
        }
    }
}
