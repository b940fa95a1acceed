//! One-shot conversion of a loose-file (V1) world folder into the
//! compressed blob layout (V2).
//!
//! Every file under the source folder falls into exactly one class:
//!
//! - `maps/**.map` quadrants and `o.*` overmap terrain go into the shared
//!   `map.sqlite3`, keyed by their relative path.
//! - `<save>.seen.*` and `<save>.mm1/*` go into `<save>.sqlite3`, keyed the
//!   way the runtime accessors key them.
//! - Anything else is copied byte for byte to the same relative path.
//!   Files whose names are not UTF-8 are copied this way too.
//!
//! Older worlds may name a save by its plain name (`Alice.sav`,
//! `Alice.seen.0.0`). A prefix is treated as such a legacy save when a
//! matching `<prefix>.sav` sits in the world folder; its plain files are
//! renamed to the encoded token so the save resolves after conversion.
//!
//! The whole map database is filled inside one transaction. Player databases
//! are opened as their save first appears in the walk and committed when the
//! walk moves to a different save. Any failure aborts the run; open handles
//! are dropped and their uncommitted rows discarded, but plain files already
//! copied stay behind. Re-running over a finished destination is refused.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::addressing::{
    MAP_DB_FILE, MAP_QUADRANT_EXT, MAPS_DIR, MEMORY_REGION_MARKER, OVERMAP_TERRAIN_PREFIX,
    VISIBILITY_MARKER,
};
use crate::config::StorageConfig;
use crate::error::{Result, WorldError};
use crate::save_id::{ENCODED_SENTINEL, SaveId};
use crate::store::{BlobStore, RecordStore};
use crate::world_info::{SAVE_FILE_EXT, WorldInfo};

/// What a migration run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Map quadrant rows written to `map.sqlite3`.
    pub quadrant_rows: usize,
    /// Overmap terrain rows written to `map.sqlite3`.
    pub overmap_rows: usize,
    /// Rows written per player database, by encoded save id.
    pub player_rows: BTreeMap<String, usize>,
    /// Files copied unchanged.
    pub plain_files: usize,
    /// Plain files of legacy saves copied under their encoded token.
    pub renamed_files: usize,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

impl MigrationReport {
    /// Rows in the shared map database.
    #[must_use]
    pub fn map_rows(&self) -> usize {
        self.quadrant_rows + self.overmap_rows
    }
}

/// How one source file is migrated.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathClass<'a> {
    MapQuadrant,
    OvermapTerrain,
    Player { token: &'a str, key: &'a str },
    Plain,
}

fn classify(rel: &str) -> PathClass<'_> {
    if rel.starts_with(MAPS_DIR)
        && rel[MAPS_DIR.len()..].starts_with('/')
        && rel.ends_with(MAP_QUADRANT_EXT)
    {
        return PathClass::MapQuadrant;
    }
    if rel.starts_with(OVERMAP_TERRAIN_PREFIX) && !rel.contains('/') {
        return PathClass::OvermapTerrain;
    }
    let Some(dot) = rel.find('.') else {
        return PathClass::Plain;
    };
    let token = &rel[..dot];
    if token.is_empty() || token.contains('/') {
        return PathClass::Plain;
    }
    if let Some(i) = rel.find(MEMORY_REGION_MARKER) {
        return PathClass::Player {
            token,
            key: &rel[i + MEMORY_REGION_MARKER.len()..],
        };
    }
    if rel[dot..].starts_with(VISIBILITY_MARKER) && !rel.contains('/') {
        return PathClass::Player {
            token,
            key: &rel[dot..],
        };
    }
    PathClass::Plain
}

/// `rel` with `/` separators, or `None` if a component is not UTF-8.
fn relative_key(rel: &Path) -> Result<Option<String>> {
    let mut parts = Vec::new();
    for component in rel.components() {
        let Component::Normal(part) = component else {
            return Err(WorldError::Migration(format!("unexpected path component in {}", rel.display())));
        };
        let Some(part) = part.to_str() else {
            return Ok(None);
        };
        parts.push(part);
    }
    Ok(Some(parts.join("/")))
}

/// Plain-name save prefixes: stems of `*.sav` files without the sentinel.
///
/// Names containing `.` are left out; their prefix cannot be told apart
/// from the rest of a file name.
fn legacy_save_prefixes(source: &Path) -> Result<BTreeSet<String>> {
    let mut prefixes = BTreeSet::new();
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(SAVE_FILE_EXT)) else {
            continue;
        };
        if !stem.is_empty() && !stem.starts_with(ENCODED_SENTINEL) && !stem.contains('.') {
            prefixes.insert(stem.to_string());
        }
    }
    Ok(prefixes)
}

/// `rel` with a legacy save prefix swapped for its encoded token.
fn encoded_rel(rel: &str, legacy: &BTreeSet<String>) -> Option<String> {
    let dot = rel.find('.')?;
    let prefix = &rel[..dot];
    if !legacy.contains(prefix) {
        return None;
    }
    Some(format!("{}{}", SaveId::from_name(prefix).encoded(), &rel[dot..]))
}

struct OpenPlayer {
    save: SaveId,
    store: BlobStore,
    rows: usize,
}

impl OpenPlayer {
    fn finish(self, report: &mut MigrationReport) -> Result<()> {
        self.store.commit()?;
        *report
            .player_rows
            .entry(self.save.encoded().to_string())
            .or_default() += self.rows;
        debug!(save = %self.save, rows = self.rows, "Player database migrated");
        Ok(())
    }
}

/// Copy the V1 world at `source` into a V2 layout at `destination`.
///
/// The destination folder is created if needed. `source` is only read. The
/// caller is responsible for keeping a backup of `source`.
///
/// # Errors
/// [`WorldError::Migration`] if preconditions fail; otherwise the first I/O,
/// database or codec error encountered, which aborts the run.
pub fn migrate_v1_to_v2(
    source: &Path,
    destination: &Path,
    storage: &StorageConfig,
) -> Result<MigrationReport> {
    let start = Instant::now();
    storage.validate()?;

    if !source.is_dir() {
        return Err(WorldError::Migration(format!(
            "source {} is not a folder",
            source.display()
        )));
    }
    std::fs::create_dir_all(destination)?;
    if destination.canonicalize()?.starts_with(source.canonicalize()?) {
        return Err(WorldError::Migration(
            "destination must not be inside the source folder".to_string(),
        ));
    }
    let map_db_path = WorldInfo::map_db_path(destination);
    if map_db_path.exists() {
        return Err(WorldError::Migration(format!(
            "{} already exists in {}",
            MAP_DB_FILE,
            destination.display()
        )));
    }

    info!(
        source = %source.display(),
        destination = %destination.display(),
        "Migrating world to V2"
    );

    let map_db = BlobStore::open(&map_db_path, storage)?;
    map_db.begin()?;

    let mut report = MigrationReport::default();
    let mut player: Option<OpenPlayer> = None;

    let legacy = legacy_save_prefixes(source)?;
    if !legacy.is_empty() {
        debug!(saves = legacy.len(), "Found saves with plain-name prefixes");
    }

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel_path = entry.path().strip_prefix(source).map_err(|_| {
            WorldError::Migration(format!("{} escapes the source folder", entry.path().display()))
        })?;
        let Some(rel) = relative_key(rel_path)? else {
            warn!(file = %rel_path.display(), "Non UTF-8 file name, copying as plain file");
            copy_plain(entry.path(), destination, rel_path)?;
            report.plain_files += 1;
            continue;
        };

        match classify(&rel) {
            PathClass::MapQuadrant => {
                map_db.write(&rel, &std::fs::read(entry.path())?)?;
                report.quadrant_rows += 1;
            }
            PathClass::OvermapTerrain => {
                map_db.write(&rel, &std::fs::read(entry.path())?)?;
                report.overmap_rows += 1;
            }
            PathClass::Player { token, key } => {
                let save = match SaveId::from_encoded(token) {
                    Ok(save) => save,
                    Err(e) => {
                        warn!(file = %rel, error = %e, "Unrecognized save prefix, copying as plain file");
                        copy_plain(entry.path(), destination, rel_path)?;
                        report.plain_files += 1;
                        continue;
                    }
                };
                let current = match player.take() {
                    Some(open) if open.save == save => open,
                    previous => {
                        if let Some(done) = previous {
                            done.finish(&mut report)?;
                        }
                        let store =
                            BlobStore::open(WorldInfo::player_db_path(destination, &save), storage)?;
                        store.begin()?;
                        OpenPlayer { save, store, rows: 0 }
                    }
                };
                let current = player.insert(current);
                current.store.write(key, &std::fs::read(entry.path())?)?;
                current.rows += 1;
            }
            PathClass::Plain => match encoded_rel(&rel, &legacy) {
                Some(renamed) => {
                    debug!(file = %rel, to = %renamed, "Renaming legacy save file");
                    copy_plain(entry.path(), destination, Path::new(&renamed))?;
                    report.renamed_files += 1;
                }
                None => {
                    copy_plain(entry.path(), destination, rel_path)?;
                    report.plain_files += 1;
                }
            },
        }
        debug!(file = %rel, "Migrated");
    }

    if let Some(done) = player.take() {
        done.finish(&mut report)?;
    }
    map_db.commit()?;

    report.elapsed = start.elapsed();
    info!(
        quadrants = report.quadrant_rows,
        overmaps = report.overmap_rows,
        players = report.player_rows.len(),
        plain_files = report.plain_files,
        renamed_files = report.renamed_files,
        elapsed_ms = report.elapsed.as_millis(),
        "World migrated to V2"
    );
    Ok(report)
}

fn copy_plain(from: &Path, destination: &Path, rel: &Path) -> Result<()> {
    let to: PathBuf = destination.join(rel);
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from, &to)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(classify("maps/0.0.0/0.0.0.map"), PathClass::MapQuadrant);
        assert_eq!(classify("maps/0.0.0/readme.txt"), PathClass::Plain);
        assert_eq!(classify("mapsfoo/0.0.0.map"), PathClass::Plain);
        assert_eq!(classify("o.0.-1"), PathClass::OvermapTerrain);
        assert_eq!(
            classify("#QWxpY2U.seen.0.-1"),
            PathClass::Player {
                token: "#QWxpY2U",
                key: ".seen.0.-1"
            }
        );
        assert_eq!(
            classify("#QWxpY2U.mm1/1.2.0.mmr"),
            PathClass::Player {
                token: "#QWxpY2U",
                key: "1.2.0.mmr"
            }
        );
        assert_eq!(classify("#QWxpY2U.sav"), PathClass::Plain);
        assert_eq!(classify("worldoptions.json"), PathClass::Plain);
        assert_eq!(classify("uistate"), PathClass::Plain);
    }

    #[test]
    fn relative_keys_use_forward_slashes() {
        let rel = Path::new("maps").join("0.0.0").join("1.1.0.map");
        assert_eq!(
            relative_key(&rel).expect("rel").as_deref(),
            Some("maps/0.0.0/1.1.0.map")
        );
    }

    fn write(root: &Path, rel: &str, data: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, data).expect("write");
    }

    #[test]
    fn migrates_each_class() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("old");
        let dst = dir.path().join("new");
        let alice = SaveId::from_name("Alice");
        let bob = SaveId::from_name("Bob");

        write(&src, "maps/0.0.0/0.0.0.map", br#"{"ter":"t_grass"}"#);
        write(&src, "maps/0.0.0/1.0.0.map", br#"{"ter":"t_dirt"}"#);
        write(&src, "o.0.0", b"overmap");
        write(&src, &format!("{}.seen.0.0", alice.encoded()), b"alice seen");
        write(&src, &format!("{}.mm1/0.0.0.mmr", alice.encoded()), b"alice mm");
        write(&src, &format!("{}.mm1/0.0.0.mmr", bob.encoded()), b"bob mm");
        write(&src, &format!("{}.sav", alice.encoded()), b"{}");
        write(&src, "worldoptions.json", b"[]");

        let report = migrate_v1_to_v2(&src, &dst, &StorageConfig::default()).expect("migrate");
        assert_eq!(report.quadrant_rows, 2);
        assert_eq!(report.overmap_rows, 1);
        assert_eq!(report.map_rows(), 3);
        assert_eq!(report.plain_files, 2);
        assert_eq!(report.player_rows.len(), 2);
        assert_eq!(report.player_rows[alice.encoded()], 2);
        assert_eq!(report.player_rows[bob.encoded()], 1);

        let config = StorageConfig::default();
        let map = BlobStore::open(dst.join(MAP_DB_FILE), &config).expect("map db");
        assert_eq!(map.row_count().expect("count"), 3);
        assert_eq!(
            map.read("maps/0.0.0/1.0.0.map").expect("read").as_deref(),
            Some(&br#"{"ter":"t_dirt"}"#[..])
        );

        let alice_db = BlobStore::open(WorldInfo::player_db_path(&dst, &alice), &config).expect("db");
        assert_eq!(
            alice_db.keys().expect("keys"),
            vec![".seen.0.0".to_string(), "0.0.0.mmr".to_string()]
        );

        assert!(dst.join(format!("{}.sav", alice.encoded())).is_file());
        assert!(dst.join("worldoptions.json").is_file());
        assert!(!dst.join("o.0.0").exists());
        assert!(src.join("o.0.0").is_file(), "source untouched");
    }

    #[test]
    fn refuses_second_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("old");
        let dst = dir.path().join("new");
        write(&src, "o.0.0", b"overmap");
        migrate_v1_to_v2(&src, &dst, &StorageConfig::default()).expect("first");
        let err = migrate_v1_to_v2(&src, &dst, &StorageConfig::default()).expect_err("second");
        assert!(matches!(err, WorldError::Migration(_)));
    }

    #[test]
    fn refuses_same_folder_and_missing_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("old");
        write(&src, "o.0.0", b"overmap");
        assert!(matches!(
            migrate_v1_to_v2(&src, &src, &StorageConfig::default()),
            Err(WorldError::Migration(_))
        ));
        assert!(matches!(
            migrate_v1_to_v2(&dir.path().join("nope"), &dir.path().join("x"), &StorageConfig::default()),
            Err(WorldError::Migration(_))
        ));
    }

    #[test]
    fn undecodable_prefix_is_copied_plain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("old");
        let dst = dir.path().join("new");
        write(&src, "#!!!.seen.0.0", b"odd");
        let report = migrate_v1_to_v2(&src, &dst, &StorageConfig::default()).expect("migrate");
        assert_eq!(report.plain_files, 1);
        assert!(report.player_rows.is_empty());
        assert!(dst.join("#!!!.seen.0.0").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_copied_plain() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("old");
        let dst = dir.path().join("new");
        write(&src, "maps/0.0.0/0.0.0.map", b"quad");
        let odd = OsStr::from_bytes(b"zz\xff");
        std::fs::write(src.join(odd), b"stray").expect("odd file");

        let report = migrate_v1_to_v2(&src, &dst, &StorageConfig::default()).expect("migrate");
        assert_eq!(report.quadrant_rows, 1);
        assert_eq!(report.plain_files, 1);
        assert_eq!(std::fs::read(dst.join(odd)).expect("copied"), b"stray");
    }

    #[test]
    fn plain_name_saves_move_to_encoded_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("old");
        let dst = dir.path().join("new");
        let alice = SaveId::from_name("Alice");

        write(&src, "Alice.sav", b"{}");
        write(&src, "Alice.apu.json", b"[]");
        write(&src, "Alice.seen.0.0", b"seen");
        write(&src, "Alice.mm1/0.0.0.mmr", b"mm");
        write(&src, "worldoptions.json", b"[]");
        write(&src, "Mr. Smith.sav", b"{}");

        let report = migrate_v1_to_v2(&src, &dst, &StorageConfig::default()).expect("migrate");
        assert_eq!(report.renamed_files, 2);
        assert_eq!(report.plain_files, 2);
        assert_eq!(report.player_rows[alice.encoded()], 2);

        assert!(dst.join(format!("{}.sav", alice.encoded())).is_file());
        assert!(dst.join(format!("{}.apu.json", alice.encoded())).is_file());
        assert!(!dst.join("Alice.sav").exists());
        assert!(dst.join("worldoptions.json").is_file());
        assert!(dst.join("Mr. Smith.sav").is_file());

        let info = WorldInfo::load(&dst).expect("load");
        assert!(info.has_save(&alice));
    }
}
