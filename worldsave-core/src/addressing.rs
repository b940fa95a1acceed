//! Pure functions from logical save domains to record addresses.
//!
//! Both backends share one string format. An [`Address`] carries the blob
//! store key and the loose-file path (relative to the world folder) for the
//! same record; for world-scoped records the two are identical.
//!
//! | Domain | Key | Loose path |
//! |---|---|---|
//! | Map quadrant | `maps/<seg>/<x>.<y>.<z>.map` | same |
//! | Overmap terrain | `o.<x>.<y>` | same |
//! | Overmap visibility | `.seen.<x>.<y>` | `<save>.seen.<x>.<y>` |
//! | Memory region | `<x>.<y>.<z>.mmr` | `<save>.mm1/<x>.<y>.<z>.mmr` |

use crate::coords::{OvermapCoord, Tripoint};
use crate::save_id::SaveId;

/// Folder holding map segments.
pub const MAPS_DIR: &str = "maps";
/// Extension of map quadrant records.
pub const MAP_QUADRANT_EXT: &str = ".map";
/// Prefix of overmap terrain records.
pub const OVERMAP_TERRAIN_PREFIX: &str = "o.";
/// Marker of per-player overmap visibility records.
pub const VISIBILITY_MARKER: &str = ".seen.";
/// Marker of the per-player memory region folder.
pub const MEMORY_REGION_MARKER: &str = ".mm1/";
/// Extension of memory region records.
pub const MEMORY_REGION_EXT: &str = ".mmr";
/// Shared map/overmap database file name.
pub const MAP_DB_FILE: &str = "map.sqlite3";
/// Extension of per-player database files.
pub const PLAYER_DB_EXT: &str = ".sqlite3";

/// Where one logical record lives in each backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Blob store key.
    pub key: String,
    /// Path relative to the world folder, `/`-separated.
    pub path: String,
    /// Read-only alternate path produced by old saves, if it differs.
    pub legacy_path: Option<String>,
}

impl Address {
    fn same(key: String) -> Self {
        Self {
            path: key.clone(),
            key,
            legacy_path: None,
        }
    }
}

fn dotted(p: Tripoint) -> String {
    format!("{}.{}.{}", p.x, p.y, p.z)
}

/// Format `n` with `,` thousands separators, as a locale-aware stream did
/// when writing some very old map files.
fn grouped(n: i32) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn grouped_dotted(p: Tripoint) -> String {
    format!("{}.{}.{}", grouped(p.x), grouped(p.y), grouped(p.z))
}

/// Address of the map quadrant at `p`.
#[must_use]
pub fn map_quadrant(p: Tripoint) -> Address {
    let seg = p.segment();
    let key = format!("{MAPS_DIR}/{}/{}{MAP_QUADRANT_EXT}", dotted(seg), dotted(p));
    let legacy = format!(
        "{MAPS_DIR}/{}/{}{MAP_QUADRANT_EXT}",
        grouped_dotted(seg),
        grouped_dotted(p)
    );
    Address {
        legacy_path: (legacy != key).then_some(legacy),
        path: key.clone(),
        key,
    }
}

/// Folder of the segment containing `p`, relative to the world folder.
#[must_use]
pub fn map_segment_dir(p: Tripoint) -> String {
    format!("{MAPS_DIR}/{}", dotted(p.segment()))
}

/// Address of the shared terrain record for overmap `om`.
#[must_use]
pub fn overmap_terrain(om: OvermapCoord) -> Address {
    Address::same(format!("{OVERMAP_TERRAIN_PREFIX}{}.{}", om.x, om.y))
}

/// Address of `save`'s visibility record for overmap `om`.
#[must_use]
pub fn overmap_visibility(om: OvermapCoord, save: &SaveId) -> Address {
    let key = format!("{VISIBILITY_MARKER}{}.{}", om.x, om.y);
    Address {
        path: format!("{}{key}", save.encoded()),
        key,
        legacy_path: None,
    }
}

/// Address of `save`'s memory region at `p`.
#[must_use]
pub fn memory_region(p: Tripoint, save: &SaveId) -> Address {
    let key = format!("{}{MEMORY_REGION_EXT}", dotted(p));
    Address {
        path: format!("{}{MEMORY_REGION_MARKER}{key}", save.encoded()),
        key,
        legacy_path: None,
    }
}

/// Loose path of a player file such as `<save>.sav`.
#[must_use]
pub fn player_file(save: &SaveId, suffix: &str) -> String {
    format!("{}{suffix}", save.encoded())
}

/// File name of `save`'s player database.
#[must_use]
pub fn player_db_file(save: &SaveId) -> String {
    player_file(save, PLAYER_DB_EXT)
}

/// Directory-like prefix of a key; empty for top-level keys.
#[must_use]
pub fn parent_of(key: &str) -> &str {
    key.rfind('/').map_or("", |i| &key[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_quadrant_layout() {
        let addr = map_quadrant(Tripoint::new(0, 0, 0));
        assert_eq!(addr.key, "maps/0.0.0/0.0.0.map");
        assert_eq!(addr.path, addr.key);
        assert!(addr.legacy_path.is_none());

        let addr = map_quadrant(Tripoint::new(-1, 40, 2));
        assert_eq!(addr.key, "maps/-1.1.2/-1.40.2.map");
        assert_eq!(map_segment_dir(Tripoint::new(-1, 40, 2)), "maps/-1.1.2");
    }

    #[test]
    fn legacy_path_only_for_large_coordinates() {
        let addr = map_quadrant(Tripoint::new(1234, -56789, 0));
        assert_eq!(addr.key, "maps/38.-1775.0/1234.-56789.0.map");
        assert_eq!(
            addr.legacy_path.as_deref(),
            Some("maps/38.-1,775.0/1,234.-56,789.0.map")
        );
        assert!(map_quadrant(Tripoint::new(999, -999, 0)).legacy_path.is_none());
    }

    #[test]
    fn grouping() {
        assert_eq!(grouped(0), "0");
        assert_eq!(grouped(100), "100");
        assert_eq!(grouped(1000), "1,000");
        assert_eq!(grouped(-1_234_567), "-1,234,567");
        assert_eq!(grouped(i32::MIN), "-2,147,483,648");
    }

    #[test]
    fn overmap_addresses() {
        let terrain = overmap_terrain(OvermapCoord::new(3, -4));
        assert_eq!(terrain.key, "o.3.-4");
        assert_eq!(terrain.path, "o.3.-4");

        let save = SaveId::from_name("Alice");
        let seen = overmap_visibility(OvermapCoord::new(3, -4), &save);
        assert_eq!(seen.key, ".seen.3.-4");
        assert_eq!(seen.path, format!("{}.seen.3.-4", save.encoded()));
        assert_ne!(seen.key, terrain.key);
    }

    #[test]
    fn memory_region_address() {
        let save = SaveId::from_name("Alice");
        let addr = memory_region(Tripoint::new(1, 2, -1), &save);
        assert_eq!(addr.key, "1.2.-1.mmr");
        assert_eq!(addr.path, format!("{}.mm1/1.2.-1.mmr", save.encoded()));
    }

    #[test]
    fn parents() {
        assert_eq!(parent_of("maps/0.0.0/0.0.0.map"), "maps/0.0.0");
        assert_eq!(parent_of("o.0.0"), "");
        assert_eq!(parent_of(".seen.1.1"), "");
    }

    #[test]
    fn player_files() {
        let save = SaveId::from_name("Bob");
        assert_eq!(player_file(&save, ".sav"), format!("{}.sav", save.encoded()));
        assert_eq!(player_db_file(&save), format!("{}.sqlite3", save.encoded()));
    }
}
