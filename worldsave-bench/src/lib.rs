//! Fixtures shared by the worldsave benchmarks.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use worldsave_core::config::StorageConfig;
use worldsave_core::{OvermapCoord, SaveFormat, SaveId, Tripoint, World, WorldInfo};

/// A map quadrant body of roughly the size the game writes.
#[must_use]
pub fn quadrant_payload(seed: i32) -> Vec<u8> {
    let mut body = String::from(r#"{"version":33,"coordinates":["#);
    body.push_str(&format!("{seed},{},0],\"terrain\":[", seed / 2));
    for i in 0..576 {
        if i > 0 {
            body.push(',');
        }
        body.push_str(if (i + seed) % 7 == 0 { "\"t_dirt\"" } else { "\"t_grass\"" });
    }
    body.push_str("]}");
    body.into_bytes()
}

/// Open a fresh world of `format` under `root` with save "bench" active.
///
/// # Panics
/// If the world cannot be opened.
#[must_use]
pub fn open_world(root: &Path, format: SaveFormat) -> World {
    let info = WorldInfo::new("bench", format, &BTreeMap::new());
    World::open_as(info, root.join("bench"), &StorageConfig::default(), SaveId::from_name("bench"))
        .expect("open bench world")
}

/// Fill `world` with `quads` map quadrants and a handful of overmaps and
/// memory regions.
///
/// # Panics
/// On any write failure.
pub fn populate(world: &mut World, quads: i32) {
    world.start_save_tx().expect("start");
    for i in 0..quads {
        let body = quadrant_payload(i);
        world
            .write_map_quadrant(Tripoint::new(i % 40, i / 40, 0), |w| {
                w.write_all(&body)?;
                Ok(())
            })
            .expect("quad");
    }
    for i in 0..4 {
        world
            .write_overmap(OvermapCoord::new(i, 0), |w| {
                w.write_all(b"overmap terrain")?;
                Ok(())
            })
            .expect("overmap");
        world
            .write_player_mm_quad(Tripoint::new(i, 0, 0), |w| {
                w.write_all(b"memory region")?;
                Ok(())
            })
            .expect("memory");
    }
    world.commit_save_tx().expect("commit");
}
