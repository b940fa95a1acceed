//! `worldsave`: operator commands for a folder of world saves.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use worldsave_core::store::BlobStore;
use worldsave_core::{SaveFormat, WorldDirectory, WorldInfo, WorldsaveConfig};

#[derive(Debug, Parser)]
#[command(name = "worldsave", version, about = "Manage roguelike world save folders")]
struct Cli {
    /// Folder containing one sub-folder per world.
    #[arg(long, env = "WORLDSAVE_ROOT", default_value = "save")]
    root: PathBuf,

    /// TOML configuration file.
    #[arg(long, env = "WORLDSAVE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List all worlds.
    List,
    /// Create an empty world.
    Create {
        /// World name, also its folder name.
        name: String,
        /// Storage format; defaults to the configured one.
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Show a world's metadata.
    Info {
        /// World name.
        name: String,
    },
    /// Delete a world and its folder.
    Delete {
        /// World name.
        name: String,
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Convert a loose-file world to the SQLite format, keeping a backup.
    Convert {
        /// World name.
        name: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    V1,
    V2,
}

impl From<FormatArg> for SaveFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::V1 => SaveFormat::V1,
            FormatArg::V2 => SaveFormat::V2,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => WorldsaveConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => WorldsaveConfig::default(),
    };
    config.storage.validate().context("invalid storage config")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(root = %cli.root.display(), "Starting");
    let worlds = WorldDirectory::new(&cli.root, config);

    match cli.command {
        Command::List => {
            for name in worlds.list_worlds().context("listing worlds")? {
                let info = worlds.get_world(&name)?;
                println!(
                    "{name}\t{}\t{} save(s)",
                    info.world_save_format,
                    info.world_saves().len()
                );
            }
        }
        Command::Create { name, format } => {
            let info = worlds
                .create_world(&name, format.map(SaveFormat::from))
                .with_context(|| format!("creating world '{name}'"))?;
            println!("created {} ({})", info.world_name, info.world_save_format);
        }
        Command::Info { name } => print_info(&worlds, &name)?,
        Command::Delete { name, yes } => {
            if !yes {
                bail!("refusing to delete '{name}' without --yes");
            }
            worlds
                .delete_world(&name)
                .with_context(|| format!("deleting world '{name}'"))?;
            println!("deleted {name}");
        }
        Command::Convert { name } => {
            let report = worlds.convert_world(&name).with_context(|| {
                format!("converting world '{name}'; the original folder is kept as a backup")
            })?;
            println!(
                "converted {name}: {} quadrant(s), {} overmap(s), {} player database(s), {} plain file(s), {} renamed in {:.2?}",
                report.quadrant_rows,
                report.overmap_rows,
                report.player_rows.len(),
                report.plain_files,
                report.renamed_files,
                report.elapsed
            );
        }
    }
    Ok(())
}

fn print_info(worlds: &WorldDirectory, name: &str) -> anyhow::Result<()> {
    let info = worlds
        .get_world(name)
        .with_context(|| format!("loading world '{name}'"))?;
    println!("name:    {}", info.world_name);
    println!("format:  {}", info.world_save_format);
    println!("mods:    {}", info.active_mod_order.join(", "));
    println!("saves:");
    for save in info.world_saves() {
        println!("  {save} ({})", save.encoded());
    }
    println!("options:");
    for (key, option) in &info.world_options {
        println!("  {key} = {} (default {})", option.value, option.default);
    }
    if info.world_save_format == SaveFormat::V2 {
        let folder = info.folder_path(worlds.root());
        let db = BlobStore::open(WorldInfo::map_db_path(&folder), &worlds.config().storage)?;
        println!("map rows: {}", db.row_count()?);
    }
    Ok(())
}
