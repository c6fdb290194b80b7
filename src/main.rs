mod config;
mod coord;
mod database;
mod error;
mod grid;
mod loader;
mod lock;
mod pbf_writer;
mod query;
mod region;
mod storage;
mod tagcodec;
mod tags;
mod wayblock;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Config;
use crate::database::Database;
use crate::lock::DatabaseLock;
use crate::query::BBox;
use crate::region::Backing;

#[derive(Parser, Debug)]
#[command(author, version, about = "Single-host geographic storage engine for OSM data", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "vex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load an OSM protocol-buffer dump into the database, overwriting
    /// any previously loaded data.
    Load {
        /// Database directory, or the literal `memory` for process-local
        /// shared-memory backing.
        database_dir: String,
        /// Path to the input .osm.pbf file.
        input: PathBuf,
    },
    /// Query a bounding box and write the matched nodes/ways to out.pbf.
    Query {
        database_dir: String,
        min_lat: f64,
        min_lon: f64,
        max_lat: f64,
        max_lon: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config::from_file(&args.config)?;

    match args.command {
        Command::Load {
            database_dir,
            input,
        } => run_load(config, &database_dir, &input),
        Command::Query {
            database_dir,
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        } => run_query(config, &database_dir, min_lat, min_lon, max_lat, max_lon),
    }
}

fn run_load(config: Config, database_dir: &str, input: &PathBuf) -> Result<()> {
    let lock_path = config.runtime.lock_path.clone();
    let _lock = DatabaseLock::acquire_exclusive(&lock_path)
        .with_context(|| format!("Failed to acquire exclusive lock at {lock_path}"))?;

    let backing = Backing::from_cli_arg(database_dir);
    let report_fill_factor = config.runtime.report_fill_factor;
    let mut db = Database::open(backing, config).context("Failed to open database")?;

    info!(input = %input.display(), "loading");
    loader::load(&mut db, input).context("Load failed")?;

    if report_fill_factor {
        let fill = db.fill_factor();
        info!(
            used_cells = fill.used_cells,
            total_cells = fill.total_cells,
            percent = fill.percent(),
            "grid fill factor"
        );
    }
    Ok(())
}

fn run_query(
    config: Config,
    database_dir: &str,
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
) -> Result<()> {
    let lock_path = config.runtime.lock_path.clone();
    let _lock = DatabaseLock::acquire_shared(&lock_path)
        .with_context(|| format!("Failed to acquire shared lock at {lock_path}"))?;

    let backing = Backing::from_cli_arg(database_dir);
    let mut db = Database::open(backing, config).context("Failed to open database")?;

    let bbox = BBox {
        min_lat,
        min_lon,
        max_lat,
        max_lon,
    };
    let output_path = PathBuf::from("out.pbf");
    query::query(&mut db, &bbox, &output_path).context("Query failed")?;
    info!(output = %output_path.display(), "query complete");
    Ok(())
}
