//! Ground-failure model runner.
//!
//! Runs one or more logistic model configurations against a ShakeMap grid
//! and writes a JSON summary of every output. A failing configuration is
//! reported and the remaining ones still run.

mod config;
mod runner;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use gfail_common::BoundingBox;
use grid_store::StoreConfig;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::{Area, RunnerConfig, Zoom};

#[derive(Parser, Debug)]
#[command(name = "gfail-runner")]
#[command(about = "Run logistic ground-failure models for one earthquake")]
struct Args {
    /// Model configuration files (YAML)
    #[arg(short, long = "config", required = true, num_args = 1..)]
    configs: Vec<PathBuf>,

    /// ShakeMap grid.xml
    #[arg(short, long, default_value = "grid.xml")]
    shakefile: PathBuf,

    /// ShakeMap uncertainty.xml (defaults to one next to the shakefile)
    #[arg(short, long)]
    uncertfile: Option<PathBuf>,

    /// Standard deviations of ground motion for the min/max outputs
    #[arg(long = "std", default_value = "1.0")]
    numstd: f64,

    /// Model bounds: lonmin,lonmax,latmin,latmax
    #[arg(short, long, value_parser = parse_bounds, conflicts_with = "zoom")]
    bounds: Option<BoundingBox>,

    /// Zoom to where a shaking field exceeds a threshold, e.g. pga,2.0
    #[arg(short, long)]
    zoom: Option<Zoom>,

    /// Echo aligned inputs into the outputs
    #[arg(long)]
    save_inputs: bool,

    /// Base directory for relative layer paths
    #[arg(long, env = "GFAIL_DATA_PATH")]
    data_path: Option<PathBuf>,

    /// Parent directory for spilled layers
    #[arg(long, env = "GFAIL_SPILL_DIR")]
    spill_dir: Option<PathBuf>,

    /// Keep aligned layers in memory instead of spilling to disk
    #[arg(long)]
    memory_store: bool,

    /// Keep spilled layers after the run
    #[arg(long)]
    keep_temp: bool,

    /// Rows per evaluation tile
    #[arg(long, env = "GFAIL_ROW_CHUNK", default_value = "300")]
    row_chunk: usize,

    /// Columns per evaluation tile (whole rows if unset)
    #[arg(long, env = "GFAIL_COL_CHUNK")]
    col_chunk: Option<usize>,

    /// Per-model time limit in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Only validate the configurations
    #[arg(long)]
    check: bool,

    /// Write the JSON summary here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log as JSON
    #[arg(long)]
    log_json: bool,
}

fn parse_bounds(s: &str) -> Result<BoundingBox, String> {
    BoundingBox::from_arg_string(s).map_err(|e| e.to_string())
}

impl Args {
    fn into_config(self) -> RunnerConfig {
        let mut store = if self.memory_store {
            StoreConfig::memory()
        } else {
            StoreConfig::from_env()
        };
        if self.spill_dir.is_some() {
            store.spill_dir = self.spill_dir;
        }

        let area = match (self.bounds, self.zoom) {
            (Some(bounds), _) => Area::Bounds(bounds),
            (None, Some(zoom)) => Area::Zoom(zoom),
            (None, None) => Area::Full,
        };

        RunnerConfig {
            configs: self.configs,
            shakefile: self.shakefile,
            uncertfile: self.uncertfile,
            numstd: self.numstd,
            area,
            save_inputs: self.save_inputs,
            data_path: self.data_path,
            store,
            keep_temp: self.keep_temp,
            row_chunk: Some(self.row_chunk),
            col_chunk: self.col_chunk,
            timeout: self.timeout_secs.map(Duration::from_secs),
            check_only: self.check,
            output: self.output,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);
    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let config = args.into_config();
    if let Err(e) = config.validate() {
        bail!("Invalid arguments: {e}");
    }

    info!(
        configs = config.configs.len(),
        shakefile = %config.shakefile.display(),
        backend = config.store.backend.as_str(),
        "Starting ground-failure runner"
    );

    let summary = if config.check_only {
        runner::check(&config)
    } else {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            warn!("Received interrupt, stopping after the current layer");
            flag.store(true, Ordering::Relaxed);
        });
        runner::run(&config, cancel).await?
    };

    let json = serde_json::to_string_pretty(&summary)?;
    match &config.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote summary");
        }
        None => println!("{json}"),
    }

    if !summary.report.is_success() {
        bail!("{} of {} model configurations failed", summary.report.failed.len(), config.configs.len());
    }
    Ok(())
}
