//! Sisync - copy analytics artifacts from one environment to another.
//!
//! Loads a source and a target environment file, runs one migration and
//! prints the JSON summary to stdout. Exits non-zero when any item failed.

mod commands;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use commands::Command;

#[derive(Parser, Debug)]
#[command(name = "sisync")]
#[command(about = "Migrate users, groups, dashboards and data models between environments")]
pub struct Args {
    /// Source environment YAML file
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Target environment YAML file
    #[arg(long, global = true)]
    target: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Items per batch for "--all" runs
    #[arg(long, global = true, default_value_t = sisync_core::MigrationConfig::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Seconds to pause between batches
    #[arg(long, global = true, default_value_t = sisync_core::MigrationConfig::DEFAULT_SLEEP_TIME.as_secs())]
    sleep_secs: u64,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("Starting sisync {}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(commands::run(args))
}
