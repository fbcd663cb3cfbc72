//! Metalog: operator tool for a metadata journal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metalog_core::{Config, LogFormat};
use metalog_journal::{LocalSegmentStore, SegmentStore};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;
mod commands;

use cli::{Cli, Commands, InspectArgs, JournalArgs, OutputFormat, PruneArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect(args) => run_inspect(args),
        Commands::Dump(args) => run_dump(args),
        Commands::Prune(args) => run_prune(args),
        Commands::Version => {
            println!("metalog {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let config = setup(&args.journal.config, args.journal.path)?;
    let store: Arc<dyn SegmentStore> = Arc::new(LocalSegmentStore::new());
    let summary = commands::inspect(store, &config.journal.path, args.journal.start)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!("Journal:             {}", config.journal.path.display());
            println!("Last transaction id: {}", summary.last_transaction_id);
            println!("Segments replayed:   {}", summary.segments_replayed);
            println!("Truncated tails:     {}", summary.truncated_tails);
            for (op_type, count) in &summary.operations {
                println!("  {op_type:<26} {count}");
            }
        }
    }
    Ok(())
}

fn run_dump(args: JournalArgs) -> Result<()> {
    let config = setup(&args.config, args.path)?;
    let store: Arc<dyn SegmentStore> = Arc::new(LocalSegmentStore::new());
    let mut stdout = std::io::stdout().lock();
    let written = commands::dump(store, &config.journal.path, args.start, &mut stdout)?;
    info!(records = written, "Dump complete");
    Ok(())
}

fn run_prune(args: PruneArgs) -> Result<()> {
    let config = setup(&args.config, args.path)?;
    let store: Arc<dyn SegmentStore> = Arc::new(LocalSegmentStore::new());
    let report = commands::prune(store, &config.journal.path, args.upto)?;

    println!("Deleted {} segment(s), {} failed", report.deleted.len(), report.failed.len());
    if !report.is_clean() {
        warn!(failed = ?report.failed, "Some segments could not be deleted");
    }
    Ok(())
}

/// Load configuration, apply the path override and initialize logging.
fn setup(config_path: &Option<PathBuf>, journal_path: Option<PathBuf>) -> Result<Config> {
    let mut config = load_config(config_path)?;
    if let Some(path) = journal_path {
        config.journal.path = path;
    }
    init_logging(&config)?;
    Ok(config)
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    Config::load(path.as_deref()).context("Failed to load configuration")
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    // Stdout carries command output.
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry().with(filter).with(fmt_layer.json()).init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
    }

    Ok(())
}
