//! Command line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Metalog: inspect and maintain a metadata journal.
#[derive(Parser)]
#[command(name = "metalog")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Replay the journal and summarize its contents.
    Inspect(InspectArgs),
    /// Print every record as one JSON object per line.
    Dump(JournalArgs),
    /// Delete completed segments below a sequence number.
    Prune(PruneArgs),
    /// Print version information.
    Version,
}

/// Options shared by every journal command.
#[derive(Args, Debug, Clone)]
pub struct JournalArgs {
    /// Path to configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Active segment path (overrides config).
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// First completed segment to read.
    #[arg(short, long, default_value = "0")]
    pub start: u64,
}

/// Arguments for the inspect command.
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Journal location.
    #[command(flatten)]
    pub journal: JournalArgs,

    /// Output format (text, json).
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the prune command.
#[derive(Args, Debug, Clone)]
pub struct PruneArgs {
    /// Path to configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Active segment path (overrides config).
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Delete completed segments with a sequence below this number.
    #[arg(long)]
    pub upto: u64,
}

/// Output format for CLI commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
