//! Banknote CLI: cross-validated model selection from the terminal.
//!
//! Loads a labelled CSV, runs the configured grid search over stratified
//! folds, and prints the ranked results.

mod commands;
mod report;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Banknote: pick the best classifier configuration by cross-validation
#[derive(Parser, Debug)]
#[command(name = "banknote", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.banknote/config.toml`)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the cross-validated grid search over a CSV dataset
    Search {
        /// Input CSV with a header row and a label column
        #[arg(short, long)]
        input: PathBuf,

        /// Number of stratified folds (overrides config)
        #[arg(long)]
        folds: Option<usize>,

        /// Train folds concurrently
        #[arg(long)]
        parallel: bool,

        /// Write the full result table and summary as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the ROC points of the best configuration as JSON
        #[arg(long)]
        roc_out: Option<PathBuf>,

        /// Number of raw records to list (overrides config)
        #[arg(long)]
        top: Option<usize>,
    },
    /// Show class balance and per-class feature means of a CSV dataset
    Inspect {
        /// Input CSV with a header row and a label column
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "banknote", "banknote")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "banknote.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
