//! Splash CLI - ingest scattering detector images into an anonymized archive.
//!
//! Splash copies raw frames into a content-addressed archive bucketed by
//! hashed source directory, renders thumbnails next to them, and writes one
//! ordered document stream per file.
//!
//! # Usage
//!
//! ```bash
//! # Ingest a beamtime directory, documents to stdout
//! splash ingest /data/beamtime -o /archive
//!
//! # Custom thumbnails, documents and tags to files
//! splash ingest /data/beamtime -t 128:jpg -t 512:tiff --documents docs.jsonl --tags tags.jsonl
//!
//! # View configuration
//! splash config show
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// Splash - scattering-image ingestion and document composition.
#[derive(Parser, Debug)]
#[command(name = "splash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "SPLASH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest raw detector files and emit their document streams
    Ingest(cli::ingest::IngestArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `splash config path`."
            );
            splash_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Splash v{}", splash_core::VERSION);

    match cli.command {
        Commands::Ingest(args) => cli::ingest::execute(args, cli.config.as_deref()).await,
        Commands::Config(args) => cli::config::execute(args, cli.config.as_deref()).await,
    }
}
