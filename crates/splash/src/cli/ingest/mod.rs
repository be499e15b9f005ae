//! The `splash ingest` command.

mod batch;
mod setup;
pub mod types;

pub use types::OutputFormat;

use clap::Args;
use splash_core::{FileDiscovery, ThumbnailSpec};
use std::path::{Path, PathBuf};

use batch::run_batch;
use setup::setup_ingest;

/// Arguments for the `ingest` command.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Directory of raw detector files; buckets are derived relative to it
    #[arg(required = true)]
    pub source_root: PathBuf,

    /// Archive root the raw copies and thumbnails are written under
    #[arg(short, long, env = "SPLASH_OUTPUT_ROOT")]
    pub output_root: Option<PathBuf>,

    /// Document stream output file (defaults to stdout)
    #[arg(long)]
    pub documents: Option<PathBuf>,

    /// Tag record output file (tags are only written when set)
    #[arg(long)]
    pub tags: Option<PathBuf>,

    /// Output format for documents and tag records
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Number of files ingested concurrently
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Thumbnail to render, as SIZE:FORMAT (repeatable, replaces configured thumbnails)
    #[arg(short, long = "thumbnail", value_name = "SIZE:FORMAT")]
    pub thumbnails: Vec<ThumbnailSpec>,

    /// Do not render thumbnails
    #[arg(long, conflicts_with = "thumbnails")]
    pub no_thumbnails: bool,

    /// Do not derive tags from source paths
    #[arg(long)]
    pub no_tags: bool,

    /// Skip files whose run id is already in the documents file
    #[arg(long, requires = "documents")]
    pub skip_existing: bool,
}

/// Execute the ingest command.
pub async fn execute(args: IngestArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let ctx = setup_ingest(&args, config_path)?;

    let files = ctx.ingestor.discover(ctx.ingestor.source_root());
    if files.is_empty() {
        tracing::warn!(
            "No supported raw files found under {:?}",
            ctx.ingestor.source_root()
        );
        return Ok(());
    }
    tracing::info!(
        "Found {} raw file(s) to ingest ({:.1} MB)",
        files.len(),
        FileDiscovery::total_size(&files) as f64 / 1_000_000.0
    );

    run_batch(ctx, &args, files).await
}
