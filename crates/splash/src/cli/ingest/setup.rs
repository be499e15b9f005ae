//! Ingest setup: config overrides, ingestor and composer creation.

use splash_core::pipeline::ThumbnailRequest;
use splash_core::{Config, DocumentComposer, Ingestor};
use std::path::Path;
use std::sync::Arc;

use super::types::OutputFormat;
use super::IngestArgs;
use crate::cli::{expand_path, load_config};

/// Everything assembled by [`setup_ingest`].
pub(crate) struct IngestContext {
    pub ingestor: Arc<Ingestor>,
    pub composer: DocumentComposer,
    pub output_format: OutputFormat,
    pub pretty: bool,
    pub tagging_enabled: bool,
    pub model_name: String,
}

/// Validate arguments, load config, and build the ingestor.
pub(crate) fn setup_ingest(
    args: &IngestArgs,
    config_path: Option<&Path>,
) -> anyhow::Result<IngestContext> {
    let source_root = expand_path(&args.source_root);
    if !source_root.is_dir() {
        anyhow::bail!(
            "Source root is not a directory: {:?}\n\n  Hint: Pass the directory holding the raw frames.",
            source_root
        );
    }

    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, args);
    config.ingest.source_root = source_root;

    // Reject bad thumbnail requests before any file is read
    ThumbnailRequest::validate_all(&config.ingest.thumbnails)?;

    let output_format = match args.format {
        Some(format) => format,
        None => OutputFormat::from_config(&config.output.format).unwrap_or_else(|| {
            tracing::warn!(
                "Unknown output format {:?} in config, using jsonl",
                config.output.format
            );
            OutputFormat::Jsonl
        }),
    };

    tracing::info!(
        "Archiving into {:?} with {} worker(s)",
        config.output_root(),
        config.processing.parallel_workers
    );

    Ok(IngestContext {
        ingestor: Arc::new(Ingestor::new(&config)),
        composer: DocumentComposer::new(config.output_root(), &config.ingest.source_label),
        output_format,
        pretty: config.output.pretty,
        tagging_enabled: config.tagging.enabled,
        model_name: config.tagging.model_name.clone(),
    })
}

/// Apply command-line overrides on top of the loaded config.
fn apply_overrides(config: &mut Config, args: &IngestArgs) {
    if let Some(output_root) = &args.output_root {
        config.ingest.output_root = expand_path(output_root);
    }
    if let Some(parallel) = args.parallel {
        config.processing.parallel_workers = parallel.max(1);
    }
    if args.no_thumbnails {
        config.ingest.thumbnails.clear();
    } else if !args.thumbnails.is_empty() {
        config.ingest.thumbnails = args.thumbnails.clone();
    }
    if args.no_tags {
        config.tagging.enabled = false;
    }
}
