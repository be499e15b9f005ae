//! Batch ingestion: skip-existing, document/tag output, progress and summary.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use splash_core::{
    DiscoveredFile, Document, DocumentSink, Hasher, IngestStats, OutputWriter, TagSet, TagStore,
    TaggingEvent,
};

use super::setup::IngestContext;
use super::types::OutputFormat;
use super::IngestArgs;

type Output = OutputWriter<Box<dyn Write>>;

/// Ingest discovered files, streaming each run's documents as it completes.
pub(crate) async fn run_batch(
    ctx: IngestContext,
    args: &IngestArgs,
    files: Vec<DiscoveredFile>,
) -> anyhow::Result<()> {
    // Existing runs for --skip-existing
    let existing: Vec<Document> = if args.skip_existing {
        match &args.documents {
            Some(path) => load_existing(path)?,
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };
    let existing_ids = run_ids(&existing);
    if !existing_ids.is_empty() {
        tracing::info!("Loaded {} existing run id(s)", existing_ids.len());
    }

    let total = files.len() as u64;
    let progress = create_progress_bar(total);

    let (pending, skipped): (Vec<PathBuf>, usize) = if existing_ids.is_empty() {
        (files.into_iter().map(|file| file.path).collect(), 0)
    } else {
        let progress = progress.clone();
        tokio::task::spawn_blocking(move || partition_existing(files, &existing_ids, &progress))
            .await?
    };

    let (format, pretty) = (ctx.output_format, ctx.pretty);
    let mut documents = open_output(
        args.documents.as_deref(),
        format,
        pretty,
        args.skip_existing,
        &existing,
    )?;
    let mut tags = match (&args.tags, ctx.tagging_enabled) {
        (Some(path), true) => Some(open_tag_output(path, format, pretty, args.skip_existing)?),
        _ => None,
    };
    let tagging_event = TaggingEvent::new(&ctx.model_name);
    if let Some(store) = tags.as_mut() {
        store.create_tagging_event(&tagging_event)?;
    }

    let start_time = std::time::Instant::now();
    let mut processed = 0u64;
    let composer = &ctx.composer;
    let stats = ctx
        .ingestor
        .ingest_batch(pending, |item| {
            if let Ok(run) = &item.result {
                documents.write_run(&composer.compose_run(run))?;
                if let Some(store) = tags.as_mut() {
                    store.create_tag_set(&TagSet::new(
                        run.run_id(),
                        &run.tags,
                        Some(&tagging_event),
                    ))?;
                } else if !run.tags.is_empty() {
                    tracing::debug!("Tags for {}: {:?}", run.run_id(), run.tags);
                }
            }

            processed += 1;
            progress.inc(1);
            let elapsed = start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                progress.set_message(format!("{:.1} files/sec", processed as f64 / elapsed));
            }
            Ok(())
        })
        .await?;

    documents.finish()?;
    if let Some(store) = tags.as_mut() {
        store.finish()?;
    }
    if let Some(path) = &args.documents {
        tracing::info!("Documents written to {:?}", path);
    }

    progress.finish_and_clear();
    print_summary(&IngestStats { skipped, ..stats });

    Ok(())
}

/// Open a buffered writer on `path`, or on stdout when unset.
///
/// With `skip_existing`, JSONL output appends to the file and JSON output
/// is rewritten with `existing` records first.
fn open_output<T: Serialize>(
    path: Option<&Path>,
    format: OutputFormat,
    pretty: bool,
    skip_existing: bool,
    existing: &[T],
) -> anyhow::Result<Output> {
    let append = skip_existing && format == OutputFormat::Jsonl;
    let writer: Box<dyn Write> = match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = if append && path.exists() {
                OpenOptions::new().append(true).open(path)?
            } else {
                File::create(path)?
            };
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(std::io::stdout())),
    };

    let mut output = OutputWriter::new(writer, format.into(), pretty);
    if skip_existing && format == OutputFormat::Json {
        for record in existing {
            output.write(record)?;
        }
    }
    Ok(output)
}

/// Open the tag record file, keeping earlier records under `skip_existing`.
fn open_tag_output(
    path: &Path,
    format: OutputFormat,
    pretty: bool,
    skip_existing: bool,
) -> anyhow::Result<Output> {
    let earlier: Vec<serde_json::Value> = if skip_existing && format == OutputFormat::Json {
        load_existing(path)?
    } else {
        Vec::new()
    };
    open_output(Some(path), format, pretty, skip_existing, &earlier)
}

/// Split files into those still to ingest and a count of those whose
/// content hash is already a run id. Reads every file.
fn partition_existing(
    files: Vec<DiscoveredFile>,
    existing_ids: &HashSet<String>,
    progress: &indicatif::ProgressBar,
) -> (Vec<PathBuf>, usize) {
    let mut skipped = 0usize;
    let mut pending = Vec::with_capacity(files.len());
    for file in files {
        if let Ok(hash) = Hasher::content_hash(&file.path) {
            if existing_ids.contains(&hash) {
                skipped += 1;
                progress.inc(1);
                continue;
            }
        }
        pending.push(file.path);
    }
    (pending, skipped)
}

/// Load records from an earlier JSON array or JSONL output file.
///
/// A missing file yields no records; unparsable JSONL lines are skipped
/// with a warning.
fn load_existing<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;

    // Try JSON array first (handles --format json output)
    if let Ok(records) = serde_json::from_str::<Vec<T>>(&content) {
        return Ok(records);
    }

    tracing::debug!("{:?} is not a JSON array, trying JSONL line-by-line", path);
    let mut records = Vec::new();
    let mut skipped_lines = 0u64;
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<T>(line) {
            Ok(record) => records.push(record),
            Err(_) => skipped_lines += 1,
        }
    }
    if skipped_lines > 0 {
        tracing::warn!(
            "--skip-existing: {skipped_lines} line(s) in {:?} could not be parsed",
            path
        );
    }
    Ok(records)
}

/// Run ids of every start document.
fn run_ids(documents: &[Document]) -> HashSet<String> {
    documents
        .iter()
        .filter_map(|document| match document {
            Document::Start(start) => Some(start.uid.clone()),
            _ => None,
        })
        .collect()
}

/// Create a progress bar for batch ingestion.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message("starting...");
    pb
}

/// Print a formatted summary table after the batch.
fn print_summary(stats: &IngestStats) {
    let total = stats.succeeded + stats.failed + stats.skipped;
    let mb_ingested = stats.total_bytes as f64 / 1_000_000.0;
    let (rate, throughput) = if stats.total_seconds > 0.0 {
        (
            stats.succeeded as f64 / stats.total_seconds,
            mb_ingested / stats.total_seconds,
        )
    } else {
        (0.0, 0.0)
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Succeeded:    {:>8}", stats.succeeded);
    if stats.failed > 0 {
        eprintln!("    Failed:       {:>8}", stats.failed);
    }
    if stats.skipped > 0 {
        eprintln!("    Skipped:      {:>8}", stats.skipped);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", total);
    eprintln!("    Duration:     {:>7.1}s", stats.total_seconds);
    eprintln!("    Rate:         {:>7.1} files/sec", rate);
    eprintln!("    Throughput:   {:>7.1} MB/sec", throughput);
    eprintln!("  ====================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use splash_core::documents::{RunStart, RunStop};
    use splash_core::{Config, DocumentComposer, Ingestor, NoTags};
    use std::collections::BTreeMap;
    use std::ffi::OsStr;
    use std::sync::Arc;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        args: IngestArgs,
    }

    /// A 4x4 16-bit EDF frame; `seed` varies the pixel data.
    fn write_edf(path: &Path, seed: u16) {
        let mut bytes =
            b"{\nDataType = UnsignedShort ;\nDim_1 = 4 ;\nDim_2 = 4 ;\n}\n".to_vec();
        for i in 0..16u16 {
            bytes.extend_from_slice(&(seed + i).to_le_bytes());
        }
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn read_records(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn run(uid: &str) -> Vec<Document> {
        vec![
            Document::Start(RunStart {
                uid: uid.to_string(),
                time: 1.0,
                source: "scattering ingestor".to_string(),
                plan_name: "ingest".to_string(),
                raw_format: "edf".to_string(),
            }),
            Document::Stop(RunStop {
                uid: format!("{uid}-stop"),
                run_start: uid.to_string(),
                time: 2.0,
                exit_status: "success".to_string(),
                num_events: BTreeMap::new(),
            }),
        ]
    }

    #[test]
    fn test_load_existing_documents_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");
        let mut documents = run("hash_a");
        documents.extend(run("hash_b"));
        std::fs::write(&path, serde_json::to_string_pretty(&documents).unwrap()).unwrap();

        let loaded = load_existing::<Document>(&path).unwrap();
        assert_eq!(loaded.len(), 4);
        let ids = run_ids(&loaded);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("hash_a") && ids.contains("hash_b"));
    }

    #[test]
    fn test_load_existing_documents_jsonl_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        let mut f = File::create(&path).unwrap();
        for document in run("hash_c") {
            writeln!(f, "{}", serde_json::to_string(&document).unwrap()).unwrap();
        }
        writeln!(f, "this is not valid json at all").unwrap();
        for document in run("hash_d") {
            writeln!(f, "{}", serde_json::to_string(&document).unwrap()).unwrap();
        }

        let ids = run_ids(&load_existing::<Document>(&path).unwrap());
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("hash_c") && ids.contains("hash_d"));
    }

    #[test]
    fn test_load_existing_documents_missing_or_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_existing::<Document>(&dir.path().join("nope.json"))
            .unwrap()
            .is_empty());

        let empty = dir.path().join("empty.jsonl");
        std::fs::write(&empty, "").unwrap();
        assert!(load_existing::<Document>(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_partition_existing_skips_known_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let (known, fresh) = (dir.path().join("a.edf"), dir.path().join("b.edf"));
        write_edf(&known, 1);
        write_edf(&fresh, 2);
        let ids = HashSet::from([Hasher::content_hash(&known).unwrap()]);
        let files = [&known, &fresh]
            .into_iter()
            .map(|path| DiscoveredFile {
                path: path.clone(),
                size: 0,
            })
            .collect();

        let (pending, skipped) =
            partition_existing(files, &ids, &indicatif::ProgressBar::hidden());
        assert_eq!(pending, vec![fresh]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_json_tag_output_keeps_earlier_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.json");
        let earlier = serde_json::json!({
            "type": "tagging_event",
            "uid": "first-batch",
            "model_name": "keyword",
            "run_time": "2024-01-01T00:00:00Z"
        });
        std::fs::write(&path, serde_json::to_string(&vec![&earlier]).unwrap()).unwrap();

        let mut store = open_tag_output(&path, OutputFormat::Json, false, true).unwrap();
        store
            .create_tagging_event(&TaggingEvent::new("keyword"))
            .unwrap();
        store.finish().unwrap();
        drop(store);

        let records: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], earlier);
        assert_eq!(records[1]["type"], "tagging_event");
    }

    #[test]
    fn test_tag_output_without_skip_existing_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.json");
        std::fs::write(&path, r#"[{"type": "tagging_event", "uid": "old"}]"#).unwrap();

        let mut store = open_tag_output(&path, OutputFormat::Json, false, false).unwrap();
        store.finish().unwrap();
        drop(store);

        let records: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_every_run_gets_a_tag_set() {
        let dir = tempfile::tempdir().unwrap();
        let (source, output) = (dir.path().join("src"), dir.path().join("out"));
        write_edf(&source.join("plain/frame.edf"), 7);

        let mut config = Config::default();
        config.ingest.source_root = source.clone();
        config.ingest.output_root = output.clone();
        let ingestor = Ingestor::new(&config)
            .with_tagger(NoTags)
            .with_thumbnails(vec![]);
        let files = ingestor.discover(&source);
        assert_eq!(files.len(), 1);
        let hash = Hasher::content_hash(&files[0].path).unwrap();

        let ctx = IngestContext {
            ingestor: Arc::new(ingestor),
            composer: DocumentComposer::new(&output, "scattering ingestor"),
            output_format: OutputFormat::Jsonl,
            pretty: false,
            tagging_enabled: true,
            model_name: "keyword".to_string(),
        };
        let (documents, tags) = (dir.path().join("docs.jsonl"), dir.path().join("tags.jsonl"));
        let cli = TestCli::try_parse_from([
            OsStr::new("splash"),
            source.as_os_str(),
            OsStr::new("--documents"),
            documents.as_os_str(),
            OsStr::new("--tags"),
            tags.as_os_str(),
        ])
        .unwrap();

        run_batch(ctx, &cli.args, files).await.unwrap();

        let records = read_records(&tags);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["type"], "tagging_event");
        assert_eq!(records[1]["type"], "tag_set");
        assert_eq!(records[1]["asset_uid"], hash.as_str());
        assert_eq!(records[1]["tags"], serde_json::json!([]));
        assert_eq!(read_records(&documents).len(), 6);
    }
}
