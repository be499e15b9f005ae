//! Concurrent ingestion of many files.
//!
//! Files are ingested by a bounded pool of tokio tasks (a semaphore caps how
//! many run at once). Finished runs travel over a bounded channel to the
//! calling task, which hands them to `on_run` one at a time, so the sink
//! never sees two runs interleaved.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use super::channel::bounded_channel;
use super::ingest::Ingestor;
use crate::error::IngestResult;
use crate::types::{IngestStats, IngestedRun};

/// Outcome of ingesting one file in a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub path: PathBuf,
    pub result: IngestResult<IngestedRun>,
}

impl Ingestor {
    /// Ingest `files` with `processing.parallel_workers` concurrent tasks.
    ///
    /// `on_run` is called on the current task for every file, successful or
    /// not, in completion order. Failed files are logged and counted and the
    /// batch continues. An error from `on_run` stops the batch and is
    /// returned; files already in flight still finish their writes.
    pub async fn ingest_batch<F>(
        self: &Arc<Self>,
        files: Vec<PathBuf>,
        mut on_run: F,
    ) -> io::Result<IngestStats>
    where
        F: FnMut(BatchItem) -> io::Result<()>,
    {
        let start = Instant::now();
        let total = files.len();
        let (tx, mut rx) = bounded_channel::<BatchItem>(&self.pipeline);
        let semaphore = Arc::new(Semaphore::new(self.parallel_workers.max(1)));

        let ingestor = Arc::clone(self);
        let producer = tokio::spawn(async move {
            for path in files {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    tracing::warn!("Ingest semaphore closed unexpectedly, stopping batch");
                    break;
                };
                if tx.is_closed() {
                    break;
                }
                let ingestor = Arc::clone(&ingestor);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let result = ingestor.ingest(&path).await;
                    // Receiver gone means the batch was aborted
                    let _ = tx.send(BatchItem { path, result }).await;
                    // Slot is released only after the hand-off
                    drop(permit);
                });
            }
        });

        let mut stats = IngestStats::default();
        let mut received = 0usize;
        while let Some(item) = rx.recv().await {
            received += 1;
            match &item.result {
                Ok(run) => {
                    stats.succeeded += 1;
                    stats.total_bytes += run.raw.file_size;
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::error!("Failed: {:?} - {}", item.path, e);
                }
            }
            if let Err(e) = on_run(item) {
                rx.close();
                return Err(e);
            }
        }

        if let Err(e) = producer.await {
            tracing::error!("Ingest producer task panicked: {e}");
        }
        if received < total {
            tracing::error!("{} file(s) lost to panicked ingest tasks", total - received);
            stats.failed += total - received;
        }

        stats.total_seconds = start.elapsed().as_secs_f64();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::edf;
    use ndarray::Array2;
    use std::path::Path;

    fn write_frame(path: &Path, seed: u16) {
        let data = Array2::from_shape_fn((6, 6), |(r, c)| seed + (r * 6 + c) as u16);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, edf::encode_u16(&data)).unwrap();
    }

    fn ingestor(source: &Path, output: &Path, workers: usize) -> Arc<Ingestor> {
        let mut config = Config::default();
        config.ingest.source_root = source.to_path_buf();
        config.ingest.output_root = output.to_path_buf();
        config.processing.parallel_workers = workers;
        config.pipeline.buffer_size = 2;
        Arc::new(Ingestor::new(&config))
    }

    #[tokio::test]
    async fn test_batch_counts_successes_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (source, output) = (dir.path().join("src"), dir.path().join("out"));
        let mut files = Vec::new();
        for i in 0..5u16 {
            let path = source.join(format!("run{}/frame{i}.edf", i % 2));
            write_frame(&path, i * 100);
            files.push(path);
        }
        let broken = source.join("broken.edf");
        std::fs::write(&broken, b"{ nope }").unwrap();
        files.push(broken.clone());

        let mut seen = Vec::new();
        let stats = ingestor(&source, &output, 3)
            .ingest_batch(files, |item| {
                seen.push((item.path, item.result.is_ok()));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(stats.succeeded, 5);
        assert_eq!(stats.failed, 1);
        assert_eq!(seen.len(), 6);
        assert!(seen.contains(&(broken, false)));
        assert!(stats.total_bytes > 0);
    }

    #[tokio::test]
    async fn test_sink_error_stops_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (source, output) = (dir.path().join("src"), dir.path().join("out"));
        let files: Vec<PathBuf> = (0..4u16)
            .map(|i| {
                let path = source.join(format!("frame{i}.edf"));
                write_frame(&path, i);
                path
            })
            .collect();

        let mut calls = 0;
        let err = ingestor(&source, &output, 1)
            .ingest_batch(files, |_| {
                calls += 1;
                Err(io::Error::other("sink full"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "sink full");
        assert_eq!(calls, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stalled_sink_bounds_runs_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let (source, output) = (dir.path().join("src"), dir.path().join("out"));
        let files: Vec<PathBuf> = (0..12u16)
            .map(|i| {
                let path = source.join(format!("frame{i}.edf"));
                write_frame(&path, i * 10);
                path
            })
            .collect();

        let mut config = Config::default();
        config.ingest.source_root = source.clone();
        config.ingest.output_root = output.clone();
        config.processing.parallel_workers = 1;
        config.pipeline.buffer_size = 1;
        let ingestor = Arc::new(Ingestor::new(&config).with_thumbnails(vec![]));

        let archived = || {
            walkdir::WalkDir::new(&output)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "edf"))
                .count()
        };
        let mut archived_during_stall = None;
        let stats = ingestor
            .ingest_batch(files, |_| {
                if archived_during_stall.is_none() {
                    std::thread::sleep(std::time::Duration::from_millis(1500));
                    archived_during_stall = Some(archived());
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(stats.succeeded, 12);
        // One run in the sink, one buffered, one worker blocked on send
        assert!(archived_during_stall.unwrap() <= 3);
        assert_eq!(archived(), 12);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let stats = ingestor(dir.path(), &dir.path().join("out"), 4)
            .ingest_batch(Vec::new(), |_| Ok(()))
            .await
            .unwrap();
        assert_eq!(stats.succeeded + stats.failed, 0);
    }
}
