//! Ingestion of a single source file into the archive.
//!
//! Per file: check the thumbnail requests, compute the bucket, validate and
//! read the source, hash and decode it, then write the raw copy and each
//! thumbnail under `output_root/<bucket>/`. Nothing is written until the
//! source has decoded successfully, and every write lands through a temp
//! file renamed into place.

use chrono::{DateTime, Utc};
use image::GrayImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;

use super::anonymize::PathAnonymizer;
use super::decode::RawDecoder;
use super::discovery::{DiscoveredFile, FileDiscovery};
use super::hash::Hasher;
use super::thumbnail::{ThumbnailRenderer, ThumbnailRequest};
use super::validate::Validator;
use crate::config::{Config, PipelineConfig};
use crate::error::{IngestError, IngestResult};
use crate::tagging::{KeywordTagger, NoTags, PathTagger};
use crate::types::{DerivedArtifact, IngestedRun, RawArtifact, ThumbnailSpec, RAW_FIELD};

/// Moves source files into the anonymized archive and renders thumbnails.
pub struct Ingestor {
    pub(crate) source_root: PathBuf,
    pub(crate) output_root: PathBuf,
    pub(crate) parallel_workers: usize,
    pub(crate) pipeline: PipelineConfig,
    decoder: RawDecoder,
    validator: Validator,
    renderer: Arc<ThumbnailRenderer>,
    discovery: FileDiscovery,
    thumbnails: Vec<ThumbnailSpec>,
    tagger: Arc<dyn PathTagger>,
}

impl Ingestor {
    /// Create an ingestor from configuration.
    ///
    /// Uses the keyword tagger from `[tagging]` when tagging is enabled.
    pub fn new(config: &Config) -> Self {
        let tagger: Arc<dyn PathTagger> = if config.tagging.enabled {
            Arc::new(KeywordTagger::from_config(&config.tagging))
        } else {
            Arc::new(NoTags)
        };
        Self {
            source_root: config.source_root(),
            output_root: config.output_root(),
            parallel_workers: config.processing.parallel_workers,
            pipeline: config.pipeline.clone(),
            decoder: RawDecoder::new(config.limits.clone()),
            validator: Validator::new(config.limits.clone()),
            renderer: Arc::new(ThumbnailRenderer::new(config.thumbnail.clone())),
            discovery: FileDiscovery::new(&config.ingest),
            thumbnails: config.ingest.thumbnails.clone(),
            tagger,
        }
    }

    /// Replace the path tagger.
    pub fn with_tagger(mut self, tagger: impl PathTagger + 'static) -> Self {
        self.tagger = Arc::new(tagger);
        self
    }

    /// Replace the thumbnails rendered by [`Ingestor::ingest`].
    pub fn with_thumbnails(mut self, thumbnails: Vec<ThumbnailSpec>) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Default thumbnails for this ingestor.
    pub fn thumbnails(&self) -> &[ThumbnailSpec] {
        &self.thumbnails
    }

    /// Discover all supported raw files at a path.
    pub fn discover(&self, path: &Path) -> Vec<DiscoveredFile> {
        self.discovery.discover(path)
    }

    /// Ingest one file with the default thumbnails.
    pub async fn ingest(&self, file_path: &Path) -> IngestResult<IngestedRun> {
        self.ingest_with_specs(file_path, &self.thumbnails).await
    }

    /// Ingest one file, rendering the given thumbnails.
    ///
    /// Rejects unsupported thumbnail formats, zero sizes and files outside
    /// the source root before touching the filesystem.
    pub async fn ingest_with_specs(
        &self,
        file_path: &Path,
        specs: &[ThumbnailSpec],
    ) -> IngestResult<IngestedRun> {
        let start = Instant::now();
        tracing::debug!("Ingesting: {:?}", file_path);

        let requests = ThumbnailRequest::validate_all(specs)?;
        let bucket = PathAnonymizer::bucket_for(&self.source_root, file_path)?;

        // Validate and read
        let file_size = self.validator.validate(file_path)?;
        let read_start = Instant::now();
        let bytes: Arc<[u8]> = tokio::fs::read(file_path)
            .await
            .map_err(|e| IngestError::io(file_path, e))?
            .into();
        let captured_at = captured_at(file_path).await;
        tracing::trace!("  Read: {:?}", read_start.elapsed());

        let hash_start = Instant::now();
        let content_hash = Hasher::content_hash_from_bytes(&bytes);
        tracing::trace!("  Content hash: {:?}", hash_start.elapsed());

        let decode_start = Instant::now();
        let frame = self.decoder.decode_from_bytes(bytes.clone(), file_path).await?;
        tracing::trace!("  Decode: {:?}", decode_start.elapsed());

        // Normalize once for all thumbnails, still before any write
        let shape = frame.shape();
        let normalized = if requests.is_empty() {
            None
        } else {
            let norm_start = Instant::now();
            let renderer = self.renderer.clone();
            let (source, pixels) = (file_path.to_path_buf(), frame.pixels);
            let normalized = blocking(file_path, move || {
                renderer
                    .normalize(&pixels)
                    .map_err(|message| IngestError::Decode {
                        path: source,
                        message,
                    })
            })
            .await?;
            tracing::trace!("  Normalize: {:?}", norm_start.elapsed());
            Some(normalized)
        };

        // Write the raw copy
        let bucket_dir = self.output_root.join(&bucket);
        tokio::fs::create_dir_all(&bucket_dir)
            .await
            .map_err(|e| IngestError::io(&bucket_dir, e))?;

        let format_ext = file_path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        let raw_name = if format_ext.is_empty() {
            content_hash.clone()
        } else {
            format!("{content_hash}.{format_ext}")
        };
        let raw_path = bucket_dir.join(raw_name);
        if tokio::fs::try_exists(&raw_path).await.unwrap_or(false) {
            tracing::debug!("Raw copy already archived: {:?}", raw_path);
        } else {
            let write_start = Instant::now();
            let (dir, dest, data) = (bucket_dir.clone(), raw_path.clone(), bytes.clone());
            blocking(file_path, move || write_atomic(&dir, &dest, &data)).await?;
            tracing::trace!("  Raw copy: {:?}", write_start.elapsed());
        }

        let raw = RawArtifact {
            content_hash,
            source_path: file_path.to_path_buf(),
            path: raw_path,
            bucket,
            shape,
            field_name: RAW_FIELD.to_string(),
            format_ext,
            file_size,
            captured_at,
        };

        // Render thumbnails
        let derived = match normalized {
            None => Vec::new(),
            Some(normalized) => {
                let thumb_start = Instant::now();
                let renderer = self.renderer.clone();
                let hash = raw.content_hash.clone();
                let (dir, source) = (bucket_dir, raw.source_path.clone());
                let derived = blocking(file_path, move || {
                    requests
                        .iter()
                        .map(|request| {
                            render_thumbnail(&renderer, &normalized, request, &dir, &hash, &source)
                        })
                        .collect::<IngestResult<Vec<_>>>()
                })
                .await?;
                tracing::trace!("  Thumbnails: {:?}", thumb_start.elapsed());
                derived
            }
        };

        let tags = self.tagger.tags_for(file_path);

        tracing::debug!(
            "Ingested {:?} as {} in {:?} ({}x{}, {} thumbnail(s))",
            file_path,
            raw.content_hash,
            start.elapsed(),
            raw.shape[0],
            raw.shape[1],
            derived.len()
        );

        Ok(IngestedRun { raw, derived, tags })
    }
}

/// Resize, encode and store one thumbnail.
fn render_thumbnail(
    renderer: &ThumbnailRenderer,
    normalized: &GrayImage,
    request: &ThumbnailRequest,
    dir: &Path,
    content_hash: &str,
    source: &Path,
) -> IngestResult<DerivedArtifact> {
    let encoded = renderer
        .render(normalized, request)
        .map_err(|e| IngestError::Decode {
            path: source.to_path_buf(),
            message: format!("Thumbnail {} failed: {e}", request.spec),
        })?;
    let path = dir.join(request.spec.file_name(content_hash));
    write_atomic(dir, &path, &encoded)?;

    let size = request.spec.size as usize;
    Ok(DerivedArtifact {
        path,
        shape: [size, size],
        field_name: request.spec.field_name(),
        format_ext: request.spec.format.clone(),
        format: request.format,
    })
}

/// Write `data` to `dest` through a temp file in `dir` and a rename.
///
/// Readers see either the previous file or the complete new one.
pub(crate) fn write_atomic(dir: &Path, dest: &Path, data: &[u8]) -> IngestResult<()> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| IngestError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| IngestError::io(dest, e))?;
    tmp.persist(dest).map_err(|e| IngestError::io(dest, e.error))?;
    Ok(())
}

/// Run a fallible blocking closure for `path` on the blocking pool.
async fn blocking<T, F>(path: &Path, f: F) -> IngestResult<T>
where
    F: FnOnce() -> IngestResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| IngestError::io(path, std::io::Error::other(e)))?
}

/// Source modification time, falling back to now when unavailable.
async fn captured_at(path: &Path) -> DateTime<Utc> {
    match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified),
        Err(e) => {
            tracing::warn!("No modification time for {:?} ({e}), using now", path);
            Utc::now()
        }
    }
}
