//! Core data types produced by ingesting a source file.
//!
//! A run owns exactly one [`RawArtifact`] (the relocated source file) and one
//! [`DerivedArtifact`] per requested thumbnail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Field name of the raw frame in the primary stream.
pub const RAW_FIELD: &str = "raw";

/// Thumbnail output formats understood by the document protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailFormat {
    Jpeg,
    Tiff,
}

impl ThumbnailFormat {
    /// Parse a requested format name (case-insensitive).
    ///
    /// Only the JPEG and TIFF families are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    /// Encoder format for the `image` crate.
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Tiff => image::ImageFormat::Tiff,
        }
    }

    /// Handler name recorded in resource documents.
    pub fn resource_spec(self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Tiff => "AD_TIFF",
        }
    }
}

/// A requested thumbnail: edge length in pixels and output format name.
///
/// The format string is kept as requested since it becomes the file
/// extension and part of the field name (`256_jpg`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSpec {
    pub size: u32,
    pub format: String,
}

impl ThumbnailSpec {
    pub fn new(size: u32, format: impl Into<String>) -> Self {
        Self {
            size,
            format: format.into(),
        }
    }

    /// Field name of this thumbnail in the thumbnails stream.
    pub fn field_name(&self) -> String {
        format!("{}_{}", self.size, self.format)
    }

    /// File name of this thumbnail next to the raw artifact.
    pub fn file_name(&self, content_hash: &str) -> String {
        format!("{}_{}.{}", content_hash, self.size, self.format)
    }
}

impl fmt::Display for ThumbnailSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.size, self.format)
    }
}

impl FromStr for ThumbnailSpec {
    type Err = String;

    /// Parse `SIZE:FORMAT`, e.g. `256:jpg`.
    ///
    /// The format is not checked here; unsupported formats are rejected by
    /// the ingestor before it touches the filesystem.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (size, format) = s
            .split_once(':')
            .ok_or_else(|| format!("expected SIZE:FORMAT, got {s:?}"))?;
        let size = size
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid thumbnail size {size:?}: {e}"))?;
        let format = format.trim();
        if format.is_empty() {
            return Err(format!("missing thumbnail format in {s:?}"));
        }
        Ok(Self::new(size, format))
    }
}

/// The relocated source file of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArtifact {
    /// BLAKE3 digest of the file bytes; doubles as the run id
    pub content_hash: String,

    /// Where the source file was read from
    pub source_path: PathBuf,

    /// Absolute path of the copy inside the archive
    pub path: PathBuf,

    /// Anonymized directory bucket the copy lives in
    pub bucket: String,

    /// Frame shape as (rows, cols)
    pub shape: [usize; 2],

    /// Always [`RAW_FIELD`]
    pub field_name: String,

    /// Source file extension without the dot ("edf", "tiff", ...)
    pub format_ext: String,

    /// Source file size in bytes
    pub file_size: u64,

    /// Source modification time, used as the capture timestamp
    pub captured_at: DateTime<Utc>,
}

/// A thumbnail rendered from a raw artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedArtifact {
    /// Absolute path of the thumbnail inside the archive
    pub path: PathBuf,

    /// Always (size, size)
    pub shape: [usize; 2],

    /// `<size>_<format>`
    pub field_name: String,

    /// Extension as requested ("jpg", "tiff", ...)
    pub format_ext: String,

    /// Encoder family
    pub format: ThumbnailFormat,
}

/// Everything one successful ingest produced, ready for composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedRun {
    pub raw: RawArtifact,
    pub derived: Vec<DerivedArtifact>,

    /// Tags derived from the source path
    pub tags: BTreeMap<String, String>,
}

impl IngestedRun {
    /// The run id: the raw content hash.
    pub fn run_id(&self) -> &str {
        &self.raw.content_hash
    }
}

/// Statistics for a batch ingest.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestStats {
    /// Files ingested successfully
    pub succeeded: usize,

    /// Files whose run was abandoned
    pub failed: usize,

    /// Files skipped (already ingested)
    pub skipped: usize,

    /// Source bytes ingested
    pub total_bytes: u64,

    /// Wall-clock time in seconds
    pub total_seconds: f64,
}
