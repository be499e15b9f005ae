//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::ThumbnailSpec;

/// Source and destination settings for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Root of the source tree; bucket names are derived relative to it
    pub source_root: PathBuf,

    /// Root of the anonymized, content-addressed archive
    pub output_root: PathBuf,

    /// Label recorded as the `source` of every start document
    pub source_label: String,

    /// Raw file extensions picked up by discovery
    pub supported_formats: Vec<String>,

    /// Thumbnails rendered for every ingested file
    pub thumbnails: Vec<ThumbnailSpec>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("."),
            output_root: PathBuf::from("~/.splash/archive"),
            source_label: "scattering ingestor".to_string(),
            supported_formats: vec!["edf".to_string(), "tif".to_string(), "tiff".to_string()],
            thumbnails: vec![ThumbnailSpec::new(256, "jpg"), ThumbnailSpec::new(256, "tiff")],
        }
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of files ingested concurrently
    pub parallel_workers: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
        }
    }
}

/// Pipeline settings for backpressure between workers and the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Max finished runs buffered ahead of the sink
    pub buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { buffer_size: 64 }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum source file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum frame dimension (rows or columns)
    pub max_image_dimension: u32,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 512,
            max_image_dimension: 16384,
            decode_timeout_ms: 30000,
        }
    }
}

/// Interpolation used when resizing thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for image::imageops::FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => Self::Nearest,
            ResizeFilter::Triangle => Self::Triangle,
            ResizeFilter::CatmullRom => Self::CatmullRom,
            ResizeFilter::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Thumbnail rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// JPEG encoder quality (1-100)
    pub jpeg_quality: u8,

    /// Percent of the histogram clipped at each end by autocontrast
    pub autocontrast_cutoff: f64,

    /// Resize interpolation
    pub filter: ResizeFilter,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            autocontrast_cutoff: 0.1,
            filter: ResizeFilter::CatmullRom,
        }
    }
}

/// One keyword rule of the built-in path tagger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagRule {
    /// Tag key emitted when a keyword matches
    pub tag: String,

    /// Keywords searched for in the lowercased path, first match wins
    pub keywords: Vec<String>,
}

impl TagRule {
    pub fn new(tag: &str, keywords: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Path tagging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// Whether tags are derived and emitted at all
    pub enabled: bool,

    /// Name recorded on the tagging event of each batch
    pub model_name: String,

    /// Keyword rules for the built-in tagger
    pub rules: Vec<TagRule>,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_name: "scattering ingestor".to_string(),
            rules: vec![
                TagRule::new("sample_detector_distance_name", &["saxs", "waxs"]),
                TagRule::new("scattering_geometry", &["gisaxs", "giwaxs"]),
                TagRule::new("beamline", &["beamstop", "auto"]),
                TagRule::new("calibrant", &["agb", "lab6"]),
            ],
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format ("json" or "jsonl")
    pub format: String,

    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "jsonl".to_string(),
            pretty: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
