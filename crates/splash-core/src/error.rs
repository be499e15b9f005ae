//! Error types for the splash ingestion pipeline.
//!
//! Ingestion failures fall into three kinds (validation, I/O, decode), each
//! carrying the path or value that caused it so a failed file in a batch can
//! be reported without further context.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for splash operations.
#[derive(Error, Debug)]
pub enum SplashError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Per-file ingestion errors
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// The three failure kinds an ingest run can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any filesystem mutation
    Validation,
    /// Source unreadable, destination unwritable, disk full
    Io,
    /// Source bytes are not a usable image
    Decode,
}

/// Errors raised while ingesting a single source file.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Requested thumbnail format is not JPEG or TIFF
    #[error("Unsupported thumbnail format: {format:?} (expected jpg, jpeg, tif or tiff)")]
    UnsupportedFormat { format: String },

    /// Requested thumbnail size is zero
    #[error("Invalid thumbnail size {size} for format {format:?}")]
    InvalidThumbnailSize { size: u32, format: String },

    /// Source file does not live under the configured source root
    #[error("{path} is not under source root {root}")]
    OutsideSourceRoot { path: PathBuf, root: PathBuf },

    /// Reading the source or writing an artifact failed
    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source file does not exist
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Source file exceeds the size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Source bytes could not be decoded as a detector frame
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Decoding did not finish in time
    #[error("Timeout in {stage} stage for {path} after {timeout_ms}ms")]
    Timeout {
        path: PathBuf,
        stage: String,
        timeout_ms: u64,
    },
}

impl IngestError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error into one of the three ingest failure kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat { .. }
            | Self::InvalidThumbnailSize { .. }
            | Self::OutsideSourceRoot { .. } => ErrorKind::Validation,
            Self::Io { .. } | Self::FileNotFound(_) | Self::FileTooLarge { .. } => ErrorKind::Io,
            Self::Decode { .. } | Self::Timeout { .. } => ErrorKind::Decode,
        }
    }
}

/// Convenience type alias for splash results.
pub type Result<T> = std::result::Result<T, SplashError>;

/// Convenience type alias for per-file ingest results.
pub type IngestResult<T> = std::result::Result<T, IngestError>;
