//! Splash Core - ingestion and document composition for detector images.
//!
//! Splash moves raw scattering frames into an anonymized, content-addressed
//! archive, renders thumbnails next to them, and describes each file as an
//! ordered stream of typed documents for downstream cataloguing.
//!
//! # Architecture
//!
//! ```text
//! File → Validate → Read/Hash → Decode → Normalize → Write raw + thumbnails → Tag
//!                                                                      ↓
//!                                         DocumentComposer → DocumentSink / TagStore
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use splash_core::{Config, DocumentComposer, Ingestor};
//!
//! #[tokio::main]
//! async fn main() -> splash_core::Result<()> {
//!     let config = Config::load()?;
//!     let ingestor = Ingestor::new(&config);
//!     let composer = DocumentComposer::new(config.output_root(), &config.ingest.source_label);
//!
//!     let run = ingestor.ingest("./run1/frameA.edf".as_ref()).await?;
//!     for (name, doc) in composer.compose_run(&run).named() {
//!         println!("{name}: {}", serde_json::to_string(doc)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod documents;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod tagging;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use documents::{Document, DocumentComposer, RunDocuments};
pub use error::{ConfigError, ErrorKind, IngestError, IngestResult, Result, SplashError};
pub use pipeline::{BatchItem, DiscoveredFile, FileDiscovery, Hasher, Ingestor};
pub use sink::{DocumentSink, OutputFormat, OutputWriter, TagStore};
pub use tagging::{KeywordTagger, NoTags, PathTagger, TagSet, TaggingEvent};
pub use types::{
    DerivedArtifact, IngestStats, IngestedRun, RawArtifact, ThumbnailFormat, ThumbnailSpec,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
