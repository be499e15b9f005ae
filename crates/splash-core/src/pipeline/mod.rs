//! Ingestion pipeline components.
//!
//! - **discovery**: Find raw detector files under a source root
//! - **validate**: Pre-read checks (existence, size, header)
//! - **edf**: ESRF Data Format reader
//! - **decode**: Decode raw frames into floating point pixels
//! - **hash**: Content hashes for run identity
//! - **anonymize**: Anonymized destination buckets
//! - **thumbnail**: Log-scaled, contrast-stretched thumbnails
//! - **ingest**: Ingest one file into the archive
//! - **batch**: Ingest many files with a bounded worker pool
//! - **channel**: Bounded channels for backpressure

pub mod anonymize;
pub mod batch;
pub mod channel;
pub mod decode;
pub mod discovery;
pub mod edf;
pub mod hash;
pub mod ingest;
pub mod thumbnail;
pub mod validate;

// Re-exports for convenient access
pub use anonymize::PathAnonymizer;
pub use batch::BatchItem;
pub use decode::{RawDecoder, RawFrame};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use hash::Hasher;
pub use ingest::Ingestor;
pub use thumbnail::{ThumbnailRenderer, ThumbnailRequest};
pub use validate::Validator;
