//! Anonymized destination buckets derived from source directories.
//!
//! A file's bucket is the hash of its directory relative to the source root.
//! Files that shared a directory keep sharing a bucket, the original names
//! cannot be read back from the bucket, and renaming a file leaves its
//! bucket unchanged.

use std::ffi::OsStr;
use std::path::{Component, Path};

use super::hash::Hasher;
use crate::error::{IngestError, IngestResult};

/// Computes destination bucket names.
pub struct PathAnonymizer;

impl PathAnonymizer {
    /// Bucket name for `file_path`, relative to `source_root`.
    ///
    /// Files directly under the root map to the hash of the empty string.
    /// Segments are hashed as raw bytes, so names that are not valid UTF-8
    /// still get distinct buckets.
    pub fn bucket_for(source_root: &Path, file_path: &Path) -> IngestResult<String> {
        let segments = Self::dir_segments(source_root, file_path)?;
        let mut joined = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                joined.push(b'/');
            }
            joined.extend_from_slice(segment.as_encoded_bytes());
        }
        Ok(Hasher::content_hash_from_bytes(&joined))
    }

    /// Directory portion of `file_path` relative to `source_root`, joined
    /// with `/` regardless of platform.
    ///
    /// For display only; invalid UTF-8 is replaced.
    pub fn relative_dir(source_root: &Path, file_path: &Path) -> IngestResult<String> {
        let segments = Self::dir_segments(source_root, file_path)?;
        Ok(segments
            .iter()
            .map(|segment| segment.to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }

    fn dir_segments<'a>(
        source_root: &Path,
        file_path: &'a Path,
    ) -> IngestResult<Vec<&'a OsStr>> {
        let outside = || IngestError::OutsideSourceRoot {
            path: file_path.to_path_buf(),
            root: source_root.to_path_buf(),
        };
        let relative = file_path.strip_prefix(source_root).map_err(|_| outside())?;
        let dir = relative.parent().unwrap_or_else(|| Path::new(""));

        let mut segments = Vec::new();
        for component in dir.components() {
            match component {
                Component::Normal(segment) => segments.push(segment),
                Component::CurDir => {}
                _ => return Err(outside()),
            }
        }
        Ok(segments)
    }
}
