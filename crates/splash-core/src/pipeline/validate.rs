//! Source file checks before reading and decoding.

use std::io::Read;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::IngestError;

/// Validates source files before ingestion.
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    /// Create a new validator with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Perform quick validation before the full read.
    ///
    /// Checks:
    /// - File exists and is readable
    /// - File size is within limits
    /// - File starts with a recognised detector/image header
    pub fn validate(&self, path: &Path) -> Result<u64, IngestError> {
        if !path.exists() {
            return Err(IngestError::FileNotFound(path.to_path_buf()));
        }

        let metadata = std::fs::metadata(path).map_err(|e| IngestError::io(path, e))?;

        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(IngestError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        self.check_magic_bytes(path)?;

        Ok(metadata.len())
    }

    /// Check file magic bytes against the formats the decoder understands.
    fn check_magic_bytes(&self, path: &Path) -> Result<(), IngestError> {
        let mut file = std::fs::File::open(path).map_err(|e| IngestError::io(path, e))?;

        let mut header = [0u8; 8];
        let bytes_read = file
            .read(&mut header)
            .map_err(|e| IngestError::io(path, e))?;

        if !Self::is_valid_header(&header[..bytes_read]) {
            return Err(IngestError::Decode {
                path: path.to_path_buf(),
                message: "Unrecognized frame format (invalid magic bytes)".to_string(),
            });
        }

        Ok(())
    }

    /// Check if the header bytes match a supported format.
    fn is_valid_header(header: &[u8]) -> bool {
        // EDF: ASCII header opening with '{'
        if super::edf::looks_like_edf(header) {
            return true;
        }

        if header.len() < 4 {
            return false;
        }

        // TIFF: II (little-endian) or MM (big-endian) followed by version 42
        let is_tiff_le = header[..4] == [b'I', b'I', 0x2A, 0x00];
        let is_tiff_be = header[..4] == [b'M', b'M', 0x00, 0x2A];
        if is_tiff_le || is_tiff_be {
            return true;
        }

        // PNG: 89 50 4E 47
        if header[..4] == [0x89, b'P', b'N', b'G'] {
            return true;
        }

        // JPEG: FF D8 FF
        header[..3] == [0xFF, 0xD8, 0xFF]
    }
}
