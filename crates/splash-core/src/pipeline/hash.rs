//! Content hashing for run identity and deduplication.

use blake3::Hasher as Blake3Hasher;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Block size used when streaming files through the digest.
const BLOCK_SIZE: usize = 64 * 1024;

/// BLAKE3 content hasher.
///
/// Every digest is lowercase hex and depends only on the bytes fed in, so
/// identical content hashes identically on every machine.
pub struct Hasher;

impl Hasher {
    /// Hash file contents, streaming in 64 KiB blocks.
    pub fn content_hash(path: &Path) -> std::io::Result<String> {
        let file = File::open(path)?;
        let mut reader = BufReader::with_capacity(BLOCK_SIZE, file);
        let mut hasher = Blake3Hasher::new();

        let mut buffer = vec![0u8; BLOCK_SIZE];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Hash an in-memory byte buffer.
    ///
    /// Produces the same digest as [`Hasher::content_hash`] over a file with
    /// these bytes; used when the source has already been read for decoding.
    pub fn content_hash_from_bytes(data: &[u8]) -> String {
        blake3::hash(data).to_hex().to_string()
    }

    /// Hash the UTF-8 bytes of a string.
    pub fn string_hash(s: &str) -> String {
        Self::content_hash_from_bytes(s.as_bytes())
    }
}
