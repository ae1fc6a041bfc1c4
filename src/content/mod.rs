//! Content canonicalization and hashing.
//!
//! The identity of a blob is the SHA-256 of its *canonicalized* bytes:
//! JPEG and PNG payloads have their embedded metadata stripped first so the
//! same visual content always yields the same hash regardless of EXIF or
//! text-chunk noise. Re-processing already-canonical bytes is a no-op, so
//! re-hashing at upload time reuses the same canonicalization and never
//! self-rejects on a hash mismatch.

mod jpeg;
mod png;

use sha2::{Digest, Sha256};

pub use jpeg::strip_jpeg_metadata;
pub use png::strip_png_metadata;

/// Result of canonicalizing and hashing one file.
#[derive(Debug, Clone)]
pub struct Processed {
    /// Lowercase hex SHA-256 of the canonical bytes.
    pub hash: String,
    /// Canonicalized bytes; these are what gets uploaded.
    pub canonical_bytes: Vec<u8>,
    /// Length of the canonical bytes.
    pub size_bytes: u64,
}

/// Canonicalize `bytes` for the given MIME type and hash the result.
///
/// JPEG input loses its APP1 (Exif/XMP) segments; PNG input loses `eXIf`,
/// `tEXt`, `zTXt`, and `iTXt` chunks. Malformed or truncated images pass
/// through unchanged rather than failing the hash operation. Every other
/// MIME type passes through unmodified.
#[must_use]
pub fn process(bytes: &[u8], mime_type: &str) -> Processed {
    let canonical = match mime_type {
        "image/jpeg" => strip_jpeg_metadata(bytes).unwrap_or_else(|| bytes.to_vec()),
        "image/png" => strip_png_metadata(bytes).unwrap_or_else(|| bytes.to_vec()),
        _ => bytes.to_vec(),
    };

    let hash = sha256_hex(&canonical);
    let size_bytes = canonical.len() as u64;

    Processed {
        hash,
        canonical_bytes: canonical,
        size_bytes,
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
