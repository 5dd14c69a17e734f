//! Content digests for template deduplication

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `content`; also the blob's file name
pub fn digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
