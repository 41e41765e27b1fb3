//! Deterministic document identifiers.
//!
//! A document's id is the SHA-256 of its path string, hex encoded. The same
//! path always yields the same id, which is what makes re-running ingestion
//! idempotent. Moving or renaming a file yields a new id.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Returns the 64-character lowercase hex SHA-256 of `path`'s string form.
pub fn document_id(path: &Path) -> String {
    digest_str(&path.to_string_lossy())
}

/// SHA-256 of an arbitrary string, hex encoded.
pub fn digest_str(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}
