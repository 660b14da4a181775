use std::path::Path;
use sha2::{Sha256, Digest};

/// SHA-256 of rendered document bytes, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash of the file currently at `path`, or None if it cannot be read.
pub fn file_hash(path: &Path) -> Option<String> {
    std::fs::read(path).ok().map(|bytes| content_hash(&bytes))
}
