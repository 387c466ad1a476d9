//! Content fingerprints for change detection.
//!
//! A file's fingerprint is the SHA-256 of its raw bytes, hex encoded.
//! Timestamps are never consulted: touching a file without changing it
//! does not trigger re-indexing, and a one-byte edit always does.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

const READ_BUF_BYTES: usize = 64 * 1024;

/// Hex-encoded SHA-256 of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Stream a file through SHA-256. Returns the hex digest and the byte count.
pub fn hash_file(path: &Path) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_BYTES];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}
