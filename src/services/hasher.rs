use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::{AppError, Result};

/// Digest of the chain's first entry for every signer
pub const GENESIS_DIGEST: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// SHA-256 content hasher producing `0x`-prefixed lowercase hex digests
#[derive(Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    pub fn finalize(self) -> String {
        format!("0x{}", hex::encode(self.inner.finalize()))
    }

    /// Digest of an in-memory buffer
    pub fn digest(bytes: &[u8]) -> String {
        let mut hasher = Self::new();
        hasher.update(bytes);
        hasher.finalize()
    }

    /// Digest of a file on disk, read in chunks
    pub async fn digest_file(path: &Path) -> Result<String> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Self::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize())
    }
}

/// Canonical form of a user-supplied digest
pub fn normalize_digest(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if body.len() != 64 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::BadRequest(format!("Invalid digest: {}", raw)));
    }

    Ok(format!("0x{}", body.to_ascii_lowercase()))
}

/// Raw 32 bytes behind a canonical digest
pub fn digest_bytes(digest: &str) -> Result<[u8; 32]> {
    let canonical = normalize_digest(digest)?;
    let mut out = [0u8; 32];
    hex::decode_to_slice(&canonical[2..], &mut out)
        .map_err(|e| AppError::BadRequest(format!("Invalid digest: {}", e)))?;
    Ok(out)
}
