//! Checksum engine
//!
//! SHA-256 digests rendered as lowercase hex, used for both per-chunk and
//! whole-file verification.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, trace};

use crate::error::{Result, TransferError};

/// Read buffer size used while hashing streams
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Hash a byte slice
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash an async byte stream in bounded reads
pub async fn digest_reader<R>(reader: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    trace!("Hashed {} bytes", total);
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a file on disk
pub async fn digest_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).await.map_err(|e| {
        error!("Failed to open '{}' for hashing: {}", path.display(), e);
        TransferError::storage_error_full("Failed to open file for hashing", path.display().to_string(), e.to_string())
    })?;
    digest_reader(&mut file)
        .await
        .map_err(|e| e.with_context(format!("hashing {}", path.display())))
}

/// Compare two hex digests, ignoring case
pub fn checksums_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_digest_bytes_known_value() {
        assert_eq!(digest_bytes(b""), EMPTY_SHA256);
        assert_eq!(
            digest_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_is_lowercase_hex() {
        let digest = digest_bytes(b"hello world");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_checksums_match_ignores_case() {
        let digest = digest_bytes(b"hello");
        assert!(checksums_match(&digest, &digest.to_uppercase()));
        assert!(!checksums_match(&digest, &digest_bytes(b"world")));
    }

    #[tokio::test]
    async fn test_digest_reader_spans_buffers() {
        // Larger than one read buffer so the loop runs several times
        let data: Vec<u8> = (0..READ_BUFFER_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let mut cursor = std::io::Cursor::new(data.clone());
        let digest = digest_reader(&mut cursor).await.unwrap();
        assert_eq!(digest, digest_bytes(&data));
    }

    #[tokio::test]
    async fn test_digest_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"test content for checksum").await.unwrap();

        assert_eq!(digest_file(&path).await.unwrap(), digest_bytes(b"test content for checksum"));
    }

    #[tokio::test]
    async fn test_digest_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = digest_file(&dir.path().join("absent")).await.unwrap_err();
        assert!(matches!(err, TransferError::StorageError { .. }));
    }
}
