//! Object store abstraction
//!
//! Verified uploads are handed to an [`ObjectStore`], so the upload service
//! works against local disk or any remote bucket store without knowing the
//! implementation details.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransferError};
use crate::storage::validation::validate_path_component;

/// Destination for merged, verified uploads
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `length` bytes read from `reader` as `bucket`/`key`
    ///
    /// Implementations must fail if the stream yields a different number
    /// of bytes than announced.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        length: u64,
    ) -> Result<()>;
}

/// Filesystem object store laid out as `<root>/<bucket>/<key>`
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path at which `bucket`/`key` is stored
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_path_component(bucket, "bucket")?;
        validate_path_component(key, "key")?;
        Ok(self.root.join(bucket).join(key))
    }

    /// Copy `reader` into `partial`, returning the number of bytes written
    async fn write_partial(partial: &Path, reader: &mut (dyn AsyncRead + Send + Unpin), length: u64) -> Result<u64> {
        let mut file = fs::File::create(partial).await.map_err(|e| {
            error!("Failed to create object file '{}': {}", partial.display(), e);
            TransferError::storage_error_full("Failed to create object file", partial.display().to_string(), e.to_string())
        })?;

        let copied = tokio::io::copy(reader, &mut file).await.map_err(|e| {
            error!("Failed to write object file '{}' ({} bytes announced): {}", partial.display(), length, e);
            TransferError::storage_error_full("Failed to write object", partial.display().to_string(), e.to_string())
        })?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(copied)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        length: u64,
    ) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        let bucket_dir = self.root.join(bucket);
        fs::create_dir_all(&bucket_dir).await.map_err(|e| {
            error!("Failed to create bucket directory '{}': {}", bucket_dir.display(), e);
            TransferError::storage_error_full("Failed to create bucket directory", bucket_dir.display().to_string(), e.to_string())
        })?;

        let partial = bucket_dir.join(format!(".{}.part", key));
        let result = Self::write_partial(&partial, reader, length).await.and_then(|copied| {
            if copied == length {
                return Ok(());
            }
            error!("Object '{}/{}' announced {} bytes but received {}", bucket, key, length, copied);
            Err(TransferError::storage_error_with_path(
                format!("expected {} bytes, received {}", length, copied),
                path.display().to_string(),
            ))
        });
        let result = match result {
            Ok(()) => fs::rename(&partial, &path).await.map_err(|e| {
                error!("Failed to publish object '{}': {}", path.display(), e);
                TransferError::storage_error_full("Failed to publish object", path.display().to_string(), e.to_string())
            }),
            failed => failed,
        };

        if let Err(e) = result {
            if let Err(remove_err) = fs::remove_file(&partial).await {
                if remove_err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial object '{}': {}", partial.display(), remove_err);
                }
            }
            return Err(e);
        }

        debug!("Object file {}", path.display());
        info!("Stored object {}/{} ({} bytes)", bucket, key, length);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_object_path_layout() {
        let store = LocalObjectStore::new("/data");
        assert_eq!(store.object_path("docs", "a.pdf").unwrap(), PathBuf::from("/data/docs/a.pdf"));
        assert!(store.object_path("..", "a.pdf").is_err());
        assert!(store.object_path("docs", "x/y").is_err());
    }

    #[tokio::test]
    async fn test_put_writes_object() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let data = b"object body".to_vec();
        let mut reader = &data[..];
        store.put("docs", "body.txt", &mut reader, data.len() as u64).await.unwrap();

        let stored = tokio::fs::read(dir.path().join("docs").join("body.txt")).await.unwrap();
        assert_eq!(stored, data);
        assert!(!dir.path().join("docs").join(".body.txt.part").exists());
    }

    #[tokio::test]
    async fn test_put_rejects_short_stream() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let mut reader = &b"short"[..];
        let err = store.put("docs", "short.txt", &mut reader, 100).await.unwrap_err();
        assert!(matches!(err, TransferError::StorageError { .. }));
        assert!(!dir.path().join("docs").join("short.txt").exists());
        assert!(!dir.path().join("docs").join(".short.txt.part").exists());
    }

    /// Yields some bytes, then fails mid-stream
    struct BrokenReader {
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.sent {
                return std::task::Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away")));
            }
            self.sent = true;
            buf.put_slice(b"partial body");
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_put_removes_partial_on_read_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let mut reader = BrokenReader { sent: false };
        let err = store.put("docs", "broken.bin", &mut reader, 100).await.unwrap_err();
        assert!(matches!(err, TransferError::StorageError { .. }));
        assert!(!dir.path().join("docs").join("broken.bin").exists());
        assert!(!dir.path().join("docs").join(".broken.bin.part").exists());
    }
}
