//! Download service
//!
//! Server half of the download path: serves one byte range per request and
//! attaches the file metadata the client needs to resume and verify.

use tokio::fs;
use tracing::{debug, error};

use crate::checksum::digest_file;
use crate::error::{Result, TransferError};
use crate::protocol::message::{ChunkDownloadRequest, ChunkDownloadResponse};
use crate::storage::LocalObjectStore;
use crate::transfer::chunk::read_range;
use crate::transfer::ChunkPlan;

/// Serves chunks of objects held in a [`LocalObjectStore`]
#[derive(Debug, Clone)]
pub struct DownloadService {
    objects: LocalObjectStore,
    chunk_size: u64,
}

impl DownloadService {
    /// Create a service cutting objects into `chunk_size` byte chunks
    pub fn new(objects: LocalObjectStore, chunk_size: u64) -> Self {
        Self { objects, chunk_size }
    }

    /// Serve chunk `chunk_index` of `bucket`/`key`
    ///
    /// Every response carries the file name and total size. The terminal
    /// chunk also carries the whole-file checksum, computed per request.
    pub async fn serve_chunk(&self, request: &ChunkDownloadRequest) -> Result<ChunkDownloadResponse> {
        let path = self.objects.object_path(&request.bucket, &request.key)?;

        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(TransferError::not_found("Not a file", format!("{}/{}", request.bucket, request.key))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Requested object {}/{} does not exist", request.bucket, request.key);
                return Err(TransferError::not_found("File not found", format!("{}/{}", request.bucket, request.key)));
            }
            Err(e) => {
                error!("Failed to stat '{}': {}", path.display(), e);
                return Err(TransferError::storage_error_full("Failed to stat object", path.display().to_string(), e.to_string()));
            }
        };

        let file_size = meta.len();
        let plan = ChunkPlan::new(file_size, self.chunk_size)?;
        let range = plan.range_of(request.chunk_index).ok_or_else(|| {
            debug!(
                "Chunk {} requested past the end of {}/{} ({} chunks)",
                request.chunk_index,
                request.bucket,
                request.key,
                plan.wire_chunk_count()
            );
            TransferError::validation_error_with_field(
                format!("chunk {} is beyond the end of the file", request.chunk_index),
                "chunkIndex",
            )
        })?;

        let data = read_range(&path, range).await?;
        let is_last = plan.is_last(request.chunk_index);
        let expected_checksum = if is_last { Some(digest_file(&path).await?) } else { None };

        debug!(
            "Serving chunk {} of {}/{} [{}..{}){}",
            request.chunk_index,
            request.bucket,
            request.key,
            range.start,
            range.end,
            if is_last { ", terminal" } else { "" }
        );

        Ok(ChunkDownloadResponse {
            data,
            file_size,
            file_name: request.key.clone(),
            is_last,
            expected_checksum,
        })
    }
}
