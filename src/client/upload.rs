//! Upload client
//!
//! Splits a local file into chunks, delivers them one at a time with a
//! bounded retry, then asks the server to complete the upload.

use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::checksum::digest_file;
use crate::client::{ChunkProgress, ProgressCallback};
use crate::error::{Result, TransferError};
use crate::protocol::message::{ChunkUpload, CompleteUpload};
use crate::protocol::transport::ChunkTransport;
use crate::storage::validate_path_component;
use crate::transfer::{with_retries, ChunkDescriptor, ChunkPlan, TransferConfig};

/// Generate a fresh upload session id (128 random bits, lowercase hex)
pub fn new_upload_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

/// How the completion call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Server merged, verified and published the file
    Accepted { message: String },
    /// Server answered with a failure status
    Rejected { status: u16, message: String },
    /// No answer reached us
    Unreachable { reason: String },
}

impl Completion {
    /// Whether the server accepted the upload
    pub fn is_accepted(&self) -> bool {
        matches!(self, Completion::Accepted { .. })
    }
}

/// Summary of a finished upload session
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub session_id: String,
    pub file_name: String,
    pub total_chunks: u32,
    pub file_size: u64,
    /// Whole-file checksum sent at completion
    pub checksum: String,
    pub completion: Completion,
}

/// Client half of the upload path
pub struct UploadClient {
    transport: Arc<dyn ChunkTransport>,
    config: TransferConfig,
    progress: Option<ProgressCallback>,
}

impl UploadClient {
    /// Create an upload client
    pub fn new(transport: Arc<dyn ChunkTransport>, config: TransferConfig) -> Self {
        Self {
            transport,
            config,
            progress: None,
        }
    }

    /// Report progress after every chunk
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Upload `path` into `bucket` under its file name
    ///
    /// Fails if any chunk exhausts its retry budget. Completion is sent
    /// once; its outcome is reported in the receipt and never retried.
    pub async fn start_upload(&self, path: &Path, bucket: &str) -> Result<UploadReceipt> {
        self.config.validate()?;
        validate_path_component(bucket, "bucketName")?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::validation_error_with_field(format!("no usable file name in {}", path.display()), "fileName"))?
            .to_string();
        validate_path_component(&file_name, "fileName")?;

        let meta = fs::metadata(path).await.map_err(|e| {
            error!("Cannot stat upload source '{}': {}", path.display(), e);
            if e.kind() == std::io::ErrorKind::NotFound {
                TransferError::not_found("Upload source does not exist", path.display().to_string())
            } else {
                TransferError::storage_error_full("Failed to stat upload source", path.display().to_string(), e.to_string())
            }
        })?;
        if !meta.is_file() {
            return Err(TransferError::validation_error_with_field(format!("{} is not a file", path.display()), "file"));
        }

        let file_size = meta.len();
        let plan = ChunkPlan::new(file_size, self.config.chunk_size)?;
        let checksum = digest_file(path).await?;
        let session_id = new_upload_id();
        let total_chunks = plan.wire_chunk_count();

        info!(
            "Uploading {} ({} bytes, {} chunks) to bucket {} as session {}",
            file_name, file_size, total_chunks, bucket, session_id
        );

        for range in plan.ranges() {
            let index = range.index;
            with_retries(index, self.config.max_retries, "Upload", |attempt| {
                let transport = Arc::clone(&self.transport);
                let session_id = session_id.clone();
                async move {
                    let chunk = ChunkDescriptor::read(path, range).await?;
                    debug!("Sending chunk {} ({} bytes, attempt {})", index, chunk.len(), attempt);
                    let reply = transport
                        .send_chunk(ChunkUpload {
                            upload_id: session_id,
                            chunk_index: index,
                            chunk_checksum: chunk.checksum,
                            content: chunk.content,
                        })
                        .await?;
                    if reply.is_success() {
                        debug!("Chunk {} accepted: {}", index, reply.message);
                        Ok(())
                    } else {
                        Err(TransferError::transport_error_for_chunk(
                            format!("server answered {}", reply.status),
                            index,
                            reply.message,
                        ))
                    }
                }
            })
            .await?;

            if let Some(progress) = &self.progress {
                progress(ChunkProgress {
                    index,
                    total_chunks,
                    bytes_done: range.end,
                    total_bytes: file_size,
                    resumed: false,
                });
            }
        }

        let request = CompleteUpload {
            upload_id: session_id.clone(),
            file_name: file_name.clone(),
            total_chunks,
            expected_checksum: checksum.clone(),
            bucket_name: bucket.to_string(),
        };

        let completion = match self.transport.complete_upload(request).await {
            Ok(reply) if reply.is_success() => {
                info!("Upload {} completed: {}", session_id, reply.message);
                Completion::Accepted { message: reply.message }
            }
            Ok(reply) => {
                warn!("Upload {} completion rejected ({}): {}", session_id, reply.status, reply.message);
                Completion::Rejected {
                    status: reply.status,
                    message: reply.message,
                }
            }
            Err(e) => {
                error!("Upload {} completion failed: {}", session_id, e);
                Completion::Unreachable { reason: e.to_string() }
            }
        };

        Ok(UploadReceipt {
            session_id,
            file_name,
            total_chunks,
            file_size,
            checksum,
            completion,
        })
    }
}
