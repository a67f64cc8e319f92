//! Upload service
//!
//! Server half of the upload path: verifies and stores incoming chunks,
//! then merges, verifies and publishes the completed file.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::checksum::{checksums_match, digest_file};
use crate::error::{Result, TransferError};
use crate::protocol::message::{ChunkUpload, CompleteUpload};
use crate::storage::{validate_path_component, ObjectStore, TransferStore};

/// Result of accepting a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// First delivery, stored and verified
    Stored,
    /// An identical chunk was already stored; nothing was rewritten
    AlreadyPresent,
    /// A stored chunk with a different checksum was replaced
    Replaced,
}

impl AcceptOutcome {
    /// Advisory text returned to the client
    pub fn message(&self, index: u32) -> String {
        match self {
            AcceptOutcome::Stored => format!("Chunk {} uploaded and verified.", index),
            AcceptOutcome::AlreadyPresent => format!("Chunk {} already uploaded and verified.", index),
            AcceptOutcome::Replaced => format!("Chunk {} replaced and verified.", index),
        }
    }
}

/// A published upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub checksum: String,
}

/// Server-side upload sessions
pub struct UploadService {
    store: TransferStore,
    objects: Arc<dyn ObjectStore>,
    /// One lock per live session id
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UploadService {
    /// Create a service staging chunks in `store` and publishing to `objects`
    pub fn new(store: TransferStore, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            objects,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Staging area used by this service
    pub fn store(&self) -> &TransferStore {
        &self.store
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(session_id.to_string()).or_default().clone()
    }

    /// Verify and persist one chunk
    ///
    /// Re-delivery of an identical chunk is a no-op. A stored chunk whose
    /// checksum differs from the new claim is replaced; the replacement is
    /// verified after it hits disk and removed again if it does not match.
    pub async fn accept_chunk(&self, chunk: ChunkUpload) -> Result<AcceptOutcome> {
        validate_path_component(&chunk.upload_id, "uploadId")?;
        let session = chunk.upload_id.as_str();
        let index = chunk.chunk_index;

        let lock = self.session_lock(session).await;
        let _guard = lock.lock().await;

        let replacing = match self.store.chunk_checksum(session, index).await? {
            Some(existing) if checksums_match(&existing, &chunk.chunk_checksum) => {
                debug!("Chunk {} of session {} already present", index, session);
                return Ok(AcceptOutcome::AlreadyPresent);
            }
            Some(existing) => {
                warn!(
                    "Chunk {} of session {} stored with checksum {}, client claims {}; replacing",
                    index, session, existing, chunk.chunk_checksum
                );
                self.store.remove_chunk(session, index).await?;
                true
            }
            None => false,
        };

        self.store.write_chunk(session, index, &chunk.content).await?;

        let stored = self.store.chunk_path(session, index)?;
        let actual = digest_file(&stored).await?;
        if !checksums_match(&actual, &chunk.chunk_checksum) {
            warn!(
                "Chunk {} of session {} checksum mismatch: expected {}, got {}",
                index, session, chunk.chunk_checksum, actual
            );
            self.store.remove_chunk(session, index).await?;
            return Err(TransferError::chunk_checksum_mismatch(index, chunk.chunk_checksum, actual));
        }

        debug!("Accepted chunk {} of session {} ({} bytes)", index, session, chunk.content.len());
        Ok(if replacing {
            AcceptOutcome::Replaced
        } else {
            AcceptOutcome::Stored
        })
    }

    /// Merge, verify and publish an upload session
    ///
    /// Missing chunks fail before anything is verified. A merged file that
    /// fails verification is left in staging for inspection. After a
    /// successful handoff the session staging area is removed.
    pub async fn complete_upload(&self, request: CompleteUpload) -> Result<CompletedUpload> {
        validate_path_component(&request.upload_id, "uploadId")?;
        validate_path_component(&request.bucket_name, "bucketName")?;
        if request.total_chunks == 0 {
            return Err(TransferError::validation_error_with_field("total chunks must be at least 1", "totalChunks"));
        }

        let session = request.upload_id.as_str();
        let merged = self.store.merged_path(session, &request.file_name)?;

        let lock = self.session_lock(session).await;
        let _guard = lock.lock().await;

        info!(
            "Completing upload {} ({} chunks) as {}/{}",
            session, request.total_chunks, request.bucket_name, request.file_name
        );

        let size = self.store.merge_chunks(session, request.total_chunks, &merged).await?;

        let actual = digest_file(&merged).await?;
        if !checksums_match(&actual, &request.expected_checksum) {
            error!(
                "Final checksum mismatch for upload {}: expected {}, got {}; merged file kept at {}",
                session,
                request.expected_checksum,
                actual,
                merged.display()
            );
            return Err(TransferError::file_checksum_mismatch(request.expected_checksum, actual));
        }

        let mut file = fs::File::open(&merged).await.map_err(|e| {
            error!("Failed to open merged file '{}': {}", merged.display(), e);
            TransferError::storage_error_full("Failed to open merged file", merged.display().to_string(), e.to_string())
        })?;
        self.objects
            .put(&request.bucket_name, &request.file_name, &mut file, size)
            .await
            .map_err(|e| e.with_context(format!("publishing upload {}", session)))?;
        drop(file);

        self.store.remove_session(session).await?;

        info!("Upload {} published as {}/{} ({} bytes)", session, request.bucket_name, request.file_name, size);
        Ok(CompletedUpload {
            bucket: request.bucket_name,
            key: request.file_name,
            size,
            checksum: actual,
        })
    }

    /// Remove staging areas of sessions idle for at least `max_age`
    ///
    /// Sessions with an operation in flight are skipped. Lock entries of
    /// idle sessions are pruned.
    pub async fn sweep_stale(&self, max_age: Duration) -> Result<usize> {
        // No session lock is handed out while the map is held
        let mut locks = self.locks.lock().await;
        let busy: HashSet<String> = locks
            .iter()
            .filter(|(_, lock)| Arc::strong_count(lock) > 1 || lock.try_lock().is_err())
            .map(|(session, _)| session.clone())
            .collect();

        let removed = self.store.sweep_stale(max_age, |session| busy.contains(session)).await?;
        locks.retain(|session, _| busy.contains(session));
        if !busy.is_empty() {
            debug!("Sweep skipped {} busy upload sessions", busy.len());
        }
        if removed > 0 {
            info!("Swept {} abandoned upload sessions", removed);
        }
        Ok(removed)
    }
}
