//! Download client
//!
//! Fetches a stored object chunk by chunk into the local staging area,
//! skipping chunks already persisted by an earlier run, then reassembles
//! and verifies the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::checksum::{checksums_match, digest_bytes, digest_file};
use crate::client::{ChunkProgress, ProgressCallback};
use crate::error::{Result, TransferError};
use crate::protocol::message::{ChunkDownloadRequest, ChunkDownloadResponse};
use crate::protocol::transport::ChunkTransport;
use crate::storage::{validate_path_component, DownloadManifest, TransferStore};
use crate::transfer::{validate_chunk_sequence, with_retries, ChunkPlan, TransferConfig};

/// Prefix of reassembled output files
const OUTPUT_PREFIX: &str = "downloaded_";

/// Staging session id for `bucket`/`key`
///
/// Derived from the source so a restarted process finds its earlier chunks.
pub fn download_session_id(bucket: &str, key: &str) -> String {
    let digest = digest_bytes(format!("{}\n{}", bucket, key).as_bytes());
    format!("dl-{}", &digest[..32])
}

/// Outcome of whole-file verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified { checksum: String },
    Mismatch { expected: String, actual: String },
}

impl Verification {
    /// Whether the file matched the server checksum
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified { .. })
    }
}

/// Summary of a finished download
#[derive(Debug, Clone)]
pub struct DownloadReceipt {
    /// Reassembled output file
    pub path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    /// Chunks transferred during this run
    pub chunks_fetched: u32,
    /// Chunks found on disk from an earlier run
    pub chunks_resumed: u32,
    pub verification: Verification,
}

/// Client half of the download path
pub struct DownloadClient {
    transport: Arc<dyn ChunkTransport>,
    config: TransferConfig,
    store: TransferStore,
    progress: Option<ProgressCallback>,
}

impl DownloadClient {
    /// Create a download client staging chunks under `config.staging_root`
    pub fn new(transport: Arc<dyn ChunkTransport>, config: TransferConfig) -> Self {
        let store = TransferStore::new(config.staging_root.clone());
        Self {
            transport,
            config,
            store,
            progress: None,
        }
    }

    /// Report progress after every chunk
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Staging area used by this client
    pub fn store(&self) -> &TransferStore {
        &self.store
    }

    /// Download `bucket`/`key` into `output_dir`
    ///
    /// Chunks persisted by an interrupted earlier run are reused. The
    /// output is written to `<output_dir>/downloaded_<file_name>`.
    pub async fn download(&self, bucket: &str, key: &str, output_dir: &Path) -> Result<DownloadReceipt> {
        self.config.validate()?;
        validate_path_component(bucket, "bucket")?;
        validate_path_component(key, "key")?;

        let session = download_session_id(bucket, key);
        let manifest_path = self.store.manifest_path(&session)?;
        let mut manifest = self.open_manifest(&session, &manifest_path, bucket, key).await?;

        info!("Downloading {}/{} (session {})", bucket, key, session);

        let mut index = 0u32;
        let mut fetched = 0u32;
        let mut resumed = 0u32;

        loop {
            if let Some(plan) = manifest.plan()? {
                if self.can_skip(&session, &manifest, &plan, index).await? {
                    debug!("Chunk {} already on disk, skipping", index);
                    resumed += 1;
                    self.report(&plan, index, true);
                    if plan.is_last(index) {
                        break;
                    }
                    index += 1;
                    continue;
                }
            }

            let response = self.fetch(bucket, key, index).await?;

            if let Some(previous) = manifest.file_size {
                if previous != response.file_size {
                    warn!(
                        "Remote size of {}/{} changed from {} to {}, restarting",
                        bucket, key, previous, response.file_size
                    );
                    self.store.remove_session(&session).await?;
                    manifest = DownloadManifest::new(bucket, key, self.config.chunk_size);
                    manifest.save(&manifest_path).await?;
                    index = 0;
                    fetched = 0;
                    resumed = 0;
                    continue;
                }
            }

            let plan = ChunkPlan::new(response.file_size, self.config.chunk_size)?;
            check_response(&plan, index, &response)?;

            self.store.write_chunk(&session, index, &response.data).await?;

            let mut changed = manifest.record_file(&response.file_name, response.file_size);
            if let Some(checksum) = &response.expected_checksum {
                changed |= manifest.record_checksum(checksum);
            }
            if changed {
                manifest.save(&manifest_path).await?;
            }

            fetched += 1;
            self.report(&plan, index, false);
            if response.is_last {
                break;
            }
            index += 1;
        }

        let total_chunks = index + 1;
        info!(
            "All {} chunks of {}/{} staged ({} fetched, {} resumed)",
            total_chunks, bucket, key, fetched, resumed
        );

        self.reassemble(&session, &manifest, total_chunks, output_dir, fetched, resumed)
            .await
    }

    async fn open_manifest(&self, session: &str, path: &Path, bucket: &str, key: &str) -> Result<DownloadManifest> {
        let manifest = match DownloadManifest::load(path).await? {
            Some(existing) if existing.matches(bucket, key, self.config.chunk_size) => {
                info!("Resuming download session {}", session);
                return Ok(existing);
            }
            Some(existing) => {
                warn!(
                    "Discarding session {} started with chunk size {} (now {})",
                    session, existing.chunk_size, self.config.chunk_size
                );
                self.store.remove_session(session).await?;
                DownloadManifest::new(bucket, key, self.config.chunk_size)
            }
            None => DownloadManifest::new(bucket, key, self.config.chunk_size),
        };
        manifest.save(path).await?;
        Ok(manifest)
    }

    /// Whether chunk `index` on disk can be trusted without fetching it
    async fn can_skip(&self, session: &str, manifest: &DownloadManifest, plan: &ChunkPlan, index: u32) -> Result<bool> {
        let Some(range) = plan.range_of(index) else {
            return Ok(false);
        };
        let Some(len) = self.store.chunk_len(session, index).await? else {
            return Ok(false);
        };
        if len != range.len() {
            debug!("Chunk {} on disk has {} bytes, expected {}; refetching", index, len, range.len());
            return Ok(false);
        }
        if plan.is_last(index) && manifest.expected_checksum.is_none() {
            return Ok(false);
        }
        Ok(true)
    }

    async fn fetch(&self, bucket: &str, key: &str, index: u32) -> Result<ChunkDownloadResponse> {
        with_retries(index, self.config.max_retries, "Download", |attempt| {
            let transport = Arc::clone(&self.transport);
            let request = ChunkDownloadRequest {
                bucket: bucket.to_string(),
                key: key.to_string(),
                chunk_index: index,
            };
            async move {
                debug!("Fetching chunk {} (attempt {})", index, attempt);
                transport.fetch_chunk(request).await
            }
        })
        .await
    }

    fn report(&self, plan: &ChunkPlan, index: u32, resumed: bool) {
        if let (Some(progress), Some(range)) = (&self.progress, plan.range_of(index)) {
            progress(ChunkProgress {
                index,
                total_chunks: plan.wire_chunk_count(),
                bytes_done: range.end,
                total_bytes: plan.total_size(),
                resumed,
            });
        }
    }

    async fn reassemble(
        &self,
        session: &str,
        manifest: &DownloadManifest,
        total_chunks: u32,
        output_dir: &Path,
        fetched: u32,
        resumed: u32,
    ) -> Result<DownloadReceipt> {
        let (Some(file_name), Some(expected)) = (manifest.file_name.as_deref(), manifest.expected_checksum.as_deref()) else {
            error!("Session {} finished without file metadata", session);
            return Err(TransferError::protocol_error("terminal chunk carried no file metadata"));
        };
        validate_path_component(file_name, "fileName")?;

        let indices = self.store.list_chunks(session).await?;
        validate_chunk_sequence(&indices, Some(total_chunks))?;

        fs::create_dir_all(output_dir).await.map_err(|e| {
            error!("Failed to create output directory '{}': {}", output_dir.display(), e);
            TransferError::storage_error_full("Failed to create output directory", output_dir.display().to_string(), e.to_string())
        })?;
        let output = output_dir.join(format!("{}{}", OUTPUT_PREFIX, file_name));

        let file_size = self.store.merge_chunks(session, total_chunks, &output).await?;
        self.store.remove_session(session).await?;

        let actual = digest_file(&output).await?;
        let verification = if checksums_match(&actual, expected) {
            info!("Downloaded {} ({} bytes), checksum verified", output.display(), file_size);
            Verification::Verified { checksum: actual }
        } else if self.config.strict_checksum {
            error!("Checksum mismatch for {}: expected {}, got {}", output.display(), expected, actual);
            if let Err(e) = fs::remove_file(&output).await {
                warn!("Failed to remove unverified output '{}': {}", output.display(), e);
            }
            return Err(TransferError::file_checksum_mismatch(expected, actual));
        } else {
            warn!("Checksum mismatch for {}: expected {}, got {}", output.display(), expected, actual);
            Verification::Mismatch {
                expected: expected.to_string(),
                actual,
            }
        };

        Ok(DownloadReceipt {
            path: output,
            file_name: file_name.to_string(),
            file_size,
            chunks_fetched: fetched,
            chunks_resumed: resumed,
            verification,
        })
    }
}

/// Check a response against the chunk layout it claims to belong to
fn check_response(plan: &ChunkPlan, index: u32, response: &ChunkDownloadResponse) -> Result<()> {
    let range = plan.range_of(index).ok_or_else(|| {
        error!("Server sent chunk {} beyond the end of a {} byte file", index, plan.total_size());
        TransferError::protocol_error(format!("chunk {} is beyond the end of the file", index))
    })?;

    if response.data.len() as u64 != range.len() {
        error!(
            "Chunk {} has {} bytes, expected {} (server chunk size differs?)",
            index,
            response.data.len(),
            range.len()
        );
        return Err(TransferError::protocol_error(format!(
            "chunk {} has {} bytes, expected {}",
            index,
            response.data.len(),
            range.len()
        )));
    }

    if response.is_last != plan.is_last(index) {
        error!("Chunk {} terminal flag disagrees with the file size", index);
        return Err(TransferError::protocol_error(format!("unexpected terminal flag on chunk {}", index)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{ChunkUpload, CompleteUpload, TransportReply};
    use crate::protocol::LocalTransport;
    use crate::server::ServerState;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records fetched indices and can fail or corrupt on demand
    struct RecordingTransport {
        inner: LocalTransport,
        fetched: Mutex<Vec<u32>>,
        /// Fail every fetch of an index at or above this one
        fail_from: Option<u32>,
        /// Fail this many fetches before forwarding
        transient_failures: AtomicU32,
        /// Report this checksum on the terminal chunk
        forged_checksum: Option<String>,
    }

    impl RecordingTransport {
        fn new(state: Arc<ServerState>) -> Self {
            Self {
                inner: LocalTransport::new(state),
                fetched: Mutex::new(Vec::new()),
                fail_from: None,
                transient_failures: AtomicU32::new(0),
                forged_checksum: None,
            }
        }

        fn fetched(&self) -> Vec<u32> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChunkTransport for RecordingTransport {
        async fn send_chunk(&self, chunk: ChunkUpload) -> Result<TransportReply> {
            self.inner.send_chunk(chunk).await
        }

        async fn complete_upload(&self, request: CompleteUpload) -> Result<TransportReply> {
            self.inner.complete_upload(request).await
        }

        async fn fetch_chunk(&self, request: ChunkDownloadRequest) -> Result<ChunkDownloadResponse> {
            if self.fail_from.is_some_and(|from| request.chunk_index >= from) {
                return Err(TransferError::transport_error("connection refused"));
            }
            let pending = self.transient_failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.transient_failures.store(pending - 1, Ordering::SeqCst);
                return Err(TransferError::transport_error("connection reset"));
            }
            self.fetched.lock().unwrap().push(request.chunk_index);
            let mut response = self.inner.fetch_chunk(request).await?;
            if let (Some(forged), Some(_)) = (&self.forged_checksum, &response.expected_checksum) {
                response.expected_checksum = Some(forged.clone());
            }
            Ok(response)
        }
    }

    struct Fixture {
        dir: TempDir,
        state: Arc<ServerState>,
        config: TransferConfig,
    }

    async fn fixture(content: &[u8]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let objects = dir.path().join("objects");
        tokio::fs::create_dir_all(objects.join("docs")).await.unwrap();
        tokio::fs::write(objects.join("docs").join("data.bin"), content).await.unwrap();

        let server_config = TransferConfig::new(dir.path().join("server-staging")).with_chunk_size(4);
        let state = Arc::new(ServerState::new(&server_config, objects).unwrap());
        let config = TransferConfig::new(dir.path().join("client-staging")).with_chunk_size(4);
        Fixture { dir, state, config }
    }

    #[test]
    fn test_session_id_is_deterministic() {
        let a = download_session_id("docs", "data.bin");
        assert_eq!(a, download_session_id("docs", "data.bin"));
        assert_ne!(a, download_session_id("docs", "other.bin"));
        assert!(validate_path_component(&a, "uploadId").is_ok());
    }

    #[test]
    fn test_check_response_rejects_wrong_length() {
        let plan = ChunkPlan::new(10, 4).unwrap();
        let response = ChunkDownloadResponse {
            data: Bytes::from_static(b"abc"),
            file_size: 10,
            file_name: "data.bin".to_string(),
            is_last: false,
            expected_checksum: None,
        };
        assert!(matches!(check_response(&plan, 0, &response), Err(TransferError::ProtocolError { .. })));
    }

    #[tokio::test]
    async fn test_download_reassembles_and_verifies() {
        let f = fixture(b"0123456789").await;
        let transport = Arc::new(RecordingTransport::new(Arc::clone(&f.state)));
        let client = DownloadClient::new(transport.clone(), f.config.clone());

        let out = f.dir.path().join("out");
        let receipt = client.download("docs", "data.bin", &out).await.unwrap();

        assert_eq!(receipt.path, out.join("downloaded_data.bin"));
        assert_eq!(tokio::fs::read(&receipt.path).await.unwrap(), b"0123456789");
        assert!(receipt.verification.is_verified());
        assert_eq!(receipt.chunks_fetched, 3);
        assert_eq!(receipt.chunks_resumed, 0);
        assert_eq!(transport.fetched(), vec![0, 1, 2]);

        let session = download_session_id("docs", "data.bin");
        assert!(!client.store().has_session(&session).await.unwrap());
    }

    #[tokio::test]
    async fn test_resume_skips_persisted_chunks() {
        let f = fixture(b"0123456789").await;
        let out = f.dir.path().join("out");

        let mut broken = RecordingTransport::new(Arc::clone(&f.state));
        broken.fail_from = Some(2);
        let client = DownloadClient::new(Arc::new(broken), f.config.clone());
        let err = client.download("docs", "data.bin", &out).await.unwrap_err();
        assert!(matches!(err, TransferError::RetriesExhausted { chunk: 2, .. }));

        let transport = Arc::new(RecordingTransport::new(Arc::clone(&f.state)));
        let client = DownloadClient::new(transport.clone(), f.config.clone());
        let receipt = client.download("docs", "data.bin", &out).await.unwrap();

        assert_eq!(transport.fetched(), vec![2]);
        assert_eq!(receipt.chunks_resumed, 2);
        assert_eq!(receipt.chunks_fetched, 1);
        assert!(receipt.verification.is_verified());
        assert_eq!(tokio::fs::read(&receipt.path).await.unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_chunk_size_change_discards_session() {
        let f = fixture(b"0123456789").await;
        let out = f.dir.path().join("out");

        let mut broken = RecordingTransport::new(Arc::clone(&f.state));
        broken.fail_from = Some(1);
        let client = DownloadClient::new(Arc::new(broken), f.config.clone().with_chunk_size(3));
        assert!(client.download("docs", "data.bin", &out).await.is_err());

        let transport = Arc::new(RecordingTransport::new(Arc::clone(&f.state)));
        let client = DownloadClient::new(transport.clone(), f.config.clone());
        let receipt = client.download("docs", "data.bin", &out).await.unwrap();
        assert_eq!(transport.fetched(), vec![0, 1, 2]);
        assert!(receipt.verification.is_verified());
    }

    #[tokio::test]
    async fn test_remote_size_change_restarts_download() {
        let f = fixture(b"abcdefghij").await;
        let out = f.dir.path().join("out");

        let mut broken = RecordingTransport::new(Arc::clone(&f.state));
        broken.fail_from = Some(2);
        let client = DownloadClient::new(Arc::new(broken), f.config.clone());
        assert!(client.download("docs", "data.bin", &out).await.is_err());

        let object = f.dir.path().join("objects").join("docs").join("data.bin");
        tokio::fs::write(&object, b"abcdefghijklmn").await.unwrap();

        let transport = Arc::new(RecordingTransport::new(Arc::clone(&f.state)));
        let client = DownloadClient::new(transport.clone(), f.config.clone());
        let receipt = client.download("docs", "data.bin", &out).await.unwrap();

        // chunks 0 and 1 are trusted until chunk 2 reports the new size
        assert_eq!(transport.fetched(), vec![2, 0, 1, 2, 3]);
        assert_eq!(receipt.chunks_fetched, 4);
        assert_eq!(receipt.chunks_resumed, 0);
        assert_eq!(receipt.file_size, 14);
        assert!(receipt.verification.is_verified());
        assert_eq!(tokio::fs::read(&receipt.path).await.unwrap(), b"abcdefghijklmn");
    }

    #[tokio::test]
    async fn test_transient_fetch_failures_are_retried() {
        let f = fixture(b"0123456789").await;
        let transport = RecordingTransport::new(Arc::clone(&f.state));
        transport.transient_failures.store(2, Ordering::SeqCst);

        let client = DownloadClient::new(Arc::new(transport), f.config.clone());
        let receipt = client.download("docs", "data.bin", &f.dir.path().join("out")).await.unwrap();
        assert!(receipt.verification.is_verified());
    }

    #[tokio::test]
    async fn test_mismatch_is_reported_by_default() {
        let f = fixture(b"0123456789").await;
        let mut transport = RecordingTransport::new(Arc::clone(&f.state));
        transport.forged_checksum = Some(digest_bytes(b"something else"));

        let client = DownloadClient::new(Arc::new(transport), f.config.clone());
        let receipt = client.download("docs", "data.bin", &f.dir.path().join("out")).await.unwrap();
        assert!(matches!(receipt.verification, Verification::Mismatch { .. }));
        assert!(receipt.path.exists());
    }

    #[tokio::test]
    async fn test_mismatch_is_fatal_when_strict() {
        let f = fixture(b"0123456789").await;
        let mut transport = RecordingTransport::new(Arc::clone(&f.state));
        transport.forged_checksum = Some(digest_bytes(b"something else"));

        let out = f.dir.path().join("out");
        let client = DownloadClient::new(Arc::new(transport), f.config.clone().with_strict_checksum(true));
        let err = client.download("docs", "data.bin", &out).await.unwrap_err();
        assert!(matches!(err, TransferError::ChecksumMismatch { chunk: None, .. }));
        assert!(!out.join("downloaded_data.bin").exists());
    }

    #[tokio::test]
    async fn test_empty_file_download() {
        let f = fixture(b"").await;
        let client = DownloadClient::new(Arc::new(LocalTransport::new(Arc::clone(&f.state))), f.config.clone());
        let receipt = client.download("docs", "data.bin", &f.dir.path().join("out")).await.unwrap();
        assert_eq!(receipt.file_size, 0);
        assert_eq!(receipt.chunks_fetched, 1);
        assert!(receipt.verification.is_verified());
    }

    #[tokio::test]
    async fn test_unknown_object_fails() {
        let f = fixture(b"x").await;
        let client = DownloadClient::new(Arc::new(LocalTransport::new(Arc::clone(&f.state))), f.config.clone());
        let err = client.download("docs", "absent.bin", &f.dir.path().join("out")).await.unwrap_err();
        assert!(matches!(err, TransferError::RetriesExhausted { chunk: 0, .. }));
        assert!(err.to_string().contains("Not found"));
    }
}
