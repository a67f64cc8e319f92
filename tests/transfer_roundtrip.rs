//! End-to-end transfers through the public API with the in-process transport.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chunked_transfer::{
    digest_bytes, ChunkDownloadRequest, ChunkDownloadResponse, ChunkTransport, ChunkUpload, CompleteUpload,
    DownloadClient, LocalTransport, Result, ServerState, TransferConfig, TransferError, TransportReply, UploadClient,
};

const MIB: u64 = 1024 * 1024;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 253) as u8).collect()
}

fn server(root: &Path) -> Arc<ServerState> {
    let config = TransferConfig::new(root.join("server-staging"));
    Arc::new(ServerState::new(&config, root.join("objects")).unwrap())
}

/// Fails every fetch at or past `cut` while `broken` is set
struct Interrupted {
    inner: LocalTransport,
    cut: u32,
    broken: AtomicBool,
}

#[async_trait]
impl ChunkTransport for Interrupted {
    async fn send_chunk(&self, chunk: ChunkUpload) -> Result<TransportReply> {
        self.inner.send_chunk(chunk).await
    }

    async fn complete_upload(&self, request: CompleteUpload) -> Result<TransportReply> {
        self.inner.complete_upload(request).await
    }

    async fn fetch_chunk(&self, request: ChunkDownloadRequest) -> Result<ChunkDownloadResponse> {
        if self.broken.load(Ordering::SeqCst) && request.chunk_index >= self.cut {
            return Err(TransferError::transport_error("connection reset"));
        }
        self.inner.fetch_chunk(request).await
    }
}

#[tokio::test]
async fn twelve_mib_upload_merges_three_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let state = server(dir.path());
    let content = pattern((12 * MIB) as usize);
    let source = dir.path().join("dataset.bin");
    tokio::fs::write(&source, &content).await.unwrap();

    let client = UploadClient::new(
        Arc::new(LocalTransport::new(Arc::clone(&state))),
        TransferConfig::new(dir.path().join("client-staging")),
    );
    let receipt = client.start_upload(&source, "archive").await.unwrap();

    assert!(receipt.completion.is_accepted(), "{:?}", receipt.completion);
    assert_eq!(receipt.total_chunks, 3);
    assert_eq!(receipt.file_size, 12 * MIB);
    assert_eq!(receipt.checksum, digest_bytes(&content));

    let stored = tokio::fs::read(dir.path().join("objects/archive/dataset.bin")).await.unwrap();
    assert_eq!(stored, content);
    assert!(!state.upload.store().has_session(&receipt.session_id).await.unwrap());
}

#[tokio::test]
async fn interrupted_download_resumes_without_refetching() {
    let dir = tempfile::tempdir().unwrap();
    let state = server(dir.path());
    let content = pattern((12 * MIB) as usize);
    let objects = dir.path().join("objects/archive");
    tokio::fs::create_dir_all(&objects).await.unwrap();
    tokio::fs::write(objects.join("dataset.bin"), &content).await.unwrap();

    let transport = Arc::new(Interrupted {
        inner: LocalTransport::new(state),
        cut: 2,
        broken: AtomicBool::new(true),
    });
    let config = TransferConfig::new(dir.path().join("client-staging"));
    let output = dir.path().join("out");

    let client = DownloadClient::new(transport.clone(), config.clone());
    let first = client.download("archive", "dataset.bin", &output).await;
    assert!(matches!(first, Err(TransferError::RetriesExhausted { chunk: 2, .. })), "{:?}", first);

    transport.broken.store(false, Ordering::SeqCst);
    let client = DownloadClient::new(transport, config);
    let receipt = client.download("archive", "dataset.bin", &output).await.unwrap();

    assert!(receipt.verification.is_verified());
    assert_eq!(receipt.chunks_resumed, 2);
    assert_eq!(receipt.chunks_fetched, 1);
    assert_eq!(receipt.path, output.join("downloaded_dataset.bin"));
    assert_eq!(tokio::fs::read(&receipt.path).await.unwrap(), content);
}

#[tokio::test]
async fn uploaded_file_downloads_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let state = server(dir.path());
    let content = pattern((5 * MIB + 17) as usize);
    let source = dir.path().join("notes.txt");
    tokio::fs::write(&source, &content).await.unwrap();

    let transport = Arc::new(LocalTransport::new(state));
    let upload = UploadClient::new(transport.clone(), TransferConfig::new(dir.path().join("up")));
    assert!(upload.start_upload(&source, "docs").await.unwrap().completion.is_accepted());

    let download = DownloadClient::new(transport, TransferConfig::new(dir.path().join("down")));
    let receipt = download.download("docs", "notes.txt", &dir.path().join("out")).await.unwrap();

    assert!(receipt.verification.is_verified());
    assert_eq!(receipt.file_size, content.len() as u64);
    assert_eq!(tokio::fs::read(&receipt.path).await.unwrap(), content);
}
