//! Transport seam between client sessions and a server
//!
//! Client sessions only see [`ChunkTransport`]; the HTTP carrier and the
//! in-process carrier are interchangeable behind it.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::message::{ChunkDownloadRequest, ChunkDownloadResponse, ChunkUpload, CompleteUpload, TransportReply};

/// Carrier for the three chunk protocol operations
///
/// `send_chunk` and `complete_upload` return `Ok` for any reply the server
/// produced, successful or not; `Err` means the reply never arrived.
/// `fetch_chunk` returns `Err` for non-success replies as well, since a
/// rejected download has no payload to interpret.
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// Deliver one chunk of an upload session
    async fn send_chunk(&self, chunk: ChunkUpload) -> Result<TransportReply>;

    /// Ask the server to merge, verify and publish an upload
    async fn complete_upload(&self, request: CompleteUpload) -> Result<TransportReply>;

    /// Fetch one chunk of a stored object
    async fn fetch_chunk(&self, request: ChunkDownloadRequest) -> Result<ChunkDownloadResponse>;
}
