//! In-process transport
//!
//! Calls the server services directly, producing the same replies the HTTP
//! surface would. Used for local transfers and by the test suite.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::error::Result;
use crate::protocol::message::{ChunkDownloadRequest, ChunkDownloadResponse, ChunkUpload, CompleteUpload, TransportReply};
use crate::protocol::transport::ChunkTransport;
use crate::server::ServerState;

/// Transport bound to a [`ServerState`] in the same process
#[derive(Clone)]
pub struct LocalTransport {
    state: Arc<ServerState>,
}

impl LocalTransport {
    /// Create a transport talking to `state`
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    /// Server state behind this transport
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }
}

#[async_trait]
impl ChunkTransport for LocalTransport {
    async fn send_chunk(&self, chunk: ChunkUpload) -> Result<TransportReply> {
        let index = chunk.chunk_index;
        trace!("Local delivery of chunk {} for session {}", index, chunk.upload_id);
        Ok(match self.state.upload.accept_chunk(chunk).await {
            Ok(outcome) => TransportReply::ok(outcome.message(index)),
            Err(e) => TransportReply {
                status: e.status_code(),
                message: e.to_string(),
            },
        })
    }

    async fn complete_upload(&self, request: CompleteUpload) -> Result<TransportReply> {
        Ok(match self.state.upload.complete_upload(request).await {
            Ok(done) => TransportReply::ok(format!("File uploaded successfully to {}/{}.", done.bucket, done.key)),
            Err(e) => TransportReply {
                status: e.status_code(),
                message: e.to_string(),
            },
        })
    }

    async fn fetch_chunk(&self, request: ChunkDownloadRequest) -> Result<ChunkDownloadResponse> {
        trace!("Local fetch of chunk {} of {}/{}", request.chunk_index, request.bucket, request.key);
        self.state.download.serve_chunk(&request).await
    }
}
