//! HTTP transport
//!
//! Carries the chunk protocol over the server's HTTP surface: multipart
//! forms for upload operations, JSON request plus metadata headers for
//! chunk downloads.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, error, trace};
use url::Url;

use crate::error::{Result, TransferError};
use crate::protocol::message::{
    fields, ChunkDownloadRequest, ChunkDownloadResponse, ChunkUpload, CompleteUpload, TransportReply,
    HEADER_EXPECTED_CHECKSUM, HEADER_FILE_NAME, HEADER_FILE_SIZE, ROUTE_CHUNK_WITH_META, ROUTE_UPLOAD_CHUNK,
    ROUTE_UPLOAD_COMPLETE,
};
use crate::protocol::transport::ChunkTransport;
use crate::storage::chunk_file_name;

/// Transport talking to a chunk transfer server over HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport for the server at `base_url`
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// Create a transport from a URL string
    pub fn parse(base_url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(base_url)?))
    }

    /// Server base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, route: &str) -> Result<Url> {
        Ok(self.base_url.join(route)?)
    }
}

#[async_trait]
impl ChunkTransport for HttpTransport {
    async fn send_chunk(&self, chunk: ChunkUpload) -> Result<TransportReply> {
        let index = chunk.chunk_index;
        let url = self.endpoint(ROUTE_UPLOAD_CHUNK)?;
        trace!("POST {} chunk {} ({} bytes)", url, index, chunk.content.len());

        let part = Part::bytes(chunk.content.to_vec())
            .file_name(chunk_file_name(index))
            .mime_str("application/octet-stream")
            .map_err(|e| TransferError::transport_error_for_chunk("Failed to build chunk part", index, e.to_string()))?;
        let form = Form::new()
            .part(fields::FILE, part)
            .text(fields::UPLOAD_ID, chunk.upload_id)
            .text(fields::CHUNK_INDEX, index.to_string())
            .text(fields::CHUNK_CHECKSUM, chunk.chunk_checksum);

        let response = self.client.post(url).multipart(form).send().await.map_err(|e| {
            debug!("Chunk {} request failed: {}", index, e);
            TransferError::transport_error_for_chunk("Chunk upload request failed", index, e.to_string())
        })?;

        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .map_err(|e| TransferError::transport_error_for_chunk("Failed to read chunk reply", index, e.to_string()))?;
        Ok(TransportReply { status, message })
    }

    async fn complete_upload(&self, request: CompleteUpload) -> Result<TransportReply> {
        let url = self.endpoint(ROUTE_UPLOAD_COMPLETE)?;
        debug!("POST {} for upload {}", url, request.upload_id);

        let form = Form::new()
            .text(fields::UPLOAD_ID, request.upload_id)
            .text(fields::FILE_NAME, request.file_name)
            .text(fields::TOTAL_CHUNKS, request.total_chunks.to_string())
            .text(fields::EXPECTED_CHECKSUM, request.expected_checksum)
            .text(fields::BUCKET_NAME, request.bucket_name);

        let response = self.client.post(url).multipart(form).send().await.map_err(|e| {
            error!("Completion request failed: {}", e);
            TransferError::transport_error_with_source("Completion request failed", e.to_string())
        })?;

        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .map_err(|e| TransferError::transport_error_with_source("Failed to read completion reply", e.to_string()))?;
        Ok(TransportReply { status, message })
    }

    async fn fetch_chunk(&self, request: ChunkDownloadRequest) -> Result<ChunkDownloadResponse> {
        let index = request.chunk_index;
        let url = self.endpoint(ROUTE_CHUNK_WITH_META)?;
        trace!("POST {} chunk {} of {}/{}", url, index, request.bucket, request.key);

        let response = self.client.post(url).json(&request).send().await.map_err(|e| {
            debug!("Chunk {} request failed: {}", index, e);
            TransferError::transport_error_for_chunk("Chunk download request failed", index, e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TransferError::transport_error_for_chunk(
                format!("server answered {}", status.as_u16()),
                index,
                text,
            ));
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let file_name = header(HEADER_FILE_NAME);
        let file_size = header(HEADER_FILE_SIZE);
        let expected_checksum = header(HEADER_EXPECTED_CHECKSUM);

        let data = response
            .bytes()
            .await
            .map_err(|e| TransferError::transport_error_for_chunk("Failed to read chunk body", index, e.to_string()))?;

        ChunkDownloadResponse::from_parts(data, file_name.as_deref(), file_size.as_deref(), expected_checksum.as_deref())
    }
}
