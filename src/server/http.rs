//! HTTP routes
//!
//! Endpoints:
//! - POST /api/upload/chunk - Verify and store one chunk (multipart)
//! - POST /api/upload/complete - Merge, verify and publish an upload (multipart)
//! - POST /files/chunkWithMeta - Serve one chunk with file metadata headers (JSON)

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tracing::{debug, error, warn};

use crate::error::{Result, TransferError};
use crate::protocol::message::{
    encode_file_name, fields, ChunkDownloadRequest, ChunkUpload, CompleteUpload, HEADER_EXPECTED_CHECKSUM,
    HEADER_FILE_NAME, HEADER_FILE_SIZE, ROUTE_CHUNK_WITH_META, ROUTE_UPLOAD_CHUNK, ROUTE_UPLOAD_COMPLETE,
};
use crate::server::ServerState;

/// Multipart overhead allowed on top of one chunk
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Create the transfer router
///
/// `chunk_size` bounds the accepted request body size.
pub fn router(state: Arc<ServerState>, chunk_size: u64) -> Router {
    let body_limit = usize::try_from(chunk_size)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_SLACK);

    Router::new()
        .route(ROUTE_UPLOAD_CHUNK, post(upload_chunk))
        .route(ROUTE_UPLOAD_COMPLETE, post(complete_upload))
        .route(ROUTE_CHUNK_WITH_META, post(chunk_with_meta))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// POST /api/upload/chunk
async fn upload_chunk(State(state): State<Arc<ServerState>>, mut multipart: Multipart) -> Result<String> {
    let mut upload_id = None;
    let mut chunk_index = None;
    let mut chunk_checksum = None;
    let mut content = None;

    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            fields::FILE => content = Some(field_bytes(field).await?),
            fields::UPLOAD_ID => upload_id = Some(field_text(field).await?),
            fields::CHUNK_INDEX => chunk_index = Some(field_text(field).await?),
            fields::CHUNK_CHECKSUM => chunk_checksum = Some(field_text(field).await?),
            other => debug!("Ignoring multipart field '{}'", other),
        }
    }

    let chunk = ChunkUpload {
        upload_id: required(upload_id, fields::UPLOAD_ID)?,
        chunk_index: parse_u32(required(chunk_index, fields::CHUNK_INDEX)?, fields::CHUNK_INDEX)?,
        chunk_checksum: required(chunk_checksum, fields::CHUNK_CHECKSUM)?,
        content: required(content, fields::FILE)?,
    };

    let index = chunk.chunk_index;
    let outcome = state.upload.accept_chunk(chunk).await?;
    Ok(outcome.message(index))
}

/// POST /api/upload/complete
async fn complete_upload(State(state): State<Arc<ServerState>>, mut multipart: Multipart) -> Result<String> {
    let mut upload_id = None;
    let mut file_name = None;
    let mut total_chunks = None;
    let mut expected_checksum = None;
    let mut bucket_name = None;

    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            fields::UPLOAD_ID => upload_id = Some(field_text(field).await?),
            fields::FILE_NAME => file_name = Some(field_text(field).await?),
            fields::TOTAL_CHUNKS => total_chunks = Some(field_text(field).await?),
            fields::EXPECTED_CHECKSUM => expected_checksum = Some(field_text(field).await?),
            fields::BUCKET_NAME => bucket_name = Some(field_text(field).await?),
            other => debug!("Ignoring multipart field '{}'", other),
        }
    }

    let request = CompleteUpload {
        upload_id: required(upload_id, fields::UPLOAD_ID)?,
        file_name: required(file_name, fields::FILE_NAME)?,
        total_chunks: parse_u32(required(total_chunks, fields::TOTAL_CHUNKS)?, fields::TOTAL_CHUNKS)?,
        expected_checksum: required(expected_checksum, fields::EXPECTED_CHECKSUM)?,
        bucket_name: required(bucket_name, fields::BUCKET_NAME)?,
    };

    let done = state.upload.complete_upload(request).await?;
    Ok(format!("File uploaded successfully to {}/{}.", done.bucket, done.key))
}

/// POST /files/chunkWithMeta
async fn chunk_with_meta(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ChunkDownloadRequest>,
) -> Result<Response> {
    let chunk = state.download.serve_chunk(&request).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    headers.insert(HEADER_FILE_NAME, header_value(&encode_file_name(&chunk.file_name))?);
    headers.insert(HEADER_FILE_SIZE, HeaderValue::from(chunk.file_size));
    if let Some(checksum) = &chunk.expected_checksum {
        headers.insert(HEADER_EXPECTED_CHECKSUM, header_value(checksum)?);
    }

    Ok((StatusCode::OK, headers, chunk.data).into_response())
}

async fn next_field<'a>(multipart: &'a mut Multipart) -> Result<Option<Field<'a>>> {
    multipart.next_field().await.map_err(|e| {
        error!("Failed to read multipart field: {}", e);
        TransferError::validation_error(format!("malformed multipart body: {}", e))
    })
}

async fn field_bytes(field: Field<'_>) -> Result<Bytes> {
    let name = field.name().unwrap_or("").to_string();
    field.bytes().await.map_err(|e| {
        error!("Failed to read multipart field '{}': {}", name, e);
        TransferError::validation_error_with_field(format!("unreadable field: {}", e), name)
    })
}

async fn field_text(field: Field<'_>) -> Result<String> {
    let name = field.name().unwrap_or("").to_string();
    field.text().await.map(|t| t.trim().to_string()).map_err(|e| {
        error!("Failed to read multipart field '{}': {}", name, e);
        TransferError::validation_error_with_field(format!("unreadable field: {}", e), name)
    })
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| TransferError::validation_error_with_field("missing field", field))
}

fn parse_u32(value: String, field: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .map_err(|_| TransferError::validation_error_with_field(format!("not a chunk count or index: {}", value), field))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        TransferError::protocol_error_with_source(format!("value cannot be sent as a header: {}", value), e.to_string())
    })
}
