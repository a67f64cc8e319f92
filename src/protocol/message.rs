//! Chunk transfer messages
//!
//! Defines the request and response types exchanged for each protocol
//! operation, together with their HTTP field and header names.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::error::{Result, TransferError};

/// Route accepting one uploaded chunk
pub const ROUTE_UPLOAD_CHUNK: &str = "/api/upload/chunk";
/// Route completing an upload session
pub const ROUTE_UPLOAD_COMPLETE: &str = "/api/upload/complete";
/// Route serving one chunk of a stored file
pub const ROUTE_CHUNK_WITH_META: &str = "/files/chunkWithMeta";

/// Multipart field names
pub mod fields {
    pub const FILE: &str = "file";
    pub const UPLOAD_ID: &str = "uploadId";
    pub const CHUNK_INDEX: &str = "chunkIndex";
    pub const CHUNK_CHECKSUM: &str = "chunkChecksum";
    pub const FILE_NAME: &str = "fileName";
    pub const TOTAL_CHUNKS: &str = "totalChunks";
    pub const EXPECTED_CHECKSUM: &str = "expectedChecksum";
    pub const BUCKET_NAME: &str = "bucketName";
}

/// Response header carrying the stored file name, percent-encoded
pub const HEADER_FILE_NAME: &str = "X-File-Name";
/// Response header carrying the total file size
pub const HEADER_FILE_SIZE: &str = "X-File-Size";
/// Response header carrying the whole-file checksum (terminal chunk only)
pub const HEADER_EXPECTED_CHECKSUM: &str = "X-Expected-Checksum";

/// Header form of a file name
///
/// Header values are limited to visible ASCII on the receiving side, so
/// the name travels percent-encoded.
pub fn encode_file_name(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

/// Inverse of [`encode_file_name`]
pub fn decode_file_name(value: &str) -> Result<String> {
    urlencoding::decode(value.trim()).map(|name| name.into_owned()).map_err(|e| {
        error!("Invalid {} header: {}", HEADER_FILE_NAME, e);
        TransferError::protocol_error_with_source(format!("invalid {} header", HEADER_FILE_NAME), e.to_string())
    })
}

/// One chunk delivered by an upload client
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub upload_id: String,
    pub chunk_index: u32,
    /// Checksum the client computed over `content`
    pub chunk_checksum: String,
    pub content: Bytes,
}

/// Completion request closing an upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteUpload {
    pub upload_id: String,
    pub file_name: String,
    pub total_chunks: u32,
    /// Whole-file checksum computed by the client before chunking
    pub expected_checksum: String,
    pub bucket_name: String,
}

/// Request for one chunk of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDownloadRequest {
    pub bucket: String,
    pub key: String,
    pub chunk_index: u32,
}

/// One served chunk plus the file metadata that travels with it
#[derive(Debug, Clone)]
pub struct ChunkDownloadResponse {
    pub data: Bytes,
    pub file_size: u64,
    pub file_name: String,
    /// Whether this is the terminal chunk
    pub is_last: bool,
    /// Whole-file checksum, present only on the terminal chunk
    pub expected_checksum: Option<String>,
}

impl ChunkDownloadResponse {
    /// Rebuild a response from the raw header values of a reply
    ///
    /// `file_name` is the percent-encoded header value. The terminal chunk
    /// is recognised by the presence of the checksum.
    pub fn from_parts(
        data: Bytes,
        file_name: Option<&str>,
        file_size: Option<&str>,
        expected_checksum: Option<&str>,
    ) -> Result<Self> {
        let file_name = file_name
            .ok_or_else(|| {
                error!("Chunk response is missing {}", HEADER_FILE_NAME);
                TransferError::protocol_error(format!("missing {} header", HEADER_FILE_NAME))
            })
            .and_then(decode_file_name)?;

        let file_size = file_size
            .ok_or_else(|| {
                error!("Chunk response is missing {}", HEADER_FILE_SIZE);
                TransferError::protocol_error(format!("missing {} header", HEADER_FILE_SIZE))
            })?
            .trim()
            .parse::<u64>()
            .map_err(|e| {
                error!("Invalid {} header: {}", HEADER_FILE_SIZE, e);
                TransferError::protocol_error_with_source(format!("invalid {} header", HEADER_FILE_SIZE), e.to_string())
            })?;

        let expected_checksum = expected_checksum
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        trace!(
            "Chunk response: {} bytes of {} ({} bytes), terminal={}",
            data.len(),
            file_name,
            file_size,
            expected_checksum.is_some()
        );

        Ok(Self {
            data,
            file_size,
            file_name,
            is_last: expected_checksum.is_some(),
            expected_checksum,
        })
    }
}

/// Status and advisory text returned by accept and complete operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub message: String,
}

impl TransportReply {
    /// Successful reply
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: 200,
            message: message.into(),
        }
    }

    /// Client-error reply
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_request_uses_wire_names() {
        let request = ChunkDownloadRequest {
            bucket: "docs".to_string(),
            key: "a.bin".to_string(),
            chunk_index: 2,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"bucket":"docs","key":"a.bin","chunkIndex":2}"#);

        let parsed: ChunkDownloadRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_response_from_parts_intermediate() {
        let response = ChunkDownloadResponse::from_parts(Bytes::from_static(b"abc"), Some("a.bin"), Some("12"), None).unwrap();
        assert_eq!(response.file_size, 12);
        assert_eq!(response.file_name, "a.bin");
        assert!(!response.is_last);
        assert!(response.expected_checksum.is_none());
    }

    #[test]
    fn test_response_from_parts_terminal() {
        let response = ChunkDownloadResponse::from_parts(Bytes::new(), Some("a.bin"), Some("0"), Some("ABCD")).unwrap();
        assert!(response.is_last);
        assert_eq!(response.expected_checksum.as_deref(), Some("ABCD"));
    }

    #[test]
    fn test_file_name_header_is_ascii() {
        let encoded = encode_file_name("résumé 2024.bin");
        assert!(encoded.is_ascii());
        assert_eq!(encoded, "r%C3%A9sum%C3%A9%202024.bin");

        let response = ChunkDownloadResponse::from_parts(Bytes::new(), Some(&encoded), Some("0"), Some("ab")).unwrap();
        assert_eq!(response.file_name, "résumé 2024.bin");
    }

    #[test]
    fn test_response_rejects_undecodable_file_name() {
        let err = ChunkDownloadResponse::from_parts(Bytes::new(), Some("%FF%FE"), Some("1"), None).unwrap_err();
        assert!(matches!(err, TransferError::ProtocolError { .. }));
    }

    #[test]
    fn test_response_from_parts_missing_headers() {
        assert!(matches!(
            ChunkDownloadResponse::from_parts(Bytes::new(), None, Some("1"), None),
            Err(TransferError::ProtocolError { .. })
        ));
        assert!(ChunkDownloadResponse::from_parts(Bytes::new(), Some("a"), None, None).is_err());
        assert!(ChunkDownloadResponse::from_parts(Bytes::new(), Some("a"), Some("lots"), None).is_err());
    }

    #[test]
    fn test_reply_status() {
        assert!(TransportReply::ok("fine").is_success());
        assert!(!TransportReply::bad_request("nope").is_success());
    }
}
