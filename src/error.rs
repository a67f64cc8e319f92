//! Error types for chunked transfers
//!
//! This module defines the error taxonomy shared by the client and server
//! halves of the upload and download protocol.

use std::fmt;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, TransferError>;

/// Comprehensive error type for transfer operations
#[derive(Debug, Clone)]
pub enum TransferError {
    /// A single chunk operation failed on the wire (retried locally)
    TransportError {
        message: String,
        chunk: Option<u32>,
        source: Option<String>,
    },

    /// A chunk failed on every attempt; the whole session is aborted
    RetriesExhausted {
        chunk: u32,
        attempts: u32,
        reason: String,
    },

    /// Content did not hash to the expected digest
    ///
    /// `chunk` is `None` for whole-file verification.
    ChecksumMismatch {
        chunk: Option<u32>,
        expected: String,
        actual: String,
    },

    /// A required chunk artifact was never persisted
    MissingChunk {
        index: u32,
    },

    /// Collected chunk artifacts are duplicated or not contiguous
    ReassemblyError {
        message: String,
        index: Option<u32>,
    },

    /// File I/O and staging errors
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Requested file or session does not exist
    NotFound {
        message: String,
        resource: String,
    },

    /// Caller supplied an invalid value
    ValidationError {
        message: String,
        field: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Peer returned something we could not interpret
    ProtocolError {
        message: String,
        source: Option<String>,
    },
}

impl TransferError {
    /// Create a new TransportError
    pub fn transport_error(message: impl Into<String>) -> Self {
        TransferError::TransportError {
            message: message.into(),
            chunk: None,
            source: None,
        }
    }

    /// Create a new TransportError for a specific chunk
    pub fn transport_error_for_chunk(message: impl Into<String>, chunk: u32, source: impl Into<String>) -> Self {
        TransferError::TransportError {
            message: message.into(),
            chunk: Some(chunk),
            source: Some(source.into()),
        }
    }

    /// Create a new TransportError with source
    pub fn transport_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TransferError::TransportError {
            message: message.into(),
            chunk: None,
            source: Some(source.into()),
        }
    }

    /// Create a new RetriesExhausted error
    pub fn retries_exhausted(chunk: u32, attempts: u32, reason: impl Into<String>) -> Self {
        TransferError::RetriesExhausted {
            chunk,
            attempts,
            reason: reason.into(),
        }
    }

    /// Create a chunk-level ChecksumMismatch
    pub fn chunk_checksum_mismatch(chunk: u32, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        TransferError::ChecksumMismatch {
            chunk: Some(chunk),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a whole-file ChecksumMismatch
    pub fn file_checksum_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        TransferError::ChecksumMismatch {
            chunk: None,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new MissingChunk error
    pub fn missing_chunk(index: u32) -> Self {
        TransferError::MissingChunk { index }
    }

    /// Create a new ReassemblyError
    pub fn reassembly_error(message: impl Into<String>) -> Self {
        TransferError::ReassemblyError {
            message: message.into(),
            index: None,
        }
    }

    /// Create a new ReassemblyError at a given index
    pub fn reassembly_error_at(message: impl Into<String>, index: u32) -> Self {
        TransferError::ReassemblyError {
            message: message.into(),
            index: Some(index),
        }
    }

    /// Create a new StorageError
    pub fn storage_error(message: impl Into<String>) -> Self {
        TransferError::StorageError {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new StorageError with path
    pub fn storage_error_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        TransferError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: None,
        }
    }

    /// Create a new StorageError with path and source
    pub fn storage_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        TransferError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new NotFound error
    pub fn not_found(message: impl Into<String>, resource: impl Into<String>) -> Self {
        TransferError::NotFound {
            message: message.into(),
            resource: resource.into(),
        }
    }

    /// Create a new ValidationError
    pub fn validation_error(message: impl Into<String>) -> Self {
        TransferError::ValidationError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ValidationError with field
    pub fn validation_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TransferError::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        TransferError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TransferError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new ProtocolError
    pub fn protocol_error(message: impl Into<String>) -> Self {
        TransferError::ProtocolError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ProtocolError with source
    pub fn protocol_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TransferError::ProtocolError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The chunk index this error is about, if any
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            TransferError::TransportError { chunk, .. } => *chunk,
            TransferError::RetriesExhausted { chunk, .. } => Some(*chunk),
            TransferError::ChecksumMismatch { chunk, .. } => *chunk,
            TransferError::MissingChunk { index } => Some(*index),
            TransferError::ReassemblyError { index, .. } => *index,
            _ => None,
        }
    }

    /// Whether a client should try the same chunk operation again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransferError::TransportError { .. }
                | TransferError::ProtocolError { .. }
                | TransferError::StorageError { .. }
        )
    }

    /// Status code a server reports for this error
    ///
    /// Client mistakes (bad input, checksum mismatch, missing chunks) are
    /// 400, unknown files 404, everything else 500.
    pub fn status_code(&self) -> u16 {
        match self {
            TransferError::ValidationError { .. }
            | TransferError::ChecksumMismatch { .. }
            | TransferError::MissingChunk { .. }
            | TransferError::ReassemblyError { .. }
            | TransferError::ProtocolError { .. } => 400,
            TransferError::NotFound { .. } => 404,
            TransferError::TransportError { .. }
            | TransferError::RetriesExhausted { .. }
            | TransferError::StorageError { .. }
            | TransferError::ConfigError { .. } => 500,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            TransferError::TransportError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            TransferError::StorageError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            TransferError::ProtocolError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            TransferError::RetriesExhausted { reason, .. } => {
                *reason = format!("{}: {}", reason, ctx);
            }
            _ => {}
        }
        self
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::TransportError { message, chunk, source } => {
                match (chunk, source) {
                    (Some(c), Some(s)) => write!(f, "Transport error: {} (chunk: {}, source: {})", message, c, s),
                    (Some(c), None) => write!(f, "Transport error: {} (chunk: {})", message, c),
                    (None, Some(s)) => write!(f, "Transport error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Transport error: {}", message),
                }
            }
            TransferError::RetriesExhausted { chunk, attempts, reason } => {
                write!(f, "Chunk {} failed after {} attempts: {}", chunk, attempts, reason)
            }
            TransferError::ChecksumMismatch { chunk, expected, actual } => {
                match chunk {
                    Some(c) => write!(f, "Checksum mismatch for chunk {} (expected: {}, actual: {})", c, expected, actual),
                    None => write!(f, "Checksum mismatch for file (expected: {}, actual: {})", expected, actual),
                }
            }
            TransferError::MissingChunk { index } => {
                write!(f, "Missing chunk: {}", index)
            }
            TransferError::ReassemblyError { message, index } => {
                if let Some(i) = index {
                    write!(f, "Reassembly error: {} (index: {})", message, i)
                } else {
                    write!(f, "Reassembly error: {}", message)
                }
            }
            TransferError::StorageError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Storage error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Storage error: {}", message),
                }
            }
            TransferError::NotFound { message, resource } => {
                write!(f, "Not found: {} ({})", message, resource)
            }
            TransferError::ValidationError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Validation error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Validation error: {}", message)
                }
            }
            TransferError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
            TransferError::ProtocolError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Protocol error: {} (source: {})", message, src)
                } else {
                    write!(f, "Protocol error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for TransferError {}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::storage_error_full(err.to_string(), "unknown".to_string(), err.kind().to_string())
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::storage_error_full("Failed to parse JSON data", "unknown".to_string(), err.to_string())
    }
}

impl From<url::ParseError> for TransferError {
    fn from(err: url::ParseError) -> Self {
        TransferError::config_error(format!("Invalid URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_chunk_names_index() {
        let err = TransferError::missing_chunk(7);
        assert_eq!(err.to_string(), "Missing chunk: 7");
        assert_eq!(err.chunk_index(), Some(7));
    }

    #[test]
    fn test_retries_exhausted() {
        let err = TransferError::retries_exhausted(2, 3, "connection refused");
        assert!(err.to_string().contains("Chunk 2"));
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.chunk_index(), Some(2));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_chunk_checksum_mismatch() {
        let err = TransferError::chunk_checksum_mismatch(4, "aa", "bb");
        assert!(err.to_string().contains("chunk 4"));
        assert_eq!(err.chunk_index(), Some(4));
    }

    #[test]
    fn test_file_checksum_mismatch() {
        let err = TransferError::file_checksum_mismatch("aa", "bb");
        assert!(err.to_string().contains("for file"));
        assert_eq!(err.chunk_index(), None);
    }

    #[test]
    fn test_transport_error_is_retryable() {
        let err = TransferError::transport_error_for_chunk("status 500", 1, "server error");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("chunk: 1"));
    }

    #[test]
    fn test_storage_error_with_path() {
        let err = TransferError::storage_error_with_path("File not found", "/path/to/file");
        assert!(err.to_string().contains("Storage error"));
        assert!(err.to_string().contains("/path/to/file"));
    }

    #[test]
    fn test_with_context() {
        let err = TransferError::transport_error("reset").with_context("while sending chunk 3");
        assert!(err.to_string().contains("while sending chunk 3"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: TransferError = io_err.into();
        assert!(matches!(err, TransferError::StorageError { .. }));
    }

    #[test]
    fn test_validation_error_with_field() {
        let err = TransferError::validation_error_with_field("contains '..'", "fileName");
        assert!(err.to_string().contains("Validation error"));
        assert!(err.to_string().contains("fileName"));
    }

    #[test]
    fn test_reassembly_error_at() {
        let err = TransferError::reassembly_error_at("gap in chunk sequence", 3);
        assert!(err.to_string().contains("index: 3"));
        assert_eq!(err.chunk_index(), Some(3));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TransferError::missing_chunk(1).status_code(), 400);
        assert_eq!(TransferError::chunk_checksum_mismatch(0, "a", "b").status_code(), 400);
        assert_eq!(TransferError::not_found("gone", "docs/a").status_code(), 404);
        assert_eq!(TransferError::storage_error("disk full").status_code(), 500);
    }
}
