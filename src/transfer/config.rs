//! Transfer configuration
//!
//! Settings threaded explicitly into every session and service.

use std::path::PathBuf;

use tracing::error;

use crate::error::{Result, TransferError};

/// Default chunk size: 5 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default number of attempts per chunk operation
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Configuration shared by the client and server halves
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Maximum chunk size in bytes
    pub chunk_size: u64,
    /// Attempts per chunk before the session is aborted
    pub max_retries: u32,
    /// Root directory holding one staging directory per session
    pub staging_root: PathBuf,
    /// Treat a whole-file checksum mismatch on download as fatal
    pub strict_checksum: bool,
}

impl TransferConfig {
    /// Create a configuration with default chunking and retry settings
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            staging_root: staging_root.into(),
            strict_checksum: false,
        }
    }

    /// Override the chunk size
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Override the retry ceiling
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enable or disable strict download verification
    pub fn with_strict_checksum(mut self, strict: bool) -> Self {
        self.strict_checksum = strict;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            error!("Invalid chunk size: 0");
            return Err(TransferError::config_error_with_field("chunk size must be at least 1 byte", "chunk_size"));
        }

        if self.max_retries == 0 {
            error!("Invalid retry ceiling: 0");
            return Err(TransferError::config_error_with_field("max_retries must be at least 1", "max_retries"));
        }

        if self.staging_root.as_os_str().is_empty() {
            error!("Staging root is empty");
            return Err(TransferError::config_error_with_field("staging root cannot be empty", "staging_root"));
        }

        Ok(())
    }
}
