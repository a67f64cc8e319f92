//! Client module
//!
//! Upload and download sessions driven over a [`ChunkTransport`].
//!
//! [`ChunkTransport`]: crate::protocol::ChunkTransport

pub mod download;
#[cfg(feature = "http")]
pub mod http;
pub mod upload;

use std::sync::Arc;

pub use download::{download_session_id, DownloadClient, DownloadReceipt, Verification};
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use upload::{new_upload_id, Completion, UploadClient, UploadReceipt};

/// Progress of a session after one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Index of the chunk just finished
    pub index: u32,
    /// Number of chunks in the session
    pub total_chunks: u32,
    /// Bytes covered by chunks `0..=index`
    pub bytes_done: u64,
    /// Total file size
    pub total_bytes: u64,
    /// Chunk was already on disk and not transferred again
    pub resumed: bool,
}

impl ChunkProgress {
    /// Completed fraction (0.0 to 1.0)
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.index + 1 >= self.total_chunks { 1.0 } else { 0.0 };
        }
        self.bytes_done as f64 / self.total_bytes as f64
    }
}

/// Callback invoked after every chunk
pub type ProgressCallback = Arc<dyn Fn(ChunkProgress) + Send + Sync>;
