//! Chunk transfer protocol module
//!
//! Wire messages for the three protocol operations and the transport seam
//! the client sessions are written against.

pub mod local;
pub mod message;
pub mod transport;

// Re-export main types
pub use local::LocalTransport;
pub use message::{
    decode_file_name, encode_file_name, ChunkDownloadRequest, ChunkDownloadResponse, ChunkUpload, CompleteUpload,
    TransportReply,
};
pub use transport::ChunkTransport;
