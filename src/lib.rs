//! chunked-transfer
//!
//! Resumable, integrity-verified chunked file transfer: files are split into
//! fixed-size chunks, each chunk is SHA-256 verified on arrival, and the
//! reassembled file is checked against a whole-file checksum.

pub mod checksum;
pub mod cli;
pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod transfer;

pub use error::{Result, TransferError};

pub use checksum::{checksums_match, digest_bytes, digest_file, digest_reader};
pub use client::{
    ChunkProgress, Completion, DownloadClient, DownloadReceipt, ProgressCallback, UploadClient, UploadReceipt,
    Verification,
};
#[cfg(feature = "http")]
pub use client::HttpTransport;
pub use protocol::{
    ChunkDownloadRequest, ChunkDownloadResponse, ChunkTransport, ChunkUpload, CompleteUpload, LocalTransport,
    TransportReply,
};
pub use server::{AcceptOutcome, CompletedUpload, DownloadService, ServerState, UploadService};
pub use storage::{DownloadManifest, LocalObjectStore, ObjectStore, TransferStore};
pub use transfer::{ChunkDescriptor, ChunkPlan, ChunkRange, TransferConfig};
pub use cli::{CliArgs, Config, ProgressDisplay, TransferStats};
