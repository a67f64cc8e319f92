//! Transfer module
//!
//! Chunk planning, chunk descriptors, retry policy and configuration.

pub mod chunk;
pub mod config;
pub mod plan;
pub mod retry;

pub use chunk::{read_range, validate_chunk_sequence, ChunkDescriptor};
pub use config::{TransferConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES};
pub use plan::{plan, ChunkPlan, ChunkRange};
pub use retry::with_retries;
