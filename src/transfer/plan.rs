//! Chunk planner
//!
//! Splits a byte length into fixed-size, index-ordered ranges.

use tracing::{debug, error};

use crate::error::{Result, TransferError};

/// Number of chunks needed to cover `total_size` bytes
///
/// `ceil(total_size / chunk_size)`; zero for an empty file.
pub fn plan(total_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total_size.div_ceil(chunk_size)
}

/// Half-open byte range `[start, end)` of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// Chunk index
    pub index: u32,
    /// First byte offset (inclusive)
    pub start: u64,
    /// Last byte offset (exclusive)
    pub end: u64,
}

impl ChunkRange {
    /// Length of the range in bytes
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the range covers no bytes
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Chunk layout of a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    chunk_count: u32,
}

impl ChunkPlan {
    /// Create a plan for a file of `total_size` bytes
    pub fn new(total_size: u64, chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            error!("Chunk size must be positive");
            return Err(TransferError::config_error_with_field("chunk size must be positive", "chunk_size"));
        }

        let count = plan(total_size, chunk_size);
        let chunk_count = u32::try_from(count).map_err(|_| {
            error!("File of {} bytes needs {} chunks, too many to index", total_size, count);
            TransferError::validation_error_with_field(
                format!("{} chunks exceed the index range", count),
                "chunk_size",
            )
        })?;

        debug!("Planned {} chunks of {} bytes for {} bytes", chunk_count, chunk_size, total_size);
        Ok(Self {
            total_size,
            chunk_size,
            chunk_count,
        })
    }

    /// Total file size in bytes
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Configured maximum chunk size
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of data-bearing chunks (`ceil(total / chunk)`)
    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    /// Number of chunks exchanged on the wire
    ///
    /// An empty file still travels as one empty terminal chunk.
    pub fn wire_chunk_count(&self) -> u32 {
        self.chunk_count.max(1)
    }

    /// Byte range of chunk `index`, or `None` past the end of the plan
    pub fn range_of(&self, index: u32) -> Option<ChunkRange> {
        if index >= self.wire_chunk_count() {
            return None;
        }
        let start = index as u64 * self.chunk_size;
        let end = start.saturating_add(self.chunk_size).min(self.total_size);
        Some(ChunkRange { index, start, end })
    }

    /// Whether `index` is the terminal chunk
    pub fn is_last(&self, index: u32) -> bool {
        index + 1 == self.wire_chunk_count()
    }

    /// Iterate over every wire chunk in index order
    pub fn ranges(&self) -> impl Iterator<Item = ChunkRange> + '_ {
        (0..self.wire_chunk_count()).filter_map(move |index| self.range_of(index))
    }
}
