//! Chunk descriptors and sequence validation

use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{error, trace, warn};

use crate::checksum::{checksums_match, digest_bytes};
use crate::error::{Result, TransferError};
use crate::transfer::plan::ChunkRange;

/// One chunk of a file together with its digest
#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    /// Chunk index
    pub index: u32,
    /// First byte offset (inclusive)
    pub start: u64,
    /// Last byte offset (exclusive)
    pub end: u64,
    /// Chunk content
    pub content: Bytes,
    /// Lowercase hex SHA-256 of `content`
    pub checksum: String,
}

impl ChunkDescriptor {
    /// Build a descriptor for `range`, hashing the content
    pub fn from_range(range: ChunkRange, content: Bytes) -> Result<Self> {
        if content.len() as u64 != range.len() {
            error!(
                "Chunk {} holds {} bytes but its range spans {}",
                range.index,
                content.len(),
                range.len()
            );
            return Err(TransferError::validation_error_with_field(
                format!("chunk {} length {} does not match range length {}", range.index, content.len(), range.len()),
                "content",
            ));
        }

        let checksum = digest_bytes(&content);
        Ok(Self {
            index: range.index,
            start: range.start,
            end: range.end,
            content,
            checksum,
        })
    }

    /// Read `range` from the file at `path` and hash it
    pub async fn read(path: &Path, range: ChunkRange) -> Result<Self> {
        let content = read_range(path, range).await?;
        Self::from_range(range, content)
    }

    /// Length of the chunk in bytes
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the chunk is empty
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Re-hash the content and compare with the recorded checksum
    pub fn verify(&self) -> bool {
        checksums_match(&digest_bytes(&self.content), &self.checksum)
    }
}

/// Positioned read of `range` from the file at `path`
///
/// Only the bytes of the range are loaded, never the whole file.
pub async fn read_range(path: &Path, range: ChunkRange) -> Result<Bytes> {
    let mut file = fs::File::open(path).await.map_err(|e| {
        error!("Failed to open '{}': {}", path.display(), e);
        TransferError::storage_error_full("Failed to open file", path.display().to_string(), e.to_string())
    })?;
    file.seek(SeekFrom::Start(range.start)).await?;

    let len = usize::try_from(range.len())
        .map_err(|_| TransferError::validation_error_with_field("chunk does not fit in memory", "chunk_size"))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await.map_err(|e| {
        error!("Failed to read {} bytes at {} from '{}': {}", len, range.start, path.display(), e);
        TransferError::storage_error_full("Failed to read chunk range", path.display().to_string(), e.to_string())
    })?;

    trace!("Read chunk {} [{}..{}) from {}", range.index, range.start, range.end, path.display());
    Ok(Bytes::from(buf))
}

/// Check that `indices` (already sorted) are exactly `0..expected`
///
/// When `expected` is `None` the count of `indices` is used.
pub fn validate_chunk_sequence(indices: &[u32], expected: Option<u32>) -> Result<()> {
    for (position, index) in indices.iter().enumerate() {
        let position = position as u32;
        if *index == position {
            continue;
        }
        if position > 0 && *index == indices[position as usize - 1] {
            error!("Chunk {} appears more than once", index);
            return Err(TransferError::reassembly_error_at("duplicate chunk", *index));
        }
        error!("Chunk order mismatch at index {} (found {})", position, index);
        return Err(TransferError::reassembly_error_at(
            format!("chunk sequence broken, found chunk {}", index),
            position,
        ));
    }

    if let Some(expected) = expected {
        let found = indices.len() as u32;
        if found < expected {
            warn!("Only {} of {} chunks present", found, expected);
            return Err(TransferError::reassembly_error_at("chunk missing from sequence", found));
        }
        if found > expected {
            error!("Found {} chunks but expected {}", found, expected);
            return Err(TransferError::reassembly_error_at("unexpected chunk beyond end of file", expected));
        }
    }

    Ok(())
}
