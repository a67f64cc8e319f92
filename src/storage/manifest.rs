//! Download manifest
//!
//! Handles saving and loading the metadata a resumed download needs before
//! it can trust chunk artifacts already on disk.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, error, warn};

use crate::error::{Result, TransferError};
use crate::transfer::plan::ChunkPlan;

/// Persistent state of one download session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadManifest {
    /// Source bucket
    pub bucket: String,
    /// Source object key
    pub key: String,
    /// Chunk size the session was started with
    pub chunk_size: u64,
    /// File name reported by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Total size reported by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Whole-file checksum, known once the terminal chunk has been fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_checksum: Option<String>,
}

impl DownloadManifest {
    /// Create a manifest for a fresh session
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, chunk_size: u64) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            chunk_size,
            file_name: None,
            file_size: None,
            expected_checksum: None,
        }
    }

    /// Whether this manifest describes the same source and chunking
    pub fn matches(&self, bucket: &str, key: &str, chunk_size: u64) -> bool {
        self.bucket == bucket && self.key == key && self.chunk_size == chunk_size
    }

    /// Record file name and size learned from a chunk response
    ///
    /// Returns true if anything changed.
    pub fn record_file(&mut self, file_name: &str, file_size: u64) -> bool {
        let mut changed = false;
        if self.file_name.as_deref() != Some(file_name) {
            self.file_name = Some(file_name.to_string());
            changed = true;
        }
        if self.file_size != Some(file_size) {
            if let Some(previous) = self.file_size {
                warn!("Remote size of {}/{} changed from {} to {}", self.bucket, self.key, previous, file_size);
            }
            self.file_size = Some(file_size);
            changed = true;
        }
        changed
    }

    /// Record the whole-file checksum carried by the terminal chunk
    pub fn record_checksum(&mut self, checksum: &str) -> bool {
        if self.expected_checksum.as_deref() == Some(checksum) {
            return false;
        }
        self.expected_checksum = Some(checksum.to_string());
        true
    }

    /// Chunk plan derived from the recorded size, if known
    pub fn plan(&self) -> Result<Option<ChunkPlan>> {
        match self.file_size {
            Some(size) => Ok(Some(ChunkPlan::new(size, self.chunk_size)?)),
            None => Ok(None),
        }
    }

    /// Serialize to bytes
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize from bytes
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Save to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let data = self.serialize()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await.map_err(|e| {
            error!("Failed to write manifest '{}': {}", path.display(), e);
            TransferError::storage_error_full("Failed to write manifest", path.display().to_string(), e.to_string())
        })?;
        debug!("Saved manifest for {}/{}", self.bucket, self.key);
        Ok(())
    }

    /// Load from file
    ///
    /// A missing file yields `None`. An unreadable or corrupt manifest is
    /// also treated as absent so the session starts over.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                error!("Failed to read manifest '{}': {}", path.display(), e);
                return Err(TransferError::storage_error_full("Failed to read manifest", path.display().to_string(), e.to_string()));
            }
        };

        match Self::deserialize(&data) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                warn!("Ignoring corrupt manifest '{}': {}", path.display(), e);
                Ok(None)
            }
        }
    }
}
