//! Transfer store
//!
//! Durable staging area holding one directory per session, with one file
//! per chunk index until the chunks are merged or the session is dropped.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

use crate::checksum::digest_file;
use crate::error::{Result, TransferError};
use crate::storage::validation::validate_path_component;

/// File name prefix of persisted chunk artifacts
const CHUNK_PREFIX: &str = "chunk-";

/// Suffix of an artifact that is still being written
const PARTIAL_SUFFIX: &str = ".part";

/// File name of the download manifest inside a session directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Storage key of the artifact for chunk `index`
pub fn chunk_file_name(index: u32) -> String {
    format!("{}{}", CHUNK_PREFIX, index)
}

/// Recover the chunk index encoded in an artifact name
///
/// Returns `None` for files that are not chunk artifacts (manifest, merged
/// output, half-written `.part` files).
pub fn parse_chunk_file_name(name: &str) -> Option<Result<u32>> {
    let rest = name.strip_prefix(CHUNK_PREFIX)?;
    if rest.ends_with(PARTIAL_SUFFIX) {
        return None;
    }
    Some(rest.parse::<u32>().map_err(|_| {
        error!("Invalid chunk file name format: {}", name);
        TransferError::reassembly_error(format!("invalid chunk file name format: {}", name))
    }))
}

/// Whether `name` would collide with staging bookkeeping files
pub fn is_reserved_name(name: &str) -> bool {
    name == MANIFEST_FILE || name.starts_with(CHUNK_PREFIX)
}

/// Staging area keyed by session identifier
#[derive(Debug, Clone)]
pub struct TransferStore {
    root: PathBuf,
}

impl TransferStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by `session_id`
    pub fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        validate_path_component(session_id, "uploadId")?;
        Ok(self.root.join(session_id))
    }

    /// Path of the artifact for chunk `index`
    pub fn chunk_path(&self, session_id: &str, index: u32) -> Result<PathBuf> {
        Ok(self.session_dir(session_id)?.join(chunk_file_name(index)))
    }

    /// Path of the merged artifact named `file_name`
    pub fn merged_path(&self, session_id: &str, file_name: &str) -> Result<PathBuf> {
        validate_path_component(file_name, "fileName")?;
        if is_reserved_name(file_name) {
            return Err(TransferError::validation_error_with_field(
                format!("file name collides with staging files: {}", file_name),
                "fileName",
            ));
        }
        Ok(self.session_dir(session_id)?.join(file_name))
    }

    /// Path of the download manifest
    pub fn manifest_path(&self, session_id: &str) -> Result<PathBuf> {
        Ok(self.session_dir(session_id)?.join(MANIFEST_FILE))
    }

    /// Whether the session directory exists
    pub async fn has_session(&self, session_id: &str) -> Result<bool> {
        let dir = self.session_dir(session_id)?;
        Ok(fs::try_exists(&dir).await.unwrap_or(false))
    }

    /// Whether an artifact for chunk `index` exists
    pub async fn has_chunk(&self, session_id: &str, index: u32) -> Result<bool> {
        Ok(self.chunk_len(session_id, index).await?.is_some())
    }

    /// Size of the artifact for chunk `index`, if it exists
    pub async fn chunk_len(&self, session_id: &str, index: u32) -> Result<Option<u64>> {
        let path = self.chunk_path(session_id, index)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                error!("Failed to stat chunk '{}': {}", path.display(), e);
                Err(TransferError::storage_error_full("Failed to stat chunk", path.display().to_string(), e.to_string()))
            }
        }
    }

    /// Checksum of the stored artifact for chunk `index`, if it exists
    pub async fn chunk_checksum(&self, session_id: &str, index: u32) -> Result<Option<String>> {
        if !self.has_chunk(session_id, index).await? {
            return Ok(None);
        }
        let path = self.chunk_path(session_id, index)?;
        Ok(Some(digest_file(&path).await?))
    }

    /// Create the session directory if needed
    pub async fn ensure_session_dir(&self, session_id: &str) -> Result<PathBuf> {
        let dir = self.session_dir(session_id)?;
        fs::create_dir_all(&dir).await.map_err(|e| {
            error!("Failed to create session directory '{}': {}", dir.display(), e);
            TransferError::storage_error_full("Failed to create session directory", dir.display().to_string(), e.to_string())
        })?;
        Ok(dir)
    }

    /// Persist chunk `index`, replacing any previous artifact
    ///
    /// Content goes to a `.part` file first and is renamed into place, so
    /// the final name never refers to a half-written chunk.
    pub async fn write_chunk(&self, session_id: &str, index: u32, data: &[u8]) -> Result<()> {
        let dir = self.ensure_session_dir(session_id).await?;
        let final_path = dir.join(chunk_file_name(index));
        let partial_path = dir.join(format!("{}{}", chunk_file_name(index), PARTIAL_SUFFIX));
        trace!("Writing chunk {} of session {} ({} bytes)", index, session_id, data.len());

        let mut file = fs::File::create(&partial_path).await.map_err(|e| {
            error!("Failed to create chunk file '{}': {}", partial_path.display(), e);
            TransferError::storage_error_full("Failed to create chunk file", partial_path.display().to_string(), e.to_string())
        })?;
        file.write_all(data).await.map_err(|e| {
            error!("Failed to write chunk file '{}': {}", partial_path.display(), e);
            TransferError::storage_error_full("Failed to write chunk file", partial_path.display().to_string(), e.to_string())
        })?;
        file.sync_all().await.map_err(|e| {
            error!("Failed to sync chunk file '{}': {}", partial_path.display(), e);
            TransferError::storage_error_full("Failed to sync chunk file", partial_path.display().to_string(), e.to_string())
        })?;
        drop(file);

        fs::rename(&partial_path, &final_path).await.map_err(|e| {
            error!("Failed to publish chunk file '{}': {}", final_path.display(), e);
            TransferError::storage_error_full("Failed to publish chunk file", final_path.display().to_string(), e.to_string())
        })?;

        debug!("Stored chunk {} of session {} ({} bytes)", index, session_id, data.len());
        Ok(())
    }

    /// Read the artifact for chunk `index`
    pub async fn read_chunk(&self, session_id: &str, index: u32) -> Result<Bytes> {
        let path = self.chunk_path(session_id, index)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TransferError::missing_chunk(index)),
            Err(e) => {
                error!("Failed to read chunk '{}': {}", path.display(), e);
                Err(TransferError::storage_error_full("Failed to read chunk", path.display().to_string(), e.to_string()))
            }
        }
    }

    /// Delete the artifact for chunk `index` (no-op if absent)
    pub async fn remove_chunk(&self, session_id: &str, index: u32) -> Result<()> {
        let path = self.chunk_path(session_id, index)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed chunk {} of session {}", index, session_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Failed to remove chunk '{}': {}", path.display(), e);
                Err(TransferError::storage_error_full("Failed to remove chunk", path.display().to_string(), e.to_string()))
            }
        }
    }

    /// Indices of every stored chunk artifact, sorted ascending
    pub async fn list_chunks(&self, session_id: &str) -> Result<Vec<u32>> {
        let dir = self.session_dir(session_id)?;
        let mut indices = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(indices),
            Err(e) => {
                error!("Failed to list session directory '{}': {}", dir.display(), e);
                return Err(TransferError::storage_error_full("Failed to list session directory", dir.display().to_string(), e.to_string()));
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(index) = parse_chunk_file_name(name) {
                indices.push(index?);
            }
        }

        indices.sort_unstable();
        trace!("Session {} holds {} chunks", session_id, indices.len());
        Ok(indices)
    }

    /// Concatenate chunks `0..total_chunks` into `dest`, strictly in order
    ///
    /// Fails fast with [`TransferError::MissingChunk`] on the first absent
    /// index; the partially written `dest` is removed on any failure.
    pub async fn merge_chunks(&self, session_id: &str, total_chunks: u32, dest: &Path) -> Result<u64> {
        info!("Merging {} chunks of session {} into {}", total_chunks, session_id, dest.display());
        let dir = self.session_dir(session_id)?;

        let result = Self::concatenate(&dir, total_chunks, dest).await;
        match &result {
            Ok(written) => debug!("Merged {} bytes into {}", written, dest.display()),
            Err(e) => {
                warn!("Merge of session {} failed: {}", session_id, e);
                if let Err(remove_err) = fs::remove_file(dest).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial merge '{}': {}", dest.display(), remove_err);
                    }
                }
            }
        }
        result
    }

    async fn concatenate(dir: &Path, total_chunks: u32, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = fs::File::create(dest).await.map_err(|e| {
            error!("Failed to create merged file '{}': {}", dest.display(), e);
            TransferError::storage_error_full("Failed to create merged file", dest.display().to_string(), e.to_string())
        })?;
        let mut out = BufWriter::new(file);
        let mut written = 0u64;

        for index in 0..total_chunks {
            let chunk_path = dir.join(chunk_file_name(index));
            let mut chunk = match fs::File::open(&chunk_path).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    error!("Missing chunk {} at {}", index, chunk_path.display());
                    return Err(TransferError::missing_chunk(index));
                }
                Err(e) => {
                    error!("Failed to open chunk '{}': {}", chunk_path.display(), e);
                    return Err(TransferError::storage_error_full("Failed to open chunk", chunk_path.display().to_string(), e.to_string()));
                }
            };
            let copied = tokio::io::copy(&mut chunk, &mut out).await?;
            trace!("Appended chunk {} ({} bytes)", index, copied);
            written += copied;
        }

        out.flush().await?;
        out.into_inner().sync_all().await?;
        Ok(written)
    }

    /// Delete the whole session directory (no-op if absent)
    pub async fn remove_session(&self, session_id: &str) -> Result<()> {
        let dir = self.session_dir(session_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!("Removed staging directory {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Failed to remove staging directory '{}': {}", dir.display(), e);
                Err(TransferError::storage_error_full("Failed to remove staging directory", dir.display().to_string(), e.to_string()))
            }
        }
    }

    /// Remove session directories untouched for at least `max_age`
    ///
    /// Sessions for which `in_use` returns true are left alone. Returns the
    /// number of sessions removed.
    pub async fn sweep_stale(&self, max_age: Duration, in_use: impl Fn(&str) -> bool) -> Result<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                error!("Failed to list staging root '{}': {}", self.root.display(), e);
                return Err(TransferError::storage_error_full("Failed to list staging root", self.root.display().to_string(), e.to_string()));
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_dir() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or(Duration::ZERO);
            if age < max_age {
                continue;
            }

            let path = entry.path();
            if entry.file_name().to_str().is_some_and(&in_use) {
                debug!("Session {} is busy, not sweeping", path.display());
                continue;
            }
            match fs::remove_dir_all(&path).await {
                Ok(()) => {
                    info!("Swept abandoned session {} (idle {:?})", path.display(), age);
                    removed += 1;
                }
                Err(e) => warn!("Failed to sweep '{}': {}", path.display(), e),
            }
        }

        Ok(removed)
    }
}
