//! Server module
//!
//! Upload and download services, plus the HTTP surface exposing them.

pub mod download;
#[cfg(feature = "http")]
pub mod http;
pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::storage::{LocalObjectStore, TransferStore};
use crate::transfer::TransferConfig;

pub use download::DownloadService;
pub use upload::{AcceptOutcome, CompletedUpload, UploadService};

/// Services shared by every request
pub struct ServerState {
    pub upload: UploadService,
    pub download: DownloadService,
}

impl ServerState {
    /// Build services staging in `config.staging_root` and storing objects
    /// under `object_root`
    pub fn new(config: &TransferConfig, object_root: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        let objects = LocalObjectStore::new(object_root);
        let store = TransferStore::new(config.staging_root.clone());

        Ok(Self {
            upload: UploadService::new(store, Arc::new(objects.clone())),
            download: DownloadService::new(objects, config.chunk_size),
        })
    }
}
