//! Storage module
//!
//! Handles chunk staging, download manifests and the object store seam.

pub mod backend;
pub mod manifest;
pub mod staging;
pub mod validation;

// Re-export backend types
pub use backend::{LocalObjectStore, ObjectStore};

// Re-export manifest types
pub use manifest::DownloadManifest;

// Re-export staging types
pub use staging::{chunk_file_name, is_reserved_name, parse_chunk_file_name, TransferStore, MANIFEST_FILE};

pub use validation::validate_path_component;
