//! Object-storage collaborator interface.
//!
//! After the `.hist` file (and, when profiling, the CPU profile) has
//! been written and synced, it is optionally handed to an uploader
//! under a fixed key prefix. The production uploader lives behind
//! this trait; local runs and tests use [`DirUploader`], which treats
//! the bucket name as a directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::report::sanitize_component;

/// Key prefix for histogram artifacts.
pub const HIST_KEY_PREFIX: &str = "hist";

/// Key prefix for CPU-profile artifacts.
pub const PERF_KEY_PREFIX: &str = "perf";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("artifact path '{0}' has no file name")]
    BadPath(PathBuf),
    #[error("error uploading artifact: {0}")]
    Io(#[from] io::Error),
}

pub trait ObjectUploader: Send + Sync {
    /// Stores a finished local artifact under
    /// `<bucket>/<key_prefix>/<file name>`.
    fn upload(&self, local_path: &Path, bucket: &str, key_prefix: &str) -> Result<(), UploadError>;
}

/// Bucket-as-directory stand-in for object storage.
pub struct DirUploader;

impl ObjectUploader for DirUploader {
    fn upload(&self, local_path: &Path, bucket: &str, key_prefix: &str) -> Result<(), UploadError> {
        let base = local_path
            .file_name()
            .ok_or_else(|| UploadError::BadPath(local_path.to_owned()))?;

        let dest_dir = Path::new(bucket).join(sanitize_component(key_prefix));
        fs::create_dir_all(&dest_dir)?;
        fs::copy(local_path, dest_dir.join(base))?;
        Ok(())
    }
}
