//! Archive module: collaborators around the harvest core
//!
//! This module handles:
//! - Blob store access (download of job URL files, upload of finished artifacts)
//! - Construction and validation of the credentials file
//! - Resolving a job id to its opening search URL

mod blob;
mod credentials;
mod resolver;

pub use blob::{BlobStore, LocalBlobStore};
pub use credentials::{load_credentials, write_credentials, Credentials};
pub use resolver::resolve_job_url;

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by archive collaborators
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Object {bucket}/{remote_path} already exists; refusing to overwrite")]
    UploadConflict { bucket: String, remote_path: String },

    #[error("Object {bucket}/{remote_path} not found")]
    NotFound { bucket: String, remote_path: String },

    #[error("Invalid object path: {0:?}")]
    InvalidPath(String),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Invalid job URL in {path}: {message}")]
    InvalidJobUrl { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;
