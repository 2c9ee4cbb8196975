//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while fetching, saving or reading assets.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Failed to fetch {uri}: {message}")]
    FetchFailed { uri: String, message: String },

    #[error("Failed to write {path}: {message}")]
    WriteFailed { path: PathBuf, message: String },

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Asset is not materialized: {0}")]
    NotMaterialized(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn fetch_failed(uri: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::FetchFailed {
            uri: uri.into(),
            message: msg.into(),
        }
    }

    pub fn write_failed(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::WriteFailed {
            path: path.into(),
            message: msg.into(),
        }
    }
}
