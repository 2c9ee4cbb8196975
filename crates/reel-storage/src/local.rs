//! Local save capability.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Outcome of the destination prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveChoice {
    Cancelled,
    Path(PathBuf),
}

/// Access to the local filesystem, usually behind a save dialog.
#[async_trait]
pub trait LocalSaver: Send + Sync {
    /// Ask where to save. Cancelling is a valid outcome, not an error.
    async fn choose_destination(&self, title: &str, default_name: &str) -> StorageResult<SaveChoice>;

    /// Write `bytes` to `path` and return the path written.
    async fn write(&self, bytes: &[u8], path: &Path) -> StorageResult<PathBuf>;
}

/// Non-interactive saver that always picks `<dir>/<default_name>`.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl LocalSaver for DirectorySaver {
    async fn choose_destination(&self, title: &str, default_name: &str) -> StorageResult<SaveChoice> {
        // Never let a suggested name escape the output directory.
        let name = Path::new(default_name)
            .file_name()
            .ok_or_else(|| StorageError::config_error(format!("invalid file name: {default_name}")))?;
        let path = self.dir.join(name);
        debug!(title, path = %path.display(), "Chose save destination");
        Ok(SaveChoice::Path(path))
    }

    async fn write(&self, bytes: &[u8], path: &Path) -> StorageResult<PathBuf> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::write_failed(path, e.to_string()))?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| StorageError::write_failed(path, e.to_string()))?;
        info!(path = %path.display(), bytes = bytes.len(), "Saved asset");
        Ok(path.to_path_buf())
    }
}
