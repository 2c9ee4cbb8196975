//! Asset references.
//!
//! A finished generation can live in exactly one of three places: at the
//! provider (a fetchable URI), on the local filesystem, or in the in-session
//! blob store. `AssetRef` keeps those apart so a remote URI can never be
//! mistaken for something that is already materialized.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Identifier of an in-memory blob, valid for the current session only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(pub String);

impl BlobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a generated asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetRef {
    /// Provider-side result, not yet materialized
    Remote { uri: String },
    /// Saved to the local filesystem
    Local { path: PathBuf },
    /// Held in the session blob store
    Ephemeral { id: BlobId },
}

impl AssetRef {
    pub fn remote(uri: impl Into<String>) -> Self {
        Self::Remote { uri: uri.into() }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    /// Whether the asset is addressable without going back to the provider.
    pub fn is_materialized(&self) -> bool {
        !matches!(self, AssetRef::Remote { .. })
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            AssetRef::Local { path } => Some(path),
            _ => None,
        }
    }

    pub fn remote_uri(&self) -> Option<&str> {
        match self {
            AssetRef::Remote { uri } => Some(uri),
            _ => None,
        }
    }

    /// URL a player can open.
    ///
    /// Local files use the `file://` scheme; relative paths that cannot be
    /// expressed as a file URL fall back to a plain `file://` prefix.
    pub fn playback_url(&self) -> String {
        match self {
            AssetRef::Remote { uri } => uri.clone(),
            AssetRef::Local { path } => url::Url::from_file_path(path)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| format!("file://{}", path.display())),
            AssetRef::Ephemeral { id } => format!("blob:reel/{}", id),
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.playback_url())
    }
}
