//! Fetching finished assets.

use std::time::Duration;

use async_trait::async_trait;
use reel_models::CredentialSlot;
use tracing::{debug, info};
use url::Url;

use crate::error::{StorageError, StorageResult};

/// Header the provider expects the API key in.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Downloads the full bytes of a finished asset.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> StorageResult<Vec<u8>>;
}

/// HTTP fetcher for provider result URIs.
///
/// `file://` URIs are read from disk so locally produced results go through
/// the same path.
#[derive(Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
    credential: Option<CredentialSlot>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::config_error(e.to_string()))?;
        Ok(Self {
            http,
            credential: None,
        })
    }

    /// Send the current API key with every request.
    pub fn with_credential(mut self, credential: CredentialSlot) -> Self {
        self.credential = Some(credential);
        self
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> StorageResult<Vec<u8>> {
        let parsed = Url::parse(uri).map_err(|e| StorageError::fetch_failed(uri, e.to_string()))?;

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| StorageError::fetch_failed(uri, "invalid file URI"))?;
            debug!(path = %path.display(), "Reading local asset");
            return tokio::fs::read(&path)
                .await
                .map_err(|e| StorageError::fetch_failed(uri, e.to_string()));
        }

        let mut request = self.http.get(parsed);
        if let Some(key) = self.credential.as_ref().and_then(|c| c.get()) {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::fetch_failed(uri, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::fetch_failed(
                uri,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::fetch_failed(uri, e.to_string()))?;

        info!(bytes = bytes.len(), "Fetched asset");
        Ok(bytes.to_vec())
    }
}
