//! Turning a finished remote result into a usable asset.
//!
//! The asset is fetched exactly once per resolution. When a local saver is
//! available and the user picks a destination, the bytes go to disk and the
//! result is `AssetRef::Local`. Otherwise (no saver, prompt cancelled, write
//! failed) the same bytes become an ephemeral blob.

use std::sync::Arc;

use reel_models::AssetRef;
use tracing::{info, warn};

use crate::blob::BlobStore;
use crate::error::StorageResult;
use crate::fetch::AssetFetcher;
use crate::local::{LocalSaver, SaveChoice};

const SAVE_TITLE: &str = "Save generated video";

#[derive(Clone)]
pub struct AssetResolver {
    fetcher: Arc<dyn AssetFetcher>,
    saver: Option<Arc<dyn LocalSaver>>,
    blobs: BlobStore,
}

impl AssetResolver {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, blobs: BlobStore) -> Self {
        Self {
            fetcher,
            saver: None,
            blobs,
        }
    }

    pub fn with_saver(mut self, saver: Arc<dyn LocalSaver>) -> Self {
        self.saver = Some(saver);
        self
    }

    pub fn saver(&self) -> Option<&Arc<dyn LocalSaver>> {
        self.saver.as_ref()
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Materialize `uri`. A fetch failure is returned as-is; the caller keeps
    /// the remote reference and may call this again with the same URI.
    pub async fn resolve(&self, uri: &str, default_name: &str) -> StorageResult<AssetRef> {
        let bytes = self.fetcher.fetch(uri).await?;

        if let Some(saver) = &self.saver {
            match saver.choose_destination(SAVE_TITLE, default_name).await {
                Ok(SaveChoice::Path(path)) => match saver.write(&bytes, &path).await {
                    Ok(written) => {
                        info!(path = %written.display(), "Resolved asset to local file");
                        return Ok(AssetRef::Local { path: written });
                    }
                    Err(e) => warn!(error = %e, "Local save failed, keeping asset in memory"),
                },
                Ok(SaveChoice::Cancelled) => {
                    info!("Save cancelled, keeping asset in memory");
                }
                Err(e) => warn!(error = %e, "Save prompt failed, keeping asset in memory"),
            }
        }

        Ok(self.blobs.insert(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::fetch::HttpFetcher;
    use crate::local::DirectorySaver;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct CancellingSaver;

    #[async_trait]
    impl LocalSaver for CancellingSaver {
        async fn choose_destination(&self, _: &str, _: &str) -> StorageResult<SaveChoice> {
            Ok(SaveChoice::Cancelled)
        }

        async fn write(&self, _: &[u8], path: &Path) -> StorageResult<PathBuf> {
            panic!("write called for {}", path.display());
        }
    }

    struct BrokenSaver;

    #[async_trait]
    impl LocalSaver for BrokenSaver {
        async fn choose_destination(&self, _: &str, name: &str) -> StorageResult<SaveChoice> {
            Ok(SaveChoice::Path(PathBuf::from(name)))
        }

        async fn write(&self, _: &[u8], path: &Path) -> StorageResult<PathBuf> {
            Err(StorageError::write_failed(path, "disk full"))
        }
    }

    async fn serve_once(server: &MockServer) -> String {
        Mock::given(method("GET"))
            .and(path("/v/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video".to_vec()))
            .expect(1)
            .mount(server)
            .await;
        format!("{}/v/clip.mp4", server.uri())
    }

    fn fetcher() -> Arc<dyn AssetFetcher> {
        Arc::new(HttpFetcher::new(Duration::from_secs(5)).unwrap())
    }

    #[tokio::test]
    async fn test_resolve_saves_locally() {
        let server = MockServer::start().await;
        let uri = serve_once(&server).await;
        let dir = tempfile::tempdir().unwrap();

        let resolver = AssetResolver::new(fetcher(), BlobStore::new())
            .with_saver(Arc::new(DirectorySaver::new(dir.path())));
        let asset = resolver.resolve(&uri, "scene_1.mp4").await.unwrap();

        let expected = dir.path().join("scene_1.mp4");
        assert_eq!(asset, AssetRef::local(&expected));
        assert_eq!(std::fs::read(expected).unwrap(), b"video");
        assert!(asset.playback_url().starts_with("file://"));
    }

    #[tokio::test]
    async fn test_no_saver_is_ephemeral() {
        let server = MockServer::start().await;
        let uri = serve_once(&server).await;
        let blobs = BlobStore::new();

        let resolver = AssetResolver::new(fetcher(), blobs.clone());
        let asset = resolver.resolve(&uri, "scene_1.mp4").await.unwrap();

        let AssetRef::Ephemeral { id } = asset else {
            panic!("expected ephemeral asset");
        };
        assert_eq!(blobs.get(&id).unwrap().as_slice(), b"video");
    }

    #[tokio::test]
    async fn test_cancel_falls_back_without_refetch() {
        let server = MockServer::start().await;
        let uri = serve_once(&server).await;

        let resolver = AssetResolver::new(fetcher(), BlobStore::new()).with_saver(Arc::new(CancellingSaver));
        let asset = resolver.resolve(&uri, "scene_1.mp4").await.unwrap();
        assert!(matches!(asset, AssetRef::Ephemeral { .. }));
    }

    #[tokio::test]
    async fn test_write_failure_falls_back() {
        let server = MockServer::start().await;
        let uri = serve_once(&server).await;

        let resolver = AssetResolver::new(fetcher(), BlobStore::new()).with_saver(Arc::new(BrokenSaver));
        let asset = resolver.resolve(&uri, "scene_1.mp4").await.unwrap();
        assert!(matches!(asset, AssetRef::Ephemeral { .. }));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let blobs = BlobStore::new();

        let resolver = AssetResolver::new(fetcher(), blobs.clone());
        let err = resolver
            .resolve(&format!("{}/v/clip.mp4", server.uri()), "scene_1.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::FetchFailed { .. }));
        assert!(blobs.is_empty());
    }
}
