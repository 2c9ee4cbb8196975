//! Reading the bytes behind an asset reference.

use std::sync::Arc;

use reel_models::AssetRef;

use crate::blob::BlobStore;
use crate::error::StorageResult;
use crate::fetch::AssetFetcher;

/// Returns the full bytes of any `AssetRef`.
#[derive(Clone)]
pub struct AssetReader {
    fetcher: Arc<dyn AssetFetcher>,
    blobs: BlobStore,
}

impl AssetReader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, blobs: BlobStore) -> Self {
        Self { fetcher, blobs }
    }

    pub async fn read(&self, asset: &AssetRef) -> StorageResult<Vec<u8>> {
        match asset {
            AssetRef::Remote { uri } => self.fetcher.fetch(uri).await,
            AssetRef::Local { path } => Ok(tokio::fs::read(path).await?),
            AssetRef::Ephemeral { id } => Ok(self.blobs.get(id)?.as_ref().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use async_trait::async_trait;

    struct NoFetch;

    #[async_trait]
    impl AssetFetcher for NoFetch {
        async fn fetch(&self, uri: &str) -> StorageResult<Vec<u8>> {
            Err(StorageError::fetch_failed(uri, "offline"))
        }
    }

    #[tokio::test]
    async fn test_read_each_kind() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp4");
        std::fs::write(&file, b"local").unwrap();

        let blobs = BlobStore::new();
        let ephemeral = blobs.insert(b"blob".to_vec());
        let reader = AssetReader::new(Arc::new(NoFetch), blobs);

        assert_eq!(reader.read(&AssetRef::local(&file)).await.unwrap(), b"local");
        assert_eq!(reader.read(&ephemeral).await.unwrap(), b"blob");
        assert!(reader.read(&AssetRef::remote("https://x/y")).await.is_err());
    }
}
