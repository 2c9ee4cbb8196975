//! Session-scoped in-memory blob store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use reel_models::{AssetRef, BlobId};
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// In-memory objects that live only as long as the current session.
///
/// Cheap to clone; clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct BlobStore {
    blobs: Arc<RwLock<HashMap<BlobId, Arc<Vec<u8>>>>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<BlobId, Arc<Vec<u8>>>> {
        self.blobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<BlobId, Arc<Vec<u8>>>> {
        self.blobs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `data` and return an ephemeral reference to it.
    pub fn insert(&self, data: Vec<u8>) -> AssetRef {
        let id = BlobId::new();
        debug!(blob_id = %id, bytes = data.len(), "Stored ephemeral blob");
        self.write().insert(id.clone(), Arc::new(data));
        AssetRef::Ephemeral { id }
    }

    pub fn get(&self, id: &BlobId) -> StorageResult<Arc<Vec<u8>>> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::BlobNotFound(id.to_string()))
    }

    /// Release a blob. Returns whether it existed.
    pub fn revoke(&self, id: &BlobId) -> bool {
        self.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_revoke() {
        let store = BlobStore::new();
        let asset = store.insert(b"video".to_vec());

        let AssetRef::Ephemeral { id } = asset else {
            panic!("expected ephemeral asset");
        };
        assert_eq!(store.get(&id).unwrap().as_slice(), b"video");
        assert_eq!(store.len(), 1);

        assert!(store.revoke(&id));
        assert!(!store.revoke(&id));
        assert!(matches!(store.get(&id), Err(StorageError::BlobNotFound(_))));
    }

    #[test]
    fn test_clones_share_storage() {
        let store = BlobStore::new();
        let clone = store.clone();
        store.insert(vec![1, 2, 3]);
        assert_eq!(clone.len(), 1);
    }

    #[test]
    fn test_poisoned_lock_still_stores() {
        let store = BlobStore::new();
        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.blobs.write().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(store.blobs.is_poisoned());

        let AssetRef::Ephemeral { id } = store.insert(b"clip".to_vec()) else {
            panic!("expected ephemeral asset");
        };
        assert_eq!(store.get(&id).unwrap().as_slice(), b"clip");
        assert!(store.revoke(&id));
    }
}
