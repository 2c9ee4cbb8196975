//! Shared provider credential.

use std::sync::{Arc, RwLock};

/// The API key or session token currently in use.
///
/// Cloned handles share the same slot, so invalidating it from the error
/// path is immediately visible to every client holding a handle.
#[derive(Debug, Clone, Default)]
pub struct CredentialSlot {
    inner: Arc<RwLock<Option<String>>>,
}

impl CredentialSlot {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(secret.filter(|s| !s.trim().is_empty()))),
        }
    }

    pub fn from_env(var: &str) -> Self {
        Self::new(std::env::var(var).ok())
    }

    /// Current secret, if one is set.
    pub fn get(&self) -> Option<String> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }

    pub fn set(&self, secret: impl Into<String>) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = Some(secret.into());
        }
    }

    /// Drop the secret after the provider rejected it.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}
