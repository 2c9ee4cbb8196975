//! Provider client error types.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Generation failed: {0}")]
    Rejected(String),

    #[error("No credential configured")]
    MissingCredential,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No supported endpoint responded")]
    NoEndpoint,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// HTTP status code, if the provider answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the provider rejected the credential.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, ProviderError::MissingCredential)
            || matches!(self.status_code(), Some(401) | Some(403))
    }

    /// Whether the failure happened before any answer arrived.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Network(_))
    }
}
