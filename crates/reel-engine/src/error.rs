//! Engine error types.

use reel_models::PreconditionError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Credential rejected: {0}")]
    CredentialInvalid(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Cannot merge: {0}")]
    PreconditionFailed(String),

    #[error("Concatenation failed: {0}")]
    ConcatenationFailed(String),

    #[error("Cancelled by user")]
    UserCancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] reel_storage::StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] reel_provider::ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PreconditionError> for EngineError {
    fn from(err: PreconditionError) -> Self {
        Self::PreconditionFailed(err.to_string())
    }
}

impl EngineError {
    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn concatenation_failed(msg: impl Into<String>) -> Self {
        Self::ConcatenationFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the error stops every job, not just the one that failed.
    pub fn is_global(&self) -> bool {
        matches!(self, EngineError::CredentialInvalid(_) | EngineError::QuotaExceeded(_))
    }

    /// A dismissed dialog. A valid outcome rather than a failure.
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, EngineError::UserCancelled)
    }
}
