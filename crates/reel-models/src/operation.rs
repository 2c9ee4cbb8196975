//! Provider long-running operation types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message used when a provider reports completion with neither a result nor an error.
pub const UNKNOWN_GENERATION_ERROR: &str = "Generation finished with an unknown error.";

/// Opaque provider-side token for an in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(pub String);

impl OperationHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Answer to a generation start call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationStart {
    /// The provider produced the asset synchronously.
    Immediate { uri: String },
    /// The provider accepted a long-running job.
    Pending { handle: OperationHandle },
}

/// Error payload carried by a finished operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub message: String,
}

/// Snapshot returned by a status query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

/// Interpretation of a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Pending,
    Succeeded { uri: String },
    Failed { message: String },
}

impl OperationStatus {
    /// A still-running status with the given progress.
    pub fn running(progress_percent: Option<u8>) -> Self {
        Self {
            done: false,
            progress_percent,
            ..Default::default()
        }
    }

    pub fn succeeded(uri: impl Into<String>) -> Self {
        Self {
            done: true,
            progress_percent: Some(100),
            result_uri: Some(uri.into()),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            done: true,
            progress_percent: None,
            result_uri: None,
            error: Some(OperationError {
                message: message.into(),
            }),
        }
    }

    /// Classify the snapshot. A result URI wins over an error payload.
    pub fn outcome(&self) -> OperationOutcome {
        if !self.done {
            return OperationOutcome::Pending;
        }
        if let Some(uri) = self.result_uri.as_ref().filter(|u| !u.is_empty()) {
            return OperationOutcome::Succeeded { uri: uri.clone() };
        }
        let message = self
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| UNKNOWN_GENERATION_ERROR.to_string());
        OperationOutcome::Failed { message }
    }
}
