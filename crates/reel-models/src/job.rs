//! Generation job identity, states and failures.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, nothing requested yet
    #[default]
    Idle,
    /// Start call sent to the provider
    Starting,
    /// Provider accepted the job, status is being polled
    Polling,
    /// Provider produced a result
    Succeeded,
    /// Provider, transport or deadline failure
    Failed,
    /// Removed by the caller before reaching another terminal state
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Starting => "starting",
            JobState::Polling => "polling",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a job failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider reported an error payload
    Provider,
    /// The status or start request itself failed
    Transport,
    /// The job outlived its deadline
    Timeout,
    /// The provider rejected the credential
    Credential,
}

/// Structured failure attached to a `Failed` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    /// Human-readable message (provider text when available)
    pub message: String,
    /// Operation context, e.g. "polling video status"
    pub context: String,
    /// HTTP status of the provider answer, when there was one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: context.into(),
            status_code: None,
        }
    }

    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn provider(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(FailureKind::Provider, message, context)
    }

    pub fn transport(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message, context)
    }

    pub fn timeout(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message, context)
    }

    pub fn credential(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(FailureKind::Credential, message, context)
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.context)
    }
}
