//! Generation job records owned by the poller.

use chrono::{DateTime, Utc};
use reel_models::{AssetRef, FailureKind, JobFailure, JobId, JobState, OperationHandle};
use reel_provider::ProviderError;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A single generation job and its lifecycle.
///
/// Transitions are only reachable from inside the crate; once terminal, every
/// transition method returns `false` and leaves the job untouched.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    state: JobState,
    progress_percent: u8,
    handle: Option<OperationHandle>,
    result: Option<AssetRef>,
    error: Option<JobFailure>,
    pub(crate) epoch: u64,
    pub(crate) in_flight: bool,
    pub(crate) deadline: Option<Instant>,
    pub(crate) deadline_guard: Option<CancellationToken>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Read-only view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    pub progress_percent: u8,
    pub handle: Option<OperationHandle>,
    pub result: Option<AssetRef>,
    pub error: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub(crate) fn new(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Starting,
            progress_percent: 0,
            handle: None,
            result: None,
            error: None,
            epoch: 0,
            in_flight: false,
            deadline: None,
            deadline_guard: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn handle(&self) -> Option<&OperationHandle> {
        self.handle.as_ref()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// `Starting → Polling`.
    pub(crate) fn attach(&mut self, handle: OperationHandle, epoch: u64) -> bool {
        if self.state != JobState::Starting {
            return false;
        }
        self.handle = Some(handle);
        self.epoch = epoch;
        self.state = JobState::Polling;
        self.touch();
        true
    }

    /// Record reported progress. Returns the new value if it moved forward.
    pub(crate) fn record_progress(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.min(100);
        if self.state.is_terminal() || percent <= self.progress_percent {
            return None;
        }
        self.progress_percent = percent;
        self.touch();
        Some(percent)
    }

    pub(crate) fn succeed(&mut self, result: AssetRef) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = JobState::Succeeded;
        self.progress_percent = 100;
        self.result = Some(result);
        self.finish();
        true
    }

    pub(crate) fn fail(&mut self, failure: JobFailure) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = JobState::Failed;
        self.error = Some(failure);
        self.finish();
        true
    }

    pub(crate) fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = JobState::Cancelled;
        self.finish();
        true
    }

    fn finish(&mut self) {
        self.in_flight = false;
        self.handle = None;
        if let Some(guard) = self.deadline_guard.take() {
            guard.cancel();
        }
        self.touch();
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            state: self.state,
            progress_percent: self.progress_percent,
            handle: self.handle.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Translate a provider error into a job failure.
pub fn provider_failure(err: &ProviderError, context: &str) -> JobFailure {
    let kind = if err.is_credential_error() {
        FailureKind::Credential
    } else if err.is_transport() {
        FailureKind::Transport
    } else {
        FailureKind::Provider
    };
    let message = match err {
        ProviderError::Http { body, .. } if !body.trim().is_empty() => body.clone(),
        ProviderError::Rejected(message) => message.clone(),
        other => other.to_string(),
    };
    let failure = JobFailure::new(kind, message, context);
    match err.status_code() {
        Some(status) => failure.with_status_code(status),
        None => failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_transition_happens_once() {
        let mut job = Job::new(JobId::new());
        assert!(job.attach(OperationHandle::new("op"), 1));
        assert!(job.succeed(AssetRef::remote("https://v/1.mp4")));

        assert!(!job.fail(JobFailure::provider("late", "polling")));
        assert!(!job.cancel());
        assert_eq!(job.state(), JobState::Succeeded);
        assert!(job.snapshot().error.is_none());
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut job = Job::new(JobId::new());
        job.attach(OperationHandle::new("op"), 1);

        assert_eq!(job.record_progress(45), Some(45));
        assert_eq!(job.record_progress(10), None);
        assert_eq!(job.record_progress(45), None);
        assert_eq!(job.record_progress(250), Some(100));
        assert_eq!(job.snapshot().progress_percent, 100);
    }

    #[test]
    fn test_attach_requires_starting() {
        let mut job = Job::new(JobId::new());
        assert!(job.attach(OperationHandle::new("a"), 1));
        assert!(!job.attach(OperationHandle::new("b"), 2));
        assert_eq!(job.handle().map(|h| h.as_str()), Some("a"));
    }

    #[test]
    fn test_provider_failure_mapping() {
        let failure = provider_failure(&ProviderError::http(403, "API key not valid"), "starting generation");
        assert_eq!(failure.kind, FailureKind::Credential);
        assert_eq!(failure.message, "API key not valid");
        assert_eq!(failure.status_code, Some(403));

        let failure = provider_failure(&ProviderError::http(429, "RESOURCE_EXHAUSTED"), "polling");
        assert_eq!(failure.kind, FailureKind::Provider);
        assert_eq!(failure.status_code, Some(429));
    }
}
