//! Provider failure classification.
//!
//! Maps a job failure to how far recovery has to reach: a rejected credential
//! or an exhausted quota stops everything, anything else only the job that
//! failed.

use reel_models::{FailureKind, JobFailure};

/// Message fragments meaning the credential was rejected.
const CREDENTIAL_SIGNALS: &[&str] = &[
    "api key not valid",
    "requested entity was not found",
    "no credential configured",
];

/// Message fragments meaning the account ran out of quota.
const QUOTA_SIGNALS: &[&str] = &["resource_exhausted", "quota"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invalidate the credential and halt every job
    InvalidCredential,
    /// Halt every job, keep the credential
    QuotaExceeded,
    /// Stop only the failed job
    Transient,
}

impl ErrorClass {
    /// Whether every active job has to stop.
    pub fn halts_all(&self) -> bool {
        !matches!(self, ErrorClass::Transient)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, failure: &JobFailure) -> ErrorClass {
        match failure.kind {
            // A deadline is local to its job whatever the last message said.
            FailureKind::Timeout => ErrorClass::Transient,
            FailureKind::Credential => ErrorClass::InvalidCredential,
            FailureKind::Provider | FailureKind::Transport => {
                self.classify_message(&failure.message, failure.status_code)
            }
        }
    }

    pub fn classify_message(&self, message: &str, status_code: Option<u16>) -> ErrorClass {
        match status_code {
            Some(401) | Some(403) => return ErrorClass::InvalidCredential,
            Some(429) => return ErrorClass::QuotaExceeded,
            _ => {}
        }

        let message = message.to_lowercase();
        if CREDENTIAL_SIGNALS.iter().any(|s| message.contains(s)) {
            ErrorClass::InvalidCredential
        } else if QUOTA_SIGNALS.iter().any(|s| message.contains(s)) {
            ErrorClass::QuotaExceeded
        } else {
            ErrorClass::Transient
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_signals() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.classify(&JobFailure::provider("API key not valid. Please pass a valid API key.", "start")),
            ErrorClass::InvalidCredential
        );
        assert_eq!(
            classifier.classify(&JobFailure::provider("Requested entity was not found.", "poll")),
            ErrorClass::InvalidCredential
        );
        assert_eq!(
            classifier.classify(&JobFailure::transport("forbidden", "poll").with_status_code(401)),
            ErrorClass::InvalidCredential
        );
        assert_eq!(
            classifier.classify(&JobFailure::credential("Auth failed with status 403", "start")),
            ErrorClass::InvalidCredential
        );
    }

    #[test]
    fn test_quota_signals() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.classify(&JobFailure::provider("429 RESOURCE_EXHAUSTED", "start")),
            ErrorClass::QuotaExceeded
        );
        assert_eq!(
            classifier.classify(&JobFailure::provider("You exceeded your current quota", "start")),
            ErrorClass::QuotaExceeded
        );
        assert_eq!(
            classifier.classify_message("slow down", Some(429)),
            ErrorClass::QuotaExceeded
        );
    }

    #[test]
    fn test_everything_else_is_transient() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.classify(&JobFailure::provider("Video blocked by safety filters", "poll")),
            ErrorClass::Transient
        );
        assert_eq!(
            classifier.classify(&JobFailure::timeout("quota of time exhausted", "test clip")),
            ErrorClass::Transient
        );
        assert!(!ErrorClass::Transient.halts_all());
        assert!(ErrorClass::QuotaExceeded.halts_all());
    }
}
