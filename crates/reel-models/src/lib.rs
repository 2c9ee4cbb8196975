//! Shared data models for ReelForge.
//!
//! This crate provides Serde-serializable types for:
//! - Generation jobs and their lifecycle states
//! - Asset references (remote, local file, in-session blob)
//! - Provider operation handles and status payloads
//! - Merge requests
//! - User-visible notifications
//! - The shared provider credential slot

pub mod asset;
pub mod credential;
pub mod job;
pub mod merge;
pub mod notification;
pub mod operation;
pub mod request;

// Re-export common types
pub use asset::{AssetRef, BlobId};
pub use credential::CredentialSlot;
pub use job::{FailureKind, JobFailure, JobId, JobState};
pub use merge::{MergeInput, MergeRequest, PreconditionError};
pub use notification::{Notification, NotificationLevel};
pub use operation::{GenerationStart, OperationError, OperationHandle, OperationOutcome, OperationStatus};
pub use request::{AspectRatio, AspectRatioParseError, GenerationRequest, VideoQuality};
