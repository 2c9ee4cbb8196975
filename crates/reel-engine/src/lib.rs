//! Video generation engine.
//!
//! This crate provides:
//! - The operation poller driving long-running provider jobs
//! - Per-unit generation orchestration (start, poll, resolve, retry)
//! - Failure classification and global halt
//! - The clip merge pipeline
//! - Structured unit logging

pub mod classifier;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod merge;
pub mod orchestrator;
pub mod poller;

pub use classifier::{ErrorClass, ErrorClassifier};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use job::{Job, JobSnapshot};
pub use logging::UnitLogger;
pub use merge::{MergeOutput, MergePipeline};
pub use orchestrator::{GenerationOrchestrator, Unit, UnitId, UnitState};
pub use poller::{OperationPoller, PollEvent};
