//! Per-unit generation orchestration.
//!
//! A unit is one scene or the standalone test clip. Each unit goes through
//! `NotStarted → Requesting → Polling → Ready | Failed`; providers that answer
//! synchronously skip `Polling`. The orchestrator is the only component that
//! raises user-visible notifications, exactly one per terminal failure.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reel_media::LogSink;
use reel_models::{
    AssetRef, CredentialSlot, FailureKind, GenerationRequest, GenerationStart, JobFailure, JobId, MergeInput,
    MergeRequest, Notification,
};
use reel_provider::GenerationProvider;
use reel_storage::{AssetResolver, SaveChoice};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use crate::classifier::{ErrorClass, ErrorClassifier};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::job::provider_failure;
use crate::logging::UnitLogger;
use crate::merge::{MergeOutput, MergePipeline};
use crate::poller::{OperationPoller, PollEvent};

const START_CONTEXT: &str = "starting generation";
const RESOLVE_CONTEXT: &str = "saving generated video";
const MERGE_CONTEXT: &str = "merging videos";
const MERGE_TITLE: &str = "Save merged video";
const MERGE_DEFAULT_NAME: &str = "merged_video.mp4";

/// Identifier of a generation unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The standalone test clip.
    pub fn test_clip() -> Self {
        Self("test_clip".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Suggested file name for the unit's video.
    pub fn file_name(&self) -> String {
        format!("{}.mp4", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    #[default]
    NotStarted,
    Requesting,
    Polling,
    Ready,
    Failed,
}

impl UnitState {
    /// Requesting or polling.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, UnitState::Requesting | UnitState::Polling)
    }
}

/// Observable state of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    pub id: UnitId,
    pub state: UnitState,
    pub job_id: Option<JobId>,
    pub progress_percent: u8,
    pub result: Option<AssetRef>,
    pub error: Option<String>,
    pub generating: bool,
    /// Bumped on every start and on halt; a start call answering for an
    /// older attempt is stale.
    #[serde(skip)]
    attempt: u64,
}

impl Unit {
    fn new(id: UnitId) -> Self {
        Self {
            id,
            state: UnitState::NotStarted,
            job_id: None,
            progress_percent: 0,
            result: None,
            error: None,
            generating: false,
            attempt: 0,
        }
    }

    fn is_current(&self, job_id: &JobId) -> bool {
        self.job_id.as_ref() == Some(job_id)
    }
}

pub struct GenerationOrchestrator {
    provider: Arc<dyn GenerationProvider>,
    poller: OperationPoller,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<PollEvent>>,
    resolver: AssetResolver,
    merger: MergePipeline,
    classifier: ErrorClassifier,
    credential: CredentialSlot,
    config: EngineConfig,
    units: Mutex<BTreeMap<UnitId, Unit>>,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl GenerationOrchestrator {
    /// Build an orchestrator and the receiving end of its notifications.
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        resolver: AssetResolver,
        merger: MergePipeline,
        credential: CredentialSlot,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (poller, events) = OperationPoller::new(Arc::clone(&provider), config.poll_interval);
        let (notifications, notification_rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            provider,
            poller,
            events: tokio::sync::Mutex::new(events),
            resolver,
            merger,
            classifier: ErrorClassifier::new(),
            credential,
            config,
            units: Mutex::new(BTreeMap::new()),
            notifications,
        };
        (orchestrator, notification_rx)
    }

    pub fn poller(&self) -> &OperationPoller {
        &self.poller
    }

    fn lock_units(&self) -> MutexGuard<'_, BTreeMap<UnitId, Unit>> {
        self.units.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, notification: Notification) {
        let _ = self.notifications.send(notification);
    }

    /// Snapshot of every unit, in id order.
    pub fn units(&self) -> Vec<Unit> {
        self.lock_units().values().cloned().collect()
    }

    pub fn unit(&self, id: &UnitId) -> Option<Unit> {
        self.lock_units().get(id).cloned()
    }

    /// Start (or restart) generation for a scene.
    pub async fn generate(&self, unit: &UnitId, request: GenerationRequest) -> EngineResult<()> {
        self.start_unit(unit, request, self.config.scene_timeout).await
    }

    /// Start the standalone test clip, bounded by the test deadline.
    pub async fn generate_test_clip(&self, request: GenerationRequest) -> EngineResult<()> {
        self.start_unit(&UnitId::test_clip(), request, Some(self.config.test_timeout))
            .await
    }

    async fn start_unit(
        &self,
        unit_id: &UnitId,
        request: GenerationRequest,
        deadline: Option<Duration>,
    ) -> EngineResult<()> {
        let logger = UnitLogger::new(unit_id.as_str(), "generate");
        let job_id = self.poller.begin();
        let attempt = {
            let mut units = self.lock_units();
            let unit = units
                .entry(unit_id.clone())
                .or_insert_with(|| Unit::new(unit_id.clone()));

            if let Some(previous) = unit.job_id.take() {
                self.poller.forget(&previous);
            }
            if let Some(AssetRef::Ephemeral { id }) = unit.result.take() {
                self.resolver.blobs().revoke(&id);
            }
            unit.attempt += 1;
            unit.state = UnitState::Requesting;
            unit.job_id = Some(job_id.clone());
            unit.progress_percent = 0;
            unit.error = None;
            unit.generating = true;
            unit.attempt
        };

        logger.log_start(&request.prompt);
        let started = self
            .provider
            .start(&request)
            .instrument(logger.create_span())
            .await;

        let still_current = {
            let units = self.lock_units();
            units
                .get(unit_id)
                .is_some_and(|u| u.attempt == attempt && u.state == UnitState::Requesting)
        };
        if !still_current {
            debug!(unit_id = %unit_id, job_id = %job_id, "Discarding stale start result");
            self.poller.forget(&job_id);
            return Ok(());
        }

        match started {
            Ok(GenerationStart::Immediate { uri }) => {
                self.poller.complete_immediate(&job_id, uri.clone());
                logger.log_progress(100);
                self.complete(unit_id, &job_id, uri).await
            }
            Ok(GenerationStart::Pending { handle }) => {
                {
                    let mut units = self.lock_units();
                    if let Some(unit) = units.get_mut(unit_id).filter(|u| u.is_current(&job_id)) {
                        unit.state = UnitState::Polling;
                    }
                }
                self.poller.register(&job_id, handle, deadline);
                Ok(())
            }
            Err(e) => {
                let failure = provider_failure(&e, START_CONTEXT);
                self.poller.fail_start(&job_id, failure.clone());
                Err(self.fail(unit_id, &job_id, failure))
            }
        }
    }

    /// Wait for the next poller event and apply it. Returns `false` once the
    /// event stream has ended.
    pub async fn process_next(&self) -> bool {
        let event = self.events.lock().await.recv().await;
        match event {
            Some(event) => {
                self.handle_event(event).await;
                true
            }
            None => false,
        }
    }

    /// Apply every event that is already queued, without waiting.
    pub async fn process_events(&self) -> usize {
        let mut processed = 0;
        loop {
            let event = self.events.lock().await.try_recv();
            let Ok(event) = event else { break };
            self.handle_event(event).await;
            processed += 1;
        }
        processed
    }

    /// Apply events until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Orchestrator event loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                more = self.process_next() => if !more { break },
            }
        }
        info!("Orchestrator event loop stopped");
    }

    /// Apply events until `unit` is neither requesting nor polling.
    pub async fn settle(&self, unit: &UnitId) -> Option<Unit> {
        loop {
            match self.unit(unit) {
                Some(u) if u.state.is_in_flight() => {}
                other => return other,
            }
            if !self.process_next().await {
                return self.unit(unit);
            }
        }
    }

    async fn handle_event(&self, event: PollEvent) {
        let job_id = event.job_id().clone();
        let unit_id = {
            let units = self.lock_units();
            units
                .values()
                .find(|u| u.is_current(&job_id) && u.state == UnitState::Polling)
                .map(|u| u.id.clone())
        };
        let Some(unit_id) = unit_id else {
            debug!(job_id = %job_id, "Ignoring event for a job no unit is polling");
            return;
        };

        match event {
            PollEvent::Progress { percent, .. } => {
                let mut units = self.lock_units();
                if let Some(unit) = units.get_mut(&unit_id) {
                    unit.progress_percent = unit.progress_percent.max(percent);
                }
                drop(units);
                UnitLogger::new(unit_id.as_str(), "poll").log_progress(percent);
            }
            PollEvent::Succeeded { uri, .. } => {
                let _ = self.complete(&unit_id, &job_id, uri).await;
            }
            PollEvent::Failed { failure, .. } => {
                let _ = self.fail(&unit_id, &job_id, failure);
            }
            PollEvent::Cancelled { .. } => {}
        }
    }

    /// Resolve the result of a succeeded job and mark the unit ready.
    async fn complete(&self, unit_id: &UnitId, job_id: &JobId, uri: String) -> EngineResult<()> {
        let logger = UnitLogger::new(unit_id.as_str(), "resolve");
        let resolved = self.resolver.resolve(&uri, &unit_id.file_name()).await;

        let mut units = self.lock_units();
        let Some(unit) = units.get_mut(unit_id).filter(|u| u.is_current(job_id)) else {
            // Halted or re-triggered while the asset was being fetched.
            if let Ok(AssetRef::Ephemeral { id }) = &resolved {
                self.resolver.blobs().revoke(id);
            }
            return Ok(());
        };

        unit.state = UnitState::Ready;
        unit.generating = false;
        unit.progress_percent = 100;
        unit.error = None;

        match resolved {
            Ok(asset) => {
                logger.log_completion(&asset.playback_url());
                unit.result = Some(asset);
                drop(units);
                self.notify(Notification::success(format!("Video for {unit_id} is ready")));
                Ok(())
            }
            Err(e) => {
                // Keep the provider URI so resolution can be retried.
                logger.log_error(&e.to_string());
                unit.result = Some(AssetRef::remote(uri));
                drop(units);
                self.notify(
                    Notification::error(format!("Video for {unit_id} was generated but could not be saved: {e}"))
                        .with_context(RESOLVE_CONTEXT),
                );
                Err(EngineError::Storage(e))
            }
        }
    }

    /// Apply a job failure to its unit and return the matching error.
    fn fail(&self, unit_id: &UnitId, job_id: &JobId, failure: JobFailure) -> EngineError {
        let logger = UnitLogger::new(unit_id.as_str(), "generate");
        logger.log_error(&failure.to_string());

        match self.classifier.classify(&failure) {
            ErrorClass::InvalidCredential => {
                self.credential.invalidate();
                self.halt_all();
                self.notify(
                    Notification::error("Your API key is invalid or was not found. Please provide a valid key.")
                        .with_context(failure.context.clone()),
                );
                EngineError::CredentialInvalid(failure.message)
            }
            ErrorClass::QuotaExceeded => {
                self.halt_all();
                self.notify(
                    Notification::error(
                        "You've exceeded your API quota. Please check billing or try again later.",
                    )
                    .with_context(failure.context.clone()),
                );
                EngineError::QuotaExceeded(failure.message)
            }
            ErrorClass::Transient => {
                {
                    let mut units = self.lock_units();
                    if let Some(unit) = units.get_mut(unit_id).filter(|u| u.is_current(job_id)) {
                        unit.state = UnitState::Failed;
                        unit.generating = false;
                        unit.progress_percent = 0;
                        unit.result = None;
                        unit.error = Some(failure.message.clone());
                    }
                }
                self.notify(
                    Notification::error(format!("Generation failed for {unit_id}: {}", failure.message))
                        .with_context(failure.context.clone()),
                );
                match failure.kind {
                    FailureKind::Timeout => EngineError::Timeout(failure.to_string()),
                    FailureKind::Transport => EngineError::Transport(failure.to_string()),
                    _ => EngineError::GenerationFailed(failure.to_string()),
                }
            }
        }
    }

    /// Stop every job. In-flight units go back to `NotStarted`; ready units
    /// keep their result.
    pub fn halt_all(&self) {
        let cleared = self.poller.clear();
        let mut units = self.lock_units();
        for unit in units.values_mut() {
            if unit.state.is_in_flight() {
                unit.state = UnitState::NotStarted;
                if let Some(job_id) = unit.job_id.take() {
                    self.poller.forget(&job_id);
                }
                unit.attempt += 1;
            }
            unit.generating = false;
            unit.progress_percent = 0;
        }
        info!(cancelled = cleared.len(), units = units.len(), "Halted all generation");
    }

    /// Resolve again a ready unit whose asset is still only at the provider.
    pub async fn retry_resolution(&self, unit_id: &UnitId) -> EngineResult<AssetRef> {
        let uri = self
            .unit(unit_id)
            .filter(|u| u.state == UnitState::Ready)
            .and_then(|u| u.result)
            .and_then(|r| r.remote_uri().map(str::to_string))
            .ok_or_else(|| EngineError::precondition_failed(format!("{unit_id} has nothing to resolve")))?;

        match self.resolver.resolve(&uri, &unit_id.file_name()).await {
            Ok(asset) => {
                {
                    let mut units = self.lock_units();
                    if let Some(unit) = units.get_mut(unit_id).filter(|u| u.state == UnitState::Ready) {
                        unit.result = Some(asset.clone());
                    }
                }
                self.notify(Notification::success(format!("Video for {unit_id} saved")));
                Ok(asset)
            }
            Err(e) => {
                self.notify(
                    Notification::error(format!("Could not save the video for {unit_id}: {e}"))
                        .with_context(RESOLVE_CONTEXT),
                );
                Err(EngineError::Storage(e))
            }
        }
    }

    /// Merge the results of `unit_ids`, in that order.
    pub async fn merge_units(&self, unit_ids: &[UnitId], sink: LogSink) -> EngineResult<MergeOutput> {
        let inputs: Vec<MergeInput> = {
            let units = self.lock_units();
            unit_ids
                .iter()
                .map(|id| MergeInput::new(id.as_str(), units.get(id).and_then(|u| u.result.clone())))
                .collect()
        };

        let mut request = MergeRequest::new(inputs, PathBuf::new());
        if let Err(e) = request.materialized_assets() {
            self.notify(Notification::info(format!("Cannot merge yet: {e}")).with_context(MERGE_CONTEXT));
            return Err(e.into());
        }

        if self.merger.has_native_executor() {
            request.output_path = match self.merge_destination().await? {
                Some(path) => path,
                None => {
                    self.notify(Notification::info("Merge cancelled").with_context(MERGE_CONTEXT));
                    return Err(EngineError::UserCancelled);
                }
            };
        }

        match self.merger.merge(&request, sink).await {
            Ok(output) => {
                self.notify(Notification::success(format!(
                    "Merged {} videos: {}",
                    unit_ids.len(),
                    output.playback_url()
                )));
                Ok(output)
            }
            Err(e) => {
                self.notify(Notification::error(format!("Merge failed: {e}")).with_context(MERGE_CONTEXT));
                Err(e)
            }
        }
    }

    /// Ask the saver where the merge goes. `None` means the user cancelled.
    async fn merge_destination(&self) -> EngineResult<Option<PathBuf>> {
        let Some(saver) = self.resolver.saver() else {
            return Ok(Some(self.config.output_dir.join(MERGE_DEFAULT_NAME)));
        };
        match saver.choose_destination(MERGE_TITLE, MERGE_DEFAULT_NAME).await? {
            SaveChoice::Path(path) => Ok(Some(path)),
            SaveChoice::Cancelled => Ok(None),
        }
    }
}
