//! Long-running operation poller.
//!
//! Tracks every in-flight generation job and drives it to a terminal state
//! with periodic status queries. One shared timer serves all jobs; it starts
//! with the first registration and stops as soon as the active set is empty.
//!
//! All job state lives behind a single mutex that is never held across an
//! await point. Status queries run concurrently, at most one per job, and
//! their results are applied one at a time. A result whose registration has
//! been cancelled or replaced in the meantime is dropped.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use metrics::counter;
use reel_models::{AssetRef, JobFailure, JobId, JobState, OperationHandle, OperationOutcome, OperationStatus};
use reel_provider::{GenerationProvider, ProviderResult};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::job::{provider_failure, Job, JobSnapshot};

const POLL_CONTEXT: &str = "polling generation status";
const DEADLINE_CONTEXT: &str = "waiting for generation";

/// Change notifications emitted by the poller, once per change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    Progress { id: JobId, percent: u8 },
    Succeeded { id: JobId, uri: String },
    Failed { id: JobId, failure: JobFailure },
    Cancelled { id: JobId },
}

impl PollEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            PollEvent::Progress { id, .. }
            | PollEvent::Succeeded { id, .. }
            | PollEvent::Failed { id, .. }
            | PollEvent::Cancelled { id } => id,
        }
    }
}

#[derive(Default)]
struct PollerState {
    jobs: HashMap<JobId, Job>,
    active: BTreeSet<JobId>,
    next_epoch: u64,
    timer: Option<CancellationToken>,
}

struct Shared {
    provider: Arc<dyn GenerationProvider>,
    interval: Duration,
    state: Mutex<PollerState>,
    events: mpsc::UnboundedSender<PollEvent>,
}

/// Cheap to clone; clones drive the same job table.
#[derive(Clone)]
pub struct OperationPoller {
    shared: Arc<Shared>,
}

impl OperationPoller {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PollEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let poller = Self {
            shared: Arc::new(Shared {
                provider,
                interval,
                state: Mutex::new(PollerState::default()),
                events,
            }),
        };
        (poller, rx)
    }

    fn lock(&self) -> MutexGuard<'_, PollerState> {
        // Transitions never span a panic point, so a poisoned table is usable.
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: PollEvent) {
        // No receiver just means nobody is listening any more.
        let _ = self.shared.events.send(event);
    }

    /// Create a job in `Starting`.
    pub fn begin(&self) -> JobId {
        let id = JobId::new();
        self.lock().jobs.insert(id.clone(), Job::new(id.clone()));
        debug!(job_id = %id, "Job created");
        id
    }

    /// Attach the provider handle and start polling the job.
    ///
    /// Returns `false` if the job is unknown, already registered or no longer
    /// in `Starting`.
    pub fn register(&self, id: &JobId, handle: OperationHandle, timeout: Option<Duration>) -> bool {
        let mut state = self.lock();
        state.next_epoch += 1;
        let epoch = state.next_epoch;

        let Some(job) = state.jobs.get_mut(id) else {
            return false;
        };
        if !job.attach(handle, epoch) {
            return false;
        }

        if let Some(timeout) = timeout {
            let guard = CancellationToken::new();
            job.deadline = Some(Instant::now() + timeout);
            job.deadline_guard = Some(guard.clone());
            self.spawn_deadline(id.clone(), epoch, timeout, guard);
        }

        state.active.insert(id.clone());
        self.ensure_timer(&mut state);
        info!(job_id = %id, active = state.active.len(), "Job registered for polling");
        true
    }

    /// `Starting → Succeeded` for a provider that answered synchronously.
    pub fn complete_immediate(&self, id: &JobId, uri: impl Into<String>) -> bool {
        let uri = uri.into();
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(id) else {
            return false;
        };
        if job.state() != JobState::Starting || !job.succeed(AssetRef::remote(uri.clone())) {
            return false;
        }
        drop(state);
        counter!("reel_jobs_total", "outcome" => "succeeded").increment(1);
        self.emit(PollEvent::Succeeded { id: id.clone(), uri });
        true
    }

    /// `Starting → Failed` when the start call itself failed.
    pub fn fail_start(&self, id: &JobId, failure: JobFailure) -> bool {
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(id) else {
            return false;
        };
        if job.state() != JobState::Starting || !job.fail(failure.clone()) {
            return false;
        }
        drop(state);
        counter!("reel_jobs_total", "outcome" => "failed").increment(1);
        self.emit(PollEvent::Failed { id: id.clone(), failure });
        true
    }

    /// Stop tracking a job. Safe to call at any time; a query already in
    /// flight for it will be ignored when it returns.
    pub fn cancel(&self, id: &JobId) -> bool {
        let mut state = self.lock();
        state.active.remove(id);
        let cancelled = state.jobs.get_mut(id).map(|job| job.cancel()).unwrap_or(false);
        self.settle_timer(&mut state);
        drop(state);

        if cancelled {
            debug!(job_id = %id, "Job cancelled");
            counter!("reel_jobs_total", "outcome" => "cancelled").increment(1);
            self.emit(PollEvent::Cancelled { id: id.clone() });
        }
        cancelled
    }

    /// Cancel the job if it is still live and drop its record. Later results
    /// and deadline expiries for it are ignored.
    pub fn forget(&self, id: &JobId) -> bool {
        self.cancel(id);
        let removed = self.lock().jobs.remove(id).is_some();
        if removed {
            debug!(job_id = %id, "Job forgotten");
        }
        removed
    }

    /// Cancel every active job and return their ids.
    pub fn clear(&self) -> Vec<JobId> {
        let ids: Vec<JobId> = self.lock().active.iter().cloned().collect();
        for id in &ids {
            self.cancel(id);
        }
        if !ids.is_empty() {
            info!(count = ids.len(), "Cleared all active jobs");
        }
        ids
    }

    pub fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        self.lock().jobs.get(id).map(Job::snapshot)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Whether the shared poll timer is currently running.
    pub fn is_timer_running(&self) -> bool {
        self.lock().timer.is_some()
    }

    /// Run one polling round.
    ///
    /// Expired jobs fail first. Every other active job without an outstanding
    /// query gets one; results are applied as they arrive.
    pub async fn tick(&self) {
        let now = Instant::now();
        let mut expired = Vec::new();
        let mut due = Vec::new();
        {
            let mut state = self.lock();
            let PollerState { jobs, active, .. } = &mut *state;
            for id in active.iter() {
                let Some(job) = jobs.get_mut(id) else { continue };
                if job.deadline.is_some_and(|deadline| deadline <= now) {
                    expired.push((id.clone(), job.epoch));
                } else if !job.in_flight {
                    if let Some(handle) = job.handle().cloned() {
                        job.in_flight = true;
                        due.push((id.clone(), job.epoch, handle));
                    }
                }
            }
        }

        for (id, epoch) in expired {
            self.expire(&id, epoch);
        }
        if due.is_empty() {
            return;
        }

        let mut queries: FuturesUnordered<_> = due
            .into_iter()
            .map(|(id, epoch, handle)| {
                let provider = Arc::clone(&self.shared.provider);
                async move {
                    counter!("reel_poll_queries_total").increment(1);
                    let result = provider.status(&handle).await;
                    (id, epoch, result)
                }
            })
            .collect();

        while let Some((id, epoch, result)) = queries.next().await {
            self.apply(&id, epoch, result);
        }
    }

    fn apply(&self, id: &JobId, epoch: u64, result: ProviderResult<OperationStatus>) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            let is_active = state.active.contains(id);
            let Some(job) = state.jobs.get_mut(id) else {
                debug!(job_id = %id, "Dropping status for unknown job");
                return;
            };
            if !is_active || job.epoch != epoch {
                debug!(job_id = %id, epoch, "Dropping stale status result");
                return;
            }
            job.in_flight = false;

            let terminal = match result {
                Ok(status) => {
                    if let Some(percent) = status.progress_percent.and_then(|p| job.record_progress(p)) {
                        events.push(PollEvent::Progress { id: id.clone(), percent });
                    }
                    match status.outcome() {
                        OperationOutcome::Pending => false,
                        OperationOutcome::Succeeded { uri } => {
                            job.succeed(AssetRef::remote(uri.clone()));
                            counter!("reel_jobs_total", "outcome" => "succeeded").increment(1);
                            info!(job_id = %id, "Generation succeeded");
                            events.push(PollEvent::Succeeded { id: id.clone(), uri });
                            true
                        }
                        OperationOutcome::Failed { message } => {
                            let failure = JobFailure::provider(message, POLL_CONTEXT);
                            job.fail(failure.clone());
                            counter!("reel_jobs_total", "outcome" => "failed").increment(1);
                            warn!(job_id = %id, error = %failure, "Generation failed");
                            events.push(PollEvent::Failed { id: id.clone(), failure });
                            true
                        }
                    }
                }
                Err(e) => {
                    let failure = provider_failure(&e, POLL_CONTEXT);
                    job.fail(failure.clone());
                    counter!("reel_jobs_total", "outcome" => "failed").increment(1);
                    warn!(job_id = %id, error = %e, "Status query failed");
                    events.push(PollEvent::Failed { id: id.clone(), failure });
                    true
                }
            };

            if terminal {
                state.active.remove(id);
                self.settle_timer(&mut state);
            }
        }

        for event in events {
            self.emit(event);
        }
    }

    /// Fail a job whose deadline passed. No-op if it moved on in the meantime.
    fn expire(&self, id: &JobId, epoch: u64) {
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(id) else { return };
        if job.epoch != epoch || job.state() != JobState::Polling {
            return;
        }

        let failure = JobFailure::timeout("Video generation timed out", DEADLINE_CONTEXT);
        job.fail(failure.clone());
        state.active.remove(id);
        self.settle_timer(&mut state);
        drop(state);

        counter!("reel_jobs_total", "outcome" => "timeout").increment(1);
        warn!(job_id = %id, "Generation deadline exceeded");
        self.emit(PollEvent::Failed { id: id.clone(), failure });
    }

    fn spawn_deadline(&self, id: JobId, epoch: u64, timeout: Duration, guard: CancellationToken) {
        let poller = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = tokio::time::sleep(timeout) => poller.expire(&id, epoch),
            }
        });
    }

    fn ensure_timer(&self, state: &mut PollerState) {
        if state.timer.is_some() || state.active.is_empty() {
            return;
        }
        let token = CancellationToken::new();
        state.timer = Some(token.clone());

        let poller = self.clone();
        let period = self.shared.interval;
        debug!(interval_secs = period.as_secs(), "Poll timer started");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Poll timer stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        // Rounds run detached so one slow query never delays the
                        // next round for other jobs.
                        let round = poller.clone();
                        tokio::spawn(async move { round.tick().await });
                    }
                }
            }
        });
    }

    fn settle_timer(&self, state: &mut PollerState) {
        if state.active.is_empty() {
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
        }
    }
}
