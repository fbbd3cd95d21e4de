//! Single-consumer tracking job queue with global spacing and backoff.
//!
//! At most one job is in flight at any moment. Consecutive job starts are
//! separated by at least the effective spacing: the configured base spacing,
//! doubled per consecutive rate-limited outcome and clamped to the maximum
//! backoff. Rate-limited jobs are transparently re-queued — their futures
//! stay pending until a terminal outcome. The queue is process-local and not
//! persisted; the scheduler re-enqueues lost work on its next tick.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gramtrack_core::{AppConfig, Platform};
use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;

use crate::{TrackError, TrackOutcome};

/// Idle time after which the consecutive rate-limit counter is forgiven
/// before the next backoff computation.
const RATE_LIMIT_COUNTER_RESET: Duration = Duration::from_secs(60 * 60);

/// Result delivered to every waiter of a job. Errors are shared because one
/// failure may settle several deduplicated callers.
pub type JobResult = Result<TrackOutcome, Arc<TrackError>>;

/// The (platform, username) pair a job scrapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobTarget {
    pub platform: Platform,
    pub username: String,
}

impl std::fmt::Display for JobTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.platform, self.username)
    }
}

/// Everything the pipeline needs to run one tracking job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub target: JobTarget,
    pub immediate: bool,
    /// Caller-supplied session identifier; `Some` opens or reassigns a
    /// tracking session.
    pub tracking_id: Option<String>,
    pub user_id: Option<String>,
}

/// Awaitable handle returned by [`TrackQueue::add`]. Deduplicated callers
/// hold separate handles onto the same underlying job.
pub struct JobHandle {
    rx: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    /// Wait for the job's terminal outcome. Pending across transparent
    /// rate-limit retries.
    pub async fn wait(self) -> JobResult {
        match self.rx.await {
            Ok(result) => result,
            // The queue was dropped with the job unresolved (process
            // shutdown); surface as fatal rather than hanging.
            Err(_) => Err(Arc::new(TrackError::Fatal(
                "queue dropped before job completion".to_string(),
            ))),
        }
    }
}

/// Diagnostic snapshot of the queue for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub size: usize,
    pub in_flight: Option<String>,
    pub last_dispatch_at: Option<DateTime<Utc>>,
    pub base_spacing_ms: u64,
    pub effective_spacing_ms: u64,
    pub consecutive_rate_limit_errors: u32,
    pub pending: Vec<String>,
}

struct QueuedJob {
    spec: JobSpec,
    added_at: DateTime<Utc>,
    running: bool,
    waiters: Vec<oneshot::Sender<JobResult>>,
}

struct QueueInner {
    jobs: Vec<QueuedJob>,
    in_flight: Option<JobTarget>,
    last_dispatch: Option<Instant>,
    last_dispatch_at: Option<DateTime<Utc>>,
    consecutive_rate_limit_errors: u32,
    last_rate_limit: Option<Instant>,
}

/// The job runner injected at construction. Production wires this to
/// [`crate::Tracker::track`]; tests drive scripted outcomes.
pub type JobRunner = Box<
    dyn Fn(JobSpec) -> Pin<Box<dyn Future<Output = Result<TrackOutcome, TrackError>> + Send>>
        + Send
        + Sync,
>;

pub struct TrackQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    runner: JobRunner,
    base_spacing: Duration,
    max_backoff: Duration,
}

impl TrackQueue {
    /// Build the queue and spawn its dispatcher task. The dispatcher runs
    /// for the life of the process.
    #[must_use]
    pub fn start(config: &AppConfig, runner: JobRunner) -> Arc<Self> {
        let queue = Arc::new(Self {
            inner: Mutex::new(QueueInner {
                jobs: Vec::new(),
                in_flight: None,
                last_dispatch: None,
                last_dispatch_at: None,
                consecutive_rate_limit_errors: 0,
                last_rate_limit: None,
            }),
            notify: Notify::new(),
            runner,
            base_spacing: Duration::from_millis(config.min_time_between_jobs_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        });
        tokio::spawn(Arc::clone(&queue).run_dispatcher());
        queue
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Enqueue a job, deduplicating on target: while a non-completed job for
    /// the same target exists, callers share it and every handle settles
    /// from the same outcome.
    pub fn add(
        &self,
        target: JobTarget,
        immediate: bool,
        tracking_id: Option<String>,
        user_id: Option<String>,
    ) -> JobHandle {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.lock();
            if let Some(job) = inner.jobs.iter_mut().find(|j| j.spec.target == target) {
                job.waiters.push(tx);
            } else {
                inner.jobs.push(QueuedJob {
                    spec: JobSpec {
                        target,
                        immediate,
                        tracking_id,
                        user_id,
                    },
                    added_at: Utc::now(),
                    running: false,
                    waiters: vec![tx],
                });
            }
        }
        // Kick the dispatcher; spacing is still enforced on wake-up.
        self.notify.notify_one();
        JobHandle { rx }
    }

    /// Manual dispatcher kick (the `/queue/process` endpoint). Spacing still
    /// applies.
    pub fn process_now(&self) {
        self.notify.notify_one();
    }

    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let mut inner = self.lock();
        let effective = self.effective_spacing(&mut inner);
        QueueStatus {
            size: inner.jobs.len(),
            in_flight: inner.in_flight.as_ref().map(ToString::to_string),
            last_dispatch_at: inner.last_dispatch_at,
            base_spacing_ms: u64::try_from(self.base_spacing.as_millis()).unwrap_or(u64::MAX),
            effective_spacing_ms: u64::try_from(effective.as_millis()).unwrap_or(u64::MAX),
            consecutive_rate_limit_errors: inner.consecutive_rate_limit_errors,
            pending: inner
                .jobs
                .iter()
                .filter(|j| !j.running)
                .map(|j| j.spec.target.to_string())
                .collect(),
        }
    }

    async fn run_dispatcher(self: Arc<Self>) {
        enum Step {
            Idle,
            Wait(Duration),
            Run(JobSpec),
        }

        loop {
            let step = {
                let mut inner = self.lock();
                if inner.in_flight.is_some() || inner.jobs.iter().all(|j| j.running) {
                    Step::Idle
                } else {
                    let spacing = self.effective_spacing(&mut inner);
                    let elapsed = inner.last_dispatch.map(|t| t.elapsed());
                    match elapsed {
                        Some(done) if done < spacing => Step::Wait(spacing - done),
                        _ => match take_next_job(&mut inner) {
                            Some(spec) => {
                                inner.in_flight = Some(spec.target.clone());
                                inner.last_dispatch = Some(Instant::now());
                                inner.last_dispatch_at = Some(Utc::now());
                                Step::Run(spec)
                            }
                            None => Step::Idle,
                        },
                    }
                }
            };

            match step {
                Step::Idle => self.notify.notified().await,
                Step::Wait(deficit) => {
                    // A notify during the wait re-evaluates; spacing is
                    // recomputed, never bypassed.
                    tokio::select! {
                        () = tokio::time::sleep(deficit) => {}
                        () = self.notify.notified() => {}
                    }
                }
                Step::Run(spec) => {
                    tracing::info!(target = %spec.target, "dispatching tracking job");
                    let result = (self.runner)(spec.clone()).await;
                    self.complete(&spec.target, result);
                }
            }
        }
    }

    /// Settle one finished run. Rate limits re-queue the job with its
    /// waiters intact; everything else settles and removes it.
    fn complete(&self, target: &JobTarget, result: Result<TrackOutcome, TrackError>) {
        let mut inner = self.lock();
        inner.in_flight = None;

        match result {
            Err(err) if err.is_rate_limited() => {
                inner.consecutive_rate_limit_errors += 1;
                inner.last_rate_limit = Some(Instant::now());
                tracing::warn!(
                    target = %target,
                    consecutive = inner.consecutive_rate_limit_errors,
                    retry_after_secs = err.retry_after_secs(),
                    "rate limited — re-queueing with backoff"
                );
                if let Some(job) = inner.jobs.iter_mut().find(|j| &j.spec.target == target) {
                    job.running = false;
                }
            }
            result => {
                if result.is_ok() {
                    inner.consecutive_rate_limit_errors = 0;
                    inner.last_rate_limit = None;
                }
                if let Some(position) = inner.jobs.iter().position(|j| &j.spec.target == target) {
                    let job = inner.jobs.swap_remove(position);
                    settle(job, result);
                }
            }
        }
        drop(inner);
        self.notify.notify_one();
    }

    /// Base spacing doubled per consecutive rate-limited outcome, clamped to
    /// the maximum backoff. A counter older than an hour is forgiven first.
    fn effective_spacing(&self, inner: &mut QueueInner) -> Duration {
        if inner.consecutive_rate_limit_errors > 0
            && inner
                .last_rate_limit
                .is_none_or(|t| t.elapsed() > RATE_LIMIT_COUNTER_RESET)
        {
            tracing::info!("an hour since the last rate limit — resetting backoff counter");
            inner.consecutive_rate_limit_errors = 0;
            inner.last_rate_limit = None;
        }

        let exponent = inner.consecutive_rate_limit_errors.min(16);
        let scaled = self
            .base_spacing
            .saturating_mul(2u32.saturating_pow(exponent));
        scaled.clamp(self.base_spacing, self.max_backoff.max(self.base_spacing))
    }
}

/// Pick the next runnable job: immediate before non-immediate, FIFO by
/// `added_at` within each class.
fn take_next_job(inner: &mut QueueInner) -> Option<JobSpec> {
    let (position, _) = inner
        .jobs
        .iter()
        .enumerate()
        .filter(|(_, j)| !j.running)
        .min_by_key(|(_, j)| (!j.spec.immediate, j.added_at))?;
    inner.jobs[position].running = true;
    Some(inner.jobs[position].spec.clone())
}

fn settle(job: QueuedJob, result: Result<TrackOutcome, TrackError>) {
    let shared: JobResult = match result {
        Ok(outcome) => Ok(outcome),
        Err(err) => Err(Arc::new(err)),
    };
    for waiter in job.waiters {
        // A dropped receiver just means the HTTP caller went away.
        let _ = waiter.send(shared.clone());
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
