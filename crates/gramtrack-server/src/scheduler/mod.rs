//! Background cron scheduler.
//!
//! Registers the daily tick (enqueue a non-immediate job for every tracked
//! profile, then refresh the materialized daily metrics) and the optional
//! refresh tick. Ticks only call `Queue::add` — they never wait for job
//! completion; the queue's global spacing paces the actual scraping.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gramtrack_core::{AppConfig, Platform};
use gramtrack_db::DbError;
use gramtrack_engine::{JobTarget, TrackQueue};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

/// Handle onto the running scheduler, kept in the app state for the
/// schedule diagnostic endpoint. Dropping the underlying [`JobScheduler`]
/// shuts down all jobs, so the state must live for the process lifetime.
#[derive(Clone)]
pub struct SchedulerHandle {
    scheduler: JobScheduler,
    daily_job: Uuid,
    refresh_job: Option<Uuid>,
}

impl SchedulerHandle {
    /// Next firing times of (daily, refresh), when known.
    pub async fn next_fire_times(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let mut scheduler = self.scheduler.clone();
        let daily = scheduler
            .next_tick_for_job(self.daily_job)
            .await
            .ok()
            .flatten();
        let refresh = match self.refresh_job {
            Some(id) => scheduler.next_tick_for_job(id).await.ok().flatten(),
            None => None,
        };
        (daily, refresh)
    }
}

/// Builds and starts the scheduler in the configured time zone.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, a
/// cron expression does not parse, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    queue: Arc<TrackQueue>,
    config: &AppConfig,
) -> Result<SchedulerHandle, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let daily_job =
        register_daily_job(&scheduler, pool.clone(), Arc::clone(&queue), config).await?;
    let refresh_job = match &config.refresh_cron {
        Some(cron) => {
            Some(register_refresh_job(&scheduler, pool, queue, cron, config.timezone).await?)
        }
        None => {
            tracing::info!("refresh tick disabled by configuration");
            None
        }
    };

    scheduler.start().await?;

    let handle = SchedulerHandle {
        scheduler,
        daily_job,
        refresh_job,
    };
    let (next_daily, next_refresh) = handle.next_fire_times().await;
    tracing::info!(
        timezone = %config.timezone,
        daily_cron = %config.daily_cron,
        ?next_daily,
        ?next_refresh,
        "scheduler started"
    );
    Ok(handle)
}

/// The daily tick: enqueue every profile, then materialize today's daily
/// metrics from history.
async fn register_daily_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    queue: Arc<TrackQueue>,
    config: &AppConfig,
) -> Result<Uuid, JobSchedulerError> {
    let pool = Arc::new(pool);
    let timezone = config.timezone;

    let job = Job::new_async_tz(config.daily_cron.as_str(), timezone, move |uuid, lock| {
        let pool = Arc::clone(&pool);
        let queue = Arc::clone(&queue);

        Box::pin(async move {
            tracing::info!("scheduler: daily tick started");
            match enqueue_all_profiles(&pool, &queue).await {
                Ok(enqueued) => tracing::info!(enqueued, "scheduler: daily tick enqueued jobs"),
                Err(e) => tracing::error!(error = %e, "scheduler: daily tick failed to enqueue"),
            }
            if let Err(e) = gramtrack_engine::refresh_daily_metrics(&pool, timezone).await {
                tracing::error!(error = %e, "scheduler: daily analytics refresh failed");
            }
            log_next_fire("daily", uuid, lock).await;
        })
    })?;

    scheduler.add(job).await
}

/// The optional refresh tick: enqueue-all only.
async fn register_refresh_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    queue: Arc<TrackQueue>,
    cron: &str,
    timezone: chrono_tz::Tz,
) -> Result<Uuid, JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async_tz(cron, timezone, move |uuid, lock| {
        let pool = Arc::clone(&pool);
        let queue = Arc::clone(&queue);

        Box::pin(async move {
            tracing::info!("scheduler: refresh tick started");
            match enqueue_all_profiles(&pool, &queue).await {
                Ok(enqueued) => tracing::info!(enqueued, "scheduler: refresh tick enqueued jobs"),
                Err(e) => tracing::error!(error = %e, "scheduler: refresh tick failed to enqueue"),
            }
            log_next_fire("refresh", uuid, lock).await;
        })
    })?;

    scheduler.add(job).await
}

async fn log_next_fire(tick: &'static str, uuid: Uuid, mut scheduler: JobScheduler) {
    match scheduler.next_tick_for_job(uuid).await {
        Ok(Some(next)) => tracing::info!(tick, %next, "scheduler: next firing time"),
        Ok(None) => tracing::warn!(tick, "scheduler: no further firings planned"),
        Err(e) => tracing::warn!(tick, error = %e, "scheduler: next firing time unknown"),
    }
}

/// Enqueue a non-immediate job for every tracked profile. Shared by the
/// cron ticks and the manual `/cron/trigger` endpoint. Jobs carry the
/// profile's owning user so the pipeline resolves the same row; the
/// tracking id is deliberately absent — a scheduled refresh must not reset
/// anyone's session.
pub async fn enqueue_all_profiles(
    pool: &PgPool,
    queue: &Arc<TrackQueue>,
) -> Result<usize, DbError> {
    let profiles = gramtrack_db::list_profiles(pool).await?;
    let mut enqueued = 0usize;

    for profile in profiles {
        let platform = match profile.platform.parse::<Platform>() {
            Ok(platform) => platform,
            Err(e) => {
                tracing::warn!(
                    profile_id = profile.id,
                    error = %e,
                    "skipping profile with unknown platform tag"
                );
                continue;
            }
        };
        // The handle is dropped: scheduled runs have no caller to settle.
        let _ = queue.add(
            JobTarget {
                platform,
                username: profile.username,
            },
            false,
            None,
            profile.user_id,
        );
        enqueued += 1;
    }
    Ok(enqueued)
}
