mod daily;
mod pipeline;
mod queue;
mod reels;
mod replies;

pub use daily::refresh_daily_metrics;
pub use pipeline::Tracker;
pub use queue::{JobHandle, JobResult, JobRunner, JobSpec, JobTarget, QueueStatus, TrackQueue};

use gramtrack_db::{DbError, ProfileRow, SnapshotRow};
use gramtrack_scraper::ScraperError;
use thiserror::Error;

/// Errors surfaced by the tracking pipeline and settled into job futures.
///
/// The queue inspects [`TrackError::is_rate_limited`] to decide between
/// transparent re-queue with backoff and settling the caller's future.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error(transparent)]
    Scraper(#[from] ScraperError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("fatal tracking error: {0}")]
    Fatal(String),
}

impl TrackError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TrackError::Scraper(e) if e.is_rate_limited())
    }

    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            TrackError::Scraper(e) => e.retry_after_secs(),
            _ => None,
        }
    }
}

/// Result of one completed tracking run: the upserted profile row and the
/// snapshot written by this run.
#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub profile: ProfileRow,
    pub snapshot: SnapshotRow,
}
