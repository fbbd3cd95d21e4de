//! The per-profile tracking pipeline: scrape, snapshot, delta, reel
//! reconciliation, daily roll-up.
//!
//! Executed as the dispatched unit for one queue job. Scrape, profile
//! resolution, and the snapshot insert abort the run; every later step is
//! logged and skipped on failure — the pipeline never rolls back prior
//! writes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use gramtrack_core::{AppConfig, Platform};
use gramtrack_db::{DbError, ProfileFields, ProfileRow, SnapshotRow};
use gramtrack_scraper::{ProfileData, ScraperClient};
use sqlx::PgPool;
use uuid::Uuid;

use crate::queue::{JobRunner, JobSpec};
use crate::{daily, reels, replies, TrackError, TrackOutcome};

pub struct Tracker {
    pool: PgPool,
    scraper: Arc<ScraperClient>,
    timezone: Tz,
    media_fetch_delay: Duration,
}

impl Tracker {
    #[must_use]
    pub fn new(pool: PgPool, scraper: Arc<ScraperClient>, config: &AppConfig) -> Self {
        Self {
            pool,
            scraper,
            timezone: config.timezone,
            media_fetch_delay: Duration::from_millis(config.media_fetch_delay_ms),
        }
    }

    /// Adapt this tracker into the queue's runner shape.
    #[must_use]
    pub fn into_runner(self: Arc<Self>) -> JobRunner {
        Box::new(move |spec| {
            let tracker = Arc::clone(&self);
            Box::pin(async move { tracker.track(spec).await })
        })
    }

    /// Run the full pipeline for one job.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError`] when the scrape, the profile resolution, or
    /// the snapshot insert fails; later steps degrade to warnings.
    pub async fn track(&self, job: JobSpec) -> Result<TrackOutcome, TrackError> {
        let platform = job.target.platform;
        let username = job.target.username.clone();
        tracing::info!(target = %job.target, "tracking run started");

        // Scrape first: nothing is written for an unreachable profile.
        let data = self.scraper.fetch_profile(platform, &username).await?;

        let mut profile = self.resolve_profile(&job, &data).await?;

        // The baseline is chosen BEFORE the new snapshot is written. With a
        // caller-supplied tracking id the baseline is deliberately null:
        // session-reset semantics, every delta restarts inside the session.
        let baseline = if job.tracking_id.is_some() {
            None
        } else {
            match gramtrack_db::get_recent_snapshots(&self.pool, profile.id, 2).await {
                Ok(recent) => baseline_snapshot(&recent).cloned(),
                Err(e) => {
                    tracing::warn!(error = %e, "baseline lookup failed — treating as first run");
                    None
                }
            }
        };

        let snapshot = gramtrack_db::insert_snapshot(
            &self.pool,
            &gramtrack_db::NewSnapshot {
                profile_id: profile.id,
                followers: data.followers,
                following: data.following,
                media_count: data.media_count,
                reel_count: data.reel_count,
                biography: data.biography.clone(),
                avatar_url: data.avatar_url.clone(),
                raw: data.raw.clone(),
            },
        )
        .await?;

        if let Err(e) =
            gramtrack_db::set_last_snapshot(&self.pool, profile.id, snapshot.id).await
        {
            tracing::warn!(error = %e, "failed to advance last_snapshot pointer");
        } else {
            profile.last_snapshot_id = Some(snapshot.id);
        }

        // Zero-valued deltas are still written: a run that saw no change is
        // itself a data point.
        if let Some(base) = &baseline {
            let diffs = compute_delta(base, &snapshot);
            if let Err(e) = gramtrack_db::insert_delta(
                &self.pool,
                profile.id,
                base.id,
                snapshot.id,
                diffs.followers,
                diffs.following,
                diffs.media,
                diffs.reels,
            )
            .await
            {
                tracing::warn!(error = %e, "delta insert failed — continuing");
            }
        }

        let totals = reels::reconcile(
            &self.pool,
            &self.scraper,
            platform,
            self.media_fetch_delay,
            &profile,
            &data,
        )
        .await;

        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        let first_in_session = self.is_first_in_session(&profile, snapshot.id).await;
        if let Err(e) = daily::apply_daily_rollup(
            &self.pool,
            profile.id,
            &snapshot,
            &totals,
            today,
            first_in_session,
        )
        .await
        {
            tracing::warn!(error = %e, "daily roll-up failed — continuing");
        }

        if platform.has_replies() {
            let stored = replies::sync_replies(&self.pool, &self.scraper, &profile).await;
            tracing::debug!(stored, "reply sync finished");
        }

        tracing::info!(
            target = %job.target,
            snapshot_id = snapshot.id,
            followers = snapshot.followers,
            "tracking run complete"
        );
        Ok(TrackOutcome { profile, snapshot })
    }

    /// Resolve (or create) the profile row per the session rules:
    ///
    /// - caller-supplied tracking id → look up by tracking id; a row under
    ///   the same handle is refreshed in place. An unknown tracking id falls
    ///   back to `(handle, user)`: an existing row owned by this user is
    ///   realigned to the caller's tracking id (session reset); a row owned
    ///   by a *different* user never matches, so this `(user, handle)` pair
    ///   gets its own row.
    /// - no tracking id → update-or-create by `(handle, user)`, minting a
    ///   tracking id on create.
    async fn resolve_profile(
        &self,
        job: &JobSpec,
        data: &ProfileData,
    ) -> Result<ProfileRow, TrackError> {
        let platform = job.target.platform;
        let username = &job.target.username;
        let user_id = job.user_id.as_deref();
        let fields = profile_fields(data);

        if let Some(tracking_id) = &job.tracking_id {
            if let Some(existing) =
                gramtrack_db::get_profile_by_tracking_id(&self.pool, tracking_id).await?
            {
                if existing.platform == platform.as_str() && existing.username == *username {
                    return Ok(
                        gramtrack_db::update_profile_meta(&self.pool, existing.id, fields).await?
                    );
                }
                // The caller is reusing a session id against a different
                // handle; there is no sound row to attach it to.
                return Err(TrackError::Db(DbError::Conflict {
                    context: "profiles.tracking_id",
                }));
            }

            match gramtrack_db::get_profile_by_handle(&self.pool, platform, username, user_id)
                .await?
            {
                Some(existing) => {
                    gramtrack_db::update_profile_meta(&self.pool, existing.id, fields).await?;
                    // Align the tracking id and bump the session boundary —
                    // updated_at is authoritative for session-scoped reads.
                    Ok(gramtrack_db::open_session(&self.pool, existing.id, tracking_id).await?)
                }
                None => {
                    self.insert_resolving_race(platform, username, fields, tracking_id, user_id)
                        .await
                }
            }
        } else {
            match gramtrack_db::get_profile_by_handle(&self.pool, platform, username, user_id)
                .await?
            {
                Some(existing) => {
                    Ok(gramtrack_db::update_profile_meta(&self.pool, existing.id, fields).await?)
                }
                None => {
                    let minted = Uuid::new_v4().to_string();
                    self.insert_resolving_race(platform, username, fields, &minted, user_id)
                        .await
                }
            }
        }
    }

    /// Insert a profile, falling back to re-read-and-update when a
    /// concurrent writer won the uniqueness race.
    async fn insert_resolving_race(
        &self,
        platform: Platform,
        username: &str,
        fields: ProfileFields<'_>,
        tracking_id: &str,
        user_id: Option<&str>,
    ) -> Result<ProfileRow, TrackError> {
        match gramtrack_db::insert_profile(
            &self.pool,
            platform,
            username,
            fields,
            tracking_id,
            user_id,
        )
        .await
        {
            Ok(row) => Ok(row),
            Err(e) if e.is_conflict() => {
                match gramtrack_db::get_profile_by_handle(&self.pool, platform, username, user_id)
                    .await?
                {
                    Some(existing) => Ok(gramtrack_db::update_profile_meta(
                        &self.pool,
                        existing.id,
                        fields,
                    )
                    .await?),
                    None => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether this run wrote the first snapshot of the current session.
    /// Decides the daily-metric baseline when no row exists for today.
    async fn is_first_in_session(&self, profile: &ProfileRow, new_snapshot_id: i64) -> bool {
        match gramtrack_db::get_snapshots_since(&self.pool, profile.id, profile.session_start())
            .await
        {
            Ok(session_snapshots) => session_snapshots
                .iter()
                .all(|s| s.id == new_snapshot_id),
            Err(e) => {
                tracing::warn!(error = %e, "session snapshot count failed — assuming first run");
                true
            }
        }
    }
}

/// Per-metric arithmetic differences between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeltaDiffs {
    pub followers: i64,
    pub following: i64,
    pub media: i64,
    pub reels: i64,
}

pub(crate) fn compute_delta(base: &SnapshotRow, compare: &SnapshotRow) -> DeltaDiffs {
    DeltaDiffs {
        followers: compare.followers - base.followers,
        following: compare.following - base.following,
        media: compare.media_count - base.media_count,
        reels: compare.reel_count - base.reel_count,
    }
}

/// The comparison baseline among the snapshots that existed BEFORE this
/// run's insert, newest first: the second-most-recent when two exist (the
/// most recent is the one the just-written snapshot would otherwise collapse
/// against), the sole prior when only one exists, none on a first run.
pub(crate) fn baseline_snapshot(recent: &[SnapshotRow]) -> Option<&SnapshotRow> {
    recent.get(1).or_else(|| recent.first())
}

fn profile_fields(data: &ProfileData) -> ProfileFields<'_> {
    ProfileFields {
        account_id: data.account_id.as_deref(),
        display_name: data.display_name.as_deref(),
        avatar_url: data.avatar_url.as_deref(),
        biography: data.biography.as_deref(),
        external_url: data.external_url.as_deref(),
        followers: data.followers,
        following: data.following,
        media_count: data.media_count,
        reel_count: data.reel_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: i64, followers: i64, media_count: i64) -> SnapshotRow {
        SnapshotRow {
            id,
            profile_id: 1,
            followers,
            following: 50,
            media_count,
            reel_count: 3,
            biography: None,
            avatar_url: None,
            raw: serde_json::json!({}),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn delta_between_identical_snapshots_is_zero() {
        let base = snapshot(1, 100, 10);
        let compare = snapshot(2, 100, 10);
        let diffs = compute_delta(&base, &compare);
        assert_eq!(
            diffs,
            DeltaDiffs {
                followers: 0,
                following: 0,
                media: 0,
                reels: 0
            }
        );
    }

    #[test]
    fn delta_captures_growth_and_shrinkage() {
        let base = snapshot(1, 100, 10);
        let compare = snapshot(2, 107, 9);
        let diffs = compute_delta(&base, &compare);
        assert_eq!(diffs.followers, 7);
        assert_eq!(diffs.media, -1);
    }

    #[test]
    fn no_prior_snapshots_means_no_baseline() {
        assert!(baseline_snapshot(&[]).is_none());
    }

    #[test]
    fn a_single_prior_snapshot_is_the_baseline() {
        let recent = vec![snapshot(1, 100, 10)];
        assert_eq!(baseline_snapshot(&recent).map(|s| s.id), Some(1));
    }

    #[test]
    fn with_two_priors_the_older_one_is_the_baseline() {
        // Newest first, as returned by the recent-snapshots query: the
        // second entry is the snapshot before the latest stored one.
        let recent = vec![snapshot(2, 100, 10), snapshot(1, 93, 10)];
        assert_eq!(baseline_snapshot(&recent).map(|s| s.id), Some(1));
    }
}
