//! Daily roll-up and the standalone daily analytics runner.
//!
//! One `daily_metrics` row per (profile, local date). Within the day the row
//! is updated in place: `open` values are written once at insert and never
//! touched again; `close` and `delta` track the latest run. After the date
//! rolls over the row is frozen — the update path carries a
//! `metric_date = today` predicate and cannot reach it.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use gramtrack_db::{
    DailyCloseUpdate, DailyMetricRow, DbError, NewDailyMetric, ReelMetricRow, SnapshotRow,
};
use sqlx::PgPool;

use crate::reels::ReelTotals;

/// Step 10 of the pipeline: update today's row, or insert it with the right
/// `open` seed.
///
/// `open` seeding for a fresh row:
/// - first tracking of the session → `open = close = current` (a baseline
///   contributes zero growth);
/// - otherwise the latest earlier row's `close` (yesterday's close when
///   tracking daily, the last known close across a gap).
pub(crate) async fn apply_daily_rollup(
    pool: &PgPool,
    profile_id: i64,
    current: &SnapshotRow,
    totals: &ReelTotals,
    today: NaiveDate,
    first_in_session: bool,
) -> Result<DailyMetricRow, DbError> {
    let update = DailyCloseUpdate {
        followers_close: current.followers,
        following_close: current.following,
        media_close: current.media_count,
        reel_close: current.reel_count,
        views_delta: totals.views,
        likes_delta: totals.likes,
        comments_delta: totals.comments,
    };

    match gramtrack_db::update_daily_metric_for_today(pool, profile_id, today, &update).await {
        Ok(row) => Ok(row),
        Err(DbError::NotFound) => {
            insert_daily_row(pool, profile_id, current, totals, today, first_in_session).await
        }
        Err(e) => Err(e),
    }
}

async fn insert_daily_row(
    pool: &PgPool,
    profile_id: i64,
    current: &SnapshotRow,
    totals: &ReelTotals,
    today: NaiveDate,
    first_in_session: bool,
) -> Result<DailyMetricRow, DbError> {
    let previous = if first_in_session {
        None
    } else {
        gramtrack_db::get_previous_daily_metric(pool, profile_id, today).await?
    };

    let (followers_open, following_open, media_open, reel_open) = match &previous {
        Some(prev) => (
            prev.followers_close,
            prev.following_close,
            prev.media_close,
            prev.reel_close,
        ),
        None => (
            current.followers,
            current.following,
            current.media_count,
            current.reel_count,
        ),
    };

    let metric = NewDailyMetric {
        profile_id,
        metric_date: today,
        followers_open,
        followers_close: current.followers,
        following_open,
        following_close: current.following,
        media_open,
        media_close: current.media_count,
        reel_open,
        reel_close: current.reel_count,
        views_delta: totals.views,
        likes_delta: totals.likes,
        comments_delta: totals.comments,
    };

    match gramtrack_db::insert_daily_metric(pool, &metric).await {
        Ok(row) => Ok(row),
        // A concurrent writer created today's row between our update attempt
        // and this insert; fall back to the update path.
        Err(e) if e.is_conflict() => {
            gramtrack_db::update_daily_metric_for_today(
                pool,
                profile_id,
                today,
                &DailyCloseUpdate {
                    followers_close: current.followers,
                    following_close: current.following,
                    media_close: current.media_count,
                    reel_close: current.reel_count,
                    views_delta: totals.views,
                    likes_delta: totals.likes,
                    comments_delta: totals.comments,
                },
            )
            .await
        }
        Err(e) => Err(e),
    }
}

/// The standalone daily analytics runner: walk all profiles and refresh
/// today's row from the raw snapshot and reel-metric history. Independent of
/// any single tracking job and safe to run repeatedly — it obeys the same
/// today-only update rule.
///
/// Returns the number of profiles whose row was materialized or refreshed.
///
/// # Errors
///
/// Returns [`DbError`] only when the profile listing itself fails;
/// per-profile failures are logged and skipped.
pub async fn refresh_daily_metrics(pool: &PgPool, tz: Tz) -> Result<usize, DbError> {
    let profiles = gramtrack_db::list_profiles(pool).await?;
    let today = Utc::now().with_timezone(&tz).date_naive();
    let mut refreshed = 0usize;

    for profile in &profiles {
        match refresh_profile_daily(pool, profile.id, tz, today).await {
            Ok(true) => refreshed += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    profile_id = profile.id,
                    error = %e,
                    "daily analytics refresh failed for profile"
                );
            }
        }
    }

    tracing::info!(refreshed, total = profiles.len(), "daily analytics run complete");
    Ok(refreshed)
}

async fn refresh_profile_daily(
    pool: &PgPool,
    profile_id: i64,
    tz: Tz,
    today: NaiveDate,
) -> Result<bool, DbError> {
    let recent = gramtrack_db::get_recent_snapshots(pool, profile_id, 1).await?;
    let Some(latest) = recent.first() else {
        // Never tracked; nothing to materialize.
        return Ok(false);
    };

    let day_start = start_of_day_utc(today, tz);
    let metrics = gramtrack_db::list_reel_metrics_since(pool, profile_id, day_start).await?;
    let totals = aggregate_positive_growth(&metrics);

    apply_daily_rollup(pool, profile_id, latest, &totals, today, false).await?;
    Ok(true)
}

/// UTC instant of local midnight for `date` in `tz`. DST gaps resolve to the
/// earliest valid instant.
fn start_of_day_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    tz.from_local_datetime(&midnight)
        .earliest()
        .map_or_else(|| Utc.from_utc_datetime(&midnight), |dt| dt.with_timezone(&Utc))
}

/// Sum positive per-reel growth across an ordered metrics history. The first
/// row seen for a reel is its baseline and contributes nothing; shrinkage
/// between consecutive rows is clamped to zero.
fn aggregate_positive_growth(metrics: &[ReelMetricRow]) -> ReelTotals {
    let mut last: HashMap<i64, (i64, i64, i64)> = HashMap::new();
    let mut totals = ReelTotals::default();

    for row in metrics {
        if let Some((views, likes, comments)) = last.get(&row.reel_id) {
            totals.views += (row.view_count - views).max(0);
            totals.likes += (row.like_count - likes).max(0);
            totals.comments += (row.comment_count - comments).max(0);
        }
        last.insert(row.reel_id, (row.view_count, row.like_count, row.comment_count));
    }
    totals
}
