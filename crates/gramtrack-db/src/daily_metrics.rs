//! Database operations for the `daily_metrics` table.
//!
//! One row per (profile, calendar date). Today's row may be updated
//! repeatedly within the day; rows for past dates are never modified after
//! the date rolls over. The update statement therefore always carries a
//! `metric_date = $today` predicate — there is no code path that can touch
//! a historical row.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `daily_metrics` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyMetricRow {
    pub id: i64,
    pub profile_id: i64,
    pub metric_date: NaiveDate,
    pub followers_open: i64,
    pub followers_close: i64,
    pub followers_delta: i64,
    pub following_open: i64,
    pub following_close: i64,
    pub following_delta: i64,
    pub media_open: i64,
    pub media_close: i64,
    pub media_delta: i64,
    pub reel_open: i64,
    pub reel_close: i64,
    pub reel_delta: i64,
    pub views_delta: i64,
    pub likes_delta: i64,
    pub comments_delta: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a fresh daily-metric insert.
#[derive(Debug, Clone, Copy)]
pub struct NewDailyMetric {
    pub profile_id: i64,
    pub metric_date: NaiveDate,
    pub followers_open: i64,
    pub followers_close: i64,
    pub following_open: i64,
    pub following_close: i64,
    pub media_open: i64,
    pub media_close: i64,
    pub reel_open: i64,
    pub reel_close: i64,
    pub views_delta: i64,
    pub likes_delta: i64,
    pub comments_delta: i64,
}

/// Close-of-day fields for the intraday update path. `open` values are
/// deliberately absent: they are written once at insert and never
/// overwritten.
#[derive(Debug, Clone, Copy)]
pub struct DailyCloseUpdate {
    pub followers_close: i64,
    pub following_close: i64,
    pub media_close: i64,
    pub reel_close: i64,
    pub views_delta: i64,
    pub likes_delta: i64,
    pub comments_delta: i64,
}

const DAILY_COLUMNS: &str = "id, profile_id, metric_date, \
     followers_open, followers_close, followers_delta, \
     following_open, following_close, following_delta, \
     media_open, media_close, media_delta, \
     reel_open, reel_close, reel_delta, \
     views_delta, likes_delta, comments_delta, created_at, updated_at";

/// Fetch the daily metric for one (profile, date), if present.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_daily_metric(
    pool: &PgPool,
    profile_id: i64,
    date: NaiveDate,
) -> Result<Option<DailyMetricRow>, DbError> {
    let row = sqlx::query_as::<_, DailyMetricRow>(&format!(
        "SELECT {DAILY_COLUMNS} FROM daily_metrics \
         WHERE profile_id = $1 AND metric_date = $2"
    ))
    .bind(profile_id)
    .bind(date)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Insert a fresh daily-metric row. Delta columns are computed in SQL as
/// `close - open` so the stored triple stays internally consistent.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] when a row for `(profile, date)` already
/// exists — the caller re-reads and takes the update path —
/// or [`DbError::Sqlx`] on any other failure.
pub async fn insert_daily_metric(
    pool: &PgPool,
    metric: &NewDailyMetric,
) -> Result<DailyMetricRow, DbError> {
    sqlx::query_as::<_, DailyMetricRow>(&format!(
        "INSERT INTO daily_metrics \
             (profile_id, metric_date, \
              followers_open, followers_close, followers_delta, \
              following_open, following_close, following_delta, \
              media_open, media_close, media_delta, \
              reel_open, reel_close, reel_delta, \
              views_delta, likes_delta, comments_delta) \
         VALUES ($1, $2, \
                 $3, $4, $4 - $3, \
                 $5, $6, $6 - $5, \
                 $7, $8, $8 - $7, \
                 $9, $10, $10 - $9, \
                 $11, $12, $13) \
         RETURNING {DAILY_COLUMNS}"
    ))
    .bind(metric.profile_id)
    .bind(metric.metric_date)
    .bind(metric.followers_open)
    .bind(metric.followers_close)
    .bind(metric.following_open)
    .bind(metric.following_close)
    .bind(metric.media_open)
    .bind(metric.media_close)
    .bind(metric.reel_open)
    .bind(metric.reel_close)
    .bind(metric.views_delta)
    .bind(metric.likes_delta)
    .bind(metric.comments_delta)
    .fetch_one(pool)
    .await
    .map_err(|e| DbError::from_insert(e, "daily_metrics"))
}

/// Update today's row: set close values (deltas recomputed against the
/// stored, untouched open values) and overwrite the reel aggregate deltas
/// with this run's totals.
///
/// `today` must be the current date in the metrics time zone; the predicate
/// `metric_date = $2` guarantees no historical row can be modified.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no row exists for (profile, today) —
/// the caller inserts instead — or [`DbError::Sqlx`] on query failure.
pub async fn update_daily_metric_for_today(
    pool: &PgPool,
    profile_id: i64,
    today: NaiveDate,
    update: &DailyCloseUpdate,
) -> Result<DailyMetricRow, DbError> {
    sqlx::query_as::<_, DailyMetricRow>(&format!(
        "UPDATE daily_metrics SET \
             followers_close = $3, followers_delta = $3 - followers_open, \
             following_close = $4, following_delta = $4 - following_open, \
             media_close     = $5, media_delta     = $5 - media_open, \
             reel_close      = $6, reel_delta      = $6 - reel_open, \
             views_delta     = $7, \
             likes_delta     = $8, \
             comments_delta  = $9, \
             updated_at      = NOW() \
         WHERE profile_id = $1 AND metric_date = $2 \
         RETURNING {DAILY_COLUMNS}"
    ))
    .bind(profile_id)
    .bind(today)
    .bind(update.followers_close)
    .bind(update.following_close)
    .bind(update.media_close)
    .bind(update.reel_close)
    .bind(update.views_delta)
    .bind(update.likes_delta)
    .bind(update.comments_delta)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Session-scoped read: the newest daily metric written at or after `from`.
///
/// Used by the read API to synthesize a growth figure when the materialized
/// daily row is fresher than the latest delta row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_daily_metric_since(
    pool: &PgPool,
    profile_id: i64,
    from: DateTime<Utc>,
) -> Result<Option<DailyMetricRow>, DbError> {
    let row = sqlx::query_as::<_, DailyMetricRow>(&format!(
        "SELECT {DAILY_COLUMNS} FROM daily_metrics \
         WHERE profile_id = $1 AND updated_at >= $2 \
         ORDER BY metric_date DESC \
         LIMIT 1"
    ))
    .bind(profile_id)
    .bind(from)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Yesterday's row relative to `today`, used to seed `open` values when the
/// day rolls over mid-session.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_previous_daily_metric(
    pool: &PgPool,
    profile_id: i64,
    today: NaiveDate,
) -> Result<Option<DailyMetricRow>, DbError> {
    let row = sqlx::query_as::<_, DailyMetricRow>(&format!(
        "SELECT {DAILY_COLUMNS} FROM daily_metrics \
         WHERE profile_id = $1 AND metric_date < $2 \
         ORDER BY metric_date DESC \
         LIMIT 1"
    ))
    .bind(profile_id)
    .bind(today)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
