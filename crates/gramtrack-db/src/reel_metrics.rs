//! Database operations for the `reel_metrics` table.
//!
//! One immutable row per reel per tracking run. Never updated or deleted.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `reel_metrics` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReelMetricRow {
    pub id: i64,
    pub reel_id: i64,
    pub profile_id: i64,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub captured_at: DateTime<Utc>,
}

const REEL_METRIC_COLUMNS: &str =
    "id, reel_id, profile_id, view_count, like_count, comment_count, captured_at";

/// Append a metrics row for one reel and return it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_reel_metric(
    pool: &PgPool,
    reel_id: i64,
    profile_id: i64,
    view_count: i64,
    like_count: i64,
    comment_count: i64,
) -> Result<ReelMetricRow, DbError> {
    let row = sqlx::query_as::<_, ReelMetricRow>(&format!(
        "INSERT INTO reel_metrics (reel_id, profile_id, view_count, like_count, comment_count) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {REEL_METRIC_COLUMNS}"
    ))
    .bind(reel_id)
    .bind(profile_id)
    .bind(view_count)
    .bind(like_count)
    .bind(comment_count)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Session-scoped read: all reel metrics for a profile captured at or after
/// `from`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_reel_metrics_since(
    pool: &PgPool,
    profile_id: i64,
    from: DateTime<Utc>,
) -> Result<Vec<ReelMetricRow>, DbError> {
    let rows = sqlx::query_as::<_, ReelMetricRow>(&format!(
        "SELECT {REEL_METRIC_COLUMNS} FROM reel_metrics \
         WHERE profile_id = $1 AND captured_at >= $2 \
         ORDER BY captured_at ASC, id ASC"
    ))
    .bind(profile_id)
    .bind(from)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
