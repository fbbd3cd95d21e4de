//! Database operations for the `deltas` table.
//!
//! A delta joins two snapshots of the same profile with their arithmetic
//! differences. Append-only; zero-valued deltas are written like any other.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `deltas` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeltaRow {
    pub id: i64,
    pub profile_id: i64,
    pub base_snapshot_id: i64,
    pub compare_snapshot_id: i64,
    pub followers_diff: i64,
    pub following_diff: i64,
    pub media_diff: i64,
    pub reel_diff: i64,
    pub computed_at: DateTime<Utc>,
}

const DELTA_COLUMNS: &str = "id, profile_id, base_snapshot_id, compare_snapshot_id, \
     followers_diff, following_diff, media_diff, reel_diff, computed_at";

/// Insert a delta row and return it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
#[allow(clippy::too_many_arguments)]
pub async fn insert_delta(
    pool: &PgPool,
    profile_id: i64,
    base_snapshot_id: i64,
    compare_snapshot_id: i64,
    followers_diff: i64,
    following_diff: i64,
    media_diff: i64,
    reel_diff: i64,
) -> Result<DeltaRow, DbError> {
    let row = sqlx::query_as::<_, DeltaRow>(&format!(
        "INSERT INTO deltas \
             (profile_id, base_snapshot_id, compare_snapshot_id, \
              followers_diff, following_diff, media_diff, reel_diff) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {DELTA_COLUMNS}"
    ))
    .bind(profile_id)
    .bind(base_snapshot_id)
    .bind(compare_snapshot_id)
    .bind(followers_diff)
    .bind(following_diff)
    .bind(media_diff)
    .bind(reel_diff)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Session-scoped read: the newest delta computed at or after `from`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_delta_since(
    pool: &PgPool,
    profile_id: i64,
    from: DateTime<Utc>,
) -> Result<Option<DeltaRow>, DbError> {
    let row = sqlx::query_as::<_, DeltaRow>(&format!(
        "SELECT {DELTA_COLUMNS} FROM deltas \
         WHERE profile_id = $1 AND computed_at >= $2 \
         ORDER BY computed_at DESC, id DESC \
         LIMIT 1"
    ))
    .bind(profile_id)
    .bind(from)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
