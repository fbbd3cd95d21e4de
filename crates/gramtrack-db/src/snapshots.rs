//! Database operations for the `snapshots` table.
//!
//! Snapshots are append-only: rows are inserted once and never updated or
//! deleted by the engine.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub profile_id: i64,
    pub followers: i64,
    pub following: i64,
    pub media_count: i64,
    pub reel_count: i64,
    pub biography: Option<String>,
    pub avatar_url: Option<String>,
    pub raw: Value,
    pub captured_at: DateTime<Utc>,
}

/// Fields for a new snapshot insert.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub profile_id: i64,
    pub followers: i64,
    pub following: i64,
    pub media_count: i64,
    pub reel_count: i64,
    pub biography: Option<String>,
    pub avatar_url: Option<String>,
    /// Raw upstream payload, stored verbatim for later reprocessing.
    pub raw: Value,
}

const SNAPSHOT_COLUMNS: &str = "id, profile_id, followers, following, media_count, reel_count, \
     biography, avatar_url, raw, captured_at";

/// Insert a snapshot and return the stored row (with id and `captured_at`).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_snapshot(pool: &PgPool, snapshot: &NewSnapshot) -> Result<SnapshotRow, DbError> {
    let row = sqlx::query_as::<_, SnapshotRow>(&format!(
        "INSERT INTO snapshots \
             (profile_id, followers, following, media_count, reel_count, biography, avatar_url, raw) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {SNAPSHOT_COLUMNS}"
    ))
    .bind(snapshot.profile_id)
    .bind(snapshot.followers)
    .bind(snapshot.following)
    .bind(snapshot.media_count)
    .bind(snapshot.reel_count)
    .bind(&snapshot.biography)
    .bind(&snapshot.avatar_url)
    .bind(&snapshot.raw)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// The most recent snapshots for a profile, newest first.
///
/// `captured_at` and insertion order are consistent because the dispatcher
/// runs at most one job per profile at a time; `id DESC` breaks same-instant
/// ties deterministically.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_recent_snapshots(
    pool: &PgPool,
    profile_id: i64,
    limit: i64,
) -> Result<Vec<SnapshotRow>, DbError> {
    let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM snapshots \
         WHERE profile_id = $1 \
         ORDER BY captured_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(profile_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Session-scoped read: snapshots captured at or after `from`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_snapshots_since(
    pool: &PgPool,
    profile_id: i64,
    from: DateTime<Utc>,
) -> Result<Vec<SnapshotRow>, DbError> {
    let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM snapshots \
         WHERE profile_id = $1 AND captured_at >= $2 \
         ORDER BY captured_at ASC, id ASC"
    ))
    .bind(profile_id)
    .bind(from)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// The newest snapshot captured at or after `from`, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_snapshot_since(
    pool: &PgPool,
    profile_id: i64,
    from: DateTime<Utc>,
) -> Result<Option<SnapshotRow>, DbError> {
    let row = sqlx::query_as::<_, SnapshotRow>(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM snapshots \
         WHERE profile_id = $1 AND captured_at >= $2 \
         ORDER BY captured_at DESC, id DESC \
         LIMIT 1"
    ))
    .bind(profile_id)
    .bind(from)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
