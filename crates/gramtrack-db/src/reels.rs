//! Database operations for the `reels` table.
//!
//! One current-value row per (profile, shortcode); historical counts live in
//! `reel_metrics`. The upsert keeps the latest metrics plus the per-refresh
//! deltas computed by the pipeline.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `reels` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReelRow {
    pub id: i64,
    pub profile_id: i64,
    pub shortcode: String,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub views_delta: i64,
    pub likes_delta: i64,
    pub comments_delta: i64,
    pub is_video: bool,
    pub video_url: Option<String>,
    pub video_mirror_url: Option<String>,
    pub display_url: Option<String>,
    pub duration_secs: Option<f64>,
    /// Not exposed by the public endpoints; stays NULL until a trusted
    /// source is wired in.
    pub avg_watch_time_secs: Option<f64>,
    pub taken_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReelRow {
    /// A media item counts as a reel for video-related reads once it either
    /// reports itself as video or has acquired a video URL — both flips are
    /// observed upstream over time.
    #[must_use]
    pub fn is_reel(&self) -> bool {
        self.is_video || self.video_url.is_some()
    }
}

/// Fields for the reel upsert.
#[derive(Debug, Clone)]
pub struct ReelUpsert {
    pub shortcode: String,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub views_delta: i64,
    pub likes_delta: i64,
    pub comments_delta: i64,
    pub is_video: bool,
    pub video_url: Option<String>,
    pub video_mirror_url: Option<String>,
    pub display_url: Option<String>,
    pub duration_secs: Option<f64>,
    pub taken_at: Option<DateTime<Utc>>,
}

const REEL_COLUMNS: &str = "id, profile_id, shortcode, view_count, like_count, comment_count, \
     views_delta, likes_delta, comments_delta, is_video, video_url, video_mirror_url, \
     display_url, duration_secs, avg_watch_time_secs, taken_at, created_at, updated_at";

/// Upsert a reel on `(profile_id, shortcode)` and return the stored row.
///
/// The mirror URL is merged, not overwritten: a refresh that did not
/// re-mirror the video keeps the existing mirror reference.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_reel(
    pool: &PgPool,
    profile_id: i64,
    reel: &ReelUpsert,
) -> Result<ReelRow, DbError> {
    let row = sqlx::query_as::<_, ReelRow>(&format!(
        "INSERT INTO reels \
             (profile_id, shortcode, view_count, like_count, comment_count, \
              views_delta, likes_delta, comments_delta, is_video, video_url, \
              video_mirror_url, display_url, duration_secs, taken_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         ON CONFLICT (profile_id, shortcode) DO UPDATE SET \
             view_count       = EXCLUDED.view_count, \
             like_count       = EXCLUDED.like_count, \
             comment_count    = EXCLUDED.comment_count, \
             views_delta      = EXCLUDED.views_delta, \
             likes_delta      = EXCLUDED.likes_delta, \
             comments_delta   = EXCLUDED.comments_delta, \
             is_video         = EXCLUDED.is_video, \
             video_url        = COALESCE(EXCLUDED.video_url, reels.video_url), \
             video_mirror_url = COALESCE(EXCLUDED.video_mirror_url, reels.video_mirror_url), \
             display_url      = COALESCE(EXCLUDED.display_url, reels.display_url), \
             duration_secs    = COALESCE(EXCLUDED.duration_secs, reels.duration_secs), \
             taken_at         = COALESCE(EXCLUDED.taken_at, reels.taken_at), \
             updated_at       = NOW() \
         RETURNING {REEL_COLUMNS}"
    ))
    .bind(profile_id)
    .bind(&reel.shortcode)
    .bind(reel.view_count)
    .bind(reel.like_count)
    .bind(reel.comment_count)
    .bind(reel.views_delta)
    .bind(reel.likes_delta)
    .bind(reel.comments_delta)
    .bind(reel.is_video)
    .bind(&reel.video_url)
    .bind(&reel.video_mirror_url)
    .bind(&reel.display_url)
    .bind(reel.duration_secs)
    .bind(reel.taken_at)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Fetch one reel by shortcode, if present.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_reel(
    pool: &PgPool,
    profile_id: i64,
    shortcode: &str,
) -> Result<Option<ReelRow>, DbError> {
    let row = sqlx::query_as::<_, ReelRow>(&format!(
        "SELECT {REEL_COLUMNS} FROM reels WHERE profile_id = $1 AND shortcode = $2"
    ))
    .bind(profile_id)
    .bind(shortcode)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// All shortcodes persisted for a profile. Used by the reconciliation step
/// to separate newly-sighted media from known media.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_reel_shortcodes(pool: &PgPool, profile_id: i64) -> Result<Vec<String>, DbError> {
    let codes = sqlx::query_scalar::<_, String>(
        "SELECT shortcode FROM reels WHERE profile_id = $1 ORDER BY taken_at DESC NULLS LAST, id DESC",
    )
    .bind(profile_id)
    .fetch_all(pool)
    .await?;
    Ok(codes)
}

/// The most recently posted reels for a profile, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_reels(
    pool: &PgPool,
    profile_id: i64,
    limit: i64,
) -> Result<Vec<ReelRow>, DbError> {
    let rows = sqlx::query_as::<_, ReelRow>(&format!(
        "SELECT {REEL_COLUMNS} FROM reels \
         WHERE profile_id = $1 \
         ORDER BY taken_at DESC NULLS LAST, id DESC \
         LIMIT $2"
    ))
    .bind(profile_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Reels that qualify for video-related reads: `is_video OR video_url`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_video_reels(pool: &PgPool, profile_id: i64) -> Result<Vec<ReelRow>, DbError> {
    let rows = sqlx::query_as::<_, ReelRow>(&format!(
        "SELECT {REEL_COLUMNS} FROM reels \
         WHERE profile_id = $1 AND (is_video OR video_url IS NOT NULL) \
         ORDER BY taken_at DESC NULLS LAST, id DESC"
    ))
    .bind(profile_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
