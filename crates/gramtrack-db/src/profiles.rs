//! Database operations for the `profiles` table.
//!
//! A profile row is the identity of one tracked account on one platform.
//! `updated_at` is the session-start boundary: it is bumped only by
//! [`open_session`], never by a routine refresh, because session-scoped
//! reads filter every other table by `captured_at >= updated_at - ε`.

use chrono::{DateTime, Utc};
use gramtrack_core::Platform;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `profiles` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: i64,
    pub platform: String,
    pub username: String,
    /// Stable external account id, when the platform exposes one.
    pub account_id: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub biography: Option<String>,
    pub external_url: Option<String>,
    /// Owning end-user; `None` for anonymous trackings.
    pub user_id: Option<String>,
    pub tracking_id: String,
    pub followers: i64,
    pub following: i64,
    pub media_count: i64,
    pub reel_count: i64,
    pub last_snapshot_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRow {
    /// Lower bound for session-scoped reads: `updated_at` minus a one-second
    /// tolerance for clock skew between the session-open write and the first
    /// snapshot write.
    #[must_use]
    pub fn session_start(&self) -> DateTime<Utc> {
        self.updated_at - chrono::Duration::seconds(1)
    }
}

/// Scraped profile fields shared by insert and refresh paths.
#[derive(Debug, Clone, Copy)]
pub struct ProfileFields<'a> {
    pub account_id: Option<&'a str>,
    pub display_name: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub biography: Option<&'a str>,
    pub external_url: Option<&'a str>,
    pub followers: i64,
    pub following: i64,
    pub media_count: i64,
    pub reel_count: i64,
}

const PROFILE_COLUMNS: &str = "id, platform, username, account_id, display_name, avatar_url, \
     biography, external_url, user_id, tracking_id, followers, following, media_count, \
     reel_count, last_snapshot_id, created_at, updated_at";

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetch a profile by its tracking-id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_profile_by_tracking_id(
    pool: &PgPool,
    tracking_id: &str,
) -> Result<Option<ProfileRow>, DbError> {
    let row = sqlx::query_as::<_, ProfileRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE tracking_id = $1"
    ))
    .bind(tracking_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Fetch a profile by `(platform, username, owning user)`.
///
/// Anonymous trackings are matched when `user_id` is `None`; a handle
/// tracked by several end-users yields one row per user.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_profile_by_handle(
    pool: &PgPool,
    platform: Platform,
    username: &str,
    user_id: Option<&str>,
) -> Result<Option<ProfileRow>, DbError> {
    let row = sqlx::query_as::<_, ProfileRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles \
         WHERE platform = $1 AND username = $2 AND COALESCE(user_id, '') = COALESCE($3, '')"
    ))
    .bind(platform.as_str())
    .bind(username)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Fetch a profile by internal id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no such row exists, [`DbError::Sqlx`] on
/// query failure.
pub async fn get_profile_by_id(pool: &PgPool, id: i64) -> Result<ProfileRow, DbError> {
    sqlx::query_as::<_, ProfileRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// List all tracked profiles, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_profiles(pool: &PgPool) -> Result<Vec<ProfileRow>, DbError> {
    let rows = sqlx::query_as::<_, ProfileRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Insert a new profile row and return it.
///
/// `updated_at` defaults to `NOW()`, which opens the first tracking session
/// for the row.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] on a tracking-id or `(platform, username,
/// user)` collision, [`DbError::Sqlx`] on any other failure.
pub async fn insert_profile(
    pool: &PgPool,
    platform: Platform,
    username: &str,
    fields: ProfileFields<'_>,
    tracking_id: &str,
    user_id: Option<&str>,
) -> Result<ProfileRow, DbError> {
    sqlx::query_as::<_, ProfileRow>(&format!(
        "INSERT INTO profiles \
             (platform, username, account_id, display_name, avatar_url, biography, \
              external_url, user_id, tracking_id, followers, following, media_count, reel_count) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(platform.as_str())
    .bind(username)
    .bind(fields.account_id)
    .bind(fields.display_name)
    .bind(fields.avatar_url)
    .bind(fields.biography)
    .bind(fields.external_url)
    .bind(user_id)
    .bind(tracking_id)
    .bind(fields.followers)
    .bind(fields.following)
    .bind(fields.media_count)
    .bind(fields.reel_count)
    .fetch_one(pool)
    .await
    .map_err(|e| DbError::from_insert(e, "profiles"))
}

/// Refresh the scraped fields on an existing profile.
///
/// Does NOT touch `updated_at` — a routine refresh must not move the
/// session boundary.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the row is gone, [`DbError::Sqlx`] on
/// query failure.
pub async fn update_profile_meta(
    pool: &PgPool,
    id: i64,
    fields: ProfileFields<'_>,
) -> Result<ProfileRow, DbError> {
    sqlx::query_as::<_, ProfileRow>(&format!(
        "UPDATE profiles SET \
             account_id   = COALESCE($2, account_id), \
             display_name = $3, \
             avatar_url   = $4, \
             biography    = $5, \
             external_url = $6, \
             followers    = $7, \
             following    = $8, \
             media_count  = $9, \
             reel_count   = $10 \
         WHERE id = $1 \
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(id)
    .bind(fields.account_id)
    .bind(fields.display_name)
    .bind(fields.avatar_url)
    .bind(fields.biography)
    .bind(fields.external_url)
    .bind(fields.followers)
    .bind(fields.following)
    .bind(fields.media_count)
    .bind(fields.reel_count)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Open (or reassign) a tracking session: align the tracking-id and bump
/// `updated_at` to the current wall clock. This timestamp is authoritative
/// for session-scoped reads.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the tracking-id is already taken by
/// another profile, [`DbError::NotFound`] if the row is gone,
/// [`DbError::Sqlx`] on any other failure.
pub async fn open_session(
    pool: &PgPool,
    id: i64,
    tracking_id: &str,
) -> Result<ProfileRow, DbError> {
    sqlx::query_as::<_, ProfileRow>(&format!(
        "UPDATE profiles SET tracking_id = $2, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(id)
    .bind(tracking_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| DbError::from_insert(e, "profiles.tracking_id"))?
    .ok_or(DbError::NotFound)
}

/// Point the profile at its most recent snapshot.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_last_snapshot(pool: &PgPool, id: i64, snapshot_id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE profiles SET last_snapshot_id = $2 WHERE id = $1")
        .bind(id)
        .bind(snapshot_id)
        .execute(pool)
        .await?;
    Ok(())
}
