//! Database operations for the `replies` table (Twitter pipeline only).
//!
//! Read-append: replies are upserted on `(reel_id, reply_tweet_id)` and
//! carry no deltas.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `replies` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReplyRow {
    pub id: i64,
    pub reel_id: i64,
    pub reply_tweet_id: String,
    pub author_handle: String,
    pub body: String,
    pub like_count: i64,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a reply upsert.
#[derive(Debug, Clone)]
pub struct NewReply {
    pub reply_tweet_id: String,
    pub author_handle: String,
    pub body: String,
    pub like_count: i64,
    pub replied_at: Option<DateTime<Utc>>,
}

const REPLY_COLUMNS: &str =
    "id, reel_id, reply_tweet_id, author_handle, body, like_count, replied_at, created_at";

/// Upsert one reply row; a re-sighted reply refreshes its like count and body.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_reply(
    pool: &PgPool,
    reel_id: i64,
    reply: &NewReply,
) -> Result<ReplyRow, DbError> {
    let row = sqlx::query_as::<_, ReplyRow>(&format!(
        "INSERT INTO replies (reel_id, reply_tweet_id, author_handle, body, like_count, replied_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (reel_id, reply_tweet_id) DO UPDATE SET \
             body       = EXCLUDED.body, \
             like_count = EXCLUDED.like_count \
         RETURNING {REPLY_COLUMNS}"
    ))
    .bind(reel_id)
    .bind(&reply.reply_tweet_id)
    .bind(&reply.author_handle)
    .bind(&reply.body)
    .bind(reply.like_count)
    .bind(reply.replied_at)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// All replies for one tweet, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_replies_for_reel(pool: &PgPool, reel_id: i64) -> Result<Vec<ReplyRow>, DbError> {
    let rows = sqlx::query_as::<_, ReplyRow>(&format!(
        "SELECT {REPLY_COLUMNS} FROM replies \
         WHERE reel_id = $1 \
         ORDER BY replied_at ASC NULLS LAST, id ASC"
    ))
    .bind(reel_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
