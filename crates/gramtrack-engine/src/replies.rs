//! Reply sync sub-pipeline (Twitter only).
//!
//! For each recent tweet with at least one reply, fetch the reply set and
//! upsert it. Read-append: replies carry no deltas, and a re-sighted reply
//! just refreshes its like count. Failures are logged per tweet and never
//! abort the tracking run.

use gramtrack_db::{NewReply, ProfileRow};
use gramtrack_scraper::ScraperClient;
use sqlx::PgPool;

/// How many recent tweets are checked for replies each run.
const REPLY_TWEET_WINDOW: i64 = 12;

/// Returns the number of reply rows written.
pub(crate) async fn sync_replies(
    pool: &PgPool,
    scraper: &ScraperClient,
    profile: &ProfileRow,
) -> usize {
    let recent = match gramtrack_db::list_recent_reels(pool, profile.id, REPLY_TWEET_WINDOW).await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "recent tweet lookup failed — skipping reply sync");
            return 0;
        }
    };

    let mut stored = 0usize;
    for tweet in recent.iter().filter(|t| t.comment_count > 0) {
        let replies = match scraper.fetch_replies(&tweet.shortcode).await {
            Ok(replies) => replies,
            Err(e) => {
                tracing::warn!(
                    tweet_id = tweet.shortcode.as_str(),
                    error = %e,
                    "reply fetch failed — skipping this tweet"
                );
                continue;
            }
        };

        for reply in replies {
            let row = NewReply {
                reply_tweet_id: reply.reply_tweet_id,
                author_handle: reply.author_handle,
                body: reply.body,
                like_count: reply.like_count,
                replied_at: reply.replied_at,
            };
            match gramtrack_db::upsert_reply(pool, tweet.id, &row).await {
                Ok(_) => stored += 1,
                Err(e) => {
                    tracing::warn!(
                        tweet_id = tweet.shortcode.as_str(),
                        reply_id = row.reply_tweet_id.as_str(),
                        error = %e,
                        "reply upsert failed"
                    );
                }
            }
        }
    }
    stored
}
