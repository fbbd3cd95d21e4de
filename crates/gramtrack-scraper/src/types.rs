//! Typed results returned by the scraping client. These are the only
//! shapes the tracking pipeline depends on; the upstream wire formats stay
//! inside the per-platform parsers.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Public profile data for one account at the moment of the scrape.
#[derive(Debug, Clone)]
pub struct ProfileData {
    pub username: String,
    /// Stable external account id, when exposed.
    pub account_id: Option<String>,
    pub display_name: Option<String>,
    pub biography: Option<String>,
    pub avatar_url: Option<String>,
    pub external_url: Option<String>,
    pub followers: i64,
    pub following: i64,
    pub media_count: i64,
    pub reel_count: i64,
    /// The profile-embedded latest media items (truncated upstream to
    /// roughly a dozen). A fallback when full enumeration is unavailable.
    pub recent_media: Vec<MediaSummary>,
    /// Raw upstream payload, persisted verbatim with the snapshot.
    pub raw: Value,
}

/// Identity and coarse metrics of one media item as embedded in a profile
/// payload.
#[derive(Debug, Clone)]
pub struct MediaSummary {
    pub shortcode: String,
    pub is_video: bool,
    pub taken_at: Option<DateTime<Utc>>,
}

/// Detailed metrics for one media item from the per-item endpoint.
#[derive(Debug, Clone)]
pub struct MediaData {
    pub shortcode: String,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub is_video: bool,
    pub video_url: Option<String>,
    pub display_url: Option<String>,
    pub duration_secs: Option<f64>,
    pub taken_at: Option<DateTime<Utc>>,
}

/// One reply to a tweet (Twitter pipeline only).
#[derive(Debug, Clone)]
pub struct ReplyData {
    pub reply_tweet_id: String,
    pub author_handle: String,
    pub body: String,
    pub like_count: i64,
    pub replied_at: Option<DateTime<Utc>>,
}
