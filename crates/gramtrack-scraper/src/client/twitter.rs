//! Twitter/X endpoint URLs and response parsing.
//!
//! ## Observed shapes
//!
//! Profile data comes from the `UserByScreenName` GraphQL query: counts and
//! descriptive fields live under `data.user.result.legacy`
//! (`followers_count`, `friends_count`, `statuses_count`, `media_count`).
//! Tweet enumeration uses `UserMedia`; tweet detail uses `TweetDetail`
//! (`views.count` arrives as a **string**); replies come from the
//! conversation search timeline. Timestamps use the classic
//! `"Wed Oct 10 20:19:24 +0000 2018"` format.
//!
//! The profile payload carries no embedded media list, so the Twitter
//! pipeline always relies on enumeration for reconciliation.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use super::EnumerationPage;
use crate::error::ScraperError;
use crate::types::{MediaData, ProfileData, ReplyData};

const ENUMERATION_PAGE_SIZE: u32 = 50;

pub(super) fn profile_url(base: &Url, username: &str) -> Url {
    graphql_url(
        base,
        "UserByScreenName",
        &serde_json::json!({ "screen_name": username }),
    )
}

pub(super) fn tweet_url(base: &Url, tweet_id: &str) -> Url {
    graphql_url(
        base,
        "TweetDetail",
        &serde_json::json!({ "tweet_id": tweet_id }),
    )
}

pub(super) fn enumeration_url(base: &Url, username: &str, cursor: Option<&str>) -> Url {
    let variables = match cursor {
        Some(after) => serde_json::json!({
            "screen_name": username,
            "count": ENUMERATION_PAGE_SIZE,
            "cursor": after,
        }),
        None => serde_json::json!({
            "screen_name": username,
            "count": ENUMERATION_PAGE_SIZE,
        }),
    };
    graphql_url(base, "UserMedia", &variables)
}

pub(super) fn replies_url(base: &Url, tweet_id: &str) -> Url {
    graphql_url(
        base,
        "SearchTimeline",
        &serde_json::json!({ "conversation_id": tweet_id }),
    )
}

fn graphql_url(base: &Url, operation: &str, variables: &Value) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("i/api/graphql/{operation}"));
    url.query_pairs_mut()
        .append_pair("variables", &variables.to_string());
    url
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    data: UserData,
}

#[derive(Debug, Deserialize)]
struct UserData {
    user: UserResultWrapper,
}

#[derive(Debug, Deserialize)]
struct UserResultWrapper {
    result: UserResult,
}

#[derive(Debug, Deserialize)]
struct UserResult {
    #[serde(default)]
    rest_id: Option<String>,
    legacy: UserLegacy,
}

#[derive(Debug, Deserialize)]
struct UserLegacy {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    profile_image_url_https: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    followers_count: i64,
    #[serde(default)]
    friends_count: i64,
    #[serde(default)]
    statuses_count: i64,
    #[serde(default)]
    media_count: i64,
}

#[derive(Debug, Deserialize)]
struct MediaListEnvelope {
    data: MediaListData,
}

#[derive(Debug, Deserialize)]
struct MediaListData {
    user: MediaListUserWrapper,
}

#[derive(Debug, Deserialize)]
struct MediaListUserWrapper {
    result: MediaListResult,
}

#[derive(Debug, Deserialize)]
struct MediaListResult {
    media: MediaList,
}

#[derive(Debug, Deserialize)]
struct MediaList {
    #[serde(default)]
    items: Vec<MediaListItem>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaListItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TweetEnvelope {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    tweet: TweetResult,
}

#[derive(Debug, Deserialize)]
struct TweetResult {
    rest_id: String,
    #[serde(default)]
    views: Option<TweetViews>,
    legacy: TweetLegacy,
}

#[derive(Debug, Deserialize)]
struct TweetViews {
    /// Arrives as a decimal string, e.g. `"1000"`.
    #[serde(default)]
    count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TweetLegacy {
    #[serde(default)]
    favorite_count: i64,
    #[serde(default)]
    reply_count: i64,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    extended_entities: Option<ExtendedEntities>,
}

#[derive(Debug, Deserialize)]
struct ExtendedEntities {
    #[serde(default)]
    media: Vec<TweetMedia>,
}

#[derive(Debug, Deserialize)]
struct TweetMedia {
    #[serde(rename = "type")]
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    media_url_https: Option<String>,
    #[serde(default)]
    video_info: Option<VideoInfo>,
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    duration_millis: Option<i64>,
    #[serde(default)]
    variants: Vec<VideoVariant>,
}

#[derive(Debug, Deserialize)]
struct VideoVariant {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    bitrate: Option<i64>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct RepliesEnvelope {
    data: RepliesData,
}

#[derive(Debug, Deserialize)]
struct RepliesData {
    #[serde(default)]
    replies: Vec<ReplyItem>,
}

#[derive(Debug, Deserialize)]
struct ReplyItem {
    rest_id: String,
    #[serde(default)]
    user_screen_name: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    favorite_count: i64,
    #[serde(default)]
    created_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

pub(super) fn parse_profile(username: &str, body: Value) -> Result<ProfileData, ScraperError> {
    let envelope: UserEnvelope =
        serde_json::from_value(body.clone()).map_err(|e| ScraperError::Deserialize {
            context: format!("twitter profile({username})"),
            source: e,
        })?;
    let result = envelope.data.user.result;
    let legacy = result.legacy;

    Ok(ProfileData {
        username: username.to_string(),
        account_id: result.rest_id,
        display_name: legacy.name,
        biography: legacy.description,
        avatar_url: legacy.profile_image_url_https,
        external_url: legacy.url,
        followers: legacy.followers_count,
        following: legacy.friends_count,
        media_count: legacy.statuses_count,
        reel_count: legacy.media_count,
        // No embedded media list on this payload; enumeration covers it.
        recent_media: Vec::new(),
        raw: body,
    })
}

pub(super) fn parse_tweet(tweet_id: &str, body: Value) -> Result<MediaData, ScraperError> {
    let envelope: TweetEnvelope =
        serde_json::from_value(body).map_err(|e| ScraperError::Deserialize {
            context: format!("twitter tweet({tweet_id})"),
            source: e,
        })?;
    let tweet = envelope.data.tweet;

    let view_count = tweet
        .views
        .and_then(|v| v.count)
        .and_then(|c| c.parse::<i64>().ok())
        .unwrap_or(0);

    let video = tweet
        .legacy
        .extended_entities
        .as_ref()
        .and_then(|e| e.media.iter().find(|m| m.media_type.as_deref() == Some("video")));

    let video_url = video.and_then(best_mp4_variant);
    let duration_secs = video
        .and_then(|m| m.video_info.as_ref())
        .and_then(|v| v.duration_millis)
        .map(|ms| ms as f64 / 1000.0);
    let display_url = tweet
        .legacy
        .extended_entities
        .as_ref()
        .and_then(|e| e.media.first())
        .and_then(|m| m.media_url_https.clone());

    Ok(MediaData {
        shortcode: tweet.rest_id,
        view_count,
        like_count: tweet.legacy.favorite_count,
        comment_count: tweet.legacy.reply_count,
        is_video: video.is_some(),
        video_url,
        display_url,
        duration_secs,
        taken_at: tweet.legacy.created_at.as_deref().and_then(parse_created_at),
    })
}

pub(super) fn parse_enumeration_page(
    username: &str,
    body: Value,
) -> Result<EnumerationPage, ScraperError> {
    let envelope: MediaListEnvelope =
        serde_json::from_value(body).map_err(|e| ScraperError::Deserialize {
            context: format!("twitter enumeration({username})"),
            source: e,
        })?;
    let media = envelope.data.user.result.media;

    Ok(EnumerationPage {
        shortcodes: media.items.into_iter().map(|item| item.id).collect(),
        next_cursor: media.next_cursor,
    })
}

pub(super) fn parse_replies(tweet_id: &str, body: Value) -> Result<Vec<ReplyData>, ScraperError> {
    let envelope: RepliesEnvelope =
        serde_json::from_value(body).map_err(|e| ScraperError::Deserialize {
            context: format!("twitter replies({tweet_id})"),
            source: e,
        })?;

    Ok(envelope
        .data
        .replies
        .into_iter()
        .map(|item| ReplyData {
            reply_tweet_id: item.rest_id,
            author_handle: item.user_screen_name.unwrap_or_default(),
            body: item.text.unwrap_or_default(),
            like_count: item.favorite_count,
            replied_at: item.created_at.as_deref().and_then(parse_created_at),
        })
        .collect())
}

/// Highest-bitrate mp4 variant of a video, if any.
fn best_mp4_variant(media: &TweetMedia) -> Option<String> {
    media.video_info.as_ref().and_then(|info| {
        info.variants
            .iter()
            .filter(|v| v.content_type.as_deref() == Some("video/mp4"))
            .max_by_key(|v| v.bitrate.unwrap_or(0))
            .map(|v| v.url.clone())
    })
}

/// Parses the classic `"Wed Oct 10 20:19:24 +0000 2018"` timestamp format.
fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
