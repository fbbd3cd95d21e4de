//! Instagram endpoint URLs and response parsing.
//!
//! ## Observed shapes
//!
//! Profile data comes from the `web_profile_info` JSON endpoint: counts live
//! under `data.user.edge_followed_by.count` / `edge_follow.count`, the
//! timeline under `edge_owner_to_timeline_media` (count plus a truncated
//! `edges` list of roughly twelve items), and the clips tab count under
//! `edge_felix_video_timeline.count`. Media detail and timeline enumeration
//! use the GraphQL query endpoint with a JSON `variables` parameter; the
//! enumeration pages on `page_info.end_cursor`.
//!
//! Counts are occasionally absent on restricted accounts; every count field
//! is `#[serde(default)]` and missing values read as zero rather than a
//! parse failure.

use chrono::DateTime;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use super::EnumerationPage;
use crate::error::ScraperError;
use crate::types::{MediaData, MediaSummary, ProfileData};

/// Query hash of the user-timeline GraphQL query used for enumeration.
const TIMELINE_QUERY_HASH: &str = "e769aa130647d2354c40ea6a439bfc08";

/// Query hash of the shortcode-media GraphQL query used for media detail.
const MEDIA_QUERY_HASH: &str = "b3055c01b4b222b8a47dc12b090e4e64";

const ENUMERATION_PAGE_SIZE: u32 = 50;

pub(super) fn profile_url(base: &Url, username: &str) -> Url {
    let mut url = base.clone();
    url.set_path("api/v1/users/web_profile_info/");
    url.query_pairs_mut().append_pair("username", username);
    url
}

pub(super) fn media_url(base: &Url, shortcode: &str) -> Url {
    graphql_url(
        base,
        MEDIA_QUERY_HASH,
        &serde_json::json!({ "shortcode": shortcode }),
    )
}

pub(super) fn enumeration_url(base: &Url, username: &str, cursor: Option<&str>) -> Url {
    let variables = match cursor {
        Some(after) => serde_json::json!({
            "username": username,
            "first": ENUMERATION_PAGE_SIZE,
            "after": after,
        }),
        None => serde_json::json!({
            "username": username,
            "first": ENUMERATION_PAGE_SIZE,
        }),
    };
    graphql_url(base, TIMELINE_QUERY_HASH, &variables)
}

fn graphql_url(base: &Url, query_hash: &str, variables: &Value) -> Url {
    let mut url = base.clone();
    url.set_path("graphql/query/");
    url.query_pairs_mut()
        .append_pair("query_hash", query_hash)
        .append_pair("variables", &variables.to_string());
    url
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    data: ProfileDataNode,
}

#[derive(Debug, Deserialize)]
struct ProfileDataNode {
    user: UserNode,
}

#[derive(Debug, Deserialize)]
struct UserNode {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    biography: Option<String>,
    #[serde(default)]
    external_url: Option<String>,
    #[serde(default)]
    profile_pic_url_hd: Option<String>,
    #[serde(default)]
    profile_pic_url: Option<String>,
    #[serde(default)]
    edge_followed_by: CountEdge,
    #[serde(default)]
    edge_follow: CountEdge,
    #[serde(default)]
    edge_owner_to_timeline_media: TimelineEdge,
    #[serde(default)]
    edge_felix_video_timeline: CountEdge,
}

#[derive(Debug, Default, Deserialize)]
struct CountEdge {
    #[serde(default)]
    count: i64,
}

#[derive(Debug, Default, Deserialize)]
struct TimelineEdge {
    #[serde(default)]
    count: i64,
    #[serde(default)]
    edges: Vec<MediaEdge>,
    #[serde(default)]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct MediaEdge {
    node: MediaNode,
}

#[derive(Debug, Deserialize)]
struct MediaNode {
    shortcode: String,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    taken_at_timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnumerationEnvelope {
    data: EnumerationData,
}

#[derive(Debug, Deserialize)]
struct EnumerationData {
    user: EnumerationUser,
}

#[derive(Debug, Deserialize)]
struct EnumerationUser {
    edge_owner_to_timeline_media: TimelineEdge,
}

#[derive(Debug, Deserialize)]
struct MediaEnvelope {
    data: MediaDetailData,
}

#[derive(Debug, Deserialize)]
struct MediaDetailData {
    shortcode_media: ShortcodeMedia,
}

#[derive(Debug, Deserialize)]
struct ShortcodeMedia {
    shortcode: String,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    video_view_count: Option<i64>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    display_url: Option<String>,
    #[serde(default)]
    video_duration: Option<f64>,
    #[serde(default)]
    taken_at_timestamp: Option<i64>,
    #[serde(default)]
    edge_media_preview_like: CountEdge,
    #[serde(default)]
    edge_media_to_parent_comment: CountEdge,
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

pub(super) fn parse_profile(username: &str, body: Value) -> Result<ProfileData, ScraperError> {
    let envelope: ProfileEnvelope =
        serde_json::from_value(body.clone()).map_err(|e| ScraperError::Deserialize {
            context: format!("instagram profile({username})"),
            source: e,
        })?;
    let user = envelope.data.user;

    let recent_media = user
        .edge_owner_to_timeline_media
        .edges
        .iter()
        .map(|edge| MediaSummary {
            shortcode: edge.node.shortcode.clone(),
            is_video: edge.node.is_video,
            taken_at: edge
                .node
                .taken_at_timestamp
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        })
        .collect();

    Ok(ProfileData {
        username: username.to_string(),
        account_id: user.id,
        display_name: user.full_name,
        biography: user.biography,
        avatar_url: user.profile_pic_url_hd.or(user.profile_pic_url),
        external_url: user.external_url,
        followers: user.edge_followed_by.count,
        following: user.edge_follow.count,
        media_count: user.edge_owner_to_timeline_media.count,
        reel_count: user.edge_felix_video_timeline.count,
        recent_media,
        raw: body,
    })
}

pub(super) fn parse_media(shortcode: &str, body: Value) -> Result<MediaData, ScraperError> {
    let envelope: MediaEnvelope =
        serde_json::from_value(body).map_err(|e| ScraperError::Deserialize {
            context: format!("instagram media({shortcode})"),
            source: e,
        })?;
    let media = envelope.data.shortcode_media;

    Ok(MediaData {
        shortcode: media.shortcode,
        view_count: media.video_view_count.unwrap_or(0),
        like_count: media.edge_media_preview_like.count,
        comment_count: media.edge_media_to_parent_comment.count,
        is_video: media.is_video,
        video_url: media.video_url,
        display_url: media.display_url,
        duration_secs: media.video_duration,
        taken_at: media
            .taken_at_timestamp
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
    })
}

pub(super) fn parse_enumeration_page(
    username: &str,
    body: Value,
) -> Result<EnumerationPage, ScraperError> {
    let envelope: EnumerationEnvelope =
        serde_json::from_value(body).map_err(|e| ScraperError::Deserialize {
            context: format!("instagram enumeration({username})"),
            source: e,
        })?;
    let timeline = envelope.data.user.edge_owner_to_timeline_media;

    let shortcodes = timeline
        .edges
        .into_iter()
        .map(|edge| edge.node.shortcode)
        .collect();
    let next_cursor = timeline
        .page_info
        .filter(|p| p.has_next_page)
        .and_then(|p| p.end_cursor);

    Ok(EnumerationPage {
        shortcodes,
        next_cursor,
    })
}
