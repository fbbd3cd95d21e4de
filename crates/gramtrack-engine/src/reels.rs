//! Reel reconciliation: discover new media, refresh the recent window,
//! persist current values plus per-refresh growth, and accumulate the day's
//! positive growth totals.
//!
//! Every failure in here degrades to a warning — a half-finished
//! reconciliation still leaves valid per-reel rows behind, and the snapshot
//! written earlier in the pipeline is untouched.

use std::time::Duration;

use gramtrack_core::Platform;
use gramtrack_db::{ProfileRow, ReelRow, ReelUpsert};
use gramtrack_scraper::{MediaData, ProfileData, ScraperClient};
use sqlx::PgPool;

/// Size of the maintained "latest reels" working set.
const WORKING_SET_SIZE: usize = 12;

/// How many already-persisted reels get a metrics refresh each run.
const REFRESH_WINDOW: i64 = 12;

/// Positive growth accumulated across the working set for the daily
/// roll-up. Per-reel shrinkage (upstream revisions) is clamped to zero here
/// while the signed value is still stored on the reel row.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ReelTotals {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

impl ReelTotals {
    fn absorb(&mut self, growth: ReelGrowth) {
        self.views += growth.views.max(0);
        self.likes += growth.likes.max(0);
        self.comments += growth.comments.max(0);
    }
}

/// Signed per-refresh growth of one reel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReelGrowth {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

/// Steps 7–9 of the pipeline: enumerate, fetch details, persist.
pub(crate) async fn reconcile(
    pool: &PgPool,
    scraper: &ScraperClient,
    platform: Platform,
    fetch_delay: Duration,
    profile: &ProfileRow,
    data: &ProfileData,
) -> ReelTotals {
    let enumerated = enumerate_shortcodes(scraper, platform, profile, data).await;
    if enumerated.is_empty() {
        tracing::info!(
            profile_id = profile.id,
            "no media enumeration available — skipping reel reconciliation"
        );
        return ReelTotals::default();
    }

    let persisted = match gramtrack_db::list_reel_shortcodes(pool, profile.id).await {
        Ok(codes) => codes,
        Err(e) => {
            tracing::warn!(error = %e, "persisted shortcode lookup failed — skipping reels");
            return ReelTotals::default();
        }
    };
    let fresh = new_shortcodes(&enumerated, &persisted);

    let refresh = match gramtrack_db::list_recent_reels(pool, profile.id, REFRESH_WINDOW).await {
        Ok(rows) => rows.into_iter().map(|r| r.shortcode).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "recent reel lookup failed — refreshing none");
            Vec::new()
        }
    };

    let media = fetch_details(
        scraper,
        platform,
        fetch_delay,
        merge_unique(fresh, refresh),
    )
    .await;
    let set = working_set(media);

    let mut totals = ReelTotals::default();
    for item in &set {
        match persist_reel(pool, profile.id, item).await {
            Ok(growth) => totals.absorb(growth),
            Err(e) => {
                tracing::warn!(
                    shortcode = item.shortcode.as_str(),
                    error = %e,
                    "reel persistence failed — skipping this reel"
                );
            }
        }
    }
    totals
}

/// Step 7: the full enumeration endpoint, falling back to the truncated
/// profile-embedded list when enumeration fails or comes back empty.
async fn enumerate_shortcodes(
    scraper: &ScraperClient,
    platform: Platform,
    profile: &ProfileRow,
    data: &ProfileData,
) -> Vec<String> {
    match scraper
        .list_media_shortcodes(platform, &profile.username)
        .await
    {
        Ok(codes) if !codes.is_empty() => codes,
        Ok(_) => {
            tracing::debug!(profile_id = profile.id, "enumeration empty — using embedded list");
            embedded_shortcodes(data)
        }
        Err(e) => {
            tracing::warn!(error = %e, "media enumeration failed — using embedded list");
            embedded_shortcodes(data)
        }
    }
}

fn embedded_shortcodes(data: &ProfileData) -> Vec<String> {
    data.recent_media
        .iter()
        .map(|m| m.shortcode.clone())
        .collect()
}

/// Per-identifier detail fetch with the politeness delay between outbound
/// calls. This budget is separate from the queue's global spacing.
async fn fetch_details(
    scraper: &ScraperClient,
    platform: Platform,
    fetch_delay: Duration,
    shortcodes: Vec<String>,
) -> Vec<MediaData> {
    let mut media = Vec::with_capacity(shortcodes.len());
    for (index, shortcode) in shortcodes.iter().enumerate() {
        if index > 0 && !fetch_delay.is_zero() {
            tokio::time::sleep(fetch_delay).await;
        }
        match scraper.fetch_media(platform, shortcode).await {
            Ok(item) => media.push(item),
            Err(e) => {
                tracing::warn!(
                    shortcode = shortcode.as_str(),
                    error = %e,
                    "media detail fetch failed — skipping this reel"
                );
            }
        }
    }
    media
}

/// Step 9 for one reel: load the prior row, compute growth, upsert the
/// current values, append the immutable metrics row.
async fn persist_reel(
    pool: &PgPool,
    profile_id: i64,
    item: &MediaData,
) -> Result<ReelGrowth, gramtrack_db::DbError> {
    let prior = gramtrack_db::get_reel(pool, profile_id, &item.shortcode).await?;
    let growth = reel_growth(prior.as_ref(), item);

    let row = gramtrack_db::upsert_reel(
        pool,
        profile_id,
        &ReelUpsert {
            shortcode: item.shortcode.clone(),
            view_count: item.view_count,
            like_count: item.like_count,
            comment_count: item.comment_count,
            views_delta: growth.views,
            likes_delta: growth.likes,
            comments_delta: growth.comments,
            is_video: item.is_video,
            video_url: item.video_url.clone(),
            video_mirror_url: None,
            display_url: item.display_url.clone(),
            duration_secs: item.duration_secs,
            taken_at: item.taken_at,
        },
    )
    .await?;

    gramtrack_db::insert_reel_metric(
        pool,
        row.id,
        profile_id,
        item.view_count,
        item.like_count,
        item.comment_count,
    )
    .await?;

    Ok(growth)
}

/// Enumerated shortcodes not yet persisted, in enumeration order.
pub(crate) fn new_shortcodes(enumerated: &[String], persisted: &[String]) -> Vec<String> {
    let known: std::collections::HashSet<&str> =
        persisted.iter().map(String::as_str).collect();
    enumerated
        .iter()
        .filter(|code| !known.contains(code.as_str()))
        .cloned()
        .collect()
}

/// Union preserving first-occurrence order, new sightings first.
pub(crate) fn merge_unique(fresh: Vec<String>, refresh: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    fresh
        .into_iter()
        .chain(refresh)
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

/// Newest [`WORKING_SET_SIZE`] media by timestamp, undated items last.
pub(crate) fn working_set(mut media: Vec<MediaData>) -> Vec<MediaData> {
    media.sort_by(|a, b| match (b.taken_at, a.taken_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => std::cmp::Ordering::Equal,
    });
    media.truncate(WORKING_SET_SIZE);
    media
}

/// Per-refresh growth: `current − prior`. A first sighting is a baseline,
/// not growth, so its deltas are zero.
pub(crate) fn reel_growth(prior: Option<&ReelRow>, current: &MediaData) -> ReelGrowth {
    match prior {
        Some(row) => ReelGrowth {
            views: current.view_count - row.view_count,
            likes: current.like_count - row.like_count,
            comments: current.comment_count - row.comment_count,
        },
        None => ReelGrowth {
            views: 0,
            likes: 0,
            comments: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn media(shortcode: &str, views: i64, age_hours: i64) -> MediaData {
        MediaData {
            shortcode: shortcode.to_string(),
            view_count: views,
            like_count: 10,
            comment_count: 2,
            is_video: true,
            video_url: None,
            display_url: None,
            duration_secs: None,
            taken_at: Some(Utc::now() - ChronoDuration::hours(age_hours)),
        }
    }

    fn reel_row(shortcode: &str, views: i64, likes: i64, comments: i64) -> ReelRow {
        ReelRow {
            id: 1,
            profile_id: 1,
            shortcode: shortcode.to_string(),
            view_count: views,
            like_count: likes,
            comment_count: comments,
            views_delta: 0,
            likes_delta: 0,
            comments_delta: 0,
            is_video: true,
            video_url: None,
            video_mirror_url: None,
            display_url: None,
            duration_secs: None,
            avg_watch_time_secs: None,
            taken_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn new_shortcodes_subtracts_the_persisted_set() {
        let fresh = new_shortcodes(&codes(&["R4", "R1", "R2"]), &codes(&["R1", "R2", "R3"]));
        assert_eq!(fresh, vec!["R4"]);
    }

    #[test]
    fn merge_unique_puts_new_sightings_first_without_duplicates() {
        let merged = merge_unique(codes(&["R4"]), codes(&["R1", "R4", "R2"]));
        assert_eq!(merged, vec!["R4", "R1", "R2"]);
    }

    #[test]
    fn working_set_keeps_the_newest_twelve() {
        let items: Vec<MediaData> = (0..15).map(|i| media(&format!("R{i}"), 0, i)).collect();
        let set = working_set(items);
        assert_eq!(set.len(), 12);
        assert_eq!(set[0].shortcode, "R0", "newest first");
        assert_eq!(set[11].shortcode, "R11", "oldest three dropped");
    }

    #[test]
    fn working_set_sorts_undated_media_last() {
        let mut undated = media("undated", 0, 0);
        undated.taken_at = None;
        let set = working_set(vec![undated, media("dated", 0, 5)]);
        assert_eq!(set[0].shortcode, "dated");
        assert_eq!(set[1].shortcode, "undated");
    }

    #[test]
    fn first_sighting_growth_is_zero() {
        let growth = reel_growth(None, &media("R4", 9000, 0));
        assert_eq!(
            growth,
            ReelGrowth {
                views: 0,
                likes: 0,
                comments: 0
            }
        );
    }

    #[test]
    fn refresh_growth_is_current_minus_prior() {
        let prior = reel_row("R1", 1000, 10, 2);
        let growth = reel_growth(Some(&prior), &media("R1", 1500, 0));
        assert_eq!(growth.views, 500);
        assert_eq!(growth.likes, 0);
        assert_eq!(growth.comments, 0);
    }

    #[test]
    fn negative_growth_is_stored_signed_but_clamped_in_totals() {
        let prior = reel_row("R1", 2000, 20, 5);
        let growth = reel_growth(Some(&prior), &media("R1", 1500, 0));
        assert_eq!(growth.views, -500, "the signed value is preserved");
        assert_eq!(growth.likes, -10);

        let mut totals = ReelTotals::default();
        totals.absorb(growth);
        totals.absorb(ReelGrowth {
            views: 300,
            likes: 1,
            comments: 0,
        });
        assert_eq!(totals.views, 300, "shrinkage never reduces the daily total");
        assert_eq!(totals.likes, 1);
        assert_eq!(totals.comments, 0);
    }
}
