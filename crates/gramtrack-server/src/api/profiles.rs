//! Profile tracking endpoints: register/refresh trackings and session-scoped
//! reads by tracking id.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use gramtrack_core::Platform;
use gramtrack_db::{DailyMetricRow, DeltaRow, ProfileRow, SnapshotRow};
use gramtrack_engine::JobTarget;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, map_track_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(in crate::api) struct TrackRequest {
    username: String,
    #[serde(default)]
    platform: Option<Platform>,
    #[serde(default)]
    tracking_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct ProfileBody {
    pub id: i64,
    pub platform: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub biography: Option<String>,
    pub external_url: Option<String>,
    pub tracking_id: String,
    pub followers: i64,
    pub following: i64,
    pub media_count: i64,
    pub reel_count: i64,
    pub tracked_since: DateTime<Utc>,
    pub session_opened_at: DateTime<Utc>,
}

impl From<ProfileRow> for ProfileBody {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            platform: row.platform,
            username: row.username,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            biography: row.biography,
            external_url: row.external_url,
            tracking_id: row.tracking_id,
            followers: row.followers,
            following: row.following,
            media_count: row.media_count,
            reel_count: row.reel_count,
            tracked_since: row.created_at,
            session_opened_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct SnapshotBody {
    pub id: i64,
    pub followers: i64,
    pub following: i64,
    pub media_count: i64,
    pub reel_count: i64,
    pub captured_at: DateTime<Utc>,
}

impl From<&SnapshotRow> for SnapshotBody {
    fn from(row: &SnapshotRow) -> Self {
        Self {
            id: row.id,
            followers: row.followers,
            following: row.following,
            media_count: row.media_count,
            reel_count: row.reel_count,
            captured_at: row.captured_at,
        }
    }
}

/// Growth figures for the session read, synthesized from whichever record is
/// fresher: today's materialized daily row or the latest delta row.
#[derive(Debug, Serialize)]
pub(in crate::api) struct GrowthBody {
    pub source: &'static str,
    pub followers: i64,
    pub following: i64,
    pub media: i64,
    pub reels: i64,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct TrackingReadBody {
    pub profile: ProfileBody,
    pub snapshot: Option<SnapshotBody>,
    pub growth: Option<GrowthBody>,
}

/// `POST /profiles` — enqueue an immediate tracking job and wait for it.
///
/// The response carries the resolved tracking id: callers that lose the
/// HTTP response (rate-limit waits can outlive it) read back via
/// `GET /profiles/tracking/{tracking_id}`.
pub(in crate::api) async fn track_profile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(request): Json<TrackRequest>,
) -> Result<Json<ApiResponse<ProfileBody>>, ApiError> {
    let username = request.username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "username must not be empty",
        ));
    }

    let target = JobTarget {
        platform: request.platform.unwrap_or(Platform::Instagram),
        username,
    };
    let handle = state
        .queue
        .add(target, true, request.tracking_id, request.user_id);

    let outcome = handle
        .wait()
        .await
        .map_err(|e| map_track_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: ProfileBody::from(outcome.profile),
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct RefreshParams {
    #[serde(default)]
    platform: Option<Platform>,
}

/// `POST /profiles/{username}/refresh` — immediate re-track without opening
/// a new session.
pub(in crate::api) async fn refresh_profile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(username): Path<String>,
    axum::extract::Query(params): axum::extract::Query<RefreshParams>,
) -> Result<Json<ApiResponse<ProfileBody>>, ApiError> {
    let target = JobTarget {
        platform: params.platform.unwrap_or(Platform::Instagram),
        username,
    };
    let handle = state.queue.add(target, true, None, None);

    let outcome = handle
        .wait()
        .await
        .map_err(|e| map_track_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: ProfileBody::from(outcome.profile),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// `GET /profiles/tracking/{tracking_id}` — session-scoped read: only rows
/// captured at or after the session boundary are visible.
pub(in crate::api) async fn read_tracking(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(tracking_id): Path<String>,
) -> Result<Json<ApiResponse<TrackingReadBody>>, ApiError> {
    let profile = gramtrack_db::get_profile_by_tracking_id(&state.pool, &tracking_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "unknown tracking id"))?;

    let session_start = profile.session_start();
    let (snapshot, delta, daily) = tokio::try_join!(
        gramtrack_db::latest_snapshot_since(&state.pool, profile.id, session_start),
        gramtrack_db::latest_delta_since(&state.pool, profile.id, session_start),
        gramtrack_db::latest_daily_metric_since(&state.pool, profile.id, session_start),
    )
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let growth = synthesize_growth(delta.as_ref(), daily.as_ref());

    Ok(Json(ApiResponse {
        data: TrackingReadBody {
            profile: ProfileBody::from(profile),
            snapshot: snapshot.as_ref().map(SnapshotBody::from),
            growth,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Prefer the materialized daily row when it is fresher than the latest
/// delta; reel aggregates only exist on the daily row.
fn synthesize_growth(delta: Option<&DeltaRow>, daily: Option<&DailyMetricRow>) -> Option<GrowthBody> {
    match (delta, daily) {
        (Some(d), Some(m)) => {
            if m.updated_at >= d.computed_at {
                Some(growth_from_daily(m))
            } else {
                Some(growth_from_delta(d))
            }
        }
        (None, Some(m)) => Some(growth_from_daily(m)),
        (Some(d), None) => Some(growth_from_delta(d)),
        (None, None) => None,
    }
}

fn growth_from_daily(m: &DailyMetricRow) -> GrowthBody {
    GrowthBody {
        source: "daily_metric",
        followers: m.followers_delta,
        following: m.following_delta,
        media: m.media_delta,
        reels: m.reel_delta,
        views: m.views_delta,
        likes: m.likes_delta,
        comments: m.comments_delta,
        as_of: m.updated_at,
    }
}

fn growth_from_delta(d: &DeltaRow) -> GrowthBody {
    GrowthBody {
        source: "delta",
        followers: d.followers_diff,
        following: d.following_diff,
        media: d.media_diff,
        reels: d.reel_diff,
        views: 0,
        likes: 0,
        comments: 0,
        as_of: d.computed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(computed_at: DateTime<Utc>, followers: i64) -> DeltaRow {
        DeltaRow {
            id: 1,
            profile_id: 1,
            base_snapshot_id: 1,
            compare_snapshot_id: 2,
            followers_diff: followers,
            following_diff: 0,
            media_diff: 0,
            reel_diff: 0,
            computed_at,
        }
    }

    fn daily(updated_at: DateTime<Utc>, followers_delta: i64, views_delta: i64) -> DailyMetricRow {
        DailyMetricRow {
            id: 1,
            profile_id: 1,
            metric_date: updated_at.date_naive(),
            followers_open: 100,
            followers_close: 100 + followers_delta,
            followers_delta,
            following_open: 50,
            following_close: 50,
            following_delta: 0,
            media_open: 10,
            media_close: 10,
            media_delta: 0,
            reel_open: 3,
            reel_close: 3,
            reel_delta: 0,
            views_delta,
            likes_delta: 0,
            comments_delta: 0,
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn fresher_daily_metric_wins_over_older_delta() {
        let old = Utc::now() - chrono::Duration::minutes(10);
        let now = Utc::now();
        let growth =
            synthesize_growth(Some(&delta(old, 3)), Some(&daily(now, 7, 500))).expect("growth");
        assert_eq!(growth.source, "daily_metric");
        assert_eq!(growth.followers, 7);
        assert_eq!(growth.views, 500);
    }

    #[test]
    fn fresher_delta_wins_over_stale_daily_metric() {
        let old = Utc::now() - chrono::Duration::minutes(10);
        let now = Utc::now();
        let growth =
            synthesize_growth(Some(&delta(now, 3)), Some(&daily(old, 7, 500))).expect("growth");
        assert_eq!(growth.source, "delta");
        assert_eq!(growth.followers, 3);
        assert_eq!(growth.views, 0, "delta rows carry no reel aggregates");
    }

    #[test]
    fn either_record_alone_is_enough() {
        let now = Utc::now();
        assert_eq!(
            synthesize_growth(None, Some(&daily(now, 7, 0))).map(|g| g.source),
            Some("daily_metric")
        );
        assert_eq!(
            synthesize_growth(Some(&delta(now, 3)), None).map(|g| g.source),
            Some("delta")
        );
        assert!(synthesize_growth(None, None).is_none());
    }
}
