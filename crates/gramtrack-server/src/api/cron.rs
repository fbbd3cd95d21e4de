//! Manual scheduler endpoints: the enqueue-all trigger and the schedule
//! diagnostic.

use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::middleware::RequestId;
use crate::scheduler;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(in crate::api) struct TriggerResult {
    pub enqueued: usize,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct ScheduleInfo {
    pub timezone: String,
    pub daily_cron: String,
    pub refresh_cron: Option<String>,
    pub next_daily_fire: Option<DateTime<Utc>>,
    pub next_refresh_fire: Option<DateTime<Utc>>,
}

/// `POST /cron/trigger` — enqueue a non-immediate job for every tracked
/// profile, equivalent to the daily tick.
pub(in crate::api) async fn trigger_all(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<TriggerResult>>, ApiError> {
    let enqueued = scheduler::enqueue_all_profiles(&state.pool, &state.queue)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: TriggerResult { enqueued },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// `GET /cron/schedule` — configured schedules plus next firing times.
pub(in crate::api) async fn read_schedule(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<ScheduleInfo>> {
    let (next_daily_fire, next_refresh_fire) = state.scheduler.next_fire_times().await;

    Json(ApiResponse {
        data: ScheduleInfo {
            timezone: state.config.timezone.to_string(),
            daily_cron: state.config.daily_cron.clone(),
            refresh_cron: state.config.refresh_cron.clone(),
            next_daily_fire,
            next_refresh_fire,
        },
        meta: ResponseMeta::new(req_id.0),
    })
}
