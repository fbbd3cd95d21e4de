mod cron;
mod profiles;
mod queue;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use gramtrack_core::AppConfig;
use gramtrack_engine::{TrackError, TrackQueue};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{request_id, RequestId};
use crate::scheduler::SchedulerHandle;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub queue: Arc<TrackQueue>,
    pub config: Arc<AppConfig>,
    pub scheduler: SchedulerHandle,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &gramtrack_db::DbError) -> ApiError {
    if error.is_not_found() {
        return ApiError::new(request_id, "not_found", "record not found");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

/// Maps a terminal tracking outcome onto the error envelope. Rate limits
/// normally never reach here (the queue retries them transparently), but a
/// caller-side timeout can still observe one.
pub(super) fn map_track_error(request_id: String, error: &TrackError) -> ApiError {
    use gramtrack_scraper::ScraperError;

    match error {
        TrackError::Scraper(e) => match e {
            ScraperError::NotFound { .. } => {
                ApiError::new(request_id, "not_found", "account not found upstream")
            }
            ScraperError::RateLimited { .. } => ApiError::new(
                request_id,
                "rate_limited",
                "upstream rate limited — retry via the tracking id later",
            ),
            ScraperError::AuthFailed { .. } | ScraperError::NoCredentials { .. } => {
                ApiError::new(request_id, "unauthorized", "scraping credentials exhausted")
            }
            ScraperError::Deserialize { .. } => {
                ApiError::new(request_id, "upstream_error", "upstream response shape changed")
            }
            _ => ApiError::new(request_id, "upstream_error", "upstream fetch failed"),
        },
        TrackError::Db(e) if e.is_conflict() => {
            ApiError::new(request_id, "conflict", "tracking identity conflict")
        }
        TrackError::Db(e) => map_db_error(request_id, e),
        TrackError::Fatal(_) => {
            tracing::error!(error = %error, "tracking job failed fatally");
            ApiError::new(request_id, "internal_error", "tracking job failed")
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ]);

    Router::new()
        .route("/health", get(health))
        .route("/profiles", post(profiles::track_profile))
        .route("/profiles/{username}/refresh", post(profiles::refresh_profile))
        .route(
            "/profiles/tracking/{tracking_id}",
            get(profiles::read_tracking),
        )
        .route("/queue/status", get(queue::queue_status))
        .route("/queue/process", post(queue::process_queue))
        .route("/cron/trigger", post(cron::trigger_all))
        .route("/cron/schedule", get(cron::read_schedule))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(request_id))
                .layer(cors),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<HealthData>>, ApiError> {
    gramtrack_db::ping(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "health check db ping failed");
            ApiError::new(req_id.0.clone(), "internal_error", "database unreachable")
        })?;

    Ok(Json(ApiResponse {
        data: HealthData {
            status: "ok",
            database: "ok",
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
