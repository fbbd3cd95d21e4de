//! Queue diagnostics and the manual dispatcher kick.

use axum::{extract::State, Extension, Json};
use gramtrack_engine::QueueStatus;
use serde::Serialize;

use crate::middleware::RequestId;

use super::{ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(in crate::api) struct ProcessAck {
    pub kicked: bool,
}

/// `GET /queue/status`
pub(in crate::api) async fn queue_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<QueueStatus>> {
    Json(ApiResponse {
        data: state.queue.status(),
        meta: ResponseMeta::new(req_id.0),
    })
}

/// `POST /queue/process` — wake the dispatcher. Spacing still applies, so
/// this only helps when the queue fell idle with work pending.
pub(in crate::api) async fn process_queue(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<ProcessAck>> {
    state.queue.process_now();
    Json(ApiResponse {
        data: ProcessAck { kicked: true },
        meta: ResponseMeta::new(req_id.0),
    })
}
