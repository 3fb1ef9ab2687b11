//! Liveness endpoint.

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use crate::server::AppState;

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Always `"ok"` while the server is answering
    pub status: &'static str,
    /// Live entries in the session cache
    pub active_sessions: usize,
    /// Seconds since the server started
    pub uptime_seconds: u64,
}

/// Reports liveness and cache occupancy.
pub async fn api_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        active_sessions: state.cache().len(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}
