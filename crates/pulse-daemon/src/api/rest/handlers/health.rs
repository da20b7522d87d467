//! Health handler

use crate::api::rest::state::AppState;
use crate::ingest::StreamHealth;
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub stream: StreamHealth,
    pub entities: usize,
    pub ingested: u64,
}

/// Health check endpoint. Reports `degraded` while the live stream is not
/// connected.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let stream = state.stream_health.borrow().clone();
    let status = if stream.is_connected() { "healthy" } else { "degraded" };

    Json(HealthCheckResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        stream,
        entities: state.engine.entity_count(),
        ingested: state.engine.ingested(),
    })
}
