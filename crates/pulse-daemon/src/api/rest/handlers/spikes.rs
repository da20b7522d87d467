//! Spike and dispatcher handlers

use crate::api::rest::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use pulse_engine::{ActiveSpike, DispatcherStats};
use serde::Deserialize;

/// Query parameters for active spikes
#[derive(Debug, Deserialize)]
pub struct ActiveSpikesQuery {
    pub limit: Option<usize>,
}

/// Currently spiking entities, most recently edited first
pub async fn active_spikes(
    State(state): State<AppState>,
    Query(query): Query<ActiveSpikesQuery>,
) -> Json<Vec<ActiveSpike>> {
    let mut spikes = state.engine.active_spikes();
    if let Some(limit) = query.limit {
        spikes.truncate(limit);
    }
    Json(spikes)
}

/// Notification queue counters
pub async fn dispatcher_stats(State(state): State<AppState>) -> Json<DispatcherStats> {
    Json(state.engine.dispatcher().stats())
}
