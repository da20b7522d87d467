//! Entity and leaderboard handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use pulse_engine::LeaderboardEntry;
use serde::{Deserialize, Serialize};

const DEFAULT_LEADERBOARD_SIZE: usize = 5;
const MAX_LEADERBOARD_SIZE: usize = 1000;

/// Activity summary for one entity
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityResponse {
    pub title: String,
    pub edit_count: u64,
    pub byte_volume: u64,
    pub spiking: bool,
}

/// Query parameters for leaderboards
#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub n: Option<usize>,
}

impl LeaderboardQuery {
    fn size(&self) -> ApiResult<usize> {
        match self.n.unwrap_or(DEFAULT_LEADERBOARD_SIZE) {
            0 => Err(ApiError::BadRequest("n must be > 0".into())),
            n => Ok(n.min(MAX_LEADERBOARD_SIZE)),
        }
    }
}

/// Totals and spike status for one entity. Unknown entities report zeros.
pub async fn get_entity(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> Json<EntityResponse> {
    let engine = &state.engine;
    Json(EntityResponse {
        edit_count: engine.edit_count(&title),
        byte_volume: engine.byte_volume(&title),
        spiking: engine.is_spiking(&title),
        title,
    })
}

/// Entities with the most edits
pub async fn leaderboard_by_edits(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    Ok(Json(state.engine.top_by_edit_count(query.size()?)))
}

/// Entities with the largest byte volume
pub async fn leaderboard_by_bytes(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    Ok(Json(state.engine.top_by_byte_volume(query.size()?)))
}
