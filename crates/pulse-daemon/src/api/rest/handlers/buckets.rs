//! Time-bucket handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use pulse_engine::TimeBucket;
use pulse_types::Granularity;
use serde::Deserialize;

/// Query parameters for bucket listings
#[derive(Debug, Deserialize)]
pub struct TopEntitiesQuery {
    /// Entities kept per window; all when absent
    pub k: Option<usize>,
}

/// List configured granularities
pub async fn list_granularities(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(
        state
            .engine
            .granularities()
            .iter()
            .map(Granularity::to_string)
            .collect(),
    )
}

/// Buckets of one granularity, top `k` entities per window
pub async fn top_entities(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Query(query): Query<TopEntitiesQuery>,
) -> ApiResult<Json<Vec<TimeBucket>>> {
    let granularity: Granularity = label
        .parse()
        .map_err(|e: pulse_types::GranularityParseError| ApiError::BadRequest(e.to_string()))?;
    if !state.engine.granularities().contains(&granularity) {
        return Err(ApiError::NotFound(format!(
            "granularity {granularity} is not configured"
        )));
    }
    if query.k == Some(0) {
        return Err(ApiError::BadRequest("k must be > 0".into()));
    }

    Ok(Json(state.engine.top_entities(granularity, query.k)))
}
