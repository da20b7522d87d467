//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Buckets
        .route("/buckets", get(handlers::list_granularities))
        .route("/buckets/:granularity", get(handlers::top_entities))
        // Entities
        .route("/entities/:title", get(handlers::get_entity))
        // Spikes
        .route("/spikes/active", get(handlers::active_spikes))
        // Leaderboards
        .route("/leaderboard/edits", get(handlers::leaderboard_by_edits))
        .route("/leaderboard/bytes", get(handlers::leaderboard_by_bytes))
        // Notifications
        .route("/dispatcher", get(handlers::dispatcher_stats));

    // Build router with middleware
    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
