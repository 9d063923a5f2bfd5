use axum::{
    http::StatusCode,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{make_span_with_request_id, request_id_middleware};

pub mod features;
pub mod session;
pub mod state;

pub use state::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/recommendations", post(features::recommendations))
        .route("/recommendations/mood", post(features::mood_recommendation))
        .route("/analysis", post(features::analysis))
        .route(
            "/watchlist/insights",
            post(features::watchlist_insights).delete(features::clear_watchlist_insights),
        )
        .route("/chat", post(features::chat))
        .route("/session/lifecycle", post(session::lifecycle))
        .route("/settings/ai", put(session::update_ai_settings))
        .route("/cache/stats", get(session::cache_stats))
        .route("/cache", delete(session::clear_cache))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
