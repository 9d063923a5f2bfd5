use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    db::CacheStats,
    error::{AppError, AppResult},
    services::{session_gate::AppLifecycle, settings::AiSettings},
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct LifecycleRequest {
    pub state: AppLifecycle,
}

/// Forwards a lifecycle event to the session gate
pub async fn lifecycle(
    State(state): State<AppState>,
    Json(request): Json<LifecycleRequest>,
) -> AppResult<StatusCode> {
    state
        .lifecycle_tx
        .send(request.state)
        .await
        .map_err(|_| AppError::Internal("lifecycle listener stopped".to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn update_ai_settings(
    State(state): State<AppState>,
    Json(settings): Json<AiSettings>,
) -> StatusCode {
    state.settings.replace(settings);
    StatusCode::NO_CONTENT
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

#[derive(Debug, Deserialize)]
pub struct ClearCacheParams {
    pub namespace: Option<String>,
}

/// Empties the in-process tier. The durable store is untouched.
pub async fn clear_cache(
    State(state): State<AppState>,
    Query(params): Query<ClearCacheParams>,
) -> StatusCode {
    state.cache.clear(params.namespace.as_deref());
    tracing::info!(namespace = ?params.namespace, "In-process cache cleared");
    StatusCode::NO_CONTENT
}
