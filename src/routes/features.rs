use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::StoreKey,
    error::AppResult,
    models::{
        ChatReply, ContentAnalysis, ContentDetails, EnrichedContent, HistoryItem, MoodInput,
        MoodPick, WatchlistInsights, WatchlistItem,
    },
    services::features::{ChatInput, FeatureFailure, FeatureResult, Source},
};

use super::AppState;

/// Body shared by every feature response
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub source: Source,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Feature outcome rendered as an HTTP response.
///
/// A failure that still has stale data answers 200 with the error attached;
/// any other failure answers with the error's own status.
pub struct FeatureResponse<T>(pub FeatureResult<T>);

impl<T: Serialize> IntoResponse for FeatureResponse<T> {
    fn into_response(self) -> Response {
        match self.0 {
            Ok(resolution) => Json(Envelope {
                source: resolution.source(),
                data: resolution.into_data(),
                error: None,
            })
            .into_response(),
            Err(FeatureFailure {
                error,
                stale: Some(data),
            }) => Json(Envelope {
                source: Source::Stale,
                data: Some(data),
                error: Some(error.to_string()),
            })
            .into_response(),
            Err(FeatureFailure { error, stale: None }) => error.into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecommendationsRequest {
    /// Most recent first
    pub history: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
pub struct InsightsRequest {
    pub items: Vec<WatchlistItem>,
}

pub async fn recommendations(
    State(state): State<AppState>,
    Json(request): Json<RecommendationsRequest>,
) -> FeatureResponse<Vec<EnrichedContent>> {
    FeatureResponse(state.recommendations.resolve(&request.history).await)
}

pub async fn mood_recommendation(
    State(state): State<AppState>,
    Json(input): Json<MoodInput>,
) -> FeatureResponse<MoodPick> {
    FeatureResponse(state.mood.resolve(&input).await)
}

pub async fn analysis(
    State(state): State<AppState>,
    Json(details): Json<ContentDetails>,
) -> FeatureResponse<ContentAnalysis> {
    FeatureResponse(state.analysis.resolve(&details).await)
}

pub async fn watchlist_insights(
    State(state): State<AppState>,
    Json(request): Json<InsightsRequest>,
) -> FeatureResponse<WatchlistInsights> {
    FeatureResponse(state.insights.resolve(&request.items).await)
}

/// Clears stored insights so the next request recomputes them
pub async fn clear_watchlist_insights(State(state): State<AppState>) -> AppResult<StatusCode> {
    state.insights.forget(&StoreKey::WatchlistInsights).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn chat(
    State(state): State<AppState>,
    Json(input): Json<ChatInput>,
) -> FeatureResponse<ChatReply> {
    FeatureResponse(state.chat.resolve(&input).await)
}
