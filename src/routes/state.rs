use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    config::Config,
    db::{PersistentStore, TieredCache},
    error::AppResult,
    services::{
        enricher::ResultEnricher,
        features::{
            ChatOrchestrator, ContentAnalysisFeature, FeatureContext, FeatureOrchestrator,
            MoodRecommendationFeature, RecommendationsFeature, WatchlistInsightsFeature,
        },
        features::chat::DEFAULT_CHAT_TTL,
        generation::{GeminiClient, GroqClient, ModelRouter},
        providers::TmdbProvider,
        session_gate::{spawn_lifecycle_listener, AppLifecycle, SessionGate},
        settings::{AiSettings, RuntimeSettings},
    },
};

/// Buffered lifecycle events before senders wait
const LIFECYCLE_BUFFER: usize = 16;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommendations: Arc<FeatureOrchestrator<RecommendationsFeature>>,
    pub analysis: Arc<FeatureOrchestrator<ContentAnalysisFeature>>,
    pub insights: Arc<FeatureOrchestrator<WatchlistInsightsFeature>>,
    pub mood: Arc<FeatureOrchestrator<MoodRecommendationFeature>>,
    pub chat: Arc<ChatOrchestrator>,
    pub settings: Arc<RuntimeSettings>,
    pub cache: Arc<TieredCache>,
    pub gate: Arc<SessionGate>,
    pub lifecycle_tx: mpsc::Sender<AppLifecycle>,
}

impl AppState {
    /// Wires orchestrators over shared collaborators.
    pub fn new(
        ctx: FeatureContext,
        settings: Arc<RuntimeSettings>,
        lifecycle_tx: mpsc::Sender<AppLifecycle>,
    ) -> Self {
        let chat = ChatOrchestrator::new(
            ctx.generator.clone(),
            ctx.enricher.clone(),
            ctx.cache.clone(),
            DEFAULT_CHAT_TTL,
        );

        Self {
            recommendations: Arc::new(FeatureOrchestrator::new(RecommendationsFeature, ctx.clone())),
            analysis: Arc::new(FeatureOrchestrator::new(ContentAnalysisFeature, ctx.clone())),
            insights: Arc::new(FeatureOrchestrator::new(WatchlistInsightsFeature, ctx.clone())),
            mood: Arc::new(FeatureOrchestrator::new(MoodRecommendationFeature, ctx.clone())),
            chat: Arc::new(chat),
            settings,
            cache: ctx.cache,
            gate: ctx.gate,
            lifecycle_tx,
        }
    }

    /// Builds the production stack from configuration and starts the
    /// lifecycle listener. Must run inside a Tokio runtime.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn PersistentStore>,
    ) -> AppResult<(Self, JoinHandle<()>)> {
        let cache = Arc::new(TieredCache::new(config.memory_cache_capacity));
        let settings = Arc::new(RuntimeSettings::new(AiSettings {
            model: config.ai_model.clone(),
            api_key: config.ai_api_key.clone(),
        }));

        let gemini = GeminiClient::new(
            settings.clone(),
            config.ai_api_url.clone(),
            config.retry_policy(),
            config.http_timeout(),
        )?;
        let groq = GroqClient::new(
            settings.clone(),
            config.groq_api_url.clone(),
            config.retry_policy(),
            config.http_timeout(),
        )?;
        let generator = Arc::new(ModelRouter::new(
            settings.clone(),
            Arc::new(gemini),
            Arc::new(groq),
        ));
        let provider = Arc::new(TmdbProvider::new(
            cache.clone(),
            config.search_api_key.clone(),
            config.search_api_url.clone(),
            config.http_timeout(),
        )?);
        let enricher = Arc::new(ResultEnricher::new(
            provider,
            config.enrich_concurrency,
            config.enrich_timeout(),
        ));

        let gate = Arc::new(SessionGate::new());
        let (lifecycle_tx, lifecycle_rx) = mpsc::channel(LIFECYCLE_BUFFER);
        let listener = spawn_lifecycle_listener(gate.clone(), lifecycle_rx);

        let ctx = FeatureContext {
            store,
            cache,
            gate,
            generator,
            enricher,
        };

        tracing::info!(
            model = %config.ai_model,
            store = ctx.store.name(),
            cache_capacity = config.memory_cache_capacity,
            http_timeout_ms = config.http_timeout_ms,
            "Application state initialised"
        );
        Ok((Self::new(ctx, settings, lifecycle_tx), listener))
    }

    /// Stops every orchestrator from writing in-flight results.
    pub fn dispose(&self) {
        self.recommendations.dispose();
        self.analysis.dispose();
        self.insights.dispose();
        self.mood.dispose();
        self.chat.dispose();
    }
}
