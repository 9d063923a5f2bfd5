pub mod enricher;
pub mod features;
pub mod generation;
pub mod hasher;
pub mod providers;
pub mod session_gate;
pub mod settings;

pub use enricher::ResultEnricher;
pub use features::{
    ChatInput, ChatOrchestrator, ContentAnalysisFeature, FeatureContext, FeatureOrchestrator,
    RecommendationsFeature, Resolution, Source, WatchlistInsightsFeature,
};
pub use generation::{GeminiClient, GenerationClient};
pub use hasher::ContentHasher;
pub use providers::{SearchProvider, TmdbProvider};
pub use session_gate::{spawn_lifecycle_listener, AppLifecycle, SessionGate};
pub use settings::{AiSettings, RuntimeSettings, SettingsProvider};
