use std::sync::Arc;

use crate::{
    error::AppResult,
    services::{
        generation::{GenerationClient, GenerationRequest},
        settings::{Backend, SettingsProvider},
    },
};

/// Sends each request to the backend serving the currently selected model.
///
/// The choice is made per call, so a settings change applies to the next
/// request without rebuilding any orchestrator.
pub struct ModelRouter {
    settings: Arc<dyn SettingsProvider>,
    gemini: Arc<dyn GenerationClient>,
    groq: Arc<dyn GenerationClient>,
}

impl ModelRouter {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        gemini: Arc<dyn GenerationClient>,
        groq: Arc<dyn GenerationClient>,
    ) -> Self {
        Self {
            settings,
            gemini,
            groq,
        }
    }
}

#[async_trait::async_trait]
impl GenerationClient for ModelRouter {
    async fn generate(&self, request: GenerationRequest) -> AppResult<String> {
        let client = match self.settings.get_settings().await?.backend() {
            Backend::Gemini => &self.gemini,
            Backend::Groq => &self.groq,
        };
        tracing::debug!(backend = client.name(), "Routing generation request");
        client.generate(request).await
    }

    fn name(&self) -> &'static str {
        "router"
    }
}
