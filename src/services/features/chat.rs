use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    db::TieredCache,
    error::AppError,
    models::{ChatMessage, ChatReply, ChatRole, ContentDetails, ContentRef, Fingerprint},
    services::{
        enricher::ResultEnricher,
        features::{FeatureFailure, FeatureResult, RequestGuard, Resolution},
        generation::{strip_trailing_array, GenerationClient, GenerationRequest},
    },
};

const CHAT_NAMESPACE: &str = "chat";
pub const DEFAULT_CHAT_TTL: Duration = Duration::from_secs(30 * 60);

const SYSTEM_PROMPT: &str = "You are an expert cinema assistant. Only answer questions about \
    movies, TV, actors, directors, film history and cinema; politely refuse anything else. \
    Whenever you suggest movies or TV shows, end the WHOLE response with a single JSON array on \
    the last line containing the exact title, year, type (\"movie\" or \"tv\") and \
    original_language (ISO 639-1). Format: [{\"title\": \"Title\", \"year\": \"2024\", \
    \"type\": \"movie\", \"original_language\": \"en\"}]. Never include more than one array.";

/// One chat turn request: the conversation so far, optionally about one title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatInput {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub focus: Option<ContentDetails>,
}

impl ChatInput {
    /// Identity of the conversation, used as the memoization key.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = DefaultHasher::new();
        for message in &self.messages {
            message.role.hash(&mut hasher);
            message.content.hash(&mut hasher);
        }
        if let Some(focus) = &self.focus {
            focus.id.hash(&mut hasher);
            focus.content_type.hash(&mut hasher);
        }
        Fingerprint::new(format!("{:016x}", hasher.finish()))
    }
}

/// Cinema chat.
///
/// Every message is new input, so there is no session gate and no durable
/// record. Identical conversations are answered from the in-process cache.
pub struct ChatOrchestrator {
    generator: Arc<dyn GenerationClient>,
    enricher: Arc<ResultEnricher>,
    cache: Arc<TieredCache>,
    ttl: Duration,
    guard: RequestGuard,
}

impl ChatOrchestrator {
    pub fn new(
        generator: Arc<dyn GenerationClient>,
        enricher: Arc<ResultEnricher>,
        cache: Arc<TieredCache>,
        ttl: Duration,
    ) -> Self {
        Self {
            generator,
            enricher,
            cache,
            ttl,
            guard: RequestGuard::default(),
        }
    }

    pub fn dispose(&self) {
        self.guard.dispose();
    }

    fn request(input: &ChatInput) -> GenerationRequest {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        if let Some(focus) = &input.focus {
            let year = focus.year.map(|y| format!(" ({})", y)).unwrap_or_default();
            messages.push(ChatMessage::system(format!(
                "The user is looking at the {} \"{}\"{}. Overview: {}",
                focus.content_type, focus.title, year, focus.overview
            )));
        }
        messages.extend(input.messages.iter().cloned());
        GenerationRequest::new(messages)
    }

    pub async fn resolve(&self, input: &ChatInput) -> FeatureResult<ChatReply> {
        if !input.messages.iter().any(|m| m.role == ChatRole::User) {
            return Err(FeatureFailure::new(
                AppError::InvalidInput("conversation has no user message".to_string()),
                None,
            ));
        }

        let key = input.fingerprint();
        if let Some(reply) = self.cache.get::<ChatReply>(CHAT_NAMESPACE, key.as_str()) {
            tracing::debug!(conversation = %key, "Chat reply served from cache");
            return Ok(Resolution::Cached(reply));
        }
        let generation = self.guard.begin(key.as_str());

        let text = match self.generator.generate(Self::request(input)).await {
            Ok(text) => text,
            Err(AppError::Parse(e)) => {
                tracing::warn!(error = %e, "Chat produced no usable text");
                return Ok(Resolution::Empty);
            }
            Err(e) => {
                tracing::error!(error = %e, "Chat call failed");
                return Err(FeatureFailure::new(e, None));
            }
        };

        let (reply, items) = strip_trailing_array(&text);
        let fallback_type = input.focus.as_ref().map(|f| f.content_type);
        let refs: Vec<ContentRef> = items
            .unwrap_or_default()
            .iter()
            .filter_map(|item: &Value| ContentRef::from_value(item, fallback_type))
            .collect();
        let suggestions = self.enricher.enrich_all(refs).await;

        if !self.guard.complete(key.as_str(), generation) {
            tracing::info!(conversation = %key, generation, "Chat reply superseded, discarding");
            return Ok(Resolution::Discarded);
        }

        let reply = ChatReply { reply, suggestions };
        self.cache.set(CHAT_NAMESPACE, key.as_str(), &reply, self.ttl);
        Ok(Resolution::Fresh(reply))
    }
}
