/// Gemini `generateContent` client
///
/// Request flow:
/// 1. Read current settings; a blank key fails fast with `AppError::Config`
/// 2. POST `{api_url}/models/{model}:generateContent?key=...`
/// 3. Retry 5xx and network failures per `RetryPolicy`
/// 4. Return the first candidate's first text part
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult, ParseError},
    models::{ChatMessage, ChatRole},
    services::{
        generation::{GenerationClient, GenerationRequest, RetryPolicy},
        settings::SettingsProvider,
    },
};

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

impl GeminiRequest {
    /// System turns are merged into one instruction; `assistant` maps to `model`.
    fn from_messages(messages: &[ChatMessage]) -> Self {
        let system_text: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let system_instruction = (!system_text.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: Some(system_text.join("\n\n")),
            }],
        });

        let contents = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| GeminiContent {
                role: Some(
                    match m.role {
                        ChatRole::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: Some(m.content.clone()),
                }],
            })
            .collect();

        Self {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_k: 40,
                top_p: 0.95,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        }
    }
}

pub struct GeminiClient {
    http_client: HttpClient,
    settings: Arc<dyn SettingsProvider>,
    api_url: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    /// `timeout` bounds each attempt, so a stalled upstream counts as a
    /// transient failure and goes through the retry policy.
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        api_url: String,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            http_client: HttpClient::builder().timeout(timeout).build()?,
            settings,
            api_url: api_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn send_once(&self, url: &str, api_key: &str, body: &GeminiRequest) -> AppResult<String> {
        let response = self
            .http_client
            .post(url)
            .query(&[("key", api_key)])
            .json(body)
            .send()
            .await
            .map_err(AppError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status(status, body));
        }

        let parsed: GeminiResponse = response.json().await.map_err(AppError::from_transport)?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or(AppError::Parse(ParseError::EmptyText))
    }
}

#[async_trait::async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> AppResult<String> {
        let settings = self.settings.get_settings().await?;
        let Some(api_key) = settings.usable_key() else {
            tracing::error!("Missing AI API key, add one in AI settings");
            return Err(AppError::Config(
                "No API key configured. Add one in AI settings".to_string(),
            ));
        };

        let model = settings.model_or_default();
        let url = format!("{}/models/{}:generateContent", self.api_url, model);
        let body = GeminiRequest::from_messages(&request.messages);

        tracing::info!(model, turns = body.contents.len(), "Calling generation endpoint");
        let text = self
            .retry
            .run("gemini", || self.send_once(&url, api_key, &body))
            .await?;
        tracing::info!(model, chars = text.len(), "Generation succeeded");

        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
