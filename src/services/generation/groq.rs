/// Groq chat-completions client
///
/// OpenAI-style body with bearer auth. Compound models get the server-side
/// tool set and a normalized model name. The reply text is
/// `choices[0].message.content`.
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

const COMPOUND_TOOLS: [&str; 3] = ["web_search", "code_interpreter", "visit_website"];

#[derive(Debug, Serialize)]
struct GroqRequest<'a> {
    model: String,
    messages: Vec<GroqMessage<'a>>,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    compound_custom: Option<CompoundCustom>,
}

#[derive(Debug, Serialize)]
struct GroqMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompoundCustom {
    tools: CompoundTools,
}

#[derive(Debug, Serialize)]
struct CompoundTools {
    enabled_tools: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GroqResponse {
    #[serde(default)]
    choices: Vec<GroqChoice>,
}

#[derive(Debug, Deserialize)]
struct GroqChoice {
    message: Option<GroqReply>,
}

#[derive(Debug, Deserialize)]
struct GroqReply {
    content: Option<String>,
}

impl<'a> GroqRequest<'a> {
    fn new(model: &str, messages: &'a [ChatMessage]) -> Self {
        let compound = model.contains("compound");
        let model = match (compound, model.contains("mini")) {
            (true, true) => "groq/compound-mini".to_string(),
            (true, false) => "groq/compound".to_string(),
            (false, _) => model.to_string(),
        };

        Self {
            model,
            messages: messages
                .iter()
                .map(|m| GroqMessage {
                    role: match m.role {
                        ChatRole::System => "system",
                        ChatRole::User => "user",
                        ChatRole::Assistant => "assistant",
                    },
                    content: &m.content,
                })
                .collect(),
            temperature: 1.0,
            top_p: 1.0,
            compound_custom: compound.then(|| CompoundCustom {
                tools: CompoundTools {
                    enabled_tools: COMPOUND_TOOLS.to_vec(),
                },
            }),
        }
    }
}

pub struct GroqClient {
    http_client: HttpClient,
    settings: Arc<dyn SettingsProvider>,
    api_url: String,
    retry: RetryPolicy,
}

impl GroqClient {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        api_url: String,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            http_client: HttpClient::builder().timeout(timeout).build()?,
            settings,
            api_url,
            retry,
        })
    }

    async fn send_once(&self, api_key: &str, body: &GroqRequest<'_>) -> AppResult<String> {
        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(AppError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status(status, body));
        }

        let parsed: GroqResponse = response.json().await.map_err(AppError::from_transport)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(AppError::Parse(ParseError::EmptyText))
    }
}

#[async_trait::async_trait]
impl GenerationClient for GroqClient {
    async fn generate(&self, request: GenerationRequest) -> AppResult<String> {
        let settings = self.settings.get_settings().await?;
        let Some(api_key) = settings.usable_key() else {
            tracing::error!("Missing Groq API key, add one in AI settings");
            return Err(AppError::Config(
                "NO_API_KEY: Please set your Groq API key in AI Settings".to_string(),
            ));
        };

        let body = GroqRequest::new(settings.model_or_default(), &request.messages);
        tracing::info!(model = %body.model, turns = body.messages.len(), "Calling Groq");
        let text = self
            .retry
            .run("groq", || self.send_once(api_key, &body))
            .await?;
        tracing::info!(model = %body.model, chars = text.len(), "Groq generation succeeded");

        Ok(text)
    }

    fn name(&self) -> &'static str {
        "groq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::settings::{AiSettings, RuntimeSettings};
    use axum::{
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings(model: &str, key: Option<&str>) -> Arc<dyn SettingsProvider> {
        Arc::new(RuntimeSettings::new(AiSettings {
            model: model.to_string(),
            api_key: key.map(str::to_string),
        }))
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 4,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/openai/v1/chat/completions", addr)
    }

    #[test]
    fn test_request_keeps_roles_and_plain_models() {
        let messages = vec![ChatMessage::system("Be brief."), ChatMessage::user("Hi")];
        let body = serde_json::to_value(GroqRequest::new("llama-3.3-70b-versatile", &messages)).unwrap();

        assert_eq!(body["model"], "llama-3.3-70b-versatile");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hi");
        assert_eq!(body["temperature"], 1.0);
        assert!(body.get("compound_custom").is_none());
    }

    #[test]
    fn test_compound_models_get_tools() {
        let messages = vec![ChatMessage::user("Hi")];
        let body = serde_json::to_value(GroqRequest::new("compound-mini", &messages)).unwrap();

        assert_eq!(body["model"], "groq/compound-mini");
        assert_eq!(
            body["compound_custom"]["tools"]["enabled_tools"],
            json!(["web_search", "code_interpreter", "visit_website"])
        );
    }

    #[tokio::test]
    async fn test_success_uses_bearer_auth_and_first_choice() {
        let router = Router::new().route(
            "/openai/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer groq-key");
                assert_eq!(body["model"], "groq/compound");
                Json(json!({"choices": [{"message": {"role": "assistant", "content": "[]"}}]}))
            }),
        );
        let url = serve(router).await;
        let client =
            GroqClient::new(settings("groq/compound", Some("groq-key")), url, fast_retry(), Duration::from_secs(5))
                .unwrap();

        let text = client.generate(GenerationRequest::prompt("s", "u")).await.unwrap();
        assert_eq!(text, "[]");
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/openai/v1/chat/completions",
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::BAD_GATEWAY, "busy").into_response()
                    } else {
                        Json(json!({"choices": [{"message": {"content": "ok"}}]})).into_response()
                    }
                }
            }),
        );
        let url = serve(router).await;
        let client =
            GroqClient::new(settings("llama", Some("k")), url, fast_retry(), Duration::from_secs(5)).unwrap();

        let text = client.generate(GenerationRequest::prompt("s", "u")).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_content_is_parse_error() {
        let router = Router::new().route(
            "/openai/v1/chat/completions",
            post(|| async { Json(json!({"choices": [{"message": {"content": null}}]})) }),
        );
        let url = serve(router).await;
        let client =
            GroqClient::new(settings("llama", Some("k")), url, fast_retry(), Duration::from_secs(5)).unwrap();

        let result = client.generate(GenerationRequest::prompt("s", "u")).await;
        assert!(matches!(result, Err(AppError::Parse(ParseError::EmptyText))));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let client = GroqClient::new(
            settings("llama", None),
            "http://127.0.0.1:9".to_string(),
            fast_retry(),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = client.generate(GenerationRequest::prompt("s", "u")).await;
        match result {
            Err(AppError::Config(message)) => assert!(message.contains("NO_API_KEY")),
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }
}
