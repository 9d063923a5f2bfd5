use serde::Deserialize;
use std::time::Duration;

use crate::services::generation::RetryPolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Redis connection URL for the durable tier; in-memory store when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Generative AI API key. Optional at startup: a missing key surfaces as a
    /// configuration error on the first feature request.
    #[serde(default)]
    pub ai_api_key: Option<String>,

    /// Generative AI model name
    #[serde(default = "default_ai_model")]
    pub ai_model: String,

    /// Generative AI API base URL
    #[serde(default = "default_ai_api_url")]
    pub ai_api_url: String,

    /// Groq chat-completions URL, used when the selected model is not a Gemini model
    #[serde(default = "default_groq_api_url")]
    pub groq_api_url: String,

    /// Whole-request timeout for every outbound HTTP call, in milliseconds
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Secondary search (TMDB) API key
    #[serde(default)]
    pub search_api_key: String,

    /// Secondary search (TMDB) API base URL
    #[serde(default = "default_search_api_url")]
    pub search_api_url: String,

    /// Capacity of the in-process cache tier
    #[serde(default = "default_memory_cache_capacity")]
    pub memory_cache_capacity: usize,

    /// Retries after the first generation attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base delay in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound (exclusive) of the random jitter added to each backoff
    #[serde(default = "default_backoff_jitter_ms")]
    pub backoff_jitter_ms: u64,

    /// Concurrent secondary-search lookups during enrichment
    #[serde(default = "default_enrich_concurrency")]
    pub enrich_concurrency: usize,

    /// Per-lookup enrichment timeout in milliseconds
    #[serde(default = "default_enrich_timeout_ms")]
    pub enrich_timeout_ms: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_ai_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_ai_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_groq_api_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

fn default_search_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_memory_cache_capacity() -> usize {
    100
}

fn default_max_retries() -> u32 {
    4
}

fn default_backoff_base_ms() -> u64 {
    600
}

fn default_backoff_jitter_ms() -> u64 {
    250
}

fn default_enrich_concurrency() -> usize {
    4
}

fn default_enrich_timeout_ms() -> u64 {
    8_000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_jitter: Duration::from_millis(self.backoff_jitter_ms),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn enrich_timeout(&self) -> Duration {
        Duration::from_millis(self.enrich_timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
