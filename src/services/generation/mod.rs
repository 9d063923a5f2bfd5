/// Generative text endpoint abstraction
///
/// Features talk to the endpoint through `GenerationClient` so the transport,
/// retry policy and credentials stay out of feature logic. The loose JSON
/// extractor lives here too since every feature parses generated text the
/// same way.
use crate::{error::AppResult, models::ChatMessage};

pub mod extract;
pub mod gemini;
pub mod groq;
pub mod retry;
pub mod router;

pub use extract::{extract_json, strip_trailing_array, Shape};
pub use gemini::GeminiClient;
pub use groq::GroqClient;
pub use retry::RetryPolicy;
pub use router::ModelRouter;

/// One generation call: an ordered conversation, system turns included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// A system instruction followed by a single user turn.
    pub fn prompt(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
    }
}

/// Trait for generative text endpoints
///
/// Implementations own credentials and retries. Errors are already
/// classified: `Config` and `Client` are terminal, `TransientNetwork` means
/// retries ran out, and a `Parse` error means no usable text came back.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> AppResult<String>;

    /// Client name for logging
    fn name(&self) -> &'static str;
}
