use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::error::AppResult;

/// Model used when settings leave it empty
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Generation backend a model name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Gemini,
    Groq,
}

/// User-controlled generation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSettings {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl AiSettings {
    /// The configured model, or the default when blank.
    pub fn model_or_default(&self) -> &str {
        let model = self.model.trim();
        if model.is_empty() {
            DEFAULT_MODEL
        } else {
            model
        }
    }

    /// `gemini*` models go to Gemini. Every other name (`llama-*`,
    /// `groq/compound`, `openai/gpt-oss-*`, ...) is served by Groq.
    pub fn backend(&self) -> Backend {
        if self.model_or_default().to_ascii_lowercase().starts_with("gemini") {
            Backend::Gemini
        } else {
            Backend::Groq
        }
    }

    /// The API key when present and non-blank.
    pub fn usable_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Source of the current generation settings
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn get_settings(&self) -> AppResult<AiSettings>;
}

/// Settings held in memory and replaceable at runtime
#[derive(Debug)]
pub struct RuntimeSettings {
    current: RwLock<AiSettings>,
}

impl RuntimeSettings {
    pub fn new(initial: AiSettings) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn replace(&self, settings: AiSettings) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = settings;
        tracing::info!(
            model = current.model_or_default(),
            has_key = current.usable_key().is_some(),
            "AI settings replaced"
        );
    }
}

#[async_trait::async_trait]
impl SettingsProvider for RuntimeSettings {
    async fn get_settings(&self) -> AppResult<AiSettings> {
        let current = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_model_falls_back() {
        let settings = AiSettings {
            model: "  ".to_string(),
            api_key: None,
        };
        assert_eq!(settings.model_or_default(), DEFAULT_MODEL);
    }

    #[test]
    fn test_backend_follows_model_name() {
        let with_model = |model: &str| AiSettings {
            model: model.to_string(),
            api_key: None,
        };
        assert_eq!(with_model("").backend(), Backend::Gemini);
        assert_eq!(with_model("Gemini-2.5-pro").backend(), Backend::Gemini);
        assert_eq!(with_model("groq/compound").backend(), Backend::Groq);
        assert_eq!(with_model("llama-3.3-70b-versatile").backend(), Backend::Groq);
    }

    #[test]
    fn test_blank_key_is_unusable() {
        let settings = AiSettings {
            model: String::new(),
            api_key: Some("   ".to_string()),
        };
        assert_eq!(settings.usable_key(), None);
    }

    #[tokio::test]
    async fn test_replace_is_visible_to_readers() {
        let settings = RuntimeSettings::new(AiSettings {
            model: String::new(),
            api_key: None,
        });
        settings.replace(AiSettings {
            model: "gemini-2.0-pro".to_string(),
            api_key: Some("k".to_string()),
        });

        let current = settings.get_settings().await.unwrap();
        assert_eq!(current.model_or_default(), "gemini-2.0-pro");
        assert_eq!(current.usable_key(), Some("k"));
    }
}
