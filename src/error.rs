use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failure to pull a usable payload out of generated text.
///
/// Always recovered locally: a feature that hits one returns an empty result.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("generated text was empty")]
    EmptyText,

    #[error("no JSON {0} found in generated text")]
    NoJson(&'static str),

    #[error("JSON payload did not match the expected shape: {0}")]
    Shape(String),
}

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Missing or empty credential. Never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// 5xx from upstream, or a timeout / reset on the wire.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// 4xx from upstream. Never retried.
    #[error("Upstream rejected request with status {status}: {body}")]
    Client { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Classifies a non-success upstream status.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status.is_server_error() {
            AppError::TransientNetwork(format!("HTTP {}: {}", status.as_u16(), body))
        } else {
            AppError::Client {
                status: status.as_u16(),
                body,
            }
        }
    }

    /// Classifies a transport failure. Timeouts and refused or reset
    /// connections are transient; anything else stays a client error.
    pub fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            AppError::TransientNetwork(error.to_string())
        } else {
            AppError::HttpClient(error)
        }
    }

    /// Whether the retry loop may attempt the call again.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::TransientNetwork(_) => true,
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Config(msg) => (StatusCode::PRECONDITION_FAILED, msg.clone()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::TransientNetwork(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::Client { .. } | AppError::HttpClient(_) => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AppError::Parse(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::Cache(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
