//! Language-model gateway
//!
//! One text-in/text-out operation over heterogeneous providers. Each
//! provider is a small adapter behind `LlmProvider`; the `Gateway` owns the
//! adapters, their session state and the retry policy.
//!
//! Safety guarantees:
//! - Model output is text only, never executed directly
//! - Nothing is sent anywhere unless a provider is configured

pub mod gateway;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProviderDescriptor, ProviderKind};
use crate::outcome::ErrorKind;

pub use gateway::{Gateway, ProviderState};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use scripted::ScriptedProvider;

/// Logical request, independent of any provider's wire shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Per-call generation constraints
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_output_tokens: 1500,
            temperature: 0.2,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Gateway errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("no language model provider is available")]
    Unavailable,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Network trouble is worth another attempt; credentials and quota are not
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Timeout(_) | LlmError::Network(_) | LlmError::Server { .. })
    }

    /// Error kind reported to the caller
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Unavailable | LlmError::Network(_) | LlmError::Server { .. } => ErrorKind::Unavailable,
            LlmError::Timeout(_) => ErrorKind::Timeout,
            LlmError::BadResponse(_) => ErrorKind::BadResponse,
            LlmError::Authentication(_) => ErrorKind::Authentication,
            LlmError::Other(_) => ErrorKind::Other,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            LlmError::Timeout(timeout)
        } else {
            LlmError::Network(e.to_string())
        }
    }
}

/// Trait that all provider adapters implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for identification
    fn name(&self) -> &str;

    /// Model being used
    fn model(&self) -> &str;

    /// Send one request and return the generated text
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

/// Build the adapter for a configured provider
pub fn build_provider(descriptor: &ProviderDescriptor, client: reqwest::Client, timeout: Duration) -> Arc<dyn LlmProvider> {
    let endpoint = descriptor.base_config.endpoint.clone();
    let api_key = descriptor.base_config.api_key.clone().unwrap_or_default();
    let model = descriptor.model_id.clone();

    match descriptor.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(client, endpoint, api_key, model, timeout)),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(client, endpoint, api_key, model, timeout)),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(client, endpoint, model, timeout)),
    }
}

/// Map an HTTP error status onto the gateway taxonomy
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    let snippet: String = body.chars().take(300).collect();
    match status {
        401 => LlmError::Authentication(format!("{}: invalid API key", provider)),
        403 => LlmError::Authentication(format!("{}: access denied", provider)),
        408 => LlmError::Network(format!("{}: request timeout ({})", provider, snippet)),
        429 => LlmError::Other(format!("{}: rate limited or out of quota ({})", provider, snippet)),
        500..=599 => LlmError::Server {
            status,
            message: snippet,
        },
        _ => LlmError::Other(format!("{}: HTTP {}: {}", provider, status, snippet)),
    }
}

/// Send a prepared request and decode the JSON body
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    provider: &str,
    timeout: Duration,
) -> Result<serde_json::Value, LlmError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| LlmError::from_reqwest(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(parse_http_error(status.as_u16(), &body, provider));
    }

    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| LlmError::BadResponse(format!("{}: response is not JSON: {}", provider, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_error() {
        assert!(matches!(parse_http_error(401, "unauthorized", "openai"), LlmError::Authentication(_)));
        assert!(matches!(parse_http_error(403, "", "gemini"), LlmError::Authentication(_)));
        assert!(matches!(parse_http_error(503, "busy", "ollama"), LlmError::Server { status: 503, .. }));
        assert!(matches!(parse_http_error(429, "slow down", "openai"), LlmError::Other(_)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!LlmError::Authentication("bad key".into()).is_retryable());
        assert!(!LlmError::Other("quota".into()).is_retryable());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(LlmError::Network("x".into()).kind(), ErrorKind::Unavailable);
        assert_eq!(LlmError::Timeout(Duration::from_secs(1)).kind(), ErrorKind::Timeout);
        assert_eq!(LlmError::Authentication("x".into()).kind(), ErrorKind::Authentication);
        assert_eq!(LlmError::BadResponse("x".into()).kind(), ErrorKind::BadResponse);
    }
}
