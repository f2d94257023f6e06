//! OpenAI chat-completions adapter
//!
//! Chat-style provider: system and user prompts travel as role-tagged
//! messages, authentication is a bearer token.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{send_json, LlmError, LlmProvider, LlmRequest};

pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }
}

/// Request body in chat-messages shape
pub fn build_body(model: &str, request: &LlmRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": request.user}));

    json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

/// Pull the generated text out of a chat-completions response
pub fn extract_text(body: &Value) -> Result<String, LlmError> {
    body.get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| LlmError::BadResponse("openai: no choices[0].message.content".to_string()))
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::Authentication("API key not configured for openai".to_string()));
        }

        let url = format!("{}/chat/completions", self.endpoint);
        debug!("POST {} model={}", url, self.model);

        let builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&build_body(&self.model, request));

        let body = send_json(builder, self.name(), self.timeout).await?;
        extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_has_system_then_user() {
        let request = LlmRequest {
            system: Some("schema".to_string()),
            user: "open notepad".to_string(),
            temperature: 0.2,
            max_tokens: 1500,
        };
        let body = build_body("gpt-4o-mini", &request);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "open notepad");
        assert_eq!(body["max_tokens"], 1500);
    }

    #[test]
    fn test_body_without_system() {
        let request = LlmRequest {
            system: None,
            user: "hi".to_string(),
            temperature: 0.7,
            max_tokens: 10,
        };
        let body = build_body("m", &request);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_extract_text() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "{\"a\":1}"}}]});
        assert_eq!(extract_text(&body).unwrap(), "{\"a\":1}");
        assert!(matches!(extract_text(&json!({"choices": []})), Err(LlmError::BadResponse(_))));
    }
}
