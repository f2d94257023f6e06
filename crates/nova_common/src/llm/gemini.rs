//! Google Gemini `generateContent` adapter
//!
//! Single-prompt provider: the user text is the only content, the system
//! prompt goes in `systemInstruction`, the key travels as a query parameter.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{send_json, LlmError, LlmProvider, LlmRequest};

pub struct GeminiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiProvider {
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

pub fn build_body(request: &LlmRequest) -> Value {
    let mut body = json!({
        "contents": [{"role": "user", "parts": [{"text": request.user}]}],
        "generationConfig": {
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
        },
    });
    if let Some(system) = &request.system {
        body["systemInstruction"] = json!({"parts": [{"text": system}]});
    }
    body
}

/// Concatenate the text parts of the first candidate
pub fn extract_text(body: &Value) -> Result<String, LlmError> {
    let parts = body
        .get("candidates")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.get("parts"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            let reason = body
                .get("promptFeedback")
                .and_then(|f| f.get("blockReason"))
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            LlmError::BadResponse(format!("gemini: {}", reason))
        })?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .concat())
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::Authentication("API key not configured for gemini".to_string()));
        }

        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        debug!("POST {}", url);

        let builder = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&build_body(request));

        let body = send_json(builder, self.name(), self.timeout).await?;
        extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_shape() {
        let request = LlmRequest {
            system: Some("You plan desktop actions".to_string()),
            user: "take a screenshot".to_string(),
            temperature: 0.2,
            max_tokens: 1500,
        };
        let body = build_body(&request);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "take a screenshot");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You plan desktop actions");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1500);
    }

    #[test]
    fn test_extract_joins_parts() {
        let body = json!({"candidates": [{"content": {"parts": [{"text": "[{\"a\""}, {"text": ":1}]"}]}}]});
        assert_eq!(extract_text(&body).unwrap(), "[{\"a\":1}]");
    }

    #[test]
    fn test_extract_blocked_prompt() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        match extract_text(&body) {
            Err(LlmError::BadResponse(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("expected BadResponse, got {:?}", other),
        }
    }
}
