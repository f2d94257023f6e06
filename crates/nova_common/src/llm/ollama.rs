//! Ollama local model server adapter
//!
//! Single-prompt provider over `/api/generate`. No credentials; reachability
//! comes from a startup check of `/api/tags`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{send_json, LlmError, LlmProvider, LlmRequest};

/// Upper bound on the startup reachability check
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);

pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        }
    }
}

pub fn build_body(model: &str, request: &LlmRequest) -> Value {
    let mut body = json!({
        "model": model,
        "prompt": request.user,
        "stream": false,
        "options": {
            "temperature": request.temperature,
            "num_predict": request.max_tokens,
        },
    });
    if let Some(system) = &request.system {
        body["system"] = json!(system);
    }
    body
}

pub fn extract_text(body: &Value) -> Result<String, LlmError> {
    body.get("response")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| LlmError::BadResponse("ollama: no response field".to_string()))
}

/// Check whether an Ollama server answers at `endpoint`
pub async fn ping_endpoint(client: &reqwest::Client, endpoint: &str) -> bool {
    let url = format!("{}/api/tags", endpoint.trim_end_matches('/'));
    match client.get(&url).timeout(PING_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            debug!("Ollama ping failed: {}", e);
            false
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.endpoint);
        debug!("POST {} model={}", url, self.model);

        let builder = self.client.post(&url).json(&build_body(&self.model, request));
        let body = send_json(builder, self.name(), self.timeout).await?;
        extract_text(&body)
    }
}
