//! Scripted provider for testing
//!
//! Replays pre-defined responses in order; once one response is left it is
//! returned for every further call.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use super::{LlmError, LlmProvider, LlmRequest};

pub struct ScriptedProvider {
    name: String,
    responses: Mutex<Vec<Result<String, LlmError>>>,
    call_count: Mutex<usize>,
    last_request: Mutex<Option<LlmRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            name: "scripted".to_string(),
            responses: Mutex::new(responses),
            call_count: Mutex::new(0),
            last_request: Mutex::new(None),
            delay: None,
        }
    }

    /// Always answer with the same text
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    /// Always fail with the same error
    pub fn always_error(error: LlmError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sleep before answering (for timeout tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn last_request(&self) -> Option<LlmRequest> {
        self.last_request.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_response(&self) -> Result<String, LlmError> {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        match responses.len() {
            0 => Err(LlmError::BadResponse("scripted provider has no responses".to_string())),
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        *self.call_count.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LlmRequest {
        LlmRequest {
            system: None,
            user: "hello".to_string(),
            temperature: 0.2,
            max_tokens: 10,
        }
    }

    #[tokio::test]
    async fn test_sequence_then_repeat_last() {
        let provider = ScriptedProvider::new(vec![
            Err(LlmError::Network("reset".into())),
            Ok("second".to_string()),
        ]);

        assert!(provider.complete(&request()).await.is_err());
        assert_eq!(provider.complete(&request()).await.unwrap(), "second");
        assert_eq!(provider.complete(&request()).await.unwrap(), "second");
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.last_request().unwrap().user, "hello");
    }

    #[tokio::test]
    async fn test_empty_script_is_bad_response() {
        let provider = ScriptedProvider::new(vec![]);
        assert!(matches!(provider.complete(&request()).await, Err(LlmError::BadResponse(_))));
    }
}
