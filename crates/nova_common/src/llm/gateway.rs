//! Gateway - one `generate` operation over the configured providers
//!
//! Provider session states: unconfigured, reachable, degraded, failed.
//! A request whose attempts all fail with retryable errors degrades the
//! provider; two degraded requests in a row fail it for the rest of the
//! session. Authentication errors fail it immediately. Nothing here is
//! persisted.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{build_provider, Constraints, LlmError, LlmProvider, LlmRequest};
use crate::config::{Config, ProviderKind};

/// Initial backoff before the retry
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// Backoff ceiling
pub const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Consecutive degraded requests that fail a provider
const DEGRADED_LIMIT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Unconfigured,
    Reachable,
    Degraded,
    Failed,
}

impl ProviderState {
    /// Whether requests may be sent in this state
    pub fn is_usable(&self) -> bool {
        matches!(self, ProviderState::Reachable | ProviderState::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderState::Unconfigured => "unconfigured",
            ProviderState::Reachable => "reachable",
            ProviderState::Degraded => "degraded",
            ProviderState::Failed => "failed",
        }
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Slot {
    provider: Arc<dyn LlmProvider>,
    state: ProviderState,
    degraded_streak: u32,
}

pub struct Gateway {
    slots: Vec<Slot>,
    active: Option<usize>,
    max_retries: u32,
    backoff: Duration,
}

impl Gateway {
    /// Empty gateway; `generate` reports unavailable until a provider is added
    pub fn new(max_retries: u32) -> Self {
        Self {
            slots: Vec::new(),
            active: None,
            max_retries,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// One slot per configured provider, active one chosen by `select_provider`
    pub fn from_config(config: &Config, client: reqwest::Client, preferred: Option<ProviderKind>) -> Self {
        let mut gateway = Self::new(config.flags.max_retries);
        for descriptor in &config.providers {
            let state = if descriptor.reachable {
                ProviderState::Reachable
            } else {
                ProviderState::Unconfigured
            };
            gateway = gateway.with_provider(build_provider(descriptor, client.clone(), config.llm_timeout), state);
        }

        let wanted = preferred.or(Some(config.default_provider));
        gateway.active = config
            .select_provider(wanted)
            .and_then(|d| gateway.slots.iter().position(|s| s.provider.name() == d.name));

        match gateway.active_name() {
            Some(name) => info!("Language model provider: {}", name),
            None => info!("No language model provider reachable; using fallback planner"),
        }
        gateway
    }

    /// Add a provider; the first usable one becomes active
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>, state: ProviderState) -> Self {
        self.slots.push(Slot {
            provider,
            state,
            degraded_streak: 0,
        });
        if self.active.is_none() && state.is_usable() {
            self.active = Some(self.slots.len() - 1);
        }
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Switch the active provider by name; returns false if it is not usable
    pub fn select(&mut self, name: &str) -> bool {
        match self
            .slots
            .iter()
            .position(|s| s.provider.name() == name && s.state.is_usable())
        {
            Some(index) => {
                self.active = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.active_slot().map(|s| s.state.is_usable()).unwrap_or(false)
    }

    pub fn active_provider(&self) -> Option<Arc<dyn LlmProvider>> {
        self.active_slot()
            .filter(|s| s.state.is_usable())
            .map(|s| Arc::clone(&s.provider))
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active_slot().map(|s| s.provider.name())
    }

    /// (name, model, state) for every provider
    pub fn states(&self) -> Vec<(String, String, ProviderState)> {
        self.slots
            .iter()
            .map(|s| (s.provider.name().to_string(), s.provider.model().to_string(), s.state))
            .collect()
    }

    fn active_slot(&self) -> Option<&Slot> {
        self.active.and_then(|i| self.slots.get(i))
    }

    /// Generate text from the active provider
    pub async fn generate(
        &mut self,
        prompt: &str,
        system_prompt: Option<&str>,
        constraints: &Constraints,
    ) -> Result<String, LlmError> {
        let index = match self.active {
            Some(index) if self.slots[index].state.is_usable() => index,
            _ => return Err(LlmError::Unavailable),
        };

        let request = LlmRequest {
            system: system_prompt.map(str::to_string),
            user: prompt.to_string(),
            temperature: constraints.temperature,
            max_tokens: constraints.max_output_tokens,
        };

        let provider = Arc::clone(&self.slots[index].provider);
        let retries = self.max_retries.min(1);
        let mut delay = self.backoff;
        let mut attempt = 0;

        let result = loop {
            let result = match tokio::time::timeout(constraints.timeout, provider.complete(&request)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(constraints.timeout)),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < retries => {
                    attempt += 1;
                    debug!("{} attempt {} failed ({}), retrying in {:?}", provider.name(), attempt, e, delay);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                }
                other => break other,
            }
        };

        self.record(index, &result);
        result
    }

    fn record(&mut self, index: usize, result: &Result<String, LlmError>) {
        let slot = &mut self.slots[index];
        match result {
            Ok(_) => {
                slot.state = ProviderState::Reachable;
                slot.degraded_streak = 0;
            }
            Err(LlmError::Authentication(msg)) => {
                warn!("{} rejected credentials: {}", slot.provider.name(), msg);
                slot.state = ProviderState::Failed;
            }
            Err(e) if e.is_retryable() => {
                slot.degraded_streak += 1;
                slot.state = if slot.degraded_streak >= DEGRADED_LIMIT {
                    warn!("{} failed for this session: {}", slot.provider.name(), e);
                    ProviderState::Failed
                } else {
                    warn!("{} degraded: {}", slot.provider.name(), e);
                    ProviderState::Degraded
                };
            }
            // Bad content or quota: the provider answered, state unchanged
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedProvider;

    fn gateway_with(provider: Arc<ScriptedProvider>) -> Gateway {
        Gateway::new(2)
            .with_provider(provider, ProviderState::Reachable)
            .with_backoff(Duration::from_millis(1))
    }

    fn state(gateway: &Gateway) -> ProviderState {
        gateway.states()[0].2
    }

    #[tokio::test]
    async fn test_no_provider_is_unavailable() {
        let mut gateway = Gateway::new(2);
        let result = gateway.generate("hi", None, &Constraints::default()).await;
        assert_eq!(result, Err(LlmError::Unavailable));
        assert!(!gateway.is_available());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_not_called() {
        let provider = Arc::new(ScriptedProvider::always("x"));
        let mut gateway = Gateway::new(2).with_provider(provider.clone(), ProviderState::Unconfigured);
        let result = gateway.generate("hi", None, &Constraints::default()).await;
        assert_eq!(result, Err(LlmError::Unavailable));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_success_passes_constraints() {
        let provider = Arc::new(ScriptedProvider::always("{}"));
        let mut gateway = gateway_with(provider.clone());
        let constraints = Constraints {
            max_output_tokens: 99,
            temperature: 0.5,
            timeout: Duration::from_secs(5),
        };
        let text = gateway.generate("open notepad", Some("sys"), &constraints).await.unwrap();
        assert_eq!(text, "{}");
        let request = provider.last_request().unwrap();
        assert_eq!(request.system.as_deref(), Some("sys"));
        assert_eq!(request.max_tokens, 99);
    }

    #[tokio::test]
    async fn test_single_retry_then_success() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(LlmError::Network("reset".into())),
            Ok("ok".to_string()),
        ]));
        let mut gateway = gateway_with(provider.clone());
        assert_eq!(gateway.generate("hi", None, &Constraints::default()).await.unwrap(), "ok");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(state(&gateway), ProviderState::Reachable);
    }

    #[tokio::test]
    async fn test_no_retry_when_max_retries_zero() {
        let provider = Arc::new(ScriptedProvider::always_error(LlmError::Network("down".into())));
        let mut gateway = Gateway::new(0)
            .with_provider(provider.clone(), ProviderState::Reachable)
            .with_backoff(Duration::from_millis(1));
        assert!(gateway.generate("hi", None, &Constraints::default()).await.is_err());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_degraded_then_failed() {
        let provider = Arc::new(ScriptedProvider::always_error(LlmError::Network("down".into())));
        let mut gateway = gateway_with(provider.clone());

        assert!(gateway.generate("hi", None, &Constraints::default()).await.is_err());
        assert_eq!(state(&gateway), ProviderState::Degraded);
        assert!(gateway.is_available());

        assert!(gateway.generate("hi", None, &Constraints::default()).await.is_err());
        assert_eq!(state(&gateway), ProviderState::Failed);
        assert_eq!(provider.call_count(), 4);

        // Failed: no further network I/O
        assert_eq!(
            gateway.generate("hi", None, &Constraints::default()).await,
            Err(LlmError::Unavailable)
        );
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn test_success_resets_degraded() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(LlmError::Network("1".into())),
            Err(LlmError::Network("2".into())),
            Ok("fine".to_string()),
        ]));
        let mut gateway = gateway_with(provider);
        assert!(gateway.generate("hi", None, &Constraints::default()).await.is_err());
        assert_eq!(state(&gateway), ProviderState::Degraded);
        assert!(gateway.generate("hi", None, &Constraints::default()).await.is_ok());
        assert_eq!(state(&gateway), ProviderState::Reachable);
    }

    #[tokio::test]
    async fn test_authentication_fails_immediately() {
        let provider = Arc::new(ScriptedProvider::always_error(LlmError::Authentication("bad key".into())));
        let mut gateway = gateway_with(provider.clone());
        let result = gateway.generate("hi", None, &Constraints::default()).await;
        assert!(matches!(result, Err(LlmError::Authentication(_))));
        assert_eq!(provider.call_count(), 1);
        assert_eq!(state(&gateway), ProviderState::Failed);
        assert!(!gateway.is_available());
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let provider = Arc::new(ScriptedProvider::always("late").with_delay(Duration::from_millis(200)));
        let mut gateway = gateway_with(provider);
        let constraints = Constraints {
            timeout: Duration::from_millis(20),
            ..Constraints::default()
        };
        let result = gateway.generate("hi", None, &constraints).await;
        assert!(matches!(result, Err(LlmError::Timeout(_))));
        assert_eq!(state(&gateway), ProviderState::Degraded);
    }

    #[tokio::test]
    async fn test_bad_response_keeps_state() {
        let provider = Arc::new(ScriptedProvider::always_error(LlmError::BadResponse("empty".into())));
        let mut gateway = gateway_with(provider.clone());
        assert!(gateway.generate("hi", None, &Constraints::default()).await.is_err());
        assert_eq!(provider.call_count(), 1);
        assert_eq!(state(&gateway), ProviderState::Reachable);
    }

    #[test]
    fn test_select_by_name() {
        let mut gateway = Gateway::new(1)
            .with_provider(Arc::new(ScriptedProvider::always("a").named("gemini")), ProviderState::Reachable)
            .with_provider(Arc::new(ScriptedProvider::always("b").named("ollama")), ProviderState::Unconfigured);
        assert_eq!(gateway.active_name(), Some("gemini"));
        assert!(!gateway.select("ollama"));
        assert!(!gateway.select("openai"));
        assert_eq!(gateway.active_name(), Some("gemini"));
    }

    #[test]
    fn test_from_config_without_keys() {
        let config = Config::from_sources(&|_| None, Default::default());
        let gateway = Gateway::from_config(&config, reqwest::Client::new(), None);
        assert!(!gateway.is_available());
        assert_eq!(gateway.states().len(), 3);
        assert!(gateway.states().iter().all(|(_, _, s)| *s == ProviderState::Unconfigured));
    }

    #[test]
    fn test_from_config_picks_keyed_provider() {
        let lookup = |key: &str| match key {
            "OPENAI_API_KEY" => Some("sk-real".to_string()),
            _ => None,
        };
        let config = Config::from_sources(&lookup, Default::default());
        let gateway = Gateway::from_config(&config, reqwest::Client::new(), None);
        assert!(gateway.is_available());
        assert_eq!(gateway.active_name(), Some("openai"));
    }
}
