//! Command Planner - utterance to validated ActionPlan
//!
//! Primary path: ask the gateway for JSON steps and check them against the
//! registry. Any failure on that path (no provider, timeout, bad JSON, an
//! unregistered action) drops to the fallback rule table, which always
//! produces a plan. Planning never fails.

pub mod fallback;
pub mod structured;
pub mod system_prompt;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::action_plan::{bound_utterance, ActionPlan, PlanOrigin};
use crate::capability::Registry;
use crate::llm::{Constraints, Gateway};
use crate::outcome::ErrorKind;

pub use fallback::FallbackTable;
pub use structured::PlanError;
pub use system_prompt::build_system_prompt;

pub const PLAN_TEMPERATURE: f32 = 0.2;
pub const PLAN_MAX_TOKENS: u32 = 1500;

pub struct Planner {
    registry: Arc<Registry>,
    system_prompt: String,
    fallback: FallbackTable,
    constraints: Constraints,
}

impl Planner {
    pub fn new(registry: Arc<Registry>) -> Self {
        let system_prompt = build_system_prompt(&registry);
        Self {
            registry,
            system_prompt,
            fallback: FallbackTable::new(),
            constraints: Constraints {
                max_output_tokens: PLAN_MAX_TOKENS,
                temperature: PLAN_TEMPERATURE,
                ..Constraints::default()
            },
        }
    }

    /// Gateway timeout for planning requests
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.constraints.timeout = timeout;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Plan an utterance. `gateway` is None in offline mode.
    pub async fn plan(&self, utterance: &str, gateway: Option<&mut Gateway>) -> ActionPlan {
        let utterance = bound_utterance(utterance).trim();
        if utterance.is_empty() {
            return self.fallback(utterance, None);
        }

        let gateway = match gateway {
            Some(gateway) if gateway.is_available() => gateway,
            _ => return self.fallback(utterance, Some(ErrorKind::Unavailable)),
        };

        let provider = gateway.active_name().unwrap_or("llm").to_string();
        let text = match gateway
            .generate(utterance, Some(&self.system_prompt), &self.constraints)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Gateway failed ({}); using fallback rules", e);
                return self.fallback(utterance, Some(e.kind()));
            }
        };

        match self.structured(&text, utterance, provider) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Unusable model response ({}); using fallback rules", e);
                debug!("Response was: {}", text.chars().take(500).collect::<String>());
                self.fallback(utterance, Some(e.kind()))
            }
        }
    }

    /// Parse and check a model response
    pub fn structured(&self, text: &str, utterance: &str, provider: String) -> Result<ActionPlan, PlanError> {
        let parsed = structured::parse_response(text)?;
        let description = parsed.description.clone();
        let continue_on_error = parsed.continue_on_error;
        let steps = structured::check_steps(parsed, &self.registry, utterance)?;

        let mut plan = ActionPlan::new(
            description.unwrap_or_else(|| utterance.to_string()),
            steps,
            PlanOrigin::Structured { provider },
        );
        plan.continue_on_error = continue_on_error;
        info!("Structured plan: {}", plan.summary());
        Ok(plan)
    }

    /// Rule-table plan; always one step
    pub fn fallback(&self, utterance: &str, reason: Option<ErrorKind>) -> ActionPlan {
        let mut step = self.fallback.plan_step(utterance);
        self.registry.normalize_confirmation(&mut step);
        let plan = ActionPlan::single(step, PlanOrigin::Fallback { reason });
        info!("Fallback plan: {}", plan.steps[0].label());
        plan
    }
}
