//! Dispatcher - runs an ActionPlan step by step
//!
//! Per step: resolve, validate, confirm, execute under the step timeout,
//! retry where the side-effect class allows, record. A failed step stops
//! the plan unless the plan says `continue_on_error`; a declined
//! confirmation always stops it. Cancellation is checked between steps,
//! never inside a running handler.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::action_plan::{ActionPlan, ActionStep, Params};
use crate::capability::{CapabilitySpec, ConfirmationLevel, Registry, SideEffect};
use crate::config::Flags;
use crate::handlers::HandlerContext;
use crate::outcome::{ErrorKind, Outcome};
use crate::session::SessionRecord;

/// Default pause between handler retries (multiplied by the attempt number)
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

// ============================================================================
// Confirmation channel
// ============================================================================

/// What the user is asked to approve
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmRequest {
    pub step_index: usize,
    pub label: String,
    pub description: String,
    pub level: ConfirmationLevel,
    pub side_effect: SideEffect,
    pub parameters: Params,
}

#[async_trait]
pub trait Confirmer: Send {
    /// True only on an accepted answer; anything else is a refusal
    async fn confirm(&mut self, request: &ConfirmRequest) -> bool;
}

/// Answers from a fixed script; refuses once the script runs out
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: Vec<bool>,
    pub asked: Vec<ConfirmRequest>,
}

impl ScriptedConfirmer {
    pub fn new(answers: Vec<bool>) -> Self {
        Self { answers, asked: Vec::new() }
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&mut self, request: &ConfirmRequest) -> bool {
        self.asked.push(request.clone());
        if self.answers.is_empty() {
            false
        } else {
            self.answers.remove(0)
        }
    }
}

// ============================================================================
// Policy and results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub step_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_flags(flags: &Flags) -> Self {
        Self {
            max_retries: flags.max_retries,
            backoff: DEFAULT_RETRY_BACKOFF,
            step_timeout: flags.step_timeout,
        }
    }

    /// Linear backoff
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_RETRY_BACKOFF,
            step_timeout: Duration::from_secs(crate::config::DEFAULT_STEP_TIMEOUT_SECS),
        }
    }
}

/// pending -> running -> completed | aborted | declined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Pending,
    Running,
    Completed,
    Aborted,
    Declined,
}

impl PlanState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanState::Completed | PlanState::Aborted | PlanState::Declined)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanState::Pending => "pending",
            PlanState::Running => "running",
            PlanState::Completed => "completed",
            PlanState::Aborted => "aborted",
            PlanState::Declined => "declined",
        }
    }
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanRun {
    pub entry_id: u64,
    pub state: PlanState,
    pub outcomes: Vec<Outcome>,
}

impl PlanRun {
    pub fn all_ok(&self) -> bool {
        self.state == PlanState::Completed && self.outcomes.iter().all(|o| o.ok)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct Dispatcher {
    registry: Arc<Registry>,
    context: HandlerContext,
    policy: RetryPolicy,
    cancel: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, context: HandlerContext, policy: RetryPolicy) -> Self {
        Self {
            registry,
            context,
            policy,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag (set by the interrupt handler)
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub async fn execute(
        &self,
        utterance: &str,
        plan: &ActionPlan,
        confirmer: &mut dyn Confirmer,
        record: &mut SessionRecord,
    ) -> PlanRun {
        self.execute_observed(utterance, plan, confirmer, record, &mut |_, _, _| {})
            .await
    }

    /// Execute, calling `observer` as each step terminates
    pub async fn execute_observed(
        &self,
        utterance: &str,
        plan: &ActionPlan,
        confirmer: &mut dyn Confirmer,
        record: &mut SessionRecord,
        observer: &mut (dyn FnMut(usize, &ActionStep, &Outcome) + Send),
    ) -> PlanRun {
        let mut plan = plan.clone();
        for step in &mut plan.steps {
            self.registry.normalize_confirmation(step);
        }

        let entry_id = record.begin(utterance, &plan);
        let mut outcomes = Vec::with_capacity(plan.steps.len());
        let mut state = PlanState::Running;
        record.set_state(entry_id, state);

        for (index, step) in plan.steps.iter().enumerate() {
            if self.cancelled() {
                info!("Plan cancelled before step {}", index + 1);
                state = PlanState::Aborted;
                break;
            }

            let outcome = self.run_step(index, step, confirmer).await;
            let declined = outcome.error_kind == Some(ErrorKind::UserDeclined);
            let failed = !outcome.ok;

            match &outcome.error_kind {
                None => info!("{} ok: {}", step.label(), outcome.message),
                Some(kind) => warn!("{} failed ({}): {}", step.label(), kind, outcome.message),
            }

            record.record_outcome(entry_id, index, step, &outcome);
            observer(index, step, &outcome);
            outcomes.push(outcome);

            if declined {
                state = PlanState::Declined;
                break;
            }
            if failed && !plan.continue_on_error {
                state = PlanState::Aborted;
                break;
            }
        }

        if state == PlanState::Running {
            state = PlanState::Completed;
        }
        record.set_state(entry_id, state);

        PlanRun {
            entry_id,
            state,
            outcomes,
        }
    }

    async fn run_step(&self, index: usize, step: &ActionStep, confirmer: &mut dyn Confirmer) -> Outcome {
        let started = Utc::now();

        let spec = match self.registry.resolve(step) {
            Some(spec) => spec,
            None => {
                return Outcome::failure(
                    ErrorKind::UnknownAction,
                    format!("No handler registered for {}", step.label()),
                    started,
                    0,
                )
            }
        };

        let params = match spec.validate(&step.parameters, self.registry.screen()) {
            Ok(params) => params,
            Err(reason) => {
                return Outcome::failure(
                    ErrorKind::InvalidParameters,
                    format!("{}: {}", step.label(), reason),
                    started,
                    0,
                )
            }
        };

        let level = self.registry.required_confirmation(step);
        if level > ConfirmationLevel::None {
            let request = ConfirmRequest {
                step_index: index,
                label: step.label(),
                description: step.description.clone(),
                level,
                side_effect: spec.side_effect,
                parameters: params.clone(),
            };
            if !confirmer.confirm(&request).await {
                return Outcome::failure(
                    ErrorKind::UserDeclined,
                    format!("Declined: {}", step.description),
                    started,
                    0,
                );
            }
        }

        self.run_with_retries(spec, step, params, started).await
    }

    async fn run_with_retries(
        &self,
        spec: &CapabilitySpec,
        step: &ActionStep,
        params: Params,
        started: chrono::DateTime<Utc>,
    ) -> Outcome {
        let retries_allowed = if spec.side_effect.is_retryable() {
            self.policy.max_retries
        } else {
            0
        };
        let mut attempt = 0;

        loop {
            let (kind, message) = match self.invoke(spec, params.clone()).await {
                Ok(message) => return Outcome::success(message, started, attempt),
                Err(failure) => failure,
            };

            let message = if kind == ErrorKind::UnknownAction {
                format!("{} ({})", step.description, message)
            } else {
                message
            };

            // A timed-out handler may still be running; never start a second copy
            let transient = kind == ErrorKind::HandlerFailure;
            if !transient || attempt >= retries_allowed || self.cancelled() {
                return Outcome::failure(kind, message, started, attempt);
            }

            attempt += 1;
            let delay = self.policy.delay_for(attempt);
            debug!("{} attempt {} failed ({}), retrying in {:?}", step.label(), attempt, message, delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// One handler call on the blocking pool, bounded by the step timeout
    async fn invoke(&self, spec: &CapabilitySpec, params: Params) -> Result<String, (ErrorKind, String)> {
        let handler = Arc::clone(&spec.handler);
        let context = self.context.clone();
        let task = tokio::task::spawn_blocking(move || (*handler)(&context, &params));

        match tokio::time::timeout(self.policy.step_timeout, task).await {
            Ok(Ok(Ok(message))) => Ok(message),
            Ok(Ok(Err(e))) => Err((e.kind(), e.to_string())),
            Ok(Err(join)) => Err((ErrorKind::HandlerFailure, format!("handler crashed: {}", join))),
            // The blocking task is abandoned, not preempted
            Err(_) => Err((
                ErrorKind::Timeout,
                format!("{} did not finish within {:?}", spec.label(), self.policy.step_timeout),
            )),
        }
    }
}
