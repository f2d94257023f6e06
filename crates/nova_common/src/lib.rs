//! Nova Common - Command interpretation and dispatch core
//!
//! Turns a natural-language request into an action plan and runs it:
//! configuration and provider registry, language-model gateway, planner
//! (structured + deterministic fallback), capability registry, dispatcher
//! and the session record.

pub mod action_plan;
pub mod capability;
pub mod composer;
pub mod config;
pub mod desktop;
pub mod dispatcher;
pub mod handlers;
pub mod llm;
pub mod outcome;
pub mod planner;
pub mod session;

pub use action_plan::{ActionPlan, ActionStep, Params, PlanOrigin, TaskType};
pub use capability::{CapabilitySpec, ConfirmationLevel, Registry, SideEffect};
pub use config::{Config, ConfigError, ProviderDescriptor, ProviderKind};
pub use dispatcher::{ConfirmRequest, Confirmer, Dispatcher, PlanRun, PlanState, RetryPolicy};
pub use llm::{Constraints, Gateway, LlmError, LlmProvider, ProviderState};
pub use outcome::{ErrorKind, Outcome};
pub use planner::Planner;
pub use session::{SessionEntry, SessionLog, SessionRecord};
