//! Action plans - the typed output of the planner
//!
//! An ActionPlan is an ordered, non-empty list of ActionSteps. Structured
//! plans (from the language model) and fallback plans (from the rule table)
//! share one schema so nothing downstream cares where a plan came from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::outcome::ErrorKind;

/// Step parameters: name to primitive JSON value
pub type Params = BTreeMap<String, serde_json::Value>;

/// Upper bound on utterance length (in characters)
pub const MAX_UTTERANCE_CHARS: usize = 2_000;

/// Broad category an action belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    DocumentCreation,
    WebAutomation,
    DesktopControl,
    FileOperation,
    EmailAutomation,
    ShoppingAutomation,
    Unknown,
}

impl TaskType {
    pub const ALL: [TaskType; 7] = [
        TaskType::DocumentCreation,
        TaskType::WebAutomation,
        TaskType::DesktopControl,
        TaskType::FileOperation,
        TaskType::EmailAutomation,
        TaskType::ShoppingAutomation,
        TaskType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::DocumentCreation => "document_creation",
            TaskType::WebAutomation => "web_automation",
            TaskType::DesktopControl => "desktop_control",
            TaskType::FileOperation => "file_operation",
            TaskType::EmailAutomation => "email_automation",
            TaskType::ShoppingAutomation => "shopping_automation",
            TaskType::Unknown => "unknown",
        }
    }

    /// Lenient parse used for model output; anything unrecognised is Unknown
    pub fn parse_lenient(s: &str) -> Self {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .unwrap_or(TaskType::Unknown)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step in an action plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub task_type: TaskType,

    /// Action identifier, unique within its task type
    pub action: String,

    #[serde(default)]
    pub parameters: Params,

    #[serde(default)]
    pub confirmation_required: bool,

    #[serde(default)]
    pub description: String,
}

impl ActionStep {
    pub fn new(task_type: TaskType, action: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_type,
            action: action.into(),
            parameters: Params::new(),
            confirmation_required: false,
            description: description.into(),
        }
    }

    /// Builder-style parameter insertion
    pub fn with_param(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    /// The catch-all step produced for input nothing understands
    pub fn unknown(utterance: &str) -> Self {
        Self::new(
            TaskType::Unknown,
            UNKNOWN_COMMAND,
            format!("Unrecognized command: {}", utterance.trim()),
        )
    }

    pub fn is_unknown(&self) -> bool {
        self.task_type == TaskType::Unknown
    }

    /// "task_type/action" label used in logs and output
    pub fn label(&self) -> String {
        format!("{}/{}", self.task_type, self.action)
    }
}

/// Action name of the catch-all handler
pub const UNKNOWN_COMMAND: &str = "unknown_command";

/// Where a plan came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanOrigin {
    /// Parsed from a language-model response
    Structured { provider: String },

    /// Produced by the rule table; `reason` says why the structured path was not used
    Fallback {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<ErrorKind>,
    },
}

impl PlanOrigin {
    pub fn is_fallback(&self) -> bool {
        matches!(self, PlanOrigin::Fallback { .. })
    }
}

/// Complete action plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub description: String,

    pub steps: Vec<ActionStep>,

    pub origin: PlanOrigin,

    /// Keep executing after a failed step
    #[serde(default)]
    pub continue_on_error: bool,
}

impl ActionPlan {
    pub fn new(description: impl Into<String>, steps: Vec<ActionStep>, origin: PlanOrigin) -> Self {
        Self {
            description: description.into(),
            steps,
            origin,
            continue_on_error: false,
        }
    }

    /// One-step plan whose description is the step's
    pub fn single(step: ActionStep, origin: PlanOrigin) -> Self {
        let description = step.description.clone();
        Self::new(description, vec![step], origin)
    }

    /// Plans must never be empty
    pub fn validate(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err("Action plan has no steps".to_string());
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.action.trim().is_empty() {
                return Err(format!("Step {} has empty action", i));
            }
        }
        Ok(())
    }

    /// Check if any step requires confirmation
    pub fn requires_confirmation(&self) -> bool {
        self.steps.iter().any(|s| s.confirmation_required)
    }

    /// Get summary for user display
    pub fn summary(&self) -> String {
        let source = match &self.origin {
            PlanOrigin::Structured { provider } => format!("via {}", provider),
            PlanOrigin::Fallback { .. } => "via built-in rules".to_string(),
        };
        let noun = if self.steps.len() == 1 { "step" } else { "steps" };
        format!("{} {}, {}", self.steps.len(), noun, source)
    }
}

/// Clamp an utterance to the supported length, on a char boundary
pub fn bound_utterance(input: &str) -> &str {
    match input.char_indices().nth(MAX_UTTERANCE_CHARS) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_lenient_parse() {
        assert_eq!(TaskType::parse_lenient("desktop_control"), TaskType::DesktopControl);
        assert_eq!(TaskType::parse_lenient("Desktop-Control"), TaskType::DesktopControl);
        assert_eq!(TaskType::parse_lenient("teleportation"), TaskType::Unknown);
    }

    #[test]
    fn test_plan_serde_round_trip() {
        let plan = ActionPlan::new(
            "click then type",
            vec![
                ActionStep::new(TaskType::DesktopControl, "click_at", "Click")
                    .with_param("x", 100)
                    .with_param("y", 200),
                ActionStep::new(TaskType::DesktopControl, "type_text", "Type")
                    .with_param("text", "Hello, world"),
            ],
            PlanOrigin::Structured {
                provider: "gemini".to_string(),
            },
        );

        let json = serde_json::to_string(&plan).unwrap();
        let back: ActionPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_empty_plan_rejected() {
        let plan = ActionPlan::new("nothing", vec![], PlanOrigin::Fallback { reason: None });
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_bound_utterance_respects_char_boundaries() {
        let long = "é".repeat(MAX_UTTERANCE_CHARS + 10);
        let bounded = bound_utterance(&long);
        assert_eq!(bounded.chars().count(), MAX_UTTERANCE_CHARS);
        assert_eq!(bound_utterance("short"), "short");
    }

    #[test]
    fn test_unknown_step() {
        let step = ActionStep::unknown("  delete all files ");
        assert!(step.is_unknown());
        assert_eq!(step.action, UNKNOWN_COMMAND);
        assert_eq!(step.label(), "unknown/unknown_command");
    }
}
