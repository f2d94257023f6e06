//! Structured path - turning model text into checked steps
//!
//! The model is asked for JSON, but replies often arrive inside code fences
//! or after a sentence of prose. The first balanced JSON object or array in
//! the text that actually parses is taken; everything else is ignored.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::action_plan::{ActionStep, Params, TaskType, UNKNOWN_COMMAND};
use crate::capability::Registry;
use crate::outcome::ErrorKind;

/// Why a model response could not become a plan
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("response contains no JSON")]
    NoJson,

    #[error("response JSON does not match the step schema: {0}")]
    Schema(String),

    #[error("response contains no steps")]
    Empty,

    #[error("step {index}: {label} is not a registered action")]
    UnknownAction { index: usize, label: String },

    #[error("step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },
}

impl PlanError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BadResponse
    }
}

/// Step as the model writes it; everything optional, checked afterwards
#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    task_type: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default, alias = "params")]
    parameters: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    confirmation_required: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    steps: Vec<RawStep>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    continue_on_error: bool,
}

/// Steps parsed from a response, not yet checked against the registry
#[derive(Debug)]
pub struct ParsedPlan {
    steps: Vec<RawStep>,
    pub description: Option<String>,
    pub continue_on_error: bool,
}

impl ParsedPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Locate the first balanced JSON object or array in `text` that parses
///
/// Prose such as "[see below]" or "{name}" ahead of the real payload is
/// balanced but not JSON, so each opening bracket is tried in turn.
pub fn extract_json(text: &str) -> Option<&str> {
    text.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .filter_map(|(start, _)| balanced_from(text, start))
        .find(|candidate| serde_json::from_str::<Value>(candidate).is_ok())
}

/// The bracketed span opening at `start`, if it closes
fn balanced_from(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse model text as a single step, an array of steps, or `{"steps": [...]}`
pub fn parse_response(text: &str) -> Result<ParsedPlan, PlanError> {
    let json = extract_json(text).ok_or(PlanError::NoJson)?;
    let value: Value = serde_json::from_str(json).map_err(|e| PlanError::Schema(e.to_string()))?;

    let schema = |e: serde_json::Error| PlanError::Schema(e.to_string());
    let wrapped = matches!(&value, Value::Object(map) if map.contains_key("steps"));

    let parsed = match value {
        Value::Array(items) => ParsedPlan {
            steps: items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<_, _>>()
                .map_err(schema)?,
            description: None,
            continue_on_error: false,
        },
        Value::Object(_) if wrapped => {
            let plan: RawPlan = serde_json::from_value(value).map_err(schema)?;
            ParsedPlan {
                steps: plan.steps,
                description: plan.description,
                continue_on_error: plan.continue_on_error,
            }
        }
        Value::Object(_) => ParsedPlan {
            steps: vec![serde_json::from_value(value).map_err(schema)?],
            description: None,
            continue_on_error: false,
        },
        other => return Err(PlanError::Schema(format!("expected an object or array, got {}", other))),
    };

    if parsed.is_empty() {
        return Err(PlanError::Empty);
    }
    Ok(parsed)
}

fn flag(value: &Option<Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        _ => false,
    }
}

/// Check every step against the registry, repairing missing parameters once
pub fn check_steps(parsed: ParsedPlan, registry: &Registry, utterance: &str) -> Result<Vec<ActionStep>, PlanError> {
    let mut steps = Vec::with_capacity(parsed.steps.len());

    for (index, raw) in parsed.steps.into_iter().enumerate() {
        let task_type = TaskType::parse_lenient(raw.task_type.as_deref().unwrap_or(""));
        let action = raw.action.as_deref().map(str::trim).unwrap_or_default().to_string();
        let label = format!("{}/{}", task_type, action);

        if task_type == TaskType::Unknown {
            if action == UNKNOWN_COMMAND {
                steps.push(ActionStep::unknown(utterance));
                continue;
            }
            return Err(PlanError::UnknownAction { index, label });
        }

        let spec = registry
            .get(task_type, &action)
            .ok_or_else(|| PlanError::UnknownAction { index, label: label.clone() })?;

        let mut params = Params::new();
        for (name, value) in raw.parameters.unwrap_or_default() {
            if value.is_object() || value.is_array() {
                return Err(PlanError::InvalidStep {
                    index,
                    reason: format!("parameter '{}' is not a primitive", name),
                });
            }
            params.insert(name, value);
        }

        let validated = match spec.validate(&params, registry.screen()) {
            Ok(validated) => validated,
            Err(first) => {
                if !spec.repair_params(&mut params, utterance) {
                    return Err(PlanError::InvalidStep { index, reason: first });
                }
                debug!("Step {} repaired from utterance", index);
                spec.validate(&params, registry.screen())
                    .map_err(|reason| PlanError::InvalidStep { index, reason })?
            }
        };

        let description = raw
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| spec.description.to_string());

        let mut step = ActionStep::new(task_type, action, description);
        step.parameters = validated;
        step.confirmation_required = flag(&raw.confirmation_required);
        registry.normalize_confirmation(&mut step);
        steps.push(step);
    }

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::ScreenSize;

    fn registry() -> Registry {
        Registry::builtin(ScreenSize::default())
    }

    fn check(text: &str, utterance: &str) -> Result<Vec<ActionStep>, PlanError> {
        check_steps(parse_response(text)?, &registry(), utterance)
    }

    #[test]
    fn test_extract_from_code_fence() {
        let text = "Here is the plan:\n```json\n{\"action\": \"open_notepad\", \"note\": \"a } in a string\"}\n```";
        assert_eq!(
            extract_json(text),
            Some("{\"action\": \"open_notepad\", \"note\": \"a } in a string\"}")
        );
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{\"unterminated\": "), None);
    }

    #[test]
    fn test_extract_skips_bracketed_prose() {
        let text = "Plan [see below] for {user}:\n[{\"task_type\": \"desktop_control\", \"action\": \"open_notepad\"}]";
        assert_eq!(
            extract_json(text),
            Some("[{\"task_type\": \"desktop_control\", \"action\": \"open_notepad\"}]")
        );
        let steps = check(text, "open notepad").unwrap();
        assert_eq!(steps[0].action, "open_notepad");
        assert_eq!(extract_json("only [prose] here"), None);
    }

    #[test]
    fn test_empty_response() {
        assert_eq!(parse_response("").unwrap_err(), PlanError::NoJson);
        assert_eq!(parse_response("[]").unwrap_err(), PlanError::Empty);
    }

    #[test]
    fn test_single_object() {
        let steps = check(
            r#"{"task_type": "desktop_control", "action": "click_at", "parameters": {"x": 100, "y": "200"}, "confirmation_required": false, "description": "Click"}"#,
            "click at 100, 200",
        )
        .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].parameters["y"], 200);
    }

    #[test]
    fn test_array_and_wrapper() {
        let array = r#"[{"task_type": "desktop_control", "action": "open_notepad"},
                        {"task_type": "desktop_control", "action": "type_text", "parameters": {"text": "hi"}}]"#;
        assert_eq!(check(array, "open notepad and type hi").unwrap().len(), 2);

        let wrapped = r#"{"steps": [{"task_type": "desktop_control", "action": "open_notepad"}], "continue_on_error": true}"#;
        let parsed = parse_response(wrapped).unwrap();
        assert!(parsed.continue_on_error);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = check(r#"{"task_type": "desktop_control", "action": "format_disk"}"#, "format my disk").unwrap_err();
        assert!(matches!(err, PlanError::UnknownAction { index: 0, .. }));
    }

    #[test]
    fn test_model_unknown_command_accepted() {
        let steps = check(r#"{"task_type": "unknown", "action": "unknown_command"}"#, "fly me to the moon").unwrap();
        assert!(steps[0].is_unknown());
    }

    #[test]
    fn test_missing_param_repaired() {
        let steps = check(
            r#"{"task_type": "desktop_control", "action": "open_notepad_and_write_article", "parameters": {}}"#,
            "write an article about the history of tea",
        )
        .unwrap();
        assert_eq!(steps[0].parameters["topic"], "the history of tea");
    }

    #[test]
    fn test_missing_param_unrepairable() {
        let err = check(
            r#"{"task_type": "desktop_control", "action": "type_text", "parameters": {}}"#,
            "do the thing",
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::InvalidStep { .. }));
    }

    #[test]
    fn test_nested_values_rejected() {
        let err = check(
            r#"{"task_type": "desktop_control", "action": "type_text", "parameters": {"text": {"a": 1}}}"#,
            "type",
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::InvalidStep { .. }));
    }

    #[test]
    fn test_destructive_confirmation_cannot_be_disabled() {
        let steps = check(
            r#"{"task_type": "file_operation", "action": "delete_file", "parameters": {"path": "a.txt"}, "confirmation_required": false}"#,
            "delete file a.txt",
        )
        .unwrap();
        assert!(steps[0].confirmation_required);
    }

    #[test]
    fn test_default_description_from_registry() {
        let steps = check(r#"{"task_type": "desktop_control", "action": "take_screenshot"}"#, "screenshot").unwrap();
        assert_eq!(steps[0].description, "Save a screenshot to the desktop folder");
    }
}
