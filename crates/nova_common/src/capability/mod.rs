//! Capability Registry - which (task_type, action) pairs exist
//!
//! Every action the assistant can perform is declared here with its
//! parameters, side-effect class and minimum confirmation level. The
//! planner can only produce steps that resolve in this table (or the
//! unknown step), and the dispatcher only calls handlers found here.
//!
//! The registry is built once at startup and is immutable afterwards.

mod builtin;
pub mod plugins;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::action_plan::{ActionStep, Params, TaskType, UNKNOWN_COMMAND};
use crate::desktop::ScreenSize;
use crate::handlers::{HandlerContext, HandlerError};

/// Longest accepted text parameter (in characters)
pub const MAX_TEXT_CHARS: usize = 10_000;

// ============================================================================
// Classification
// ============================================================================

/// Minimum confirmation before a handler may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationLevel {
    None,
    /// y/N prompt
    Prompt,
    /// Only the literal answer "yes" is accepted
    RequireExplicitYes,
}

impl ConfirmationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationLevel::None => "none",
            ConfirmationLevel::Prompt => "prompt",
            ConfirmationLevel::RequireExplicitYes => "require-explicit-yes",
        }
    }
}

impl fmt::Display for ConfirmationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler does to the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    Benign,
    WritesFile,
    Network,
    Destructive,
}

impl SideEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            SideEffect::Benign => "benign",
            SideEffect::WritesFile => "writes-file",
            SideEffect::Network => "network",
            SideEffect::Destructive => "destructive",
        }
    }

    /// Whether the dispatcher may re-run a failed handler
    pub fn is_retryable(&self) -> bool {
        matches!(self, SideEffect::Benign | SideEffect::Network)
    }

    pub fn indicator(&self) -> &'static str {
        match self {
            SideEffect::Benign => "[+]",
            SideEffect::Network => "[~]",
            SideEffect::WritesFile => "[w]",
            SideEffect::Destructive => "[!]",
        }
    }
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    /// Non-empty string of at most MAX_TEXT_CHARS characters
    Text,
    Integer { min: Option<i64>, max: Option<i64> },
    /// Integer in [0, screen width)
    CoordX,
    /// Integer in [0, screen height)
    CoordY,
    Boolean,
    /// `+`-separated key names, e.g. "ctrl+shift+s"
    KeyCombo,
    /// Absolute http(s) URL
    Url,
    Path,
    /// One of a fixed set of lowercase words
    OneOf(&'static [&'static str]),
}

impl ParamType {
    pub fn name(&self) -> &'static str {
        match self {
            ParamType::Text => "string",
            ParamType::Integer { .. } => "integer",
            ParamType::CoordX => "coordinate_x",
            ParamType::CoordY => "coordinate_y",
            ParamType::Boolean => "boolean",
            ParamType::KeyCombo => "key_combo",
            ParamType::Url => "url",
            ParamType::Path => "path",
            ParamType::OneOf(_) => "enum",
        }
    }

    /// Check a value and return its normalised form
    pub fn coerce(&self, value: &Value, screen: ScreenSize) -> Result<Value, String> {
        match self {
            ParamType::Text => {
                let text = as_text(value).ok_or_else(|| format!("expected a string, got {}", value))?;
                if text.trim().is_empty() {
                    return Err("must not be empty".to_string());
                }
                if text.chars().count() > MAX_TEXT_CHARS {
                    return Err(format!("longer than {} characters", MAX_TEXT_CHARS));
                }
                Ok(Value::String(text))
            }
            ParamType::Integer { min, max } => {
                let n = as_integer(value).ok_or_else(|| format!("expected an integer, got {}", value))?;
                if let Some(min) = min.filter(|m| n < *m) {
                    return Err(format!("{} is below the minimum {}", n, min));
                }
                if let Some(max) = max.filter(|m| n > *m) {
                    return Err(format!("{} is above the maximum {}", n, max));
                }
                Ok(Value::from(n))
            }
            ParamType::CoordX | ParamType::CoordY => {
                let n = as_integer(value).ok_or_else(|| format!("expected an integer coordinate, got {}", value))?;
                let (limit, axis) = match self {
                    ParamType::CoordX => (screen.width, "width"),
                    _ => (screen.height, "height"),
                };
                if n < 0 || n >= i64::from(limit) {
                    return Err(format!("{} is outside the screen {} of {}", n, axis, limit));
                }
                Ok(Value::from(n))
            }
            ParamType::Boolean => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "yes" => Ok(Value::Bool(true)),
                    "false" | "no" => Ok(Value::Bool(false)),
                    _ => Err(format!("expected a boolean, got {:?}", s)),
                },
                other => Err(format!("expected a boolean, got {}", other)),
            },
            ParamType::KeyCombo => {
                let text = value.as_str().ok_or_else(|| format!("expected a key combination, got {}", value))?;
                let keys = split_combo(text);
                if keys.is_empty() || keys.iter().any(|k| k.is_empty()) {
                    return Err(format!("{:?} is not a key combination", text));
                }
                Ok(Value::String(keys.join("+")))
            }
            ParamType::Url => {
                let text = value.as_str().ok_or_else(|| format!("expected a URL, got {}", value))?;
                let parsed = url::Url::parse(text.trim()).map_err(|e| format!("{:?} is not a URL: {}", text, e))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(format!("unsupported URL scheme {:?}", parsed.scheme()));
                }
                Ok(Value::String(parsed.to_string()))
            }
            ParamType::Path => {
                let text = value.as_str().ok_or_else(|| format!("expected a path, got {}", value))?;
                if text.trim().is_empty() || text.contains('\0') {
                    return Err(format!("{:?} is not a usable path", text));
                }
                Ok(Value::String(text.trim().to_string()))
            }
            ParamType::OneOf(choices) => {
                let text = value.as_str().map(|s| s.trim().to_lowercase()).unwrap_or_default();
                if choices.iter().any(|c| *c == text) {
                    Ok(Value::String(text))
                } else {
                    Err(format!("expected one of {}, got {}", choices.join("|"), value))
                }
            }
        }
    }
}

/// Primitive to string; objects and arrays are rejected
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integral numbers and numeric strings
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 1e15).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Split "Ctrl + S" into ["ctrl", "s"]
pub fn split_combo(text: &str) -> Vec<String> {
    text.split('+').map(|k| k.trim().to_lowercase()).collect()
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    pub required: bool,
    /// Inserted by validation when an optional parameter is absent
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamType) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: ParamType, default: impl Into<Value>) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default.into()),
        }
    }

    /// Optional with no default
    pub fn maybe(name: &'static str, kind: ParamType) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
        }
    }
}

// ============================================================================
// Capability definition
// ============================================================================

/// Handler signature; runs on the blocking pool
pub type Handler = Arc<dyn Fn(&HandlerContext, &Params) -> Result<String, HandlerError> + Send + Sync>;

#[derive(Clone)]
pub struct CapabilitySpec {
    pub task_type: TaskType,
    pub action: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    pub confirmation: ConfirmationLevel,
    pub side_effect: SideEffect,
    /// Regexes with named groups used to back-fill missing parameters
    pub repair: Vec<Regex>,
    pub handler: Handler,
}

impl fmt::Debug for CapabilitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySpec")
            .field("task_type", &self.task_type)
            .field("action", &self.action)
            .field("confirmation", &self.confirmation)
            .field("side_effect", &self.side_effect)
            .finish_non_exhaustive()
    }
}

impl CapabilitySpec {
    pub fn new<F>(task_type: TaskType, action: &'static str, description: &'static str, handler: F) -> Self
    where
        F: Fn(&HandlerContext, &Params) -> Result<String, HandlerError> + Send + Sync + 'static,
    {
        Self {
            task_type,
            action,
            description,
            params: Vec::new(),
            confirmation: ConfirmationLevel::None,
            side_effect: SideEffect::Benign,
            repair: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn side_effect(mut self, side_effect: SideEffect) -> Self {
        self.side_effect = side_effect;
        self
    }

    pub fn confirmation(mut self, level: ConfirmationLevel) -> Self {
        self.confirmation = level;
        self
    }

    /// Add a repair pattern; group names must match parameter names
    pub fn repair(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => self.repair.push(regex),
            Err(e) => warn!("Ignoring repair pattern for {}: {}", self.action, e),
        }
        self
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.task_type, self.action)
    }

    pub fn required_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| p.required)
    }

    /// Validate and normalise parameters, filling defaults.
    /// Undeclared parameters are passed through untouched.
    pub fn validate(&self, params: &Params, screen: ScreenSize) -> Result<Params, String> {
        let mut validated = params.clone();
        for spec in &self.params {
            match params.get(spec.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    let normalised = spec
                        .kind
                        .coerce(value, screen)
                        .map_err(|e| format!("parameter '{}': {}", spec.name, e))?;
                    validated.insert(spec.name.to_string(), normalised);
                }
                None => match (&spec.default, spec.required) {
                    (Some(default), _) => {
                        validated.insert(spec.name.to_string(), default.clone());
                    }
                    (None, true) => return Err(format!("missing required parameter '{}'", spec.name)),
                    (None, false) => {
                        validated.remove(spec.name);
                    }
                },
            }
        }
        Ok(validated)
    }

    /// Fill missing required parameters from the utterance; returns true if anything was added
    pub fn repair_params(&self, params: &mut Params, utterance: &str) -> bool {
        let mut repaired = false;
        for spec in self.required_params() {
            if params.get(spec.name).map(|v| !v.is_null()).unwrap_or(false) {
                continue;
            }
            let found = self
                .repair
                .iter()
                .filter_map(|re| re.captures(utterance))
                .find_map(|caps| caps.name(spec.name).map(|m| m.as_str().trim().to_string()))
                .filter(|s| !s.is_empty());
            if let Some(value) = found {
                debug!("Repaired {}.{} from utterance", self.action, spec.name);
                params.insert(spec.name.to_string(), Value::String(value));
                repaired = true;
            }
        }
        repaired
    }
}

// ============================================================================
// Registry
// ============================================================================

pub struct Registry {
    entries: BTreeMap<(TaskType, &'static str), CapabilitySpec>,
    screen: ScreenSize,
}

impl Registry {
    /// Empty registry except for the unknown_command catch-all
    pub fn new(screen: ScreenSize) -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
            screen,
        };
        registry.register(builtin::unknown_command());
        registry
    }

    /// Built-in desktop and document capabilities plus the standard plug-ins
    pub fn builtin(screen: ScreenSize) -> Self {
        let mut registry = Self::new(screen);
        for spec in builtin::capabilities() {
            registry.register(spec);
        }
        plugins::register_all(&mut registry);
        registry
    }

    /// Add a capability. Destructive handlers always need an explicit yes.
    pub fn register(&mut self, mut spec: CapabilitySpec) {
        if spec.side_effect == SideEffect::Destructive {
            spec.confirmation = ConfirmationLevel::RequireExplicitYes;
        }
        let key = (spec.task_type, spec.action);
        if self.entries.insert(key, spec).is_some() {
            warn!("Capability {}/{} registered twice; keeping the last", key.0, key.1);
        }
    }

    /// Raise file-writing capabilities to at least a prompt
    pub fn confirm_writes(mut self, enabled: bool) -> Self {
        if enabled {
            for spec in self.entries.values_mut() {
                if spec.side_effect == SideEffect::WritesFile {
                    spec.confirmation = spec.confirmation.max(ConfirmationLevel::Prompt);
                }
            }
        }
        self
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    pub fn get(&self, task_type: TaskType, action: &str) -> Option<&CapabilitySpec> {
        // Keys hold `&'static str`, so match by value to keep the borrow tied to `self`
        self.entries
            .iter()
            .find(|((t, a), _)| *t == task_type && *a == action)
            .map(|(_, spec)| spec)
    }

    /// Look up a step's capability; unknown steps resolve to the catch-all
    pub fn resolve(&self, step: &ActionStep) -> Option<&CapabilitySpec> {
        if step.is_unknown() {
            return self.get(TaskType::Unknown, UNKNOWN_COMMAND);
        }
        self.get(step.task_type, &step.action)
    }

    /// The confirmation the dispatcher must obtain before running `step`
    pub fn required_confirmation(&self, step: &ActionStep) -> ConfirmationLevel {
        let minimum = self
            .resolve(step)
            .map(|spec| spec.confirmation)
            .unwrap_or(ConfirmationLevel::None);
        if step.confirmation_required {
            minimum.max(ConfirmationLevel::Prompt)
        } else {
            minimum
        }
    }

    /// Re-derive `confirmation_required` from the registry minimum
    pub fn normalize_confirmation(&self, step: &mut ActionStep) {
        step.confirmation_required = self.required_confirmation(step) > ConfirmationLevel::None;
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &CapabilitySpec> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("capabilities", &self.entries.len())
            .field("screen", &self.screen)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REQUIRED: [&str; 16] = [
        "open_application",
        "open_notepad",
        "type_text",
        "click_at",
        "double_click_at",
        "right_click_at",
        "drag_to",
        "scroll",
        "press_key",
        "press_key_combination",
        "take_screenshot",
        "append_text",
        "create_article",
        "create_leave_letter",
        "save_as_pdf",
        "unknown_command",
    ];

    fn registry() -> Registry {
        Registry::builtin(ScreenSize::default())
    }

    fn params(value: serde_json::Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_required_actions_registered() {
        let registry = registry();
        for action in REQUIRED {
            assert!(
                registry.capabilities().any(|c| c.action == action),
                "missing capability {}",
                action
            );
        }
    }

    #[test]
    fn test_destructive_forces_explicit_yes() {
        let registry = registry();
        for spec in registry.capabilities() {
            if spec.side_effect == SideEffect::Destructive {
                assert_eq!(spec.confirmation, ConfirmationLevel::RequireExplicitYes, "{}", spec.label());
            }
        }

        let mut custom = Registry::new(ScreenSize::default());
        custom.register(
            CapabilitySpec::new(TaskType::FileOperation, "wipe", "Wipe", |_, _| Ok(String::new()))
                .side_effect(SideEffect::Destructive),
        );
        assert_eq!(
            custom.get(TaskType::FileOperation, "wipe").unwrap().confirmation,
            ConfirmationLevel::RequireExplicitYes
        );
    }

    #[test]
    fn test_unknown_resolves_to_catch_all() {
        let registry = registry();
        let step = ActionStep::unknown("delete all files");
        assert_eq!(registry.resolve(&step).unwrap().action, UNKNOWN_COMMAND);

        let phantom = ActionStep::new(TaskType::DesktopControl, "launch_rockets", "");
        assert!(registry.resolve(&phantom).is_none());
    }

    #[test]
    fn test_click_bounds() {
        let registry = registry();
        let spec = registry.get(TaskType::DesktopControl, "click_at").unwrap();
        let screen = registry.screen();

        let ok = spec.validate(&params(json!({"x": 100, "y": 200})), screen).unwrap();
        assert_eq!(ok["x"], 100);

        assert!(spec.validate(&params(json!({"x": 9999, "y": 9999})), screen).is_err());
        assert!(spec.validate(&params(json!({"x": -1, "y": 5})), screen).is_err());
        assert!(spec.validate(&params(json!({"x": "abc", "y": "def"})), screen).is_err());
        assert!(spec.validate(&params(json!({"x": 10})), screen).is_err());
    }

    #[test]
    fn test_numeric_strings_normalised() {
        let registry = registry();
        let spec = registry.get(TaskType::DesktopControl, "click_at").unwrap();
        let ok = spec
            .validate(&params(json!({"x": "100", "y": 200.0})), registry.screen())
            .unwrap();
        assert_eq!(ok["x"], json!(100));
        assert_eq!(ok["y"], json!(200));
    }

    #[test]
    fn test_defaults_inserted() {
        let registry = registry();
        let spec = registry.get(TaskType::DocumentCreation, "create_leave_letter").unwrap();
        let ok = spec.validate(&Params::new(), registry.screen()).unwrap();
        assert_eq!(ok["reason"], "personal reasons");

        let scroll = registry.get(TaskType::DesktopControl, "scroll").unwrap();
        let ok = scroll.validate(&params(json!({"direction": "DOWN"})), registry.screen()).unwrap();
        assert_eq!(ok["direction"], "down");
        assert_eq!(ok["amount"], 3);
    }

    #[test]
    fn test_boolean_strings() {
        let screen = ScreenSize::default();
        assert_eq!(ParamType::Boolean.coerce(&json!("true"), screen).unwrap(), json!(true));
        assert_eq!(ParamType::Boolean.coerce(&json!(false), screen).unwrap(), json!(false));
        assert!(ParamType::Boolean.coerce(&json!("maybe"), screen).is_err());
    }

    #[test]
    fn test_text_rules() {
        let screen = ScreenSize::default();
        assert!(ParamType::Text.coerce(&json!("  "), screen).is_err());
        assert!(ParamType::Text.coerce(&json!("x".repeat(MAX_TEXT_CHARS + 1)), screen).is_err());
        assert_eq!(ParamType::Text.coerce(&json!(42), screen).unwrap(), json!("42"));
        assert!(ParamType::Text.coerce(&json!({"a": 1}), screen).is_err());
    }

    #[test]
    fn test_url_and_combo() {
        let screen = ScreenSize::default();
        assert!(ParamType::Url.coerce(&json!("https://example.com"), screen).is_ok());
        assert!(ParamType::Url.coerce(&json!("file:///etc/passwd"), screen).is_err());
        assert!(ParamType::Url.coerce(&json!("not a url"), screen).is_err());
        assert_eq!(
            ParamType::KeyCombo.coerce(&json!("Ctrl + S"), screen).unwrap(),
            json!("ctrl+s")
        );
        assert!(ParamType::KeyCombo.coerce(&json!("ctrl+"), screen).is_err());
    }

    #[test]
    fn test_get_by_runtime_action_name() {
        let registry = registry();
        let action = String::from("  take_screenshot ").trim().to_string();
        let spec = registry.get(TaskType::DesktopControl, &action).unwrap();
        assert_eq!(spec.action, "take_screenshot");
        assert!(registry.get(TaskType::FileOperation, &action).is_none());
        assert!(registry.get(TaskType::DesktopControl, "take_screenshots").is_none());
    }

    #[test]
    fn test_repair_topic() {
        let registry = registry();
        let spec = registry
            .get(TaskType::DesktopControl, "open_notepad_and_write_article")
            .unwrap();
        let mut p = Params::new();
        assert!(spec.repair_params(&mut p, "please write an article about Rust lifetimes"));
        assert_eq!(p["topic"], "Rust lifetimes");
    }

    #[test]
    fn test_repair_coordinates() {
        let registry = registry();
        let spec = registry.get(TaskType::DesktopControl, "click_at").unwrap();
        let mut p = Params::new();
        assert!(spec.repair_params(&mut p, "click the button at 300, 400"));
        let ok = spec.validate(&p, registry.screen()).unwrap();
        assert_eq!(ok["x"], 300);
        assert_eq!(ok["y"], 400);
    }

    #[test]
    fn test_confirm_writes() {
        let registry = Registry::builtin(ScreenSize::default()).confirm_writes(true);
        let spec = registry.get(TaskType::FileOperation, "create_file").unwrap();
        assert_eq!(spec.confirmation, ConfirmationLevel::Prompt);

        let relaxed = Registry::builtin(ScreenSize::default());
        let spec = relaxed.get(TaskType::FileOperation, "create_file").unwrap();
        assert_eq!(spec.confirmation, ConfirmationLevel::None);
    }

    #[test]
    fn test_step_flag_raises_confirmation() {
        let registry = registry();
        let mut step = ActionStep::new(TaskType::DesktopControl, "open_notepad", "Open Notepad");
        assert_eq!(registry.required_confirmation(&step), ConfirmationLevel::None);
        step.confirmation_required = true;
        assert_eq!(registry.required_confirmation(&step), ConfirmationLevel::Prompt);

        let mut delete = ActionStep::new(TaskType::FileOperation, "delete_file", "Delete")
            .with_param("path", "notes.txt");
        registry.normalize_confirmation(&mut delete);
        assert!(delete.confirmation_required);
        assert_eq!(registry.required_confirmation(&delete), ConfirmationLevel::RequireExplicitYes);
    }
}
