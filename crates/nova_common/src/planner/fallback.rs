//! Fallback rule table - deterministic, total
//!
//! Priority-ordered rules; the first match wins and unmatched input becomes
//! the unknown step. Matching is case-insensitive, extraction keeps the
//! user's original casing.
//!
//! This table is the only place that decides "did the user say X".

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, warn};

use crate::action_plan::{ActionStep, TaskType};

type Build = fn(&Captures) -> ActionStep;

struct Rule {
    name: &'static str,
    /// Lowercase substring that must also be present
    requires: Option<&'static str>,
    pattern: Regex,
    build: Build,
}

// Priority order. The first nine are the core table; the rest extend it.
const RULES: &[(&str, Option<&str>, &str, Build)] = &[
    (
        "notepad_article",
        Some("open notepad"),
        r"(?i)write an article about\s+(?P<topic>.+)",
        |caps| {
            let topic = capture(caps, "topic");
            ActionStep::new(
                TaskType::DocumentCreation,
                "create_article",
                format!("Write an article about {} in Notepad", topic),
            )
            .with_param("topic", topic)
            .with_param("open_in_notepad", true)
        },
    ),
    (
        "notepad_write",
        Some("open notepad"),
        r"(?is)\bwrite\s+(?P<rest>.+)",
        |caps| {
            let rest = literal(caps, "rest");
            ActionStep::new(TaskType::DesktopControl, "open_notepad_and_type", "Open Notepad and type text")
                .with_param("text", rest)
        },
    ),
    ("open_notepad", None, r"(?i)open notepad", |_| {
        ActionStep::new(TaskType::DesktopControl, "open_notepad", "Open Notepad")
    }),
    ("leave_letter", None, r"(?i)write a leave letter", |_| {
        ActionStep::new(TaskType::DocumentCreation, "create_leave_letter", "Write a leave letter")
            .with_param("reason", "personal reasons")
    }),
    ("article", None, r"(?i)write an article about\s+(?P<topic>.+)", |caps| {
        let topic = capture(caps, "topic");
        ActionStep::new(
            TaskType::DesktopControl,
            "open_notepad_and_write_article",
            format!("Write an article about {}", topic),
        )
        .with_param("topic", topic)
    }),
    ("screenshot", None, r"(?i)take a screenshot", |_| {
        ActionStep::new(TaskType::DesktopControl, "take_screenshot", "Take a screenshot")
    }),
    ("type", None, r"(?is)^\s*type:(?P<text>.*)$", |caps| {
        ActionStep::new(TaskType::DesktopControl, "type_text", "Type text").with_param("text", literal(caps, "text"))
    }),
    (
        "click",
        None,
        r"(?i)^\s*click at\s+(?P<x>[^,\s]+)\s*,\s*(?P<y>[^,\s]+)\s*$",
        |caps| pointer_step(caps, "click_at", "Click"),
    ),
    (
        "append",
        None,
        r"(?is)(?:add|append) to document:?\s*(?P<rest>.*)$",
        |caps| {
            ActionStep::new(TaskType::DesktopControl, "append_text", "Append text to the document")
                .with_param("text", format!("\n\n{}", literal(caps, "rest")))
        },
    ),
    (
        "double_click",
        None,
        r"(?i)^\s*double[- ]?click at\s+(?P<x>[^,\s]+)\s*,\s*(?P<y>[^,\s]+)\s*$",
        |caps| pointer_step(caps, "double_click_at", "Double-click"),
    ),
    (
        "right_click",
        None,
        r"(?i)^\s*right[- ]?click at\s+(?P<x>[^,\s]+)\s*,\s*(?P<y>[^,\s]+)\s*$",
        |caps| pointer_step(caps, "right_click_at", "Right-click"),
    ),
    (
        "drag",
        None,
        r"(?i)^\s*drag to\s+(?P<x>[^,\s]+)\s*,\s*(?P<y>[^,\s]+)\s*$",
        |caps| pointer_step(caps, "drag_to", "Drag"),
    ),
    ("press", None, r"(?i)^\s*press\s+(?P<keys>\S.*?)\s*$", |caps| {
        let keys = capture(caps, "keys").to_lowercase();
        if keys.contains('+') {
            ActionStep::new(TaskType::DesktopControl, "press_key_combination", format!("Press {}", keys))
                .with_param("keys", keys)
        } else {
            ActionStep::new(TaskType::DesktopControl, "press_key", format!("Press {}", keys)).with_param("key", keys)
        }
    }),
    (
        "scroll",
        None,
        r"(?i)^\s*scroll\s+(?P<direction>up|down)(?:\s+(?:by\s+)?(?P<amount>\d+))?\s*$",
        |caps| {
            let direction = capture(caps, "direction").to_lowercase();
            let mut step = ActionStep::new(TaskType::DesktopControl, "scroll", format!("Scroll {}", direction))
                .with_param("direction", direction);
            if let Some(amount) = caps.name("amount").and_then(|m| m.as_str().parse::<i64>().ok()) {
                step = step.with_param("amount", amount);
            }
            step
        },
    ),
    (
        "save_pdf",
        None,
        r"(?i)^\s*save (?:it |this |the document )?as (?:a )?pdf(?:\s+(?:as |named |called )?(?P<name>\S+))?\s*$",
        |caps| {
            let mut step = ActionStep::new(TaskType::DocumentCreation, "save_as_pdf", "Save the document as PDF");
            if let Some(name) = caps.name("name") {
                step = step.with_param("filename", name.as_str());
            }
            step
        },
    ),
    ("go_to", None, r"(?i)^\s*(?:go to|visit|browse to)\s+(?P<url>\S+)\s*$", |caps| {
        let raw = capture(caps, "url");
        let url = if raw.contains("://") {
            raw
        } else {
            format!("https://{}", raw)
        };
        ActionStep::new(TaskType::WebAutomation, "open_url", format!("Open {}", url)).with_param("url", url)
    }),
    ("search", None, r"(?i)^\s*search (?:the web )?for\s+(?P<query>.+)$", |caps| {
        let query = capture(caps, "query");
        ActionStep::new(TaskType::WebAutomation, "search_web", format!("Search the web for {}", query))
            .with_param("query", query)
    }),
    ("shop", None, r"(?i)^\s*(?:shop|buy)\s+(?:for\s+)?(?P<query>.+)$", |caps| {
        let query = capture(caps, "query");
        ActionStep::new(TaskType::ShoppingAutomation, "search_product", format!("Shop for {}", query))
            .with_param("query", query)
    }),
    (
        "create_file",
        None,
        r"(?i)^\s*create (?:a )?(?:new )?file\s+(?:called |named )?(?P<path>\S+)\s*$",
        |caps| {
            let path = capture(caps, "path");
            ActionStep::new(TaskType::FileOperation, "create_file", format!("Create {}", path)).with_param("path", path)
        },
    ),
    (
        "delete_file",
        None,
        r"(?i)^\s*delete (?:the )?file\s+(?P<path>\S+)\s*$",
        |caps| {
            let path = capture(caps, "path");
            ActionStep::new(TaskType::FileOperation, "delete_file", format!("Delete {}", path)).with_param("path", path)
        },
    ),
    // Keep last among the extensions: "open notepad" is caught above
    ("open_app", None, r"(?i)^\s*(?:open|launch|start)\s+(?P<name>\S.*?)\s*$", |caps| {
        let name = capture(caps, "name");
        ActionStep::new(TaskType::DesktopControl, "open_application", format!("Open {}", name))
            .with_param("name", name)
    }),
];

/// Captured group, trimmed of whitespace and trailing sentence punctuation
fn capture(caps: &Captures, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().trim().trim_end_matches(|c| matches!(c, '.' | '!' | '?')).trim().to_string())
        .unwrap_or_default()
}

/// Text to be typed verbatim: only the whitespace after the keyword goes
fn literal(caps: &Captures, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().trim_start().to_string())
        .unwrap_or_default()
}

/// Integer tokens become numbers; anything else is passed through as text
/// for the dispatcher to reject
fn coordinate(caps: &Captures, name: &str) -> Value {
    let raw = capture(caps, name);
    match raw.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(raw),
    }
}

fn pointer_step(caps: &Captures, action: &str, verb: &str) -> ActionStep {
    let x = coordinate(caps, "x");
    let y = coordinate(caps, "y");
    ActionStep::new(TaskType::DesktopControl, action, format!("{} at ({}, {})", verb, x, y))
        .with_param("x", x)
        .with_param("y", y)
}

pub struct FallbackTable {
    rules: Vec<Rule>,
}

impl FallbackTable {
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|(name, requires, pattern, build)| match Regex::new(pattern) {
                Ok(pattern) => Some(Rule {
                    name: *name,
                    requires: *requires,
                    pattern,
                    build: *build,
                }),
                Err(e) => {
                    warn!("Skipping fallback rule {}: {}", name, e);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Always returns a step; unmatched input yields the unknown step
    pub fn plan_step(&self, utterance: &str) -> ActionStep {
        let lower = utterance.to_lowercase();
        for rule in &self.rules {
            if let Some(required) = rule.requires {
                if !lower.contains(required) {
                    continue;
                }
            }
            if let Some(caps) = rule.pattern.captures(utterance) {
                debug!("Fallback rule {} matched", rule.name);
                return (rule.build)(&caps);
            }
        }
        debug!("No fallback rule matched");
        ActionStep::unknown(utterance)
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(utterance: &str) -> ActionStep {
        FallbackTable::new().plan_step(utterance)
    }

    #[test]
    fn test_all_rules_compile() {
        assert_eq!(FallbackTable::new().rule_names().len(), RULES.len());
    }

    #[test]
    fn test_rule1_notepad_article() {
        let s = step("Open Notepad and write an article about Climate Change");
        assert_eq!((s.task_type, s.action.as_str()), (TaskType::DocumentCreation, "create_article"));
        assert_eq!(s.parameters["topic"], "Climate Change");
        assert_eq!(s.parameters["open_in_notepad"], true);
    }

    #[test]
    fn test_rule2_notepad_write() {
        let s = step("open notepad and write my shopping list");
        assert_eq!(s.action, "open_notepad_and_type");
        assert_eq!(s.parameters["text"], "my shopping list");
    }

    #[test]
    fn test_rule3_open_notepad() {
        let s = step("open notepad");
        assert_eq!((s.task_type, s.action.as_str()), (TaskType::DesktopControl, "open_notepad"));
        assert!(s.parameters.is_empty());
        assert!(!s.confirmation_required);
    }

    #[test]
    fn test_rule4_leave_letter() {
        let s = step("please write a leave letter for me");
        assert_eq!(s.action, "create_leave_letter");
        assert_eq!(s.parameters["reason"], "personal reasons");
    }

    #[test]
    fn test_rule5_article() {
        let s = step("write an article about quantum computing");
        assert_eq!(s.action, "open_notepad_and_write_article");
        assert_eq!(s.parameters["topic"], "quantum computing");
    }

    #[test]
    fn test_rule6_screenshot() {
        assert_eq!(step("Take a screenshot please").action, "take_screenshot");
    }

    #[test]
    fn test_rule7_type_keeps_text() {
        let s = step("type: Hello, world");
        assert_eq!(s.action, "type_text");
        assert_eq!(s.parameters["text"], "Hello, world");
        assert_eq!(step("TYPE:Mixed Case").parameters["text"], "Mixed Case");
    }

    #[test]
    fn test_literal_text_keeps_punctuation() {
        assert_eq!(step("type: Are you there?").parameters["text"], "Are you there?");
        assert_eq!(step("type: Watch out!").parameters["text"], "Watch out!");
        assert_eq!(step("add to document The end.").parameters["text"], "\n\nThe end.");
        assert_eq!(step("open notepad and write Dear Sam.").parameters["text"], "Dear Sam.");
    }

    #[test]
    fn test_literal_text_spans_lines() {
        assert_eq!(step("type: first\nsecond").parameters["text"], "first\nsecond");
        assert_eq!(
            step("open notepad and write line one\nline two").parameters["text"],
            "line one\nline two"
        );
        assert_eq!(step("append to document: a\nb").parameters["text"], "\n\na\nb");
    }

    #[test]
    fn test_topic_still_drops_sentence_punctuation() {
        assert_eq!(step("write an article about cats.").parameters["topic"], "cats");
    }

    #[test]
    fn test_rule8_click() {
        let s = step("click at 100,200");
        assert_eq!(s.action, "click_at");
        assert_eq!(s.parameters["x"], 100);
        assert_eq!(s.parameters["y"], 200);

        let s = step("click at 100, 200");
        assert_eq!(s.parameters["y"], 200);
    }

    #[test]
    fn test_rule8_non_integer_passes_raw_values() {
        let s = step("click at abc,def");
        assert_eq!(s.action, "click_at");
        assert_eq!(s.parameters["x"], json!("abc"));
    }

    #[test]
    fn test_rule8_missing_coordinates_is_unknown() {
        assert!(step("click at the button").is_unknown());
    }

    #[test]
    fn test_rule9_append() {
        let s = step("append to document: One more line");
        assert_eq!(s.action, "append_text");
        assert_eq!(s.parameters["text"], "\n\nOne more line");
        assert_eq!(step("add to document thanks").parameters["text"], "\n\nthanks");
    }

    #[test]
    fn test_rule10_default() {
        let s = step("delete all files");
        assert_eq!((s.task_type, s.action.as_str()), (TaskType::Unknown, "unknown_command"));
        assert!(s.parameters.is_empty());
        assert!(step("").is_unknown());
    }

    #[test]
    fn test_priority_notepad_before_article() {
        // Rule 1 outranks rule 5
        assert_eq!(step("write an article about cats and open notepad").action, "create_article");
    }

    #[test]
    fn test_extensions() {
        assert_eq!(step("double click at 5,5").action, "double_click_at");
        assert_eq!(step("right-click at 5,5").action, "right_click_at");
        assert_eq!(step("press Enter").parameters["key"], "enter");
        assert_eq!(step("press ctrl+s").parameters["keys"], "ctrl+s");
        assert_eq!(step("scroll down 5").parameters["amount"], 5);
        assert_eq!(step("go to example.com").parameters["url"], "https://example.com");
        assert_eq!(step("search for rust books").parameters["query"], "rust books");
        assert_eq!(step("shop for headphones").action, "search_product");
        assert_eq!(step("save as pdf report").parameters["filename"], "report");
        assert_eq!(step("create file notes.txt").action, "create_file");
        assert_eq!(step("delete file notes.txt").action, "delete_file");
        assert_eq!(step("open calculator").parameters["name"], "calculator");
    }
}
