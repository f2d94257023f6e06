//! System prompt - the planner's contract with the language model
//!
//! Fixed schema text plus the capability table rendered from the registry,
//! built once at startup.

use crate::action_plan::TaskType;
use crate::capability::Registry;

const PROMPT_HEAD: &str = r#"You are NOVA_PLANNER, the command planner of a desktop assistant.
You never talk to a human directly. Your output is parsed as JSON and may be executed on the user's computer.

Given a user request, produce the steps needed to carry it out. Each step is a JSON object with this exact schema:

{
  "task_type": "document_creation" | "web_automation" | "desktop_control" | "file_operation" | "email_automation" | "shopping_automation",
  "action": "string",
  "parameters": {"name": primitive value},
  "confirmation_required": true | false,
  "description": "short sentence for the user"
}

Output requirements:
- Output a single JSON object for a one-step request, or a JSON array of such objects for several steps.
- Output only JSON. No markdown, no backticks, no comments, no extra text.
- Parameter values are strings, integers or booleans. Never nested objects or arrays.
- Use only the actions listed below, under their task_type, with their parameter names.
- Coordinates are integer pixels on the primary screen.
- Set confirmation_required to true for anything that writes, deletes or sends data.
- If the request cannot be expressed with the actions below, output
  {"task_type": "unknown", "action": "unknown_command", "parameters": {}, "confirmation_required": false, "description": "Unsupported request"}

Available actions (task_type/action: parameters, * = required):
"#;

const PROMPT_EXAMPLES: &str = r#"
Examples:
Request: open notepad and type hello
[{"task_type": "desktop_control", "action": "open_notepad", "parameters": {}, "confirmation_required": false, "description": "Open Notepad"},
 {"task_type": "desktop_control", "action": "type_text", "parameters": {"text": "hello"}, "confirmation_required": false, "description": "Type the greeting"}]

Request: click at 100, 200
{"task_type": "desktop_control", "action": "click_at", "parameters": {"x": 100, "y": 200}, "confirmation_required": false, "description": "Click at (100, 200)"}
"#;

/// Render the full system prompt for a registry
pub fn build_system_prompt(registry: &Registry) -> String {
    let mut prompt = String::from(PROMPT_HEAD);
    for spec in registry.capabilities().filter(|c| c.task_type != TaskType::Unknown) {
        let params = spec
            .params
            .iter()
            .map(|p| format!("{}{} ({})", p.name, if p.required { "*" } else { "" }, p.kind.name()))
            .collect::<Vec<_>>()
            .join(", ");
        let params = if params.is_empty() { "none".to_string() } else { params };
        prompt.push_str(&format!(
            "- {}: {} [{}] {}\n",
            spec.label(),
            params,
            spec.side_effect,
            spec.description
        ));
    }
    let screen = registry.screen();
    prompt.push_str(&format!("\nThe screen is {}x{} pixels.\n", screen.width, screen.height));
    prompt.push_str(PROMPT_EXAMPLES);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::ScreenSize;

    #[test]
    fn test_prompt_contains_schema() {
        let prompt = build_system_prompt(&Registry::builtin(ScreenSize::default()));
        assert!(prompt.contains("NOVA_PLANNER"));
        assert!(prompt.contains("\"task_type\""));
        assert!(prompt.contains("confirmation_required"));
        assert!(prompt.contains("1920x1080"));
    }

    #[test]
    fn test_prompt_lists_capabilities() {
        let prompt = build_system_prompt(&Registry::builtin(ScreenSize::default()));
        assert!(prompt.contains("- desktop_control/click_at: x* (coordinate_x), y* (coordinate_y)"));
        assert!(prompt.contains("- desktop_control/take_screenshot: none"));
        assert!(prompt.contains("file_operation/delete_file"));
        assert!(!prompt.contains("- unknown/unknown_command"));
    }
}
