//! Built-in desktop and document capabilities

use super::{CapabilitySpec, ConfirmationLevel, ParamSpec, ParamType, SideEffect};
use crate::action_plan::{Params, TaskType, UNKNOWN_COMMAND};
use crate::handlers::{desktop, document, HandlerContext, HandlerError};

type HandlerFn = fn(&HandlerContext, &Params) -> Result<String, HandlerError>;

const SCROLL_DIRECTIONS: &[&str] = &["up", "down"];

// Shared by the article actions
const TOPIC_REPAIR: &str = r"(?i)(?:article|essay|post)\s+(?:about|on)\s+(?P<topic>.+?)[.!?]?$";
const COORD_REPAIR: &str = r"(?P<x>-?\d+)\s*,\s*(?P<y>-?\d+)";

pub(super) fn unknown_command() -> CapabilitySpec {
    CapabilitySpec::new(TaskType::Unknown, UNKNOWN_COMMAND, "Catch-all for unrecognised input", |_, _| {
        Err(HandlerError::Unknown("no capability handles this command".to_string()))
    })
}

fn pointer(action: &'static str, description: &'static str, handler: HandlerFn) -> CapabilitySpec {
    CapabilitySpec::new(TaskType::DesktopControl, action, description, handler)
        .param(ParamSpec::required("x", ParamType::CoordX))
        .param(ParamSpec::required("y", ParamType::CoordY))
        .repair(COORD_REPAIR)
}

pub(super) fn capabilities() -> Vec<CapabilitySpec> {
    use TaskType::{DesktopControl, DocumentCreation};

    vec![
        // === Applications ===
        CapabilitySpec::new(DesktopControl, "open_application", "Launch an application by name", desktop::open_application)
            .param(ParamSpec::required("name", ParamType::Text))
            .repair(r"(?i)\b(?:open|launch|start)\s+(?P<name>[\w .-]+?)\s*$"),
        CapabilitySpec::new(DesktopControl, "open_notepad", "Open Notepad", desktop::open_notepad),
        CapabilitySpec::new(DesktopControl, "open_notepad_and_type", "Open Notepad and type text", desktop::open_notepad_and_type)
            .param(ParamSpec::required("text", ParamType::Text))
            .repair(r"(?i)\bwrite\s+(?P<text>.+)$"),
        CapabilitySpec::new(
            DesktopControl,
            "open_notepad_and_write_article",
            "Open Notepad and write an article",
            document::open_notepad_and_write_article,
        )
        .param(ParamSpec::required("topic", ParamType::Text))
        .repair(TOPIC_REPAIR),
        // === Keyboard ===
        CapabilitySpec::new(DesktopControl, "type_text", "Type text into the focused window", desktop::type_text)
            .param(ParamSpec::required("text", ParamType::Text))
            .repair(r"(?i)^\s*type:?\s*(?P<text>.+)$"),
        CapabilitySpec::new(DesktopControl, "append_text", "Append text to the end of the open document", desktop::append_text)
            .param(ParamSpec::required("text", ParamType::Text))
            .repair(r"(?i)(?:add|append)\s+to\s+(?:the\s+)?document:?\s*(?P<text>.+)$"),
        CapabilitySpec::new(DesktopControl, "press_key", "Press a single key", desktop::press_key)
            .param(ParamSpec::required("key", ParamType::Text))
            .repair(r"(?i)\bpress\s+(?P<key>\w+)"),
        CapabilitySpec::new(DesktopControl, "press_key_combination", "Press a key combination", desktop::press_key_combination)
            .param(ParamSpec::required("keys", ParamType::KeyCombo))
            .repair(r"(?i)(?P<keys>\b(?:ctrl|alt|shift|win|cmd)(?:\s*\+\s*\w+)+)"),
        // === Mouse ===
        pointer("click_at", "Left-click at screen coordinates", desktop::click_at),
        pointer("double_click_at", "Double-click at screen coordinates", desktop::double_click_at),
        pointer("right_click_at", "Right-click at screen coordinates", desktop::right_click_at),
        pointer("drag_to", "Drag from the cursor to screen coordinates", desktop::drag_to),
        CapabilitySpec::new(DesktopControl, "scroll", "Scroll the focused window", desktop::scroll)
            .param(ParamSpec::required("direction", ParamType::OneOf(SCROLL_DIRECTIONS)))
            .param(ParamSpec::optional(
                "amount",
                ParamType::Integer {
                    min: Some(1),
                    max: Some(100),
                },
                3,
            ))
            .repair(r"(?i)\b(?P<direction>up|down)\b"),
        // === Screen ===
        CapabilitySpec::new(DesktopControl, "take_screenshot", "Save a screenshot to the desktop folder", desktop::take_screenshot),
        // === Documents ===
        CapabilitySpec::new(DocumentCreation, "create_article", "Compose an article", document::create_article)
            .param(ParamSpec::required("topic", ParamType::Text))
            .param(ParamSpec::optional("open_in_notepad", ParamType::Boolean, false))
            .repair(TOPIC_REPAIR),
        CapabilitySpec::new(DocumentCreation, "create_leave_letter", "Compose a leave letter", document::create_leave_letter)
            .param(ParamSpec::optional("reason", ParamType::Text, "personal reasons")),
        CapabilitySpec::new(DocumentCreation, "save_as_pdf", "Print the open document to PDF", document::save_as_pdf)
            .param(ParamSpec::optional("filename", ParamType::Text, "document"))
            .side_effect(SideEffect::WritesFile)
            .confirmation(ConfirmationLevel::Prompt),
    ]
}
