//! Optional plug-in capabilities
//!
//! Browser, file, email and shopping actions. They are ordinary registry
//! entries; `register_all` is what `Registry::builtin` calls at startup.

use super::{CapabilitySpec, ParamSpec, ParamType, Registry, SideEffect};
use crate::action_plan::TaskType;
use crate::handlers::plugins as handlers;

pub fn web() -> Vec<CapabilitySpec> {
    vec![
        CapabilitySpec::new(TaskType::WebAutomation, "open_url", "Open a web page in the default browser", handlers::open_url)
            .param(ParamSpec::required("url", ParamType::Url))
            .side_effect(SideEffect::Network)
            .repair(r"(?P<url>https?://\S+)"),
        CapabilitySpec::new(TaskType::WebAutomation, "search_web", "Search the web", handlers::search_web)
            .param(ParamSpec::required("query", ParamType::Text))
            .side_effect(SideEffect::Network)
            .repair(r"(?i)\b(?:search|google|look up)\s+(?:the web\s+)?(?:for\s+)?(?P<query>.+)$"),
    ]
}

pub fn files() -> Vec<CapabilitySpec> {
    vec![
        CapabilitySpec::new(TaskType::FileOperation, "create_file", "Create a text file", handlers::create_file)
            .param(ParamSpec::required("path", ParamType::Path))
            .param(ParamSpec::maybe("content", ParamType::Text))
            .side_effect(SideEffect::WritesFile)
            .repair(r"(?i)\bfile\s+(?:called\s+|named\s+)?(?P<path>\S+)"),
        CapabilitySpec::new(TaskType::FileOperation, "delete_file", "Delete a file", handlers::delete_file)
            .param(ParamSpec::required("path", ParamType::Path))
            .side_effect(SideEffect::Destructive)
            .repair(r"(?i)\bdelete\s+(?:the\s+)?file\s+(?P<path>\S+)"),
    ]
}

pub fn email() -> Vec<CapabilitySpec> {
    vec![CapabilitySpec::new(
        TaskType::EmailAutomation,
        "compose_email",
        "Open a new email in the default mail client",
        handlers::compose_email,
    )
    .param(ParamSpec::required("to", ParamType::Text))
    .param(ParamSpec::optional("subject", ParamType::Text, "(no subject)"))
    .param(ParamSpec::maybe("body", ParamType::Text))
    .side_effect(SideEffect::Network)
    .confirmation(super::ConfirmationLevel::Prompt)
    .repair(r"(?P<to>[\w.+-]+@[\w-]+(?:\.[\w-]+)+)")]
}

pub fn shopping() -> Vec<CapabilitySpec> {
    vec![CapabilitySpec::new(
        TaskType::ShoppingAutomation,
        "search_product",
        "Search for a product in an online store",
        handlers::search_product,
    )
    .param(ParamSpec::required("query", ParamType::Text))
    .side_effect(SideEffect::Network)
    .repair(r"(?i)\b(?:shop|buy|order)\s+(?:for\s+)?(?:a\s+|an\s+|some\s+)?(?P<query>.+)$")]
}

pub fn register_all(registry: &mut Registry) {
    for spec in web().into_iter().chain(files()).chain(email()).chain(shopping()) {
        registry.register(spec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_plan::Params;
    use crate::capability::ConfirmationLevel;
    use crate::desktop::ScreenSize;

    #[test]
    fn test_plugins_registered() {
        let registry = Registry::builtin(ScreenSize::default());
        for (task, action) in [
            (TaskType::WebAutomation, "open_url"),
            (TaskType::WebAutomation, "search_web"),
            (TaskType::FileOperation, "create_file"),
            (TaskType::FileOperation, "delete_file"),
            (TaskType::EmailAutomation, "compose_email"),
            (TaskType::ShoppingAutomation, "search_product"),
        ] {
            assert!(registry.get(task, action).is_some(), "{}/{}", task, action);
        }
        let delete = registry.get(TaskType::FileOperation, "delete_file").unwrap();
        assert_eq!(delete.confirmation, ConfirmationLevel::RequireExplicitYes);
        assert!(!delete.side_effect.is_retryable());
    }

    #[test]
    fn test_email_repair() {
        let spec = email().remove(0);
        let mut params = Params::new();
        assert!(spec.repair_params(&mut params, "send an email to ada@example.org about lunch"));
        assert_eq!(params["to"], "ada@example.org");
    }
}
