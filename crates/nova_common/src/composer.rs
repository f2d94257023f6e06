//! Composer collaborator - article and letter text
//!
//! The template composer works offline. The LLM composer asks the active
//! provider and falls back to the template when the provider fails, so a
//! document action never fails for lack of a model.

use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::llm::{LlmProvider, LlmRequest};

pub trait Composer: Send + Sync {
    fn article(&self, topic: &str) -> String;

    fn leave_letter(&self, reason: &str) -> String;
}

/// Fixed templates, no network
#[derive(Debug, Clone, Default)]
pub struct TemplateComposer;

impl Composer for TemplateComposer {
    fn article(&self, topic: &str) -> String {
        let topic = topic.trim();
        format!(
            "{title}\n\n\
             Introduction\n\
             {topic} is a subject that keeps coming up, and for good reason. This article gives \
             a short overview of what it is, why it matters and where it is heading.\n\n\
             Background\n\
             Understanding {topic} starts with its basic ideas. People who work with it every day \
             describe it in terms of the problems it solves rather than the vocabulary around it.\n\n\
             Why it matters\n\
             The practical value of {topic} shows up in everyday work: it changes how decisions are \
             made and how quickly results can be delivered.\n\n\
             Looking ahead\n\
             Interest in {topic} is likely to keep growing. Anyone curious about it can start small, \
             read widely and try things out.\n\n\
             Conclusion\n\
             {topic} rewards a closer look. A little time spent on the fundamentals goes a long way.\n",
            title = title_case(topic),
            topic = topic,
        )
    }

    fn leave_letter(&self, reason: &str) -> String {
        let date = Local::now().format("%B %-d, %Y");
        format!(
            "{date}\n\n\
             Dear Manager,\n\n\
             I am writing to request a leave of absence due to {reason}. I will make sure my \
             current work is handed over before I leave and I will be reachable for anything \
             urgent.\n\n\
             Thank you for considering my request.\n\n\
             Sincerely,\n\
             [Your Name]\n",
            date = date,
            reason = reason.trim(),
        )
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Provider-backed composer.
///
/// Methods block on the runtime handle, so they must be called from a
/// blocking thread (handlers run under `spawn_blocking`).
pub struct LlmComposer {
    provider: Arc<dyn LlmProvider>,
    handle: tokio::runtime::Handle,
    timeout: Duration,
    fallback: TemplateComposer,
}

impl LlmComposer {
    pub fn new(provider: Arc<dyn LlmProvider>, handle: tokio::runtime::Handle, timeout: Duration) -> Self {
        Self {
            provider,
            handle,
            timeout,
            fallback: TemplateComposer,
        }
    }

    fn ask(&self, system: &str, user: String) -> Option<String> {
        let request = LlmRequest {
            system: Some(system.to_string()),
            user,
            temperature: 0.7,
            max_tokens: 1500,
        };
        // The timer must be created inside the runtime context
        let _guard = self.handle.enter();
        let result = self
            .handle
            .block_on(tokio::time::timeout(self.timeout, self.provider.complete(&request)));
        match result {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                debug!("Composed {} chars with {}", text.len(), self.provider.name());
                Some(text.trim().to_string())
            }
            Ok(Ok(_)) => {
                warn!("{} returned empty text; using template", self.provider.name());
                None
            }
            Ok(Err(e)) => {
                warn!("{} could not compose ({}); using template", self.provider.name(), e);
                None
            }
            Err(_) => {
                warn!("{} timed out composing; using template", self.provider.name());
                None
            }
        }
    }
}

impl Composer for LlmComposer {
    fn article(&self, topic: &str) -> String {
        self.ask(
            "You write clear, well-structured plain-text articles of about 400 words. \
             Use a title line and short section headings. No Markdown.",
            format!("Write an article about {}.", topic.trim()),
        )
        .unwrap_or_else(|| self.fallback.article(topic))
    }

    fn leave_letter(&self, reason: &str) -> String {
        self.ask(
            "You write short, polite plain-text leave request letters addressed to a manager.",
            format!("Write a leave letter. Reason: {}.", reason.trim()),
        )
        .unwrap_or_else(|| self.fallback.leave_letter(reason))
    }
}
