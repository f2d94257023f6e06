//! Confirmation channel
//!
//! Asks on the terminal before a step that needs approval. The allowed
//! answers are yes and no; anything else, an empty line, end of input or
//! Ctrl-C counts as no.

use async_trait::async_trait;
use nova_common::{ConfirmRequest, ConfirmationLevel, Confirmer};
use std::io::{self, Write};
use tracing::info;

use crate::display::Display;
use crate::input::{Input, InputEvent};

/// Whether `answer` accepts a request at `level`
pub fn accepts(level: ConfirmationLevel, answer: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    match level {
        ConfirmationLevel::None => true,
        ConfirmationLevel::Prompt => answer == "y" || answer == "yes",
        ConfirmationLevel::RequireExplicitYes => answer == "yes",
    }
}

/// Confirmer reading answers from the session input
pub struct StdinConfirmer<'a> {
    input: &'a mut Input,
    display: Display,
}

impl<'a> StdinConfirmer<'a> {
    pub fn new(input: &'a mut Input, display: Display) -> Self {
        Self { input, display }
    }
}

#[async_trait]
impl Confirmer for StdinConfirmer<'_> {
    async fn confirm(&mut self, request: &ConfirmRequest) -> bool {
        self.display.print_confirm(request);
        let _ = io::stdout().flush();

        let accepted = match self.input.next().await {
            InputEvent::Line(answer) => accepts(request.level, &answer),
            InputEvent::Eof | InputEvent::Interrupt => {
                println!();
                false
            }
        };

        info!("Confirmation for {}: {}", request.label, if accepted { "accepted" } else { "declined" });
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_common::{Params, SideEffect};

    #[test]
    fn test_prompt_answers() {
        assert!(accepts(ConfirmationLevel::Prompt, "y"));
        assert!(accepts(ConfirmationLevel::Prompt, " YES "));
        assert!(!accepts(ConfirmationLevel::Prompt, ""));
        assert!(!accepts(ConfirmationLevel::Prompt, "sure"));
        assert!(!accepts(ConfirmationLevel::Prompt, "n"));
    }

    #[test]
    fn test_explicit_yes_refuses_y() {
        assert!(accepts(ConfirmationLevel::RequireExplicitYes, "yes"));
        assert!(!accepts(ConfirmationLevel::RequireExplicitYes, "y"));
        assert!(!accepts(ConfirmationLevel::RequireExplicitYes, ""));
    }

    fn request(level: ConfirmationLevel) -> ConfirmRequest {
        ConfirmRequest {
            step_index: 0,
            label: "file_operation/delete_file".to_string(),
            description: "Delete notes.txt".to_string(),
            level,
            side_effect: SideEffect::Destructive,
            parameters: Params::new(),
        }
    }

    #[tokio::test]
    async fn test_reads_answers_in_order() {
        let mut input = Input::scripted(["y", "yes"]);
        let mut confirmer = StdinConfirmer::new(&mut input, Display::plain());
        assert!(!confirmer.confirm(&request(ConfirmationLevel::RequireExplicitYes)).await);
        assert!(confirmer.confirm(&request(ConfirmationLevel::RequireExplicitYes)).await);
    }

    #[tokio::test]
    async fn test_end_of_input_declines() {
        let mut input = Input::scripted(Vec::<String>::new());
        let mut confirmer = StdinConfirmer::new(&mut input, Display::plain());
        assert!(!confirmer.confirm(&request(ConfirmationLevel::Prompt)).await);
    }
}
