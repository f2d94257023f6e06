//! REPL - the interactive session
//!
//! Reads an utterance, plans it, runs it through the dispatcher (which asks
//! for confirmation where needed) and prints one line per step. Plans run
//! strictly one after another.
//!
//! Shutdown: `quit`, `exit`, end of input or Ctrl-C. An interrupt lets the
//! running step finish, starts no further steps and ends the session. The
//! session record is persisted by `finish`.

use nova_common::{Config, Dispatcher, Gateway, PlanRun, Planner, SessionRecord};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::VERSION;
use crate::confirm::StdinConfirmer;
use crate::display::Display;
use crate::errors::{exit_code_for, EXIT_INTERRUPTED, EXIT_SUCCESS};
use crate::input::{Input, InputEvent};

/// Plans listed by `history`
const HISTORY_LIMIT: usize = 10;

const PROMPT: &str = "nova> ";

/// A line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Help,
    History,
    Status,
    Quit,
    Utterance(String),
}

pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    match trimmed.to_lowercase().as_str() {
        "" => Command::Empty,
        "help" | "?" => Command::Help,
        "history" => Command::History,
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        _ => Command::Utterance(trimmed.to_string()),
    }
}

/// Session controller
pub struct Session {
    config: Config,
    gateway: Option<Gateway>,
    planner: Planner,
    dispatcher: Dispatcher,
    record: SessionRecord,
    display: Display,
    cancel: Arc<AtomicBool>,
}

impl Session {
    pub fn new(
        config: Config,
        gateway: Option<Gateway>,
        planner: Planner,
        dispatcher: Dispatcher,
        record: SessionRecord,
        display: Display,
    ) -> Self {
        let cancel = dispatcher.cancel_flag();
        Self {
            config,
            gateway,
            planner,
            dispatcher,
            record,
            display,
            cancel,
        }
    }

    /// Raised by Ctrl-C; the dispatcher checks it between steps
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn interrupted(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn display(&self) -> Display {
        self.display
    }

    pub fn gateway(&self) -> Option<&Gateway> {
        self.gateway.as_ref()
    }

    /// Plan and execute one utterance
    pub async fn run_utterance(&mut self, utterance: &str, input: &mut Input) -> PlanRun {
        let generating = self.gateway.as_ref().is_some_and(|g| g.is_available());
        let spinner = generating.then(|| self.display.thinking_spinner());
        let plan = self.planner.plan(utterance, self.gateway.as_mut()).await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        self.display.print_plan(&plan);

        let display = self.display;
        let mut confirmer = StdinConfirmer::new(input, display);
        let run = self
            .dispatcher
            .execute_observed(utterance, &plan, &mut confirmer, &mut self.record, &mut |index, step, outcome| {
                display.print_outcome(index, step, outcome)
            })
            .await;

        self.display.print_plan_end(run.state);
        run
    }

    /// Run utterances in order (single request or the demo) and map to an exit code
    pub async fn run_batch<S: AsRef<str>>(&mut self, utterances: &[S], input: &mut Input) -> i32 {
        let mut runs = Vec::with_capacity(utterances.len());
        for utterance in utterances {
            if self.interrupted() {
                break;
            }
            runs.push(self.run_utterance(utterance.as_ref(), input).await);
        }
        exit_code_for(&runs, self.interrupted())
    }

    /// Interactive loop
    pub async fn run_interactive(&mut self, input: &mut Input) -> i32 {
        let llm = self.gateway.as_ref().and_then(|g| g.active_name()).map(str::to_string);
        self.display.print_welcome(VERSION, llm.as_deref());

        loop {
            if self.interrupted() {
                return EXIT_INTERRUPTED;
            }

            print!("{}", PROMPT);
            let _ = io::stdout().flush();

            let line = match input.next().await {
                InputEvent::Line(line) => line,
                InputEvent::Eof => {
                    println!();
                    return EXIT_SUCCESS;
                }
                InputEvent::Interrupt => {
                    println!();
                    return EXIT_INTERRUPTED;
                }
            };

            match parse_command(&line) {
                Command::Empty => {}
                Command::Help => self.display.print_help(),
                Command::History => self.display.print_history(&self.record, HISTORY_LIMIT),
                Command::Status => self.display.print_status(&self.config, self.gateway.as_ref()),
                Command::Quit => return EXIT_SUCCESS,
                Command::Utterance(utterance) => {
                    self.run_utterance(&utterance, input).await;
                }
            }
        }
    }

    /// Persist the session record; returns where it went
    pub fn finish(&self) -> Option<PathBuf> {
        match self.record.persist() {
            Ok(Some(path)) => {
                info!("Session summary written to {}", path.display());
                Some(path)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to persist session record: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("   "), Command::Empty);
        assert_eq!(parse_command("HELP"), Command::Help);
        assert_eq!(parse_command("history"), Command::History);
        assert_eq!(parse_command(" status "), Command::Status);
        assert_eq!(parse_command("quit"), Command::Quit);
        assert_eq!(parse_command("Exit"), Command::Quit);
    }

    #[test]
    fn test_utterance_is_trimmed_not_lowered() {
        assert_eq!(
            parse_command("  type: Hello World "),
            Command::Utterance("type: Hello World".to_string())
        );
    }
}
