//! Terminal output for the session
//!
//! Every step gets exactly one outcome line. Colors are used only when
//! stdout is a terminal and NO_COLOR is unset.

use indicatif::{ProgressBar, ProgressStyle};
use nova_common::{
    ActionPlan, ActionStep, Config, ConfirmRequest, ConfirmationLevel, Gateway, Outcome, PlanOrigin, PlanState,
    SessionRecord,
};
use owo_colors::OwoColorize;
use std::time::Duration;

const SPINNER_TICK_MS: u64 = 80;

/// Braille spinner frames
const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// ASCII fallback spinner
const ASCII_FRAMES: &[&str] = &["-", "\\", "|", "/"];

/// Whether to emit ANSI colors
pub fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    console::Term::stdout().features().is_attended() && console::colors_enabled()
}

#[derive(Debug, Clone, Copy)]
pub struct Display {
    color: bool,
}

impl Display {
    pub fn auto() -> Self {
        Self {
            color: should_use_color(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn use_colors(&self) -> bool {
        self.color
    }

    // ========================================================================
    // Plans and outcomes
    // ========================================================================

    /// Text of an outcome line, without markers or colors
    pub fn outcome_text(index: usize, step: &ActionStep, outcome: &Outcome) -> String {
        let mut line = format!("[{}] {}", index + 1, step.description);
        if outcome.ok {
            if !outcome.message.is_empty() && outcome.message != step.description {
                line.push_str(&format!(" - {}", outcome.message));
            }
        } else {
            let kind = outcome.error_kind.map(|k| k.as_str()).unwrap_or("other");
            line.push_str(&format!(" ({}): {}", kind, outcome.message));
        }
        if outcome.retries_used > 0 {
            line.push_str(&format!(" [retries: {}]", outcome.retries_used));
        }
        line
    }

    pub fn print_outcome(&self, index: usize, step: &ActionStep, outcome: &Outcome) {
        let text = Self::outcome_text(index, step, outcome);
        match (self.color, outcome.ok) {
            (true, true) => println!("{} {}", "✓".bright_green(), text),
            (true, false) => println!("{} {}", "✗".bright_red(), text.red()),
            (false, true) => println!("✓ {}", text),
            (false, false) => println!("✗ {}", text),
        }
    }

    /// Plan summary shown before execution
    pub fn print_plan(&self, plan: &ActionPlan) {
        let origin = match &plan.origin {
            PlanOrigin::Structured { provider } => format!("planned by {}", provider),
            PlanOrigin::Fallback { reason: Some(kind) } => format!("rule table, model {}", kind),
            PlanOrigin::Fallback { reason: None } => "rule table".to_string(),
        };
        let steps = match plan.steps.len() {
            1 => "1 step".to_string(),
            n => format!("{} steps", n),
        };

        if self.color {
            println!("{} {}", plan.description.bold(), format!("({}, {})", steps, origin).dimmed());
        } else {
            println!("{} ({}, {})", plan.description, steps, origin);
        }
    }

    pub fn print_plan_end(&self, state: PlanState) {
        match state {
            PlanState::Completed => {}
            PlanState::Declined => self.warning("Plan stopped: confirmation declined"),
            PlanState::Aborted => self.warning("Plan stopped"),
            PlanState::Pending | PlanState::Running => {}
        }
    }

    /// Question for a confirmation request
    pub fn confirm_prompt(request: &ConfirmRequest) -> String {
        let effect = request.side_effect.indicator();
        match request.level {
            ConfirmationLevel::RequireExplicitYes => format!(
                "Step {} {} {}: {}\nType 'yes' to proceed: ",
                request.step_index + 1,
                effect,
                request.label,
                request.description
            ),
            _ => format!(
                "Step {} {} {}: {}\nProceed? [y/N]: ",
                request.step_index + 1,
                effect,
                request.label,
                request.description
            ),
        }
    }

    pub fn print_confirm(&self, request: &ConfirmRequest) {
        let prompt = Self::confirm_prompt(request);
        if self.color {
            print!("{}", prompt.yellow());
        } else {
            print!("{}", prompt);
        }
    }

    // ========================================================================
    // Progress
    // ========================================================================

    /// Spinner shown while a language model is generating
    pub fn thinking_spinner(&self) -> ProgressBar {
        let spinner = if console::Term::stdout().features().is_attended() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };

        let (ticks, template) = if self.color {
            (SPINNER_FRAMES, "{spinner:.cyan} {msg}")
        } else {
            (ASCII_FRAMES, "{spinner} {msg}")
        };
        if let Ok(style) = ProgressStyle::default_spinner().template(template) {
            spinner.set_style(style.tick_strings(ticks));
        }
        spinner.set_message("planning...");
        spinner.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
        spinner
    }

    // ========================================================================
    // Session commands
    // ========================================================================

    pub fn print_welcome(&self, version: &str, llm: Option<&str>) {
        let mode = match llm {
            Some(name) => format!("language model: {}", name),
            None => "offline, rule table only".to_string(),
        };
        if self.color {
            println!("{} {} {}", "nova".bright_cyan().bold(), version, format!("({})", mode).dimmed());
        } else {
            println!("nova {} ({})", version, mode);
        }
        println!("Type a request, or 'help'.");
    }

    pub fn print_help(&self) {
        println!("Requests are plain sentences, for example:");
        for example in [
            "open notepad",
            "open notepad and type: shopping list",
            "write an article about solar power",
            "click at 100, 200",
            "take a screenshot",
        ] {
            println!("  {}", example);
        }
        println!();
        println!("Commands:");
        println!("  help      show this help");
        println!("  history   recent requests and how they ended");
        println!("  status    language-model providers and settings");
        println!("  quit      end the session (also 'exit' or Ctrl-C)");
    }

    pub fn print_history(&self, record: &SessionRecord, limit: usize) {
        if record.is_empty() {
            println!("No requests yet.");
            return;
        }
        for entry in record.recent(limit) {
            let marker = if entry.all_ok() { "✓" } else { "✗" };
            let ok = entry.outcomes.iter().filter(|o| o.ok).count();
            let line = format!(
                "{} #{} {} [{}, {}/{} ok]",
                marker,
                entry.id,
                entry.utterance,
                entry.state,
                ok,
                entry.plan.steps.len()
            );
            match (self.color, entry.all_ok()) {
                (true, true) => println!("{}", line.green()),
                (true, false) => println!("{}", line.red()),
                _ => println!("{}", line),
            }
        }
    }

    pub fn print_status(&self, config: &Config, gateway: Option<&Gateway>) {
        println!("Providers:");
        match gateway {
            Some(gateway) => {
                let active = gateway.active_name();
                for (name, model, state) in gateway.states() {
                    let marker = if Some(name.as_str()) == active { "*" } else { " " };
                    println!(" {} {:<8} {:<24} {}", marker, name, model, state);
                }
            }
            None => println!("   (offline)"),
        }

        let flags = &config.flags;
        println!("Settings:");
        println!("   llm available         {}", flags.llm_available);
        println!("   confirm writes        {}", flags.confirm_destructive_default);
        println!("   max retries           {}", flags.max_retries);
        println!("   step timeout          {}s", flags.step_timeout.as_secs());
        println!("   desktop path          {}", config.desktop_path.display());
        println!("   log directory         {}", config.log_dir.display());
    }

    pub fn info(&self, message: &str) {
        if self.color {
            println!("{}", message.dimmed());
        } else {
            println!("{}", message);
        }
    }

    pub fn warning(&self, message: &str) {
        if self.color {
            println!("{}", message.yellow());
        } else {
            println!("{}", message);
        }
    }

    pub fn error(&self, message: &str) {
        if self.color {
            eprintln!("{} {}", "error:".bright_red().bold(), message);
        } else {
            eprintln!("error: {}", message);
        }
    }
}
