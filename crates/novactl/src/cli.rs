//! Command-line arguments

use clap::Parser;
use nova_common::ProviderKind;

pub const VERSION: &str = env!("NOVA_VERSION");

#[derive(Parser, Debug)]
#[command(name = "novactl")]
#[command(about = "Nova - natural-language desktop assistant", long_about = None)]
#[command(version = VERSION)]
pub struct Cli {
    /// Run a built-in scripted sequence and exit
    #[arg(long, conflicts_with = "utterance")]
    pub demo: bool,

    /// Preferred language-model provider
    #[arg(long, value_name = "openai|gemini|ollama")]
    pub provider: Option<ProviderKind>,

    /// Never contact a language model; plan with the rule table only
    #[arg(long)]
    pub offline: bool,

    /// Do not touch the host desktop (actions are logged, screenshots are blank)
    #[arg(long)]
    pub headless: bool,

    /// Request to execute once; starts an interactive session when absent
    #[arg(trailing_var_arg = true)]
    pub utterance: Vec<String>,
}

/// What the invocation asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Interactive,
    Single(String),
    Demo,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.demo {
            return Mode::Demo;
        }
        let utterance = self.utterance.join(" ");
        if utterance.trim().is_empty() {
            Mode::Interactive
        } else {
            Mode::Single(utterance)
        }
    }
}
