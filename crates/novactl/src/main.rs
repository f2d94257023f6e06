//! Novactl - natural-language desktop assistant
//!
//! `novactl` starts an interactive session, `novactl "<request>"` runs one
//! request and `novactl --demo` runs the built-in smoke test.

use anyhow::Result;
use clap::Parser;
use nova_common::config::{self, Config};
use tracing::{debug, info};

use novactl::cli::{Cli, Mode, VERSION};
use novactl::display::Display;
use novactl::errors::EXIT_CONFIG_ERROR;
use novactl::input::Input;
use novactl::startup::{self, StartOptions};
use novactl::{demo, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_file = config::load_env_file();
    let config = Config::from_env();
    logging::init(config.log_level.as_deref());
    if let Some(path) = env_file {
        debug!("Environment loaded from {}", path.display());
    }
    info!("novactl {} starting", VERSION);

    let display = Display::auto();
    if let Err(e) = config.validate() {
        display.error(&format!("configuration: {}", e));
        std::process::exit(EXIT_CONFIG_ERROR);
    }

    let options = StartOptions {
        offline: cli.offline,
        headless: cli.headless,
        provider: cli.provider,
    };
    let mut session = startup::start(config, &options, display).await?;
    let mut input = Input::stdin(session.cancel_flag());

    let code = match cli.mode() {
        Mode::Interactive => session.run_interactive(&mut input).await,
        Mode::Single(utterance) => session.run_batch(&[utterance], &mut input).await,
        Mode::Demo => demo::run(&mut session, &mut input).await,
    };

    if let Some(path) = session.finish() {
        if let Some(log) = session.record().log_path() {
            display.info(&format!("Session log: {}", log.display()));
        }
        debug!("Session summary: {}", path.display());
    }
    info!("novactl exiting with code {}", code);

    std::process::exit(code);
}
