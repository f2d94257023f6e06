//! Startup - wire the configuration into a running session

use anyhow::{Context, Result};
use chrono::Local;
use nova_common::composer::{Composer, LlmComposer, TemplateComposer};
use nova_common::desktop::{Desktop, HeadlessDesktop, SystemDesktop};
use nova_common::handlers::HandlerContext;
use nova_common::{Config, Dispatcher, Gateway, Planner, ProviderKind, Registry, RetryPolicy, SessionLog, SessionRecord};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::display::Display;
use crate::repl::Session;

/// Startup switches from the command line
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub offline: bool,
    pub headless: bool,
    pub provider: Option<ProviderKind>,
}

/// Build the session; the configuration must already be validated
pub async fn start(mut config: Config, options: &StartOptions, display: Display) -> Result<Session> {
    let client = reqwest::Client::builder()
        .timeout(config.llm_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    if !options.offline {
        config.check_local_providers(&client).await;
    }

    let desktop: Arc<dyn Desktop> = if options.headless {
        Arc::new(HeadlessDesktop::new(config.screen.unwrap_or_default()))
    } else {
        Arc::new(SystemDesktop::new(config.screen))
    };
    let screen = config.screen.unwrap_or_else(|| desktop.screen_size());
    debug!("Desktop backend {} ({}x{})", desktop.name(), screen.width, screen.height);

    let registry = Arc::new(Registry::builtin(screen).confirm_writes(config.flags.confirm_destructive_default));
    debug!("{} capabilities registered", registry.len());

    let gateway = if options.offline {
        info!("Offline: language model disabled");
        None
    } else {
        Some(Gateway::from_config(&config, client, options.provider))
    };

    let composer: Arc<dyn Composer> = match gateway.as_ref().and_then(|g| g.active_provider()) {
        Some(provider) => Arc::new(LlmComposer::new(
            provider,
            tokio::runtime::Handle::current(),
            config.composer_timeout(),
        )),
        None => Arc::new(TemplateComposer),
    };

    let context = HandlerContext::new(desktop, composer, config.desktop_path.clone());
    let planner = Planner::new(registry.clone()).with_timeout(config.llm_timeout);
    let dispatcher = Dispatcher::new(registry, context, RetryPolicy::from_flags(&config.flags));

    let mut record = SessionRecord::new(config.history_capacity);
    match SessionLog::create(&config.log_dir, Local::now()) {
        Ok(log) => {
            info!("Session log: {}", log.path().display());
            record = record.with_log(log);
        }
        Err(e) => warn!("Session log disabled, cannot write to {}: {}", config.log_dir.display(), e),
    }

    Ok(Session::new(config, gateway, planner, dispatcher, record, display))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_common::config::FileConfig;
    use std::collections::HashMap;

    fn config_in(dir: &std::path::Path) -> Config {
        let vars: HashMap<String, String> = [
            ("DESKTOP_PATH", dir.join("desktop")),
            ("NOVA_LOG_DIR", dir.join("logs")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.display().to_string()))
        .collect();
        Config::from_sources(&|key: &str| vars.get(key).cloned(), FileConfig::default())
    }

    #[tokio::test]
    async fn test_offline_headless_session() {
        let dir = tempfile::tempdir().unwrap();
        let options = StartOptions {
            offline: true,
            headless: true,
            provider: None,
        };
        let session = start(config_in(dir.path()), &options, Display::plain()).await.unwrap();

        assert!(session.gateway().is_none());
        assert!(session.record().log_path().unwrap().starts_with(dir.path().join("logs")));
        assert!(!session.interrupted());
    }
}
