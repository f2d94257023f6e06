//! Configuration & provider registry
//!
//! Reads the environment once (plus an optional `.env` and TOML file),
//! enumerates the language-model providers and publishes read-only flags.
//! Loading never fails; problems that make a session impossible are kept
//! aside and surfaced by `validate()` before the loop starts.
//!
//! Config file: $NOVA_CONFIG or ~/.config/nova/config.toml

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::desktop::ScreenSize;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Supported language-model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Ollama,
}

impl ProviderKind {
    /// Enumeration order, also the "first reachable" order
    pub const ALL: [ProviderKind; 3] = [ProviderKind::OpenAi, ProviderKind::Gemini, ProviderKind::Ollama];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::Ollama => "llama3.2",
        }
    }

    /// Environment variable holding the API key, if the provider needs one
    pub fn key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Gemini => Some("GEMINI_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }

    fn default_endpoint(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Ollama => DEFAULT_OLLAMA_URL,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ProviderKind::Ollama)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| ConfigError::UnknownProvider(s.to_string()))
    }
}

/// Startup configuration errors (`fatal_config`)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown LLM provider '{0}' (expected openai, gemini or ollama)")]
    UnknownProvider(String),

    #[error("DESKTOP_PATH '{0}' exists but is not a directory")]
    DesktopPathNotDirectory(PathBuf),

    #[error("OLLAMA_URL '{url}' is not a valid URL: {reason}")]
    InvalidOllamaUrl { url: String, reason: String },
}

/// Endpoint and credential for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderBaseConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

/// One language-model provider as seen at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub name: String,
    pub base_config: ProviderBaseConfig,
    pub reachable: bool,
    pub model_id: String,
}

/// Read-only flags published to the rest of the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    pub llm_available: bool,
    /// Steps that write files ask first unless turned off
    pub confirm_destructive_default: bool,
    pub max_retries: u32,
    pub step_timeout: Duration,
}

/// Optional TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
    #[serde(default)]
    pub llm_timeout_secs: Option<u64>,
    #[serde(default)]
    pub confirm_destructive_default: Option<bool>,
    #[serde(default)]
    pub history_capacity: Option<usize>,
    /// Extra credential values treated as absent
    #[serde(default)]
    pub placeholder_sentinels: Vec<String>,
    #[serde(default)]
    pub screen_width: Option<u32>,
    #[serde(default)]
    pub screen_height: Option<u32>,
}

impl FileConfig {
    /// Resolve the config file path
    pub fn default_path(lookup: &dyn Fn(&str) -> Option<String>) -> Option<PathBuf> {
        if let Some(path) = lookup("NOVA_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("nova").join("config.toml"))
    }

    /// Read the file; missing is fine, malformed is logged and ignored
    pub fn read(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("Cannot read config file {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring malformed config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Main configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub providers: Vec<ProviderDescriptor>,
    pub default_provider: ProviderKind,
    pub desktop_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: Option<String>,
    pub flags: Flags,
    pub llm_timeout: Duration,
    pub history_capacity: usize,
    pub screen: Option<ScreenSize>,
    issues: Vec<ConfigError>,
}

impl Config {
    /// Read `.env`, the environment and the config file once
    pub fn load() -> Self {
        load_env_file();
        Self::from_env()
    }

    /// Environment and config file only; `.env` must already be applied
    pub fn from_env() -> Self {
        let lookup = |key: &str| std::env::var(key).ok();
        let file = FileConfig::default_path(&lookup)
            .map(|path| FileConfig::read(&path))
            .unwrap_or_default();

        Self::from_sources(&lookup, file)
    }

    /// Build from an arbitrary variable lookup (tests supply a map)
    pub fn from_sources(lookup: &dyn Fn(&str) -> Option<String>, file: FileConfig) -> Self {
        let mut issues = Vec::new();
        let sentinels: Vec<String> = file
            .placeholder_sentinels
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect();

        let default_provider = match lookup("DEFAULT_LLM_PROVIDER").filter(|v| !v.trim().is_empty()) {
            Some(raw) => match raw.parse::<ProviderKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    issues.push(e);
                    ProviderKind::Gemini
                }
            },
            None => ProviderKind::Gemini,
        };

        let models = parse_model_map(lookup("DEFAULT_MODEL").as_deref(), default_provider);

        let ollama_url = lookup("OLLAMA_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        if let Err(e) = url::Url::parse(&ollama_url) {
            issues.push(ConfigError::InvalidOllamaUrl {
                url: ollama_url.clone(),
                reason: e.to_string(),
            });
        }

        let providers = ProviderKind::ALL
            .into_iter()
            .map(|kind| {
                let api_key = kind
                    .key_env()
                    .and_then(|var| lookup(var))
                    .filter(|value| !is_placeholder(value, &sentinels));
                let endpoint = if kind == ProviderKind::Ollama {
                    ollama_url.trim_end_matches('/').to_string()
                } else {
                    kind.default_endpoint().to_string()
                };
                // Hosted providers count as reachable once a real key is present;
                // the local server is pinged separately.
                let reachable = !kind.is_local() && api_key.is_some();
                ProviderDescriptor {
                    kind,
                    name: kind.as_str().to_string(),
                    base_config: ProviderBaseConfig { endpoint, api_key },
                    reachable,
                    model_id: models
                        .get(&kind)
                        .cloned()
                        .unwrap_or_else(|| kind.default_model().to_string()),
                }
            })
            .collect::<Vec<_>>();

        let desktop_path = lookup("DESKTOP_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_desktop_path);
        if desktop_path.exists() && !desktop_path.is_dir() {
            issues.push(ConfigError::DesktopPathNotDirectory(desktop_path.clone()));
        }

        let log_dir = lookup("NOVA_LOG_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs"));

        let screen = match (file.screen_width, file.screen_height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => Some(ScreenSize { width, height }),
            _ => None,
        };

        let mut config = Self {
            providers,
            default_provider,
            desktop_path,
            log_dir,
            log_level: lookup("LOG_LEVEL").filter(|v| !v.trim().is_empty()),
            flags: Flags {
                llm_available: false,
                confirm_destructive_default: file.confirm_destructive_default.unwrap_or(true),
                max_retries: file.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                step_timeout: Duration::from_secs(
                    file.step_timeout_secs.unwrap_or(DEFAULT_STEP_TIMEOUT_SECS).max(1),
                ),
            },
            llm_timeout: Duration::from_secs(file.llm_timeout_secs.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS).max(1)),
            history_capacity: file.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY).max(1),
            screen,
            issues,
        };
        config.refresh_flags();
        config
    }

    /// Fatal configuration problems found while loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.issues.first() {
            Some(issue) => Err(issue.clone()),
            None => Ok(()),
        }
    }

    /// Ping local providers (the Ollama server) and refresh reachability
    pub async fn check_local_providers(&mut self, client: &reqwest::Client) {
        for descriptor in self.providers.iter_mut().filter(|d| d.kind.is_local()) {
            descriptor.reachable = crate::llm::ollama::ping_endpoint(client, &descriptor.base_config.endpoint).await;
            debug!("Ping {}: reachable={}", descriptor.name, descriptor.reachable);
        }
        self.refresh_flags();
    }

    /// Mark a provider as reachable or not (re-evaluation after failure)
    pub fn set_reachable(&mut self, kind: ProviderKind, reachable: bool) {
        if let Some(descriptor) = self.providers.iter_mut().find(|d| d.kind == kind) {
            descriptor.reachable = reachable;
        }
        self.refresh_flags();
    }

    fn refresh_flags(&mut self) {
        self.flags.llm_available = self.providers.iter().any(|d| d.reachable);
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|d| d.kind == kind)
    }

    /// The named provider if reachable, else the first reachable, else None
    pub fn select_provider(&self, name: Option<ProviderKind>) -> Option<&ProviderDescriptor> {
        if let Some(kind) = name {
            if let Some(descriptor) = self.provider(kind).filter(|d| d.reachable) {
                return Some(descriptor);
            }
        }
        self.providers.iter().find(|d| d.reachable)
    }

    /// Budget for composing text inside a step; leaves half the step for typing
    pub fn composer_timeout(&self) -> Duration {
        self.llm_timeout.min(self.flags.step_timeout / 2)
    }
}

/// Apply a `.env` file from the working directory without overriding set variables
pub fn load_env_file() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!("Loaded environment from {}", path.display());
            Some(path)
        }
        Err(e) if e.not_found() => None,
        Err(e) => {
            warn!("Ignoring unreadable .env file: {}", e);
            None
        }
    }
}

/// Empty strings, `your_<name>_key_here` and configured sentinels count as absent
pub fn is_placeholder(value: &str, sentinels: &[String]) -> bool {
    let lower = value.trim().to_lowercase();
    if lower.is_empty() {
        return true;
    }
    if lower.starts_with("your_") && lower.ends_with("_key_here") {
        return true;
    }
    sentinels.iter().any(|s| *s == lower)
}

/// DEFAULT_MODEL: JSON object provider -> model, or a bare model name for the default provider
fn parse_model_map(raw: Option<&str>, default_provider: ProviderKind) -> HashMap<ProviderKind, String> {
    let mut models = HashMap::new();
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return models;
    };

    if raw.starts_with('{') {
        match serde_json::from_str::<HashMap<String, String>>(raw) {
            Ok(map) => {
                for (name, model) in map {
                    match name.parse::<ProviderKind>() {
                        Ok(kind) => {
                            models.insert(kind, model);
                        }
                        Err(_) => warn!("DEFAULT_MODEL names unknown provider '{}'", name),
                    }
                }
            }
            Err(e) => warn!("Ignoring malformed DEFAULT_MODEL: {}", e),
        }
    } else {
        models.insert(default_provider, raw.to_string());
    }
    models
}

fn default_desktop_path() -> PathBuf {
    dirs::desktop_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Desktop")))
        .unwrap_or_else(|| PathBuf::from("."))
}
