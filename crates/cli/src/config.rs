//! Configuration loading and management

use anyhow::{Context, Result};
use crosspost_domain::{MAX_RETRIES, MAX_RETRY_DELAY};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_true")]
    pub continue_on_error: bool,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub transport: TransportKind,
}

/// Which transport the CLI wires into the runtimes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Http,
    /// Offline transport answering `200 {}` to everything
    Stub,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Env var holding the session cookie header for this platform
    #[serde(default)]
    pub cookie_env: Option<String>,

    /// Cookie domain; the definition's homepage host when unset
    #[serde(default)]
    pub cookie_domain: Option<String>,
}

fn default_definitions_dir() -> PathBuf {
    PathBuf::from("./platforms")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    3
}

fn default_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            definitions_dir: default_definitions_dir(),
            log_level: default_log_level(),
            concurrency: default_concurrency(),
            continue_on_error: default_true(),
            retries: default_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            transport: TransportKind::default(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cookie_env: None,
            cookie_domain: None,
        }
    }
}

impl PlatformConfig {
    /// Read the session cookie from the configured env var, if any
    pub fn cookie(&self) -> Option<SecretString> {
        let env_var = self.cookie_env.as_deref()?;
        match std::env::var(env_var) {
            Ok(value) if !value.trim().is_empty() => Some(SecretString::new(value.into())),
            _ => None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CROSSPOST")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Per-platform settings; platforms without a section are enabled
    pub fn platform(&self, id: &str) -> PlatformConfig {
        self.platforms.get(id).cloned().unwrap_or_default()
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.platforms.get(id).is_none_or(|p| p.enabled)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.general.request_timeout_secs)
    }

    /// Configured retries, capped at the orchestrator's limit
    pub fn retries(&self) -> u32 {
        self.general.retries.min(MAX_RETRIES)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.general.retry_base_delay_ms).min(MAX_RETRY_DELAY)
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# crosspost configuration

[general]
definitions_dir = "./platforms"
log_level = "info"
# Platforms processed per batch
concurrency = 3
continue_on_error = true
# Extra attempts for network failures, with exponential backoff
retries = 2
retry_base_delay_ms = 500
request_timeout_secs = 30
transport = "http"  # http, stub

# One section per platform id; platforms without a section are enabled.
# [platforms.example]
# enabled = true
# cookie_env = "EXAMPLE_COOKIE"
# cookie_domain = "example.com"
"#
        .to_string()
    }
}
