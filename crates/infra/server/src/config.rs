//! Server configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use bans_webhooks::WebhookConfig;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "BANS_API_CONFIG";
/// Environment variable overriding `[mail].sendgrid_api_key`.
pub const SENDGRID_API_KEY_ENV: &str = "SENDGRID_API_KEY";

/// Server-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Log level.
    pub log_level: String,
    /// How long shutdown waits for in-flight deliveries.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Outbound mail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// SendGrid API key. Without one, notices are only logged.
    pub sendgrid_api_key: Option<String>,
    /// Sender address on disablement notices.
    pub from_address: String,
    /// Optional SendGrid dynamic template.
    pub template_id: Option<String>,
    /// Override for the SendGrid API base url.
    pub api_base: Option<String>,
    /// Upper bound on a single SendGrid call, in milliseconds.
    pub timeout_ms: u64,
    /// Contact address per endpoint owner, used for disablement notices.
    pub owners: BTreeMap<String, String>,
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sendgrid_api_key: None,
            from_address: "noreply@bans-api.local".to_string(),
            template_id: None,
            api_base: None,
            timeout_ms: 10_000,
            owners: BTreeMap::new(),
        }
    }
}

/// The full configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub webhooks: WebhookConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Applies environment overrides.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup(SENDGRID_API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.mail.sendgrid_api_key = Some(key);
        }
        self
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.webhooks.disable_threshold == 0 {
            return Err(ConfigError::Invalid("webhooks.disable_threshold must be at least 1".into()));
        }
        if self.webhooks.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("webhooks.request_timeout_ms must be positive".into()));
        }
        if self.mail.timeout_ms == 0 {
            return Err(ConfigError::Invalid("mail.timeout_ms must be positive".into()));
        }
        Ok(self)
    }
}

/// Loads configuration from a TOML file.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
    AppConfig::from_toml(&content)?
        .with_env_overrides(|name| std::env::var(name).ok())
        .validate()
}

/// Loads the file named by `BANS_API_CONFIG`, or defaults when unset.
pub fn load_from_env() -> Result<AppConfig, ConfigError> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => load_config(&path),
        Err(_) => AppConfig::default()
            .with_env_overrides(|name| std::env::var(name).ok())
            .validate(),
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
