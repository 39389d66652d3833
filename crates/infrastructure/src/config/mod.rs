//! Agent configuration: structs, parsing, and validation.
//!
//! The config module is split across several sub-modules:
//! - `common`: shared helpers and `ConfigError`
//! - `sources`, `live`, `feed`: section configs

mod common;
mod feed;
mod live;
mod sources;

// ── Public re-exports ─────────────────────────────────────────────

pub use common::ConfigError;
pub use feed::FeedConfig;
pub use live::LiveConfig;
pub use sources::{PrimarySourceConfig, SourcesConfig, StoreSourceConfig};

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_HTTP_PORT};
use common::warn_if_world_readable;

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentInfo,

    pub sources: SourcesConfig,

    #[serde(default)]
    pub live: Option<LiveConfig>,

    #[serde(default)]
    pub feed: FeedConfig,
}

impl AgentConfig {
    /// Load config from a YAML file.
    ///
    /// On Unix, logs a warning if the config file is world-readable,
    /// since it may carry store API keys.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        warn_if_world_readable(path, "config file");
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Return a copy of the config with API keys masked.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let mut sanitized = self.clone();
        if let Some(ref mut fallback) = sanitized.sources.fallback {
            fallback.mask_secrets();
        }
        if let Some(ref mut live) = sanitized.live {
            live.mask_secrets();
        }
        sanitized
    }

    /// Validate the config after deserialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agent.validate()?;
        self.sources.validate()?;
        if let Some(ref live) = self.live {
            live.validate()?;
        }
        self.feed.validate()
    }

    /// Install the store API key supplied out of band (environment). It
    /// replaces the fallback store's configured key.
    pub fn apply_store_key(&mut self, key: &str) {
        let key = key.trim();
        if key.is_empty() {
            return;
        }
        if let Some(ref mut fallback) = self.sources.fallback {
            fallback.api_key = Some(key.to_string());
        }
    }

    /// Live channel settings when the channel is configured and enabled.
    pub fn live_channel(&self) -> Option<&LiveConfig> {
        self.live.as_ref().filter(|live| live.enabled)
    }

    /// Key for the live change feed: its own, else the store's.
    pub fn live_api_key(&self) -> Option<&str> {
        self.live
            .as_ref()
            .and_then(|live| live.api_key.as_deref())
            .or_else(|| {
                self.sources
                    .fallback
                    .as_ref()
                    .and_then(|fallback| fallback.api_key.as_deref())
            })
    }

    /// Rows requested from the fallback store per snapshot.
    pub fn store_limit(&self) -> usize {
        self.sources
            .fallback
            .as_ref()
            .and_then(|fallback| fallback.limit)
            .unwrap_or(self.feed.capacity)
    }
}

// ── Agent info ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentInfo {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// IP address for the read API to bind to.
    /// Defaults to `127.0.0.1` (localhost only). Set to `0.0.0.0` to listen
    /// on all interfaces (required for container deployments).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            http_port: default_http_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl AgentInfo {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.http_port == 0 {
            return Err(ConfigError::Validation {
                field: "agent.http_port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::Validation {
                field: "agent.bind_address".to_string(),
                message: format!("'{}' is not an IP address", self.bind_address),
            });
        }
        Ok(())
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}
fn default_log_format() -> LogFormat {
    LogFormat::Json
}
fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}
fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

// ── Log level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "invalid log level '{s}': expected error|warn|info|debug|trace"
            )),
        }
    }
}

// ── Log format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            _ => Err(format!("invalid log format '{s}': expected json|text")),
        }
    }
}
