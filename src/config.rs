//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults, so a partial file (or none) still runs. Secrets
//! (the API token) are referenced by env-var name in the config and
//! resolved at runtime into a `SecretString`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::engine::alerts::DEFAULT_ALERT_CAPACITY;
use crate::engine::history::{DEFAULT_CAPACITY, MIN_CAPACITY};
use crate::engine::tracker::IsolationPolicy;
use crate::types::{Symbol, WatchError};
use crate::venue::client::{FeedConfig, DEFAULT_URL};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedSection,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedSection {
    pub url: String,
    pub app_id: String,
    /// Name of the environment variable holding the API token.
    pub api_token_env: String,
    pub symbols: Vec<String>,
    pub subscribe_spacing_ms: u64,
    pub ping_interval_secs: u64,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            app_id: "1089".to_string(),
            api_token_env: "DERIV_API_TOKEN".to_string(),
            symbols: ["R_10", "R_25", "R_50", "R_75", "R_100"]
                .into_iter()
                .map(String::from)
                .collect(),
            subscribe_spacing_ms: 200,
            ping_interval_secs: 30,
            reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub history_window: usize,
    pub isolation: IsolationPolicy,
    pub alert_log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_CAPACITY,
            isolation: IsolationPolicy::default(),
            alert_log_capacity: DEFAULT_ALERT_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "digitwatch.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3001,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise run on defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            let config = Self::load(path)?;
            info!(path, "Configuration loaded");
            Ok(config)
        } else {
            warn!(path, "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), WatchError> {
        if self.engine.history_window < MIN_CAPACITY {
            return Err(WatchError::Config(format!(
                "engine.history_window must be at least {MIN_CAPACITY} (got {})",
                self.engine.history_window
            )));
        }
        if self.feed.symbols.is_empty() {
            return Err(WatchError::Config("feed.symbols must not be empty".into()));
        }
        if self.feed.app_id.is_empty() || !self.feed.app_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(WatchError::Config(format!(
                "feed.app_id must be numeric (got {:?})",
                self.feed.app_id
            )));
        }
        if self.feed.ping_interval_secs == 0 {
            return Err(WatchError::Config("feed.ping_interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The API token, if its environment variable is set and non-empty.
    pub fn api_token(&self) -> Option<SecretString> {
        Self::resolve_env(&self.feed.api_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::new)
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.feed.symbols.iter().map(|s| Symbol::new(s.as_str())).collect()
    }

    /// Feed client settings, with the token resolved.
    pub fn feed_config(&self) -> FeedConfig {
        let max_reconnect = self
            .feed
            .max_reconnect_delay_ms
            .max(self.feed.reconnect_delay_ms);
        FeedConfig {
            url: self.feed.url.clone(),
            app_id: self.feed.app_id.clone(),
            token: self.api_token(),
            symbols: self.symbols(),
            subscribe_spacing: Duration::from_millis(self.feed.subscribe_spacing_ms),
            ping_interval: Duration::from_secs(self.feed.ping_interval_secs),
            reconnect_delay: Duration::from_millis(self.feed.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(max_reconnect),
            ..FeedConfig::default()
        }
    }
}
