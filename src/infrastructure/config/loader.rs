use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

use crate::domain::models::Config;

/// Directory holding the project configuration files.
pub const CONFIG_DIR: &str = ".taskrelay";

/// Well-known variables accepted alongside the `TASKRELAY_*` ones, mapped
/// to their config path. Later entries win, so `GITHUB_TOKEN` beats
/// `GITHUB_PAT`.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("CLICKUP_API_KEY", "clickup.api_key"),
    ("CLICKUP_WEBHOOK_SECRET", "clickup.webhook_secret"),
    ("CLICKUP_LIST_ID", "clickup.list_id"),
    ("GITHUB_PAT", "github.token"),
    ("GITHUB_TOKEN", "github.token"),
    ("GITHUB_WEBHOOK_SECRET", "github.webhook_secret"),
    ("CLAUDE_CODE_PATH", "agent.binary_path"),
];

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid PORT value: {0}")]
    InvalidPort(String),

    #[error("agent.timeout_secs must be greater than 0")]
    ZeroAgentTimeout,

    #[error("reconcile.pr_lookup_attempts must be at least 1")]
    ZeroLookupAttempts,

    #[error("reconcile.freshness_window_secs must be greater than 0")]
    ZeroFreshnessWindow,

    #[error("max_concurrent_runs must be at least 1 when set")]
    ZeroConcurrentRuns,

    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .taskrelay/config.yaml (project config)
    /// 3. .taskrelay/local.yaml (local overrides, optional)
    /// 4. Well-known credential variables (`CLICKUP_API_KEY`, `GITHUB_TOKEN`, `PORT`, ...)
    /// 5. `TASKRELAY_*` variables, `__` separating nested keys
    pub fn load() -> Result<Config> {
        Self::load_in(".")
    }

    /// Load configuration using `root` as the project directory.
    pub fn load_in(root: impl AsRef<Path>) -> Result<Config> {
        let dir = root.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Serialized::defaults(Self::legacy_env()?))
            .merge(Env::prefixed("TASKRELAY_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Nested overrides from the well-known variables. Values stay strings
    /// so numeric-looking ids and secrets are not reinterpreted.
    fn legacy_env() -> Result<Value, ConfigError> {
        let mut root = Map::new();
        for (var, path) in LEGACY_ENV {
            if let Some(value) = std::env::var(var).ok().filter(|v| !v.is_empty()) {
                insert_path(&mut root, path, Value::String(value));
            }
        }
        if let Some(port) = std::env::var("PORT").ok().filter(|v| !v.is_empty()) {
            let port: u16 = port.parse().map_err(|_| ConfigError::InvalidPort(port.clone()))?;
            insert_path(&mut root, "server.port", Value::from(port));
        }
        Ok(Value::Object(root))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.agent.timeout_secs == 0 {
            return Err(ConfigError::ZeroAgentTimeout);
        }
        if config.reconcile.pr_lookup_attempts == 0 {
            return Err(ConfigError::ZeroLookupAttempts);
        }
        if config.reconcile.freshness_window_secs == 0 {
            return Err(ConfigError::ZeroFreshnessWindow);
        }
        if config.max_concurrent_runs == Some(0) {
            return Err(ConfigError::ZeroConcurrentRuns);
        }

        let required = [
            ("agent.binary_path", config.agent.binary_path.as_str()),
            ("agent.sentinel_prefix", config.agent.sentinel_prefix.as_str()),
            ("repository.base_branch", config.repository.base_branch.as_str()),
            ("reconcile.ready_status", config.reconcile.ready_status.as_str()),
            ("reconcile.branch_field", config.reconcile.branch_field.as_str()),
            ("reconcile.pr_url_field", config.reconcile.pr_url_field.as_str()),
            ("reconcile.manual_steps_marker", config.reconcile.manual_steps_marker.as_str()),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField(name));
            }
        }

        Ok(())
    }
}

/// Insert `value` at a dotted `path`, creating intermediate objects.
fn insert_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = root;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => current = map,
            _ => return,
        }
    }
}
