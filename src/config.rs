//! Configuration management for nexus-tracker
//!
//! This module handles loading, parsing, validating, and managing the static
//! deployment configuration from a YAML file, environment variables, and CLI
//! overrides.
//!
//! The operator-chosen dispatch settings (mode, team, member) are *not* part
//! of this file; they live in the [`crate::store`] config store so they can
//! change while the tracker is running.

use crate::error::{Result, TrackerError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for nexus-tracker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote collector endpoints
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Session tracking thresholds and URL policy
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Identity token provider settings for `login` mode
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Dispatch config store location
    #[serde(default)]
    pub store: StoreConfig,
    /// Optional bounded delivery outbox
    #[serde(default)]
    pub outbox: OutboxConfig,
    /// Logging output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Collector endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Base URL of the collector service
    #[serde(default = "default_collector_base_url")]
    pub base_url: String,

    /// Path of the unauthenticated token-mode endpoint
    #[serde(default = "default_token_log_path")]
    pub token_log_path: String,

    /// Path of the bearer-authenticated login-mode endpoint
    #[serde(default = "default_auth_log_path")]
    pub auth_log_path: String,

    /// Request timeout in seconds
    #[serde(default = "default_collector_timeout")]
    pub timeout_seconds: u64,
}

fn default_collector_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_token_log_path() -> String {
    "/api/ext/log".to_string()
}

fn default_auth_log_path() -> String {
    "/api/ext/log_auth".to_string()
}

fn default_collector_timeout() -> u64 {
    30
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: default_collector_base_url(),
            token_log_path: default_token_log_path(),
            auth_log_path: default_auth_log_path(),
            timeout_seconds: default_collector_timeout(),
        }
    }
}

impl CollectorConfig {
    /// Full URL of the token-mode endpoint
    pub fn token_log_url(&self) -> String {
        join_url(&self.base_url, &self.token_log_path)
    }

    /// Full URL of the login-mode endpoint
    pub fn auth_log_url(&self) -> String {
        join_url(&self.base_url, &self.auth_log_path)
    }

    /// Request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Session tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Sessions must last strictly longer than this to be reported
    #[serde(default = "default_min_duration_seconds")]
    pub min_duration_seconds: u64,

    /// URL schemes that count as network pages
    #[serde(default = "default_tracked_schemes")]
    pub tracked_schemes: Vec<String>,

    /// Regex patterns; matching URLs are never tracked
    #[serde(default)]
    pub ignored_url_patterns: Vec<String>,
}

fn default_min_duration_seconds() -> u64 {
    2
}

fn default_tracked_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_duration_seconds: default_min_duration_seconds(),
            tracked_schemes: default_tracked_schemes(),
            ignored_url_patterns: Vec::new(),
        }
    }
}

/// Identity token provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Refresh-token exchange endpoint
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,

    /// API key appended as the `key` query parameter, if the endpoint needs one
    #[serde(default)]
    pub api_key: Option<String>,

    /// Periodic refresh cadence while signed in (seconds)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// How often the credential vault is checked for a sign-in or
    /// sign-out made by another process (seconds)
    #[serde(default = "default_vault_poll")]
    pub vault_poll_seconds: u64,

    /// Credentials this close to expiry are treated as expired (seconds)
    #[serde(default = "default_expiry_margin")]
    pub expiry_margin_seconds: u64,

    /// Request timeout for the token endpoint (seconds)
    #[serde(default = "default_identity_timeout")]
    pub timeout_seconds: u64,
}

fn default_token_endpoint() -> String {
    "https://securetoken.googleapis.com/v1/token".to_string()
}

fn default_refresh_interval() -> u64 {
    600
}

fn default_vault_poll() -> u64 {
    5
}

fn default_expiry_margin() -> u64 {
    60
}

fn default_identity_timeout() -> u64 {
    30
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_endpoint: default_token_endpoint(),
            api_key: None,
            refresh_interval_seconds: default_refresh_interval(),
            vault_poll_seconds: default_vault_poll(),
            expiry_margin_seconds: default_expiry_margin(),
            timeout_seconds: default_identity_timeout(),
        }
    }
}

impl IdentityConfig {
    /// Periodic refresh cadence as a [`Duration`]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    /// Vault check cadence as a [`Duration`]
    pub fn vault_poll_interval(&self) -> Duration {
        Duration::from_secs(self.vault_poll_seconds)
    }
}

/// Dispatch config store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file backing the store; platform data dir when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Delivery outbox configuration
///
/// A capacity of zero disables the outbox, which gives plain
/// fire-and-forget delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Maximum queued deliveries (0 disables the outbox)
    #[serde(default)]
    pub capacity: usize,

    /// Total delivery attempts per record, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff after the first failure (milliseconds)
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Backoff ceiling (milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// How often queued deliveries are retried when no new records arrive (seconds)
    #[serde(default = "default_flush_interval")]
    pub flush_interval_seconds: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_flush_interval() -> u64 {
    30
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            capacity: 0,
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            flush_interval_seconds: default_flush_interval(),
        }
    }
}

impl OutboxConfig {
    /// Whether failed deliveries are queued for retry
    pub fn enabled(&self) -> bool {
        self.capacity > 0
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (RUST_LOG takes precedence)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json_format: bool,

    /// Optional file that receives a copy of every log line
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| TrackerError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("NEXUS_COLLECTOR_URL") {
            self.collector.base_url = url;
        }

        if let Ok(value) = std::env::var("NEXUS_MIN_DURATION_SECONDS") {
            if let Ok(parsed) = value.parse() {
                self.tracker.min_duration_seconds = parsed;
            } else {
                tracing::warn!("Invalid NEXUS_MIN_DURATION_SECONDS: {}", value);
            }
        }

        if let Ok(endpoint) = std::env::var("NEXUS_TOKEN_ENDPOINT") {
            self.identity.token_endpoint = endpoint;
        }

        if let Ok(key) = std::env::var("NEXUS_API_KEY") {
            self.identity.api_key = Some(key);
        }

        if let Ok(value) = std::env::var("NEXUS_REFRESH_INTERVAL_SECONDS") {
            if let Ok(parsed) = value.parse() {
                self.identity.refresh_interval_seconds = parsed;
            } else {
                tracing::warn!("Invalid NEXUS_REFRESH_INTERVAL_SECONDS: {}", value);
            }
        }

        if let Ok(path) = std::env::var("NEXUS_STORE_PATH") {
            self.store.path = Some(PathBuf::from(path));
        }

        if let Ok(value) = std::env::var("NEXUS_OUTBOX_CAPACITY") {
            if let Ok(parsed) = value.parse() {
                self.outbox.capacity = parsed;
            } else {
                tracing::warn!("Invalid NEXUS_OUTBOX_CAPACITY: {}", value);
            }
        }

        if let Ok(level) = std::env::var("NEXUS_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Config` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.collector.base_url).map_err(|e| {
            TrackerError::Config(format!(
                "collector.base_url is not a valid URL ({}): {}",
                self.collector.base_url, e
            ))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(TrackerError::Config(format!(
                "collector.base_url must use http or https, got {}",
                base.scheme()
            ))
            .into());
        }

        for (name, path) in [
            ("collector.token_log_path", &self.collector.token_log_path),
            ("collector.auth_log_path", &self.collector.auth_log_path),
        ] {
            if !path.starts_with('/') {
                return Err(TrackerError::Config(format!("{} must start with '/'", name)).into());
            }
        }

        if self.collector.timeout_seconds == 0 {
            return Err(TrackerError::Config(
                "collector.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.tracker.tracked_schemes.is_empty() {
            return Err(TrackerError::Config(
                "tracker.tracked_schemes must list at least one scheme".to_string(),
            )
            .into());
        }

        for pattern in &self.tracker.ignored_url_patterns {
            Regex::new(pattern).map_err(|e| {
                TrackerError::Config(format!(
                    "tracker.ignored_url_patterns contains an invalid regex ({}): {}",
                    pattern, e
                ))
            })?;
        }

        url::Url::parse(&self.identity.token_endpoint).map_err(|e| {
            TrackerError::Config(format!("identity.token_endpoint is not a valid URL: {}", e))
        })?;

        if self.identity.refresh_interval_seconds == 0 {
            return Err(TrackerError::Config(
                "identity.refresh_interval_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.identity.vault_poll_seconds == 0 {
            return Err(TrackerError::Config(
                "identity.vault_poll_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.outbox.enabled() {
            if self.outbox.max_attempts == 0 {
                return Err(TrackerError::Config(
                    "outbox.max_attempts must be greater than 0".to_string(),
                )
                .into());
            }

            if self.outbox.base_backoff_ms > self.outbox.max_backoff_ms {
                return Err(TrackerError::Config(
                    "outbox.base_backoff_ms must not exceed outbox.max_backoff_ms".to_string(),
                )
                .into());
            }

            if self.outbox.flush_interval_seconds == 0 {
                return Err(TrackerError::Config(
                    "outbox.flush_interval_seconds must be greater than 0".to_string(),
                )
                .into());
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(TrackerError::Config("logging.level cannot be empty".to_string()).into());
        }

        Ok(())
    }
}
