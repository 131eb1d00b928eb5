//! Error types for nexus-tracker
//!
//! This module defines the crate-level error type used by configuration
//! loading, the config store, the identity provider, and the event adapter.
//! Delivery and identity failures have their own narrower enums in
//! [`crate::dispatch`] and [`crate::identity`]; they convert into
//! [`TrackerError`] only where they cross into the command layer.

use thiserror::Error;

/// Main error type for nexus-tracker operations
///
/// None of these are fatal to the event loop. The tracker service logs
/// and swallows everything on the dispatch path; these errors surface only
/// from startup, the CLI commands, and the store/identity plumbing.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dispatch config store errors (read, write, parse)
    #[error("Config store error: {0}")]
    Store(String),

    /// Identity and credential errors
    #[error("Identity error: {0}")]
    Identity(String),

    /// Collector delivery errors
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Malformed input from the host event source
    #[error("Event adapter error: {0}")]
    Adapter(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type alias for nexus-tracker operations
///
/// Uses `anyhow::Error` so command handlers can attach context while still
/// allowing callers to downcast to [`TrackerError`].
pub type Result<T> = anyhow::Result<T>;
