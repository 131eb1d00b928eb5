//! nexus-tracker - browsing activity session tracker library
//!
//! This library watches browser focus events, measures how long each page
//! held the user's attention, and reports significant sessions to a
//! telemetry collector.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `tracker`: Event types, URL filtering, and the session state machine
//! - `service`: Event loop driving the tracker and spawning dispatches
//! - `dispatch`: Collector client, mode selection, and the retry outbox
//! - `identity`: Login-mode credential cache, refresh, and vault
//! - `store`: Persisted dispatch settings (mode, team and member ids)
//! - `adapter`: Host event framing and focus queries
//! - `config`: Configuration management and validation
//! - `logging`: tracing subscriber setup
//! - `telemetry`: Counters for sessions and deliveries
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use nexus_tracker::cli::Cli;
//! use nexus_tracker::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cli = Cli::parse_args();
//!     let config = Config::load("config/config.yaml", &cli)?;
//!     config.validate()?;
//!
//!     // Tracker usage would go here
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod logging;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod tracker;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{Result, TrackerError};
pub use service::{RunSummary, TrackerService};
pub use store::{ConfigStore, DispatchConfig, DispatchMode};
pub use tracker::{ActivityRecord, BrowserEvent, SessionTracker};

#[cfg(test)]
pub mod test_utils;
