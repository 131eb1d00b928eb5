//! Command-line interface definition for nexus-tracker
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for running the tracker, editing the dispatch
//! settings, and signing the identity in or out.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::adapter::Framing;
use crate::store::DispatchMode;

/// nexus-tracker - browsing activity session tracker
///
/// Turns browser focus, navigation and idle events into timed activity
/// records and ships them to the collector.
#[derive(Parser, Debug, Clone)]
#[command(name = "nexus-tracker")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for nexus-tracker
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the session tracker against a browser event feed
    Track {
        /// Wire format of the event feed
        #[arg(short, long, value_enum, default_value_t = Framing::Native)]
        framing: Framing,

        /// Read events from a file instead of stdin
        #[arg(short, long)]
        events: Option<PathBuf>,

        /// Log finalized records instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect or change the dispatch settings
    Config {
        /// Config store subcommand
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Sign in for login-mode dispatch using a refresh token
    Login {
        /// Refresh token issued by the identity service
        #[arg(long, env = "NEXUS_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },

    /// Sign out and forget the stored refresh token
    Logout,
}

/// Dispatch settings subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Show the current dispatch settings
    Show {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Update one or more dispatch settings
    Set {
        /// Dispatch mode
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Team identifier for token mode
        #[arg(long)]
        team_id: Option<String>,

        /// Member identifier for token mode
        #[arg(long)]
        member_id: Option<String>,
    },
}

/// Dispatch modes accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Team and member identifiers, unauthenticated endpoint
    Token,
    /// Signed-in identity, bearer-authenticated endpoint
    Login,
}

impl From<ModeArg> for DispatchMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Token => DispatchMode::Token,
            ModeArg::Login => DispatchMode::Login,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_track_defaults() {
        let cli = Cli::try_parse_from(["nexus-tracker", "track"]).unwrap();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        if let Commands::Track {
            framing,
            events,
            dry_run,
        } = cli.command
        {
            assert_eq!(framing, Framing::Native);
            assert_eq!(events, None);
            assert!(!dry_run);
        } else {
            panic!("Expected Track command");
        }
    }

    #[test]
    fn test_cli_parse_track_lines_from_file() {
        let cli = Cli::try_parse_from([
            "nexus-tracker",
            "track",
            "--framing",
            "lines",
            "--events",
            "events.jsonl",
            "--dry-run",
        ])
        .unwrap();
        if let Commands::Track {
            framing,
            events,
            dry_run,
        } = cli.command
        {
            assert_eq!(framing, Framing::Lines);
            assert_eq!(events, Some(PathBuf::from("events.jsonl")));
            assert!(dry_run);
        } else {
            panic!("Expected Track command");
        }
    }

    #[test]
    fn test_cli_parse_config_set() {
        let cli = Cli::try_parse_from([
            "nexus-tracker",
            "config",
            "set",
            "--mode",
            "token",
            "--team-id",
            "team-1",
            "--member-id",
            "member-9",
        ])
        .unwrap();
        match cli.command {
            Commands::Config {
                command:
                    ConfigCommand::Set {
                        mode,
                        team_id,
                        member_id,
                    },
            } => {
                assert_eq!(mode.map(DispatchMode::from), Some(DispatchMode::Token));
                assert_eq!(team_id.as_deref(), Some("team-1"));
                assert_eq!(member_id.as_deref(), Some("member-9"));
            }
            other => panic!("Expected config set, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        let cli = Cli::try_parse_from(["nexus-tracker", "config", "set", "--mode", "oauth"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_parse_login() {
        let cli =
            Cli::try_parse_from(["nexus-tracker", "login", "--refresh-token", "rt-123"]).unwrap();
        if let Commands::Login { refresh_token } = cli.command {
            assert_eq!(refresh_token, "rt-123");
        } else {
            panic!("Expected Login command");
        }
    }

    #[test]
    fn test_cli_parse_verbose_and_config() {
        let cli = Cli::try_parse_from([
            "nexus-tracker",
            "--config",
            "custom.yaml",
            "--verbose",
            "logout",
        ])
        .unwrap();
        assert_eq!(cli.config, Some("custom.yaml".to_string()));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Logout));
    }
}
