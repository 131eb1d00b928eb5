//! nexus-tracker - browsing activity session tracker
//!
#![doc = "Main entry point for the nexus-tracker binary."]

use anyhow::Result;

use nexus_tracker::cli::{Cli, Commands, ConfigCommand};
use nexus_tracker::commands;
use nexus_tracker::config::Config;
use nexus_tracker::logging::init_logging;
use nexus_tracker::store::DispatchConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load and validate configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;
    config.validate()?;

    init_logging(&config.logging)?;

    match cli.command {
        Commands::Track {
            framing,
            events,
            dry_run,
        } => {
            tracing::info!("Starting tracker");
            if let Some(path) = &events {
                tracing::debug!("Reading events from: {}", path.display());
            }
            if dry_run {
                tracing::warn!("Dry-run mode: records will be logged, not sent");
            }

            let summary = commands::track::run_track(config, framing, events, dry_run).await?;
            tracing::info!(
                events = summary.events,
                sessions = summary.sessions_started,
                emitted = summary.records_emitted,
                "Tracker finished"
            );
            Ok(())
        }
        Commands::Config { command } => {
            let store = commands::open_store(&config)?;
            match command {
                ConfigCommand::Show { json } => {
                    commands::settings::show(store.as_ref(), json).await?;
                }
                ConfigCommand::Set {
                    mode,
                    team_id,
                    member_id,
                } => {
                    let patch = DispatchConfig {
                        mode: mode.map(Into::into),
                        team_id,
                        member_id,
                    };
                    commands::settings::set(store.as_ref(), patch).await?;
                }
            }
            Ok(())
        }
        Commands::Login { refresh_token } => {
            tracing::info!("Signing in");
            commands::auth::login(&config, &refresh_token).await?;
            Ok(())
        }
        Commands::Logout => {
            tracing::info!("Signing out");
            commands::auth::logout()?;
            Ok(())
        }
    }
}
