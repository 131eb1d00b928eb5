//! `track`: run the tracker service

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::{event_stream, EventStream, FocusCache, Framing};
use crate::config::Config;
use crate::dispatch::{Dispatcher, HttpCollector, Outbox};
use crate::error::{Result, TrackerError};
use crate::identity::{CredentialRefresher, KeyringVault, RefreshingIdentity};
use crate::service::{RunSummary, TrackerService};
use crate::tracker::{SessionFilter, SessionTracker, SystemClock};

/// Run the tracker until the event feed closes or Ctrl-C is pressed
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
/// * `framing` - Wire format of the event feed
/// * `events` - Optional file to read events from instead of stdin
/// * `dry_run` - Log finalized records instead of sending them
pub async fn run_track(
    config: Config,
    framing: Framing,
    events: Option<PathBuf>,
    dry_run: bool,
) -> Result<RunSummary> {
    let filter = SessionFilter::new(&config.tracker)?;
    let store = super::open_store(&config)?;

    let identity = Arc::new(RefreshingIdentity::new(
        &config.identity,
        Arc::new(KeyringVault::default()),
    )?);
    match identity.restore().await {
        Ok(true) => info!("Login-mode identity restored"),
        Ok(false) => info!("No stored login-mode identity"),
        Err(e) => warn!(error = %e, "Could not read credential vault"),
    }

    let collector = Arc::new(
        HttpCollector::new(&config.collector)
            .map_err(|e| TrackerError::Delivery(format!("Failed to build collector client: {}", e)))?,
    );
    let outbox = Outbox::from_config(&config.outbox);
    let flush_interval = outbox
        .as_ref()
        .map(|_| Duration::from_secs(config.outbox.flush_interval_seconds));

    let dispatcher = Dispatcher::new(store, identity.clone(), collector)
        .with_outbox(outbox)
        .dry_run(dry_run);

    let cancel = CancellationToken::new();
    let refresher = CredentialRefresher::spawn(
        identity.clone(),
        config.identity.refresh_interval(),
        config.identity.vault_poll_interval(),
        cancel.child_token(),
    );

    let service = TrackerService::new(
        SessionTracker::new(filter),
        dispatcher,
        Arc::new(FocusCache::new()),
        identity,
        Arc::new(SystemClock),
    )
    .with_flush_interval(flush_interval);

    let stream = open_events(events, framing).await?;

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    info!(
        framing = ?framing,
        dry_run,
        collector = %config.collector.base_url,
        "Tracking browser activity"
    );
    let summary = service.run(stream, cancel.clone()).await;
    refresher.shutdown().await;

    Ok(summary)
}

async fn open_events(events: Option<PathBuf>, framing: Framing) -> Result<EventStream> {
    match events {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open event file {}", path.display()))?;
            Ok(event_stream(file, framing))
        }
        None => Ok(event_stream(tokio::io::stdin(), framing)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_event_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_events(Some(dir.path().join("nope.jsonl")), Framing::Lines).await;
        let err = result.err().unwrap();
        assert!(err.to_string().contains("Failed to open event file"));
    }
}
