//! Periodic credential refresh
//!
//! Refreshes on a fixed cadence while an identity is signed in and stops
//! as soon as it signs out. Signing in again restarts the cadence.
//!
//! In both states the credential vault is checked on a shorter poll, so a
//! `login` or `logout` run from another process reaches a running tracker.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::provider::RefreshingIdentity;
use super::{IdentityProvider, IdentityState};

/// Background task driving [`RefreshingIdentity::scheduled_refresh`]
pub struct CredentialRefresher {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl CredentialRefresher {
    /// Spawn the refresher; it stops when `cancel` fires
    ///
    /// `interval` is the refresh cadence, `vault_poll` the vault check
    /// cadence.
    pub fn spawn(
        identity: Arc<RefreshingIdentity>,
        interval: Duration,
        vault_poll: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run(identity, interval, vault_poll, task_cancel).await;
        });
        Self { handle, cancel }
    }

    /// Stop the refresher and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

fn poll_timer(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn run(
    identity: Arc<RefreshingIdentity>,
    interval: Duration,
    vault_poll: Duration,
    cancel: CancellationToken,
) {
    let mut rx = identity.subscribe();
    let mut vault_timer = poll_timer(vault_poll);

    loop {
        // Wait for a sign-in, here or through the vault.
        loop {
            let signed_in = *rx.borrow_and_update() == IdentityState::SignedIn;
            if signed_in {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = vault_timer.tick() => identity.sync_with_vault().await,
            }
        }

        debug!(interval_secs = interval.as_secs(), "Credential refresher started");
        let mut ticker = poll_timer(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => identity.scheduled_refresh().await,
                _ = vault_timer.tick() => identity.sync_with_vault().await,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let signed_out = *rx.borrow_and_update() == IdentityState::SignedOut;
                    if signed_out {
                        debug!("Credential refresher paused");
                        break;
                    }
                }
            }
        }
    }
}
