//! Dual-mode telemetry dispatcher
//!
//! Every record is routed by the dispatch settings read at dispatch time:
//!
//! - `token`: team and member identifiers, unauthenticated endpoint
//! - `login`: bearer credential from the identity provider, authenticated endpoint
//!
//! Exactly one strategy is attempted per record. Incomplete settings,
//! missing credentials and delivery failures never surface to the caller;
//! they are logged with a `reason` field and the record is dropped (or
//! queued, when the outbox is enabled).

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::collector::{Collector, DeliveryError};
use super::outbox::{Outbox, PushOutcome};
use super::payload::{AuthLogPayload, TokenLogPayload};
use crate::identity::{IdentityProvider, IdentityState};
use crate::store::{ConfigKey, ConfigStore, DispatchMode};
use crate::telemetry;
use crate::tracker::ActivityRecord;

/// Delivery strategy selected for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Unauthenticated, team/member identified
    Token,
    /// Bearer-authenticated
    Login,
}

impl Strategy {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Token => "token",
            Strategy::Login => "login",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a record was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// No dispatch mode configured
    ModeUnset,
    /// Dispatch mode is neither `token` nor `login`
    ModeUnrecognized,
    /// Token mode without both identifiers
    MissingTeamOrMember,
    /// Login mode without a usable credential
    NoCredential,
    /// The config store could not be read
    StoreUnavailable,
    /// The collector call failed and was not queued
    DeliveryFailed,
    /// The outbox gave up on the record
    RetriesExhausted,
    /// The outbox was full and evicted the record
    OutboxFull,
}

impl DropReason {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::ModeUnset => "mode_unset",
            DropReason::ModeUnrecognized => "mode_unrecognized",
            DropReason::MissingTeamOrMember => "missing_team_or_member",
            DropReason::NoCredential => "no_credential",
            DropReason::StoreUnavailable => "store_unavailable",
            DropReason::DeliveryFailed => "delivery_failed",
            DropReason::RetriesExhausted => "retries_exhausted",
            DropReason::OutboxFull => "outbox_full",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final disposition of one `dispatch` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The collector accepted the record (or dry-run logged it)
    Delivered(Strategy),
    /// The record was discarded
    Dropped(DropReason),
    /// Delivery failed and the record waits in the outbox
    Queued(Strategy),
}

enum Attempt {
    Delivered(Strategy),
    Dropped(DropReason),
    Failed(Strategy, DeliveryError),
}

/// Routes finished records to the collector
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn ConfigStore>,
    identity: Arc<dyn IdentityProvider>,
    collector: Arc<dyn Collector>,
    outbox: Option<Arc<Mutex<Outbox>>>,
    dry_run: bool,
}

impl Dispatcher {
    /// Create a fire-and-forget dispatcher
    pub fn new(
        store: Arc<dyn ConfigStore>,
        identity: Arc<dyn IdentityProvider>,
        collector: Arc<dyn Collector>,
    ) -> Self {
        Self {
            store,
            identity,
            collector,
            outbox: None,
            dry_run: false,
        }
    }

    /// Queue retryable failures in `outbox`
    pub fn with_outbox(mut self, outbox: Option<Outbox>) -> Self {
        self.outbox = outbox.map(|o| Arc::new(Mutex::new(o)));
        self
    }

    /// Log records instead of sending them
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Number of records waiting in the outbox
    pub fn pending(&self) -> usize {
        self.lock_outbox(|outbox| outbox.len()).unwrap_or(0)
    }

    /// Deliver `record` under the current dispatch settings.
    ///
    /// Due outbox entries are retried first. Never fails; the outcome is
    /// returned for callers that want to count it.
    pub async fn dispatch(&self, record: ActivityRecord) -> DispatchOutcome {
        self.flush_outbox().await;

        match self.attempt(&record).await {
            Attempt::Delivered(strategy) => DispatchOutcome::Delivered(strategy),
            Attempt::Dropped(reason) => {
                drop_record(&record, reason);
                DispatchOutcome::Dropped(reason)
            }
            Attempt::Failed(strategy, err) => self.park(record, strategy, err),
        }
    }

    /// Retry every outbox entry whose backoff has elapsed
    pub async fn flush_outbox(&self) {
        let due = self
            .lock_outbox(|outbox| outbox.take_due(Instant::now()))
            .unwrap_or_default();
        if due.is_empty() {
            return;
        }
        debug!(count = due.len(), "Retrying queued deliveries");

        for entry in due {
            match self.attempt(&entry.record).await {
                Attempt::Delivered(strategy) => {
                    info!(
                        url = %entry.record.url,
                        strategy = %strategy,
                        attempts = entry.attempts + 1,
                        "Queued record delivered"
                    );
                }
                Attempt::Dropped(reason) => drop_record(&entry.record, reason),
                Attempt::Failed(strategy, err) if err.is_retryable() => {
                    let record = entry.record.clone();
                    let requeued = self
                        .lock_outbox(|outbox| outbox.requeue(entry, Instant::now()))
                        .unwrap_or(false);
                    if requeued {
                        debug!(url = %record.url, strategy = %strategy, error = %err, "Delivery retry failed, requeued");
                    } else {
                        warn!(url = %record.url, error = %err, "Giving up on queued record");
                        drop_record(&record, DropReason::RetriesExhausted);
                    }
                }
                Attempt::Failed(strategy, err) => {
                    warn!(url = %entry.record.url, strategy = %strategy, error = %err, "Queued record rejected by collector");
                    drop_record(&entry.record, DropReason::DeliveryFailed);
                }
            }
        }
    }

    fn park(&self, record: ActivityRecord, strategy: Strategy, err: DeliveryError) -> DispatchOutcome {
        if self.outbox.is_none() || !err.is_retryable() {
            warn!(
                url = %record.url,
                strategy = %strategy,
                status = err.status(),
                error = %err,
                "Delivery failed"
            );
            drop_record(&record, DropReason::DeliveryFailed);
            return DispatchOutcome::Dropped(DropReason::DeliveryFailed);
        }

        debug!(url = %record.url, strategy = %strategy, error = %err, "Delivery failed, queued for retry");
        let outcome = self.lock_outbox(|outbox| outbox.push(record, Instant::now()));
        match outcome {
            Some(PushOutcome::Rejected(entry)) => {
                drop_record(&entry.record, DropReason::RetriesExhausted);
                DispatchOutcome::Dropped(DropReason::RetriesExhausted)
            }
            Some(PushOutcome::Evicted(evicted)) => {
                drop_record(&evicted.record, DropReason::OutboxFull);
                telemetry::record_queued(strategy);
                DispatchOutcome::Queued(strategy)
            }
            Some(PushOutcome::Queued) | None => {
                telemetry::record_queued(strategy);
                DispatchOutcome::Queued(strategy)
            }
        }
    }

    async fn attempt(&self, record: &ActivityRecord) -> Attempt {
        let config = match self.store.get(&ConfigKey::ALL).await {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Failed to read dispatch settings");
                return Attempt::Dropped(DropReason::StoreUnavailable);
            }
        };

        match config.mode {
            None => Attempt::Dropped(DropReason::ModeUnset),
            Some(DispatchMode::Unrecognized(ref raw)) if raw.trim().is_empty() => {
                Attempt::Dropped(DropReason::ModeUnset)
            }
            Some(DispatchMode::Unrecognized(ref raw)) => {
                debug!(mode = %raw, "Unrecognized dispatch mode");
                Attempt::Dropped(DropReason::ModeUnrecognized)
            }
            Some(DispatchMode::Token) => {
                let Some((team_id, member_id)) = config.token_identity() else {
                    return Attempt::Dropped(DropReason::MissingTeamOrMember);
                };
                let payload = TokenLogPayload::new(record, team_id, member_id);
                self.send_token(&payload).await
            }
            Some(DispatchMode::Login) => {
                let payload = AuthLogPayload::new(record);
                self.send_auth(&payload).await
            }
        }
    }

    async fn send_token(&self, payload: &TokenLogPayload) -> Attempt {
        if self.dry_run {
            info!(
                strategy = "token",
                team_id = %payload.team_id,
                member_id = %payload.member_id,
                url = %payload.url,
                timestamp = %payload.timestamp,
                duration = payload.duration,
                "Dry run: record not sent"
            );
            return Attempt::Delivered(Strategy::Token);
        }

        let result = self.collector.send_token_log(payload).await;
        telemetry::delivery(Strategy::Token, result.is_ok());
        match result {
            Ok(()) => Attempt::Delivered(Strategy::Token),
            Err(e) => Attempt::Failed(Strategy::Token, e),
        }
    }

    async fn send_auth(&self, payload: &AuthLogPayload) -> Attempt {
        if self.dry_run {
            if self.identity.state() != IdentityState::SignedIn {
                return Attempt::Dropped(DropReason::NoCredential);
            }
            info!(
                strategy = "login",
                url = %payload.url,
                timestamp = %payload.timestamp,
                duration = payload.duration,
                "Dry run: record not sent"
            );
            return Attempt::Delivered(Strategy::Login);
        }

        let bearer = match self.identity.current_credential(false).await {
            Ok(token) => token,
            Err(e) => {
                debug!(error = %e, "No credential for login-mode dispatch");
                return Attempt::Dropped(DropReason::NoCredential);
            }
        };

        let result = self.collector.send_auth_log(payload, &bearer).await;
        telemetry::delivery(Strategy::Login, result.is_ok());
        match result {
            Ok(()) => Attempt::Delivered(Strategy::Login),
            Err(e) => {
                if e.is_credential_rejected() {
                    // A failed forced refresh signs the identity out.
                    if let Err(refresh_err) = self.identity.current_credential(true).await {
                        warn!(error = %refresh_err, "Credential refresh after rejection failed");
                    }
                }
                Attempt::Failed(Strategy::Login, e)
            }
        }
    }

    fn lock_outbox<R>(&self, f: impl FnOnce(&mut Outbox) -> R) -> Option<R> {
        let outbox = self.outbox.as_ref()?;
        let mut guard = outbox.lock().unwrap_or_else(|e| e.into_inner());
        Some(f(&mut guard))
    }
}

fn drop_record(record: &ActivityRecord, reason: DropReason) {
    warn!(
        reason = reason.as_str(),
        url = %record.url,
        duration = record.duration_seconds,
        "Activity record dropped"
    );
    telemetry::record_dropped(reason);
}
