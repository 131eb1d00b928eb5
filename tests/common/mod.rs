use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::watch;

use nexus_tracker::config::{CollectorConfig, TrackerConfig};
use nexus_tracker::dispatch::{Dispatcher, HttpCollector};
use nexus_tracker::identity::{IdentityError, IdentityProvider, IdentityState};
use nexus_tracker::store::{DispatchConfig, MemoryStore};
use nexus_tracker::tracker::{Clock, SessionFilter, SessionTracker};

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Collector settings pointing at a wiremock server
#[allow(dead_code)]
pub fn collector_config(base_url: &str) -> CollectorConfig {
    CollectorConfig {
        base_url: base_url.to_string(),
        timeout_seconds: 5,
        ..CollectorConfig::default()
    }
}

#[allow(dead_code)]
pub fn session_tracker() -> SessionTracker {
    SessionTracker::new(SessionFilter::new(&TrackerConfig::default()).expect("default filter"))
}

/// Dispatcher over an in-memory store and a real HTTP collector
#[allow(dead_code)]
pub fn http_dispatcher(
    base_url: &str,
    settings: DispatchConfig,
    identity: Arc<dyn IdentityProvider>,
) -> Dispatcher {
    let collector = HttpCollector::new(&collector_config(base_url)).expect("collector");
    Dispatcher::new(
        Arc::new(MemoryStore::new(settings)),
        identity,
        Arc::new(collector),
    )
}

/// Identity provider with a fixed token that can be signed out
#[allow(dead_code)]
pub struct FixedIdentity {
    token: Option<String>,
    state: watch::Sender<IdentityState>,
}

#[allow(dead_code)]
impl FixedIdentity {
    pub fn signed_in(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            state: watch::channel(IdentityState::SignedIn).0,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            token: None,
            state: watch::channel(IdentityState::SignedOut).0,
        }
    }

    pub fn sign_out(&self) {
        self.state.send_replace(IdentityState::SignedOut);
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn current_credential(&self, _force_refresh: bool) -> Result<String, IdentityError> {
        if *self.state.borrow() == IdentityState::SignedOut {
            return Err(IdentityError::SignedOut);
        }
        self.token.clone().ok_or(IdentityError::SignedOut)
    }

    fn state(&self) -> IdentityState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.state.subscribe()
    }
}

/// Clock that moves forward a fixed step every time it is read
#[allow(dead_code)]
pub struct SteppingClock {
    start: DateTime<Utc>,
    step_seconds: i64,
    reads: AtomicI64,
}

#[allow(dead_code)]
impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step_seconds: i64) -> Self {
        Self {
            start,
            step_seconds,
            reads: AtomicI64::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        self.start + Duration::seconds(n * self.step_seconds)
    }
}
