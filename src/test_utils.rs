//! Test utilities for nexus-tracker
//!
//! Shared fakes for unit tests: a fixed identity provider and sample
//! activity records.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;

use crate::identity::{IdentityError, IdentityProvider, IdentityState};
use crate::tracker::ActivityRecord;

/// Instant used as `t0` throughout the tests
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// A five-second record for `https://x.test/` starting at [`t0`]
pub fn sample_record() -> ActivityRecord {
    ActivityRecord {
        url: "https://x.test/".to_string(),
        timestamp: t0(),
        duration_seconds: 5,
    }
}

/// Identity provider that always hands out the same token, or none
pub struct FixedIdentity {
    token: Option<String>,
    state: watch::Sender<IdentityState>,
}

impl FixedIdentity {
    /// Signed in with `token`
    pub fn signed_in(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            state: watch::channel(IdentityState::SignedIn).0,
        }
    }

    /// Signed out
    pub fn signed_out() -> Self {
        Self {
            token: None,
            state: watch::channel(IdentityState::SignedOut).0,
        }
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn current_credential(&self, _force_refresh: bool) -> Result<String, IdentityError> {
        self.token.clone().ok_or(IdentityError::SignedOut)
    }

    fn state(&self) -> IdentityState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.state.subscribe()
    }
}
