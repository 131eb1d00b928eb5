//! Identity token provider
//!
//! Supplies the short-lived bearer credential used by login-mode dispatch.
//! The credential is refreshed immediately on sign-in, periodically while
//! signed in (see [`refresher`]), and on demand when the collector rejects
//! it. A forced refresh that fails signs the identity out.

pub mod credential;
pub mod provider;
pub mod refresher;
pub mod vault;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

pub use credential::CachedCredential;
pub use provider::RefreshingIdentity;
pub use refresher::CredentialRefresher;
pub use vault::{CredentialVault, KeyringVault, MemoryVault};

/// Whether an identity is currently signed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityState {
    /// No identity; login-mode records are dropped
    SignedOut,
    /// An identity is signed in and credentials can be obtained
    SignedIn,
}

/// Errors from the identity provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// No identity is signed in
    #[error("No identity is signed in")]
    SignedOut,

    /// The token endpoint could not be reached or answered unexpectedly
    #[error("Credential refresh failed: {0}")]
    Refresh(String),

    /// The token endpoint rejected the refresh token
    #[error("Refresh token rejected: {0}")]
    Rejected(String),

    /// The credential vault failed
    #[error("Credential vault error: {0}")]
    Vault(String),
}

/// Source of bearer credentials for login-mode dispatch
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current bearer token, refreshing first when stale or when forced
    async fn current_credential(&self, force_refresh: bool) -> Result<String, IdentityError>;

    /// Current sign-in state
    fn state(&self) -> IdentityState;

    /// Identity-state-changed notifications
    fn subscribe(&self) -> watch::Receiver<IdentityState>;

    /// Warm the credential cache ahead of a dispatch
    async fn prefetch(&self) {
        if self.state() != IdentityState::SignedIn {
            return;
        }
        if let Err(e) = self.current_credential(false).await {
            tracing::debug!(error = %e, "Credential prefetch failed");
        }
    }
}
