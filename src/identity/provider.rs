//! Refresh-token backed identity provider

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use reqwest::{Client, StatusCode};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::credential::{CachedCredential, TokenResponse};
use super::vault::CredentialVault;
use super::{IdentityError, IdentityProvider, IdentityState};
use crate::config::IdentityConfig;
use crate::error::{Result, TrackerError};

const MAX_MARGIN_SECONDS: i64 = 86_400;

#[derive(Debug, Default)]
struct Inner {
    refresh_token: Option<String>,
    credential: Option<CachedCredential>,
}

/// Identity provider that exchanges a refresh token for bearer credentials.
///
/// The refresh token comes from [`sign_in`](Self::sign_in) or from the
/// vault via [`restore`](Self::restore). All refreshes are serialized
/// through one lock so concurrent callers never race the token endpoint.
pub struct RefreshingIdentity {
    http: Client,
    endpoint: String,
    expiry_margin: Duration,
    inner: Mutex<Inner>,
    state: watch::Sender<IdentityState>,
    vault: Arc<dyn CredentialVault>,
}

impl RefreshingIdentity {
    /// Creates a signed-out provider.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Config` if the token endpoint is not a valid
    /// URL, or `TrackerError::Http` if the HTTP client cannot be built.
    pub fn new(config: &IdentityConfig, vault: Arc<dyn CredentialVault>) -> Result<Self> {
        let mut endpoint = url::Url::parse(&config.token_endpoint).map_err(|e| {
            TrackerError::Config(format!(
                "Invalid token endpoint '{}': {}",
                config.token_endpoint, e
            ))
        })?;
        if let Some(key) = &config.api_key {
            endpoint.query_pairs_mut().append_pair("key", key);
        }

        let http = Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_seconds))
            .build()
            .map_err(TrackerError::Http)?;

        let (state, _) = watch::channel(IdentityState::SignedOut);

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            expiry_margin: Duration::seconds(
                i64::try_from(config.expiry_margin_seconds)
                    .unwrap_or(i64::MAX)
                    .min(MAX_MARGIN_SECONDS),
            ),
            inner: Mutex::new(Inner::default()),
            state,
            vault,
        })
    }

    /// Sign in with `refresh_token`.
    ///
    /// The token is exchanged immediately; only a successful exchange stores
    /// it in the vault and flips the state to signed-in.
    pub async fn sign_in(&self, refresh_token: &str) -> std::result::Result<(), IdentityError> {
        let mut inner = self.inner.lock().await;
        let (credential, rotated) = self.exchange(refresh_token).await?;
        let refresh_token = rotated.unwrap_or_else(|| refresh_token.to_string());

        self.vault
            .save(&refresh_token)
            .map_err(|e| IdentityError::Vault(e.to_string()))?;

        inner.refresh_token = Some(refresh_token);
        inner.credential = Some(credential);
        self.state.send_replace(IdentityState::SignedIn);
        info!("Identity signed in");
        Ok(())
    }

    /// Sign out: forget the credential and the stored refresh token
    pub async fn sign_out(&self) {
        let mut inner = self.inner.lock().await;
        self.clear(&mut inner);
    }

    /// Resume a sign-in persisted in the vault.
    ///
    /// Returns `true` when a refresh token was found. A rejected token signs
    /// out; a transient refresh failure keeps the identity signed in so the
    /// next refresh can retry.
    pub async fn restore(&self) -> Result<bool> {
        let Some(refresh_token) = self.vault.load()? else {
            return Ok(false);
        };

        let mut inner = self.inner.lock().await;
        info!("Identity restored from credential vault");
        if let Err(e) = self.adopt_locked(&mut inner, refresh_token).await {
            if !matches!(e, IdentityError::Rejected(_)) {
                warn!(error = %e, "Initial credential refresh failed");
            }
        }
        Ok(true)
    }

    /// Reconcile with the vault.
    ///
    /// The `login` and `logout` commands write the vault from another
    /// process. A token that appeared or changed there is adopted; an
    /// emptied vault signs out. An unreadable vault changes nothing.
    pub async fn sync_with_vault(&self) {
        let stored = match self.vault.load() {
            Ok(stored) => stored,
            Err(e) => {
                debug!(error = %e, "Could not read credential vault");
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        match (stored, inner.refresh_token.clone()) {
            (None, None) => {}
            (None, Some(_)) => {
                info!("Refresh token removed from credential vault");
                self.clear(&mut inner);
            }
            (Some(stored), Some(current)) if stored == current => {}
            (Some(stored), _) => {
                info!("New refresh token found in credential vault");
                if let Err(e) = self.adopt_locked(&mut inner, stored).await {
                    debug!(error = %e, "Refresh after vault change failed");
                }
            }
        }
    }

    /// Timer-driven refresh.
    ///
    /// Signs out only when the endpoint rejects the refresh token; network
    /// errors are logged and left for the next tick.
    pub async fn scheduled_refresh(&self) {
        let mut inner = self.inner.lock().await;
        if inner.refresh_token.is_none() {
            return;
        }
        match self.refresh_locked(&mut inner).await {
            Ok(_) => debug!("Scheduled credential refresh succeeded"),
            Err(e @ IdentityError::Rejected(_)) => {
                warn!(error = %e, "Refresh token rejected, signing out");
                self.clear(&mut inner);
            }
            Err(e) => warn!(error = %e, "Scheduled credential refresh failed"),
        }
    }

    async fn refresh_locked(
        &self,
        inner: &mut Inner,
    ) -> std::result::Result<String, IdentityError> {
        let refresh_token = inner
            .refresh_token
            .clone()
            .ok_or(IdentityError::SignedOut)?;
        let (credential, rotated) = self.exchange(&refresh_token).await?;

        if let Some(rotated) = rotated {
            if rotated != refresh_token {
                if let Err(e) = self.vault.save(&rotated) {
                    warn!(error = %e, "Failed to persist rotated refresh token");
                }
                inner.refresh_token = Some(rotated);
            }
        }

        let token = credential.token.clone();
        inner.credential = Some(credential);
        Ok(token)
    }

    // Switch to `refresh_token` and exchange it right away. A rejected
    // token signs out again.
    async fn adopt_locked(
        &self,
        inner: &mut Inner,
        refresh_token: String,
    ) -> std::result::Result<String, IdentityError> {
        inner.refresh_token = Some(refresh_token);
        inner.credential = None;
        self.state.send_replace(IdentityState::SignedIn);

        let result = self.refresh_locked(inner).await;
        if let Err(e @ IdentityError::Rejected(_)) = &result {
            warn!(error = %e, "Stored refresh token rejected");
            self.clear(inner);
        }
        result
    }

    fn clear(&self, inner: &mut Inner) {
        inner.refresh_token = None;
        inner.credential = None;
        if let Err(e) = self.vault.clear() {
            warn!(error = %e, "Failed to clear credential vault");
        }
        let previous = self.state.send_replace(IdentityState::SignedOut);
        if previous == IdentityState::SignedIn {
            info!("Identity signed out");
        }
    }

    async fn exchange(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<(CachedCredential, Option<String>), IdentityError> {
        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);

        let resp = self
            .http
            .post(&self.endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| IdentityError::Refresh(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                    IdentityError::Rejected(format!("token endpoint returned {status}: {body}")),
                ),
                _ => Err(IdentityError::Refresh(format!(
                    "token endpoint returned {status}: {body}"
                ))),
            };
        }

        let raw: TokenResponse = resp.json().await.map_err(|e| {
            IdentityError::Refresh(format!("failed to parse token response: {e}"))
        })?;

        raw.into_credential()
            .ok_or_else(|| IdentityError::Refresh("token response carried no token".to_string()))
    }
}

#[async_trait]
impl IdentityProvider for RefreshingIdentity {
    async fn current_credential(
        &self,
        force_refresh: bool,
    ) -> std::result::Result<String, IdentityError> {
        let mut inner = self.inner.lock().await;

        if inner.refresh_token.is_none() {
            // A `login` run elsewhere may have filled the vault since.
            return match self.vault.load() {
                Ok(Some(stored)) => {
                    info!("Identity picked up from credential vault");
                    self.adopt_locked(&mut inner, stored).await
                }
                Ok(None) => Err(IdentityError::SignedOut),
                Err(e) => {
                    debug!(error = %e, "Could not read credential vault");
                    Err(IdentityError::SignedOut)
                }
            };
        }

        if !force_refresh {
            if let Some(credential) = &inner.credential {
                if !credential.is_expired(self.expiry_margin) {
                    return Ok(credential.token.clone());
                }
            }
        }

        match self.refresh_locked(&mut inner).await {
            Ok(token) => Ok(token),
            Err(IdentityError::SignedOut) => Err(IdentityError::SignedOut),
            Err(e) if force_refresh => {
                warn!(error = %e, "Forced credential refresh failed, signing out");
                self.clear(&mut inner);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn state(&self) -> IdentityState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.state.subscribe()
    }
}
