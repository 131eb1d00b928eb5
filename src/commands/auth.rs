//! `login` and `logout`

use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, TrackerError};
use crate::identity::{CredentialVault, KeyringVault, RefreshingIdentity};
use crate::store::{ConfigStore, DispatchConfig};

/// Sign in with a refresh token and switch dispatch to login mode
pub async fn login(config: &Config, refresh_token: &str) -> Result<()> {
    let identity = RefreshingIdentity::new(&config.identity, Arc::new(KeyringVault::default()))?;
    let store = super::open_store(config)?;
    sign_in(&identity, store.as_ref(), refresh_token).await?;
    println!("Signed in. Dispatch mode set to login.");
    Ok(())
}

/// Exchange `refresh_token`, persist it and set `mode = login`
pub async fn sign_in(
    identity: &RefreshingIdentity,
    store: &dyn ConfigStore,
    refresh_token: &str,
) -> Result<()> {
    let refresh_token = refresh_token.trim();
    if refresh_token.is_empty() {
        return Err(TrackerError::Identity("Refresh token is empty".to_string()).into());
    }

    identity
        .sign_in(refresh_token)
        .await
        .map_err(|e| TrackerError::Identity(e.to_string()))?;
    store.set(DispatchConfig::login()).await?;
    tracing::info!("Dispatch mode set to login");
    Ok(())
}

/// Forget the stored refresh token
pub fn logout() -> Result<()> {
    sign_out(&KeyringVault::default())?;
    println!("Signed out.");
    Ok(())
}

/// Clear `vault`; the dispatch mode is left unchanged
pub fn sign_out(vault: &dyn CredentialVault) -> Result<()> {
    vault.clear()?;
    tracing::info!("Stored refresh token removed");
    Ok(())
}
