//! Refresh token persistence
//!
//! The long-lived refresh token is kept in the operating system's native
//! credential store (Keychain on macOS, Secret Service on Linux, Windows
//! Credential Manager on Windows) so a sign-in survives tracker restarts.

use std::sync::{Arc, Mutex};

use crate::error::{Result, TrackerError};

/// Storage for the identity's refresh token
pub trait CredentialVault: Send + Sync {
    /// Load the stored refresh token, `None` when nothing is stored
    fn load(&self) -> Result<Option<String>>;

    /// Store `refresh_token`, replacing any previous one
    fn save(&self, refresh_token: &str) -> Result<()>;

    /// Forget the stored token; a no-op when nothing is stored
    fn clear(&self) -> Result<()>;
}

/// Keyring service name used by default
pub const DEFAULT_SERVICE: &str = "nexus-tracker";

const ACCOUNT: &str = "refresh-token";

/// [`CredentialVault`] backed by the OS keyring
#[derive(Debug, Clone)]
pub struct KeyringVault {
    service: String,
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

impl KeyringVault {
    /// Vault using `service` as the keyring service name
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, ACCOUNT).map_err(TrackerError::Keyring)?)
    }
}

impl CredentialVault for KeyringVault {
    fn load(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(TrackerError::Keyring(e).into()),
        }
    }

    fn save(&self, refresh_token: &str) -> Result<()> {
        self.entry()?
            .set_password(refresh_token)
            .map_err(TrackerError::Keyring)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(TrackerError::Keyring(e).into()),
        }
    }
}

/// In-process vault; clones share storage
#[derive(Debug, Clone, Default)]
pub struct MemoryVault {
    token: Arc<Mutex<Option<String>>>,
}

impl MemoryVault {
    /// Vault pre-loaded with `refresh_token`
    pub fn with_token(refresh_token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(Mutex::new(Some(refresh_token.into()))),
        }
    }
}

impl CredentialVault for MemoryVault {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.token.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, refresh_token: &str) -> Result<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(refresh_token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_vault_roundtrip() {
        let vault = MemoryVault::default();
        assert_eq!(vault.load().unwrap(), None);

        vault.save("rt-1").unwrap();
        let clone = vault.clone();
        assert_eq!(clone.load().unwrap().as_deref(), Some("rt-1"));

        clone.clear().unwrap();
        assert_eq!(vault.load().unwrap(), None);
        vault.clear().unwrap();
    }

    #[test]
    #[ignore = "requires system keyring"]
    fn test_keyring_vault_roundtrip() {
        let vault = KeyringVault::new("nexus-tracker-test");
        vault.save("rt-keyring").unwrap();
        assert_eq!(vault.load().unwrap().as_deref(), Some("rt-keyring"));
        vault.clear().unwrap();
        assert_eq!(vault.load().unwrap(), None);
    }
}
