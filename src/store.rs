//! Dispatch config store
//!
//! The operator's dispatch settings (mode plus the token-mode team and
//! member identifiers) live in a small asynchronous key-value store. The
//! dispatcher reads it on every record, so edits made through
//! `nexus-tracker config set` take effect without restarting the tracker.
//!
//! The canonical key names are `mode`, `teamId` and `memberId`. Files
//! written by older extension builds used `authMode`, `nexusTeamId` and
//! `nexusMemberId`; those are accepted on read and rewritten canonically
//! on the next `set`.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::config::StoreConfig;
use crate::error::{Result, TrackerError};

/// Identity-binding strategy chosen by the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DispatchMode {
    /// Team and member identifiers, unauthenticated endpoint
    Token,
    /// Signed-in identity, bearer-authenticated endpoint
    Login,
    /// Any other stored value, kept verbatim for diagnostics
    Unrecognized(String),
}

impl From<String> for DispatchMode {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "token" => DispatchMode::Token,
            "login" => DispatchMode::Login,
            _ => DispatchMode::Unrecognized(value),
        }
    }
}

impl From<DispatchMode> for String {
    fn from(mode: DispatchMode) -> Self {
        match mode {
            DispatchMode::Token => "token".to_string(),
            DispatchMode::Login => "login".to_string(),
            DispatchMode::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Token => write!(f, "token"),
            DispatchMode::Login => write!(f, "login"),
            DispatchMode::Unrecognized(raw) => write!(f, "{}", raw),
        }
    }
}

/// Keys held by the config store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// Dispatch mode
    Mode,
    /// Token-mode team identifier
    TeamId,
    /// Token-mode member identifier
    MemberId,
}

impl ConfigKey {
    /// Every key, in display order
    pub const ALL: [ConfigKey; 3] = [ConfigKey::Mode, ConfigKey::TeamId, ConfigKey::MemberId];

    /// Canonical on-disk name of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::Mode => "mode",
            ConfigKey::TeamId => "teamId",
            ConfigKey::MemberId => "memberId",
        }
    }
}

/// Operator dispatch settings
///
/// Every field is optional so the same type doubles as the partial config
/// returned by [`ConfigStore::get`] and accepted by [`ConfigStore::set`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredDispatchConfig")]
pub struct DispatchConfig {
    /// Dispatch mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<DispatchMode>,

    /// Token-mode team identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,

    /// Token-mode member identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
}

// On-disk shape: canonical keys plus the legacy ones. A file may carry
// both; the canonical key wins.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDispatchConfig {
    #[serde(default)]
    mode: Option<DispatchMode>,
    #[serde(default)]
    team_id: Option<String>,
    #[serde(default)]
    member_id: Option<String>,
    #[serde(default)]
    auth_mode: Option<DispatchMode>,
    #[serde(default)]
    nexus_team_id: Option<String>,
    #[serde(default)]
    nexus_member_id: Option<String>,
}

impl From<StoredDispatchConfig> for DispatchConfig {
    fn from(stored: StoredDispatchConfig) -> Self {
        Self {
            mode: stored.mode.or(stored.auth_mode),
            team_id: stored.team_id.or(stored.nexus_team_id),
            member_id: stored.member_id.or(stored.nexus_member_id),
        }
    }
}

impl DispatchConfig {
    /// Token-mode settings with both identifiers filled in
    pub fn token(team_id: impl Into<String>, member_id: impl Into<String>) -> Self {
        Self {
            mode: Some(DispatchMode::Token),
            team_id: Some(team_id.into()),
            member_id: Some(member_id.into()),
        }
    }

    /// Login-mode settings
    pub fn login() -> Self {
        Self {
            mode: Some(DispatchMode::Login),
            ..Self::default()
        }
    }

    /// Overwrite every field that is set in `patch` (last write wins)
    pub fn merge(&mut self, patch: DispatchConfig) {
        if patch.mode.is_some() {
            self.mode = patch.mode;
        }
        if patch.team_id.is_some() {
            self.team_id = patch.team_id;
        }
        if patch.member_id.is_some() {
            self.member_id = patch.member_id;
        }
    }

    /// Copy of this config restricted to `keys`
    pub fn project(&self, keys: &[ConfigKey]) -> DispatchConfig {
        let mut partial = DispatchConfig::default();
        for key in keys {
            match key {
                ConfigKey::Mode => partial.mode = self.mode.clone(),
                ConfigKey::TeamId => partial.team_id = self.team_id.clone(),
                ConfigKey::MemberId => partial.member_id = self.member_id.clone(),
            }
        }
        partial
    }

    /// Team and member identifiers, only when both are non-blank
    pub fn token_identity(&self) -> Option<(&str, &str)> {
        let team = self.team_id.as_deref().map(str::trim).unwrap_or("");
        let member = self.member_id.as_deref().map(str::trim).unwrap_or("");
        if team.is_empty() || member.is_empty() {
            None
        } else {
            Some((team, member))
        }
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.mode.is_none() && self.team_id.is_none() && self.member_id.is_none()
    }
}

/// Asynchronous key-value store for [`DispatchConfig`]
///
/// No transactional guarantees beyond last-write-wins.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the requested keys; unset keys come back as `None`
    async fn get(&self, keys: &[ConfigKey]) -> Result<DispatchConfig>;

    /// Merge `patch` into the stored settings
    async fn set(&self, patch: DispatchConfig) -> Result<()>;

    /// Read every key
    async fn load(&self) -> Result<DispatchConfig> {
        self.get(&ConfigKey::ALL).await
    }
}

/// In-memory store, used when nothing needs to outlive the process
///
/// # Examples
///
/// ```
/// use nexus_tracker::store::{ConfigKey, ConfigStore, DispatchConfig, MemoryStore};
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new(DispatchConfig::token("team-1", "member-7"));
/// store.set(DispatchConfig::login()).await.unwrap();
///
/// let config = store.get(&[ConfigKey::Mode, ConfigKey::TeamId]).await.unwrap();
/// assert_eq!(config.team_id.as_deref(), Some("team-1"));
/// assert_eq!(config.member_id, None);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<DispatchConfig>,
}

impl MemoryStore {
    /// Create a store seeded with `initial`
    pub fn new(initial: DispatchConfig) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self, keys: &[ConfigKey]) -> Result<DispatchConfig> {
        Ok(self.inner.read().await.project(keys))
    }

    async fn set(&self, patch: DispatchConfig) -> Result<()> {
        self.inner.write().await.merge(patch);
        Ok(())
    }
}

/// JSON file store
///
/// The file is re-read on every `get` so changes written by another
/// process (the `config set` command) are picked up by a running tracker.
/// Writes go to a sibling temp file first and are renamed into place.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store backed by `path`; the file need not exist yet
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create a store at the configured path or the platform default
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Store` if no data directory can be determined
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        match &config.path {
            Some(path) => Ok(Self::new(path.clone())),
            None => Ok(Self::new(Self::default_path()?)),
        }
    }

    /// `dispatch.json` inside the platform data directory
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("io", "nexuscore", "nexus-tracker").ok_or_else(|| {
            TrackerError::Store("Could not determine data directory".to_string())
        })?;
        Ok(dirs.data_dir().join("dispatch.json"))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<DispatchConfig> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DispatchConfig::default())
            }
            Err(e) => {
                return Err(TrackerError::Store(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                ))
                .into())
            }
        };

        if contents.trim().is_empty() {
            return Ok(DispatchConfig::default());
        }

        serde_json::from_str(&contents).map_err(|e| {
            TrackerError::Store(format!("Failed to parse {}: {}", self.path.display(), e)).into()
        })
    }

    async fn write_all(&self, config: &DispatchConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    TrackerError::Store(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let body = serde_json::to_string_pretty(config)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| TrackerError::Store(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            TrackerError::Store(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn get(&self, keys: &[ConfigKey]) -> Result<DispatchConfig> {
        Ok(self.read_all().await?.project(keys))
    }

    async fn set(&self, patch: DispatchConfig) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut current = self.read_all().await?;
        current.merge(patch);
        self.write_all(&current).await?;
        tracing::debug!(path = %self.path.display(), "Dispatch settings written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_mode_parses_case_insensitively() {
        assert_eq!(DispatchMode::from("token".to_string()), DispatchMode::Token);
        assert_eq!(DispatchMode::from(" LOGIN ".to_string()), DispatchMode::Login);
        assert_eq!(
            DispatchMode::from("oauth".to_string()),
            DispatchMode::Unrecognized("oauth".to_string())
        );
    }

    #[test]
    fn test_dispatch_config_reads_legacy_keys() {
        let json = r#"{"authMode":"token","nexusTeamId":"t-1","nexusMemberId":"m-2"}"#;
        let config: DispatchConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, DispatchConfig::token("t-1", "m-2"));
    }

    #[test]
    fn test_canonical_key_wins_over_legacy_key() {
        let json = r#"{"authMode":"token","mode":"login","nexusTeamId":"t-old","teamId":"t-new"}"#;
        let config: DispatchConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, Some(DispatchMode::Login));
        assert_eq!(config.team_id.as_deref(), Some("t-new"));
        assert_eq!(config.member_id, None);
    }

    #[test]
    fn test_dispatch_config_writes_canonical_keys() {
        let json = serde_json::to_string(&DispatchConfig::token("t-1", "m-2")).unwrap();
        assert_eq!(json, r#"{"mode":"token","teamId":"t-1","memberId":"m-2"}"#);
    }

    #[test]
    fn test_unknown_mode_round_trips_verbatim() {
        let config: DispatchConfig = serde_json::from_str(r#"{"mode":"sso"}"#).unwrap();
        assert_eq!(
            config.mode,
            Some(DispatchMode::Unrecognized("sso".to_string()))
        );
        assert_eq!(serde_json::to_string(&config).unwrap(), r#"{"mode":"sso"}"#);
    }

    #[test]
    fn test_merge_is_last_write_wins_per_key() {
        let mut config = DispatchConfig::token("t-1", "m-2");
        config.merge(DispatchConfig {
            member_id: Some("m-3".to_string()),
            ..DispatchConfig::default()
        });
        assert_eq!(config.mode, Some(DispatchMode::Token));
        assert_eq!(config.team_id.as_deref(), Some("t-1"));
        assert_eq!(config.member_id.as_deref(), Some("m-3"));
    }

    #[test]
    fn test_project_returns_only_requested_keys() {
        let config = DispatchConfig::token("t-1", "m-2");
        let partial = config.project(&[ConfigKey::TeamId]);
        assert_eq!(partial.team_id.as_deref(), Some("t-1"));
        assert!(partial.mode.is_none());
        assert!(partial.member_id.is_none());
    }

    #[test]
    fn test_token_identity_requires_both_non_blank() {
        assert_eq!(
            DispatchConfig::token("t-1", "m-2").token_identity(),
            Some(("t-1", "m-2"))
        );
        assert_eq!(DispatchConfig::token("t-1", "").token_identity(), None);
        assert_eq!(DispatchConfig::token("   ", "m-2").token_identity(), None);
        assert_eq!(DispatchConfig::login().token_identity(), None);
    }

    #[tokio::test]
    async fn test_memory_store_get_and_set() {
        let store = MemoryStore::default();
        assert!(store.load().await.unwrap().is_empty());

        store.set(DispatchConfig::token("t-1", "m-2")).await.unwrap();
        store.set(DispatchConfig::login()).await.unwrap();

        let config = store.load().await.unwrap();
        assert_eq!(config.mode, Some(DispatchMode::Login));
        assert_eq!(config.team_id.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
