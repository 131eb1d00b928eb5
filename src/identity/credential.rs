//! Cached bearer credential and the token endpoint response

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer};

/// Short-lived bearer credential with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCredential {
    /// Bearer token presented to the collector
    pub token: String,
    /// Instant the token stops being accepted
    pub expires_at: DateTime<Utc>,
}

impl CachedCredential {
    /// Returns `true` when the token is expired or within `margin` of expiry.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use nexus_tracker::identity::CachedCredential;
    ///
    /// let credential = CachedCredential {
    ///     token: "tok".to_string(),
    ///     expires_at: Utc::now() + Duration::seconds(30),
    /// };
    /// assert!(credential.is_expired(Duration::seconds(60)));
    /// assert!(!credential.is_expired(Duration::zero()));
    /// ```
    pub fn is_expired(&self, margin: Duration) -> bool {
        Utc::now() >= self.expires_at - margin
    }
}

/// Refresh-token exchange response.
///
/// Secure-token style endpoints return `id_token` and quote `expires_in`;
/// plain OAuth endpoints return `access_token` and a number. Both shapes are
/// accepted.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "seconds_from_string_or_number")]
    expires_in: Option<i64>,
}

/// Default lifetime when the endpoint omits `expires_in`
const DEFAULT_LIFETIME_SECONDS: i64 = 3600;

impl TokenResponse {
    /// Split into the new credential and a rotated refresh token, if any.
    ///
    /// Returns `None` when the response carries no token at all.
    pub(crate) fn into_credential(self) -> Option<(CachedCredential, Option<String>)> {
        let token = self.id_token.or(self.access_token)?;
        let lifetime = self.expires_in.unwrap_or(DEFAULT_LIFETIME_SECONDS).max(0);
        Some((
            CachedCredential {
                token,
                expires_at: Utc::now() + Duration::seconds(lifetime),
            },
            self.refresh_token,
        ))
    }
}

fn seconds_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
