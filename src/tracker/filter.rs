//! Duration and URL filtering
//!
//! Decides which surfaces may start a session and which finished sessions
//! are significant enough to report.

use std::sync::Arc;

use regex::Regex;
use url::Url;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};

/// Session filter built from the tracker configuration.
///
/// A URL is trackable when it parses, uses one of the configured network
/// schemes and matches none of the ignored patterns. A session is
/// significant when it lasted strictly longer than the threshold.
#[derive(Debug, Clone)]
pub struct SessionFilter {
    min_duration_seconds: u64,
    schemes: Vec<String>,
    ignored: Vec<Arc<Regex>>,
}

impl SessionFilter {
    /// Create a new filter from configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Tracker configuration
    ///
    /// # Returns
    ///
    /// Returns the filter or an error if an ignored pattern fails to compile
    ///
    /// # Examples
    ///
    /// ```
    /// use nexus_tracker::config::TrackerConfig;
    /// use nexus_tracker::tracker::SessionFilter;
    ///
    /// let filter = SessionFilter::new(&TrackerConfig::default()).unwrap();
    /// assert!(filter.is_trackable("https://example.com/"));
    /// assert!(!filter.is_trackable("chrome://settings/"));
    /// ```
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let ignored = config
            .ignored_url_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map(Arc::new).map_err(|e| {
                    TrackerError::Config(format!("Invalid ignored URL pattern '{}': {}", pattern, e))
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            min_duration_seconds: config.min_duration_seconds,
            schemes: config
                .tracked_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            ignored,
        })
    }

    /// Whether `url` may start (and be reported for) a session
    pub fn is_trackable(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        if !self.schemes.iter().any(|s| s == parsed.scheme()) {
            return false;
        }

        !self.ignored.iter().any(|regex| regex.is_match(url))
    }

    /// Whether a session of `duration_seconds` is worth reporting
    pub fn is_significant(&self, duration_seconds: u64) -> bool {
        duration_seconds > self.min_duration_seconds
    }

    /// Significance threshold in seconds
    pub fn min_duration_seconds(&self) -> u64 {
        self.min_duration_seconds
    }

    /// Human-readable summary for the startup log line
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("min_duration>{}s", self.min_duration_seconds),
            format!("schemes={}", self.schemes.join(",")),
        ];
        if !self.ignored.is_empty() {
            parts.push(format!("ignored_patterns={}", self.ignored.len()));
        }
        parts.join(", ")
    }
}
