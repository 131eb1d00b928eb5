//! Collector request bodies

use chrono::SecondsFormat;
use serde::Serialize;

use crate::tracker::ActivityRecord;

/// Body of the unauthenticated token-mode endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLogPayload {
    /// Enrollment team identifier
    pub team_id: String,
    /// Enrollment member identifier
    pub member_id: String,
    /// Page that was viewed
    pub url: String,
    /// Session start, ISO-8601 with millisecond precision
    pub timestamp: String,
    /// Duration in whole seconds
    pub duration: u64,
}

impl TokenLogPayload {
    /// Build the payload for `record` under the given enrollment
    pub fn new(record: &ActivityRecord, team_id: &str, member_id: &str) -> Self {
        Self {
            team_id: team_id.to_string(),
            member_id: member_id.to_string(),
            url: record.url.clone(),
            timestamp: iso_timestamp(record),
            duration: record.duration_seconds,
        }
    }
}

/// Body of the bearer-authenticated login-mode endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthLogPayload {
    /// Page that was viewed
    pub url: String,
    /// Session start, ISO-8601 with millisecond precision
    pub timestamp: String,
    /// Duration in whole seconds
    pub duration: u64,
}

impl AuthLogPayload {
    /// Build the payload for `record`
    pub fn new(record: &ActivityRecord) -> Self {
        Self {
            url: record.url.clone(),
            timestamp: iso_timestamp(record),
            duration: record.duration_seconds,
        }
    }
}

fn iso_timestamp(record: &ActivityRecord) -> String {
    record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
