//! Tracker counters
//!
//! Counters are recorded through the `metrics` facade; without an installed
//! recorder they are no-ops.
//!
//! # Metrics
//!
//! - `tracker_sessions_started_total`: sessions opened
//! - `tracker_records_emitted_total`: sessions finalized into records
//! - `tracker_records_suppressed_total`: sessions below the threshold
//! - `tracker_records_dropped_total`: records dropped by the dispatcher, by reason
//! - `tracker_deliveries_total`: delivery attempts, by strategy and outcome
//! - `tracker_records_queued_total`: records parked in the outbox

use metrics::increment_counter;

use crate::dispatch::{DropReason, Strategy};

/// A session was opened
pub fn session_started() {
    increment_counter!("tracker_sessions_started_total");
}

/// A session was finalized into a record
pub fn record_emitted() {
    increment_counter!("tracker_records_emitted_total");
}

/// A session ended below the significance threshold
pub fn record_suppressed() {
    increment_counter!("tracker_records_suppressed_total");
}

/// The dispatcher dropped a record
pub fn record_dropped(reason: DropReason) {
    increment_counter!("tracker_records_dropped_total", "reason" => reason.as_str());
}

/// A record was queued for retry
pub fn record_queued(strategy: Strategy) {
    increment_counter!("tracker_records_queued_total", "strategy" => strategy.as_str());
}

/// A delivery attempt finished
pub fn delivery(strategy: Strategy, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    increment_counter!(
        "tracker_deliveries_total",
        "strategy" => strategy.as_str(),
        "outcome" => outcome
    );
}
