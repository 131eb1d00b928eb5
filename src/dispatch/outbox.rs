//! Bounded retry queue for failed deliveries
//!
//! Off by default. When enabled, records whose delivery failed with a
//! retryable error are parked here and retried with capped exponential
//! backoff. The queue is FIFO; when it is full the oldest entry is evicted.
//! Entries hold the record only, so a retry re-reads the dispatch settings
//! and uses whatever strategy is current.

use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::config::OutboxConfig;
use crate::tracker::ActivityRecord;

/// A record waiting for another delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelivery {
    /// The record to deliver
    pub record: ActivityRecord,
    /// Attempts made so far
    pub attempts: u32,
    /// Earliest instant for the next attempt
    pub next_attempt_at: Instant,
}

/// Result of [`Outbox::push`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The record was queued
    Queued,
    /// The record was queued and the oldest entry evicted to make room
    Evicted(PendingDelivery),
    /// The attempt budget allows no retry; the record was not queued
    Rejected(PendingDelivery),
}

/// Bounded FIFO of pending deliveries
#[derive(Debug)]
pub struct Outbox {
    entries: VecDeque<PendingDelivery>,
    capacity: usize,
    max_attempts: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl Outbox {
    /// Create an outbox; returns `None` when the configured capacity is zero
    pub fn from_config(config: &OutboxConfig) -> Option<Self> {
        if !config.enabled() {
            return None;
        }
        Some(Self {
            entries: VecDeque::with_capacity(config.capacity),
            capacity: config.capacity,
            max_attempts: config.max_attempts,
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        })
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue a record after its first failed attempt
    pub fn push(&mut self, record: ActivityRecord, now: Instant) -> PushOutcome {
        let entry = PendingDelivery {
            record,
            attempts: 1,
            next_attempt_at: now + self.backoff_for(1),
        };
        if entry.attempts >= self.max_attempts {
            return PushOutcome::Rejected(entry);
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        match evicted {
            Some(evicted) => PushOutcome::Evicted(evicted),
            None => PushOutcome::Queued,
        }
    }

    /// Remove and return every entry whose backoff has elapsed
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingDelivery> {
        let (due, waiting): (VecDeque<_>, VecDeque<_>) = self
            .entries
            .drain(..)
            .partition(|entry| entry.next_attempt_at <= now);
        self.entries = waiting;
        due.into()
    }

    /// Put an entry back after another failed attempt.
    ///
    /// Returns `false` (and drops the entry) once it has used all its
    /// attempts or the queue has no room left.
    pub fn requeue(&mut self, mut entry: PendingDelivery, now: Instant) -> bool {
        entry.attempts += 1;
        if entry.attempts >= self.max_attempts || self.entries.len() >= self.capacity {
            return false;
        }
        entry.next_attempt_at = now + self.backoff_for(entry.attempts);
        self.entries.push_back(entry);
        true
    }

    /// Backoff after `attempts` failures: `base * 2^(attempts-1)`, capped,
    /// plus up to 10% jitter
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        let raw = self
            .base_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff);
        let capped = raw.min(self.max_backoff);

        let jitter_ms = (capped.as_millis() / 10) as u64;
        if jitter_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}
