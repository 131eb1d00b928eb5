//! Session state machine
//!
//! [`SessionTracker`] owns the single open viewing session. Every transition
//! that replaces a session ends the old one before starting the new one, so
//! two sessions never coexist and a finished record is always computed
//! against the start instant of the session it belongs to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::Surface;
use super::filter::SessionFilter;

/// The currently open viewing interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    /// Handle of the tracked surface
    pub surface_id: i64,
    /// URL the surface showed when the session started
    pub url: String,
    /// Session start
    pub started_at: DateTime<Utc>,
}

/// A finished, significant viewing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Page that was viewed
    pub url: String,
    /// Session start
    pub timestamp: DateTime<Utc>,
    /// Whole seconds between start and end, rounded
    pub duration_seconds: u64,
}

/// Tracker state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing is being tracked
    #[default]
    NoSession,
    /// One session is open
    Tracking(ActiveSession),
}

/// Result of ending the open session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionEnd {
    /// There was no open session
    #[default]
    NoSession,
    /// The session was too short to report
    Suppressed {
        /// URL of the discarded session
        url: String,
        /// Rounded duration of the discarded session
        duration_seconds: u64,
    },
    /// The session produced a record
    Emitted(ActivityRecord),
}

/// What a single tracker input did
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transition {
    /// Outcome of ending the previous session
    pub ended: SessionEnd,
    /// Whether a new session was opened
    pub started: bool,
}

impl Transition {
    /// The finished record, if one was emitted
    pub fn record(&self) -> Option<&ActivityRecord> {
        match &self.ended {
            SessionEnd::Emitted(record) => Some(record),
            _ => None,
        }
    }

    /// Consume the transition, returning the emitted record
    pub fn into_record(self) -> Option<ActivityRecord> {
        match self.ended {
            SessionEnd::Emitted(record) => Some(record),
            _ => None,
        }
    }
}

/// Rounded whole seconds between `start` and `end`, never negative
pub fn rounded_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    let millis = (end - start).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        ((millis + 500) / 1000) as u64
    }
}

/// Single-session tracker
#[derive(Debug, Clone)]
pub struct SessionTracker {
    filter: SessionFilter,
    state: SessionState,
}

impl SessionTracker {
    /// Create a tracker with no open session
    pub fn new(filter: SessionFilter) -> Self {
        Self {
            filter,
            state: SessionState::NoSession,
        }
    }

    /// Current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The open session, if any
    pub fn active(&self) -> Option<&ActiveSession> {
        match &self.state {
            SessionState::Tracking(session) => Some(session),
            SessionState::NoSession => None,
        }
    }

    /// Filter used for trackability and significance
    pub fn filter(&self) -> &SessionFilter {
        &self.filter
    }

    /// `surface` became the focused surface at `now`.
    ///
    /// Re-focusing the surface that is already tracked, still on the same
    /// URL, changes nothing. Otherwise the open session is ended first and
    /// a new one is started if the surface's URL is trackable.
    pub fn focus(&mut self, surface: &Surface, now: DateTime<Utc>) -> Transition {
        if let Some(active) = self.active() {
            if active.surface_id == surface.id && active.url == surface.url {
                return Transition::default();
            }
        }

        let ended = self.end(now);

        let started = if self.filter.is_trackable(&surface.url) {
            self.state = SessionState::Tracking(ActiveSession {
                surface_id: surface.id,
                url: surface.url.clone(),
                started_at: now,
            });
            true
        } else {
            false
        };

        Transition { ended, started }
    }

    /// End the open session at `now`; a no-op when nothing is open
    pub fn end(&mut self, now: DateTime<Utc>) -> SessionEnd {
        let SessionState::Tracking(session) = std::mem::take(&mut self.state) else {
            return SessionEnd::NoSession;
        };

        let duration_seconds = rounded_seconds(session.started_at, now);
        if self.filter.is_significant(duration_seconds) && self.filter.is_trackable(&session.url)
        {
            SessionEnd::Emitted(ActivityRecord {
                url: session.url,
                timestamp: session.started_at,
                duration_seconds,
            })
        } else {
            SessionEnd::Suppressed {
                url: session.url,
                duration_seconds,
            }
        }
    }

    /// Surface `surface_id` was closed at `now`
    pub fn surface_closed(&mut self, surface_id: i64, now: DateTime<Utc>) -> SessionEnd {
        match self.active() {
            Some(active) if active.surface_id == surface_id => self.end(now),
            _ => SessionEnd::NoSession,
        }
    }
}
