//! Tracker service event loop
//!
//! One task owns the [`SessionTracker`] and processes browser events
//! strictly in arrival order. Finished records are handed to the
//! dispatcher on spawned tasks; the loop never waits on a delivery before
//! taking the next event.

use std::sync::Arc;
use std::time::Duration;

use futures::{future, StreamExt};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::adapter::{EventStream, FocusQuery};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::identity::{IdentityProvider, IdentityState};
use crate::telemetry;
use crate::tracker::{
    ActivityRecord, BrowserEvent, Clock, IdleState, LoadStatus, SessionEnd, SessionTracker,
    Surface, Transition,
};

/// Counters for one run of the service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Events decoded and handled
    pub events: u64,
    /// Messages that failed to decode
    pub malformed: u64,
    /// Sessions opened
    pub sessions_started: u64,
    /// Records handed to the dispatcher
    pub records_emitted: u64,
    /// Sessions below the significance threshold
    pub records_suppressed: u64,
    /// Records accepted by the collector
    pub delivered: u64,
    /// Records dropped by the dispatcher
    pub dropped: u64,
    /// Records parked in the outbox
    pub queued: u64,
}

/// Event loop tying the tracker to the dispatcher
pub struct TrackerService {
    tracker: SessionTracker,
    dispatcher: Dispatcher,
    focus: Arc<dyn FocusQuery>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    in_flight: JoinSet<Option<DispatchOutcome>>,
    flush_interval: Option<Duration>,
    summary: RunSummary,
}

impl TrackerService {
    /// Create a service with no open session
    pub fn new(
        tracker: SessionTracker,
        dispatcher: Dispatcher,
        focus: Arc<dyn FocusQuery>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            dispatcher,
            focus,
            identity,
            clock,
            in_flight: JoinSet::new(),
            flush_interval: None,
            summary: RunSummary::default(),
        }
    }

    /// Retry queued deliveries every `interval` even when no records arrive
    pub fn with_flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.flush_interval = interval;
        self
    }

    /// The session tracker
    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Counters so far
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Run until the event stream ends or `cancel` fires.
    ///
    /// The open session is ended on the way out and in-flight dispatches
    /// are awaited before the summary is returned.
    pub async fn run(mut self, mut events: EventStream, cancel: CancellationToken) -> RunSummary {
        info!(
            filter = %self.tracker.filter().summary(),
            "Starting tracker service"
        );

        let mut identity_rx = self.identity.subscribe();
        let mut identity_open = true;
        let mut flush_timer = self.flush_interval.map(|period| {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                changed = identity_rx.changed(), if identity_open => {
                    if changed.is_err() {
                        identity_open = false;
                        continue;
                    }
                    let state = *identity_rx.borrow_and_update();
                    if state == IdentityState::SignedOut {
                        self.signed_out();
                    }
                }

                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.record_outcome(joined);
                }

                next = events.next() => match next {
                    Some(Ok(event)) => self.handle_event(event).await,
                    Some(Err(e)) => {
                        self.summary.malformed += 1;
                        warn!(error = %e, "Skipping malformed event");
                    }
                    None => {
                        info!("Event source closed");
                        break;
                    }
                },

                _ = tick(&mut flush_timer) => {
                    let dispatcher = self.dispatcher.clone();
                    self.in_flight.spawn(async move {
                        dispatcher.flush_outbox().await;
                        None
                    });
                }
            }
        }

        self.finish().await
    }

    /// Apply one browser event to the tracker
    pub async fn handle_event(&mut self, event: BrowserEvent) {
        let span = tracing::debug_span!("handle_event", kind = event.kind());
        self.apply_event(event).instrument(span).await;
    }

    async fn apply_event(&mut self, event: BrowserEvent) {
        self.summary.events += 1;
        self.focus.observe(&event);
        let now = self.clock.now();

        match event {
            BrowserEvent::SurfaceActivated { surface } => self.focus_surface(&surface, now),
            BrowserEvent::SurfaceUpdated {
                surface,
                status,
                active,
            } => {
                if active && status == Some(LoadStatus::Complete) {
                    self.focus_surface(&surface, now);
                }
            }
            BrowserEvent::SurfaceRemoved { surface_id } => {
                let ended = self.tracker.surface_closed(surface_id, now);
                self.session_ended(ended);
            }
            BrowserEvent::WindowFocusChanged { window_id: None } => {
                let ended = self.tracker.end(now);
                self.session_ended(ended);
            }
            BrowserEvent::WindowFocusChanged { window_id: Some(_) } => {
                match self.focus.focused_surface().await {
                    Some(surface) => self.focus_surface(&surface, now),
                    None => {
                        let ended = self.tracker.end(now);
                        self.session_ended(ended);
                    }
                }
            }
            BrowserEvent::IdleStateChanged {
                state: IdleState::Idle | IdleState::Locked,
            } => {
                let ended = self.tracker.end(now);
                self.session_ended(ended);
            }
            BrowserEvent::IdleStateChanged {
                state: IdleState::Active,
            } => {
                if let Some(surface) = self.focus.focused_surface().await {
                    self.focus_surface(&surface, now);
                }
            }
        }
    }

    /// The identity signed out: end the open session without a replacement
    pub fn signed_out(&mut self) {
        debug!("Identity signed out, ending open session");
        let ended = self.tracker.end(self.clock.now());
        self.session_ended(ended);
    }

    /// Wait for every in-flight dispatch to finish
    pub async fn drain(&mut self) {
        while let Some(joined) = self.in_flight.join_next().await {
            self.record_outcome(joined);
        }
    }

    /// End the open session, drain dispatches and return the counters
    pub async fn finish(mut self) -> RunSummary {
        let ended = self.tracker.end(self.clock.now());
        self.session_ended(ended);
        self.drain().await;
        info!(
            events = self.summary.events,
            emitted = self.summary.records_emitted,
            delivered = self.summary.delivered,
            dropped = self.summary.dropped,
            queued = self.summary.queued,
            pending = self.dispatcher.pending(),
            "Tracker service stopped"
        );
        self.summary
    }

    fn focus_surface(&mut self, surface: &Surface, now: chrono::DateTime<chrono::Utc>) {
        let transition = self.tracker.focus(surface, now);
        self.transitioned(transition);
    }

    fn transitioned(&mut self, transition: Transition) {
        self.session_ended(transition.ended);
        if transition.started {
            self.summary.sessions_started += 1;
            telemetry::session_started();
            if let Some(active) = self.tracker.active() {
                debug!(surface_id = active.surface_id, url = %active.url, "Session started");
            }
            let identity = self.identity.clone();
            tokio::spawn(async move { identity.prefetch().await });
        }
    }

    fn session_ended(&mut self, ended: SessionEnd) {
        match ended {
            SessionEnd::NoSession => {}
            SessionEnd::Suppressed {
                url,
                duration_seconds,
            } => {
                self.summary.records_suppressed += 1;
                telemetry::record_suppressed();
                debug!(url = %url, duration = duration_seconds, "Session below threshold");
            }
            SessionEnd::Emitted(record) => self.emit(record),
        }
    }

    fn emit(&mut self, record: ActivityRecord) {
        self.summary.records_emitted += 1;
        telemetry::record_emitted();
        info!(url = %record.url, duration = record.duration_seconds, "Session finished");

        let dispatcher = self.dispatcher.clone();
        self.in_flight
            .spawn(async move { Some(dispatcher.dispatch(record).await) });
    }

    fn record_outcome(&mut self, joined: Result<Option<DispatchOutcome>, JoinError>) {
        match joined {
            Ok(Some(DispatchOutcome::Delivered(_))) => self.summary.delivered += 1,
            Ok(Some(DispatchOutcome::Dropped(_))) => self.summary.dropped += 1,
            Ok(Some(DispatchOutcome::Queued(_))) => self.summary.queued += 1,
            Ok(None) => {}
            Err(e) => error!(error = %e, "Dispatch task failed"),
        }
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => future::pending::<()>().await,
    }
}
