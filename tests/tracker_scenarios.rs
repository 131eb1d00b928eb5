//! End-to-end tracker scenarios: events in, collector requests out

mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{http_dispatcher, session_tracker, t0, FixedIdentity, SteppingClock};
use nexus_tracker::adapter::{event_stream, EventStream, FocusCache, Framing};
use nexus_tracker::config::TrackerConfig;
use nexus_tracker::identity::IdentityProvider;
use nexus_tracker::store::DispatchConfig;
use nexus_tracker::tracker::{
    BrowserEvent, Clock, IdleState, LoadStatus, ManualClock, SessionEnd, SessionFilter,
    SessionTracker, Surface,
};
use nexus_tracker::{TrackerError, TrackerService};

fn activated(id: i64, url: &str) -> BrowserEvent {
    BrowserEvent::SurfaceActivated {
        surface: Surface::new(id, url),
    }
}

fn in_window(id: i64, url: &str, window_id: i64) -> Surface {
    Surface {
        id,
        url: url.to_string(),
        window_id: Some(window_id),
    }
}

fn token_service(server: &MockServer, clock: &ManualClock) -> TrackerService {
    let identity: Arc<dyn IdentityProvider> = Arc::new(FixedIdentity::signed_out());
    TrackerService::new(
        session_tracker(),
        http_dispatcher(
            &server.uri(),
            DispatchConfig::token("team-1", "member-7"),
            identity.clone(),
        ),
        Arc::new(FocusCache::new()),
        identity,
        Arc::new(clock.clone()),
    )
}

#[test]
fn test_tab_switch_emits_previous_session() {
    let mut tracker = session_tracker();
    let start = t0();

    tracker.focus(&Surface::new(1, "https://x.test/a"), start);
    let transition = tracker.focus(
        &Surface::new(2, "https://y.test/b"),
        start + ChronoDuration::seconds(5),
    );

    let record = transition.into_record().expect("record for the first tab");
    assert_eq!(record.url, "https://x.test/a");
    assert_eq!(record.timestamp, start);
    assert_eq!(record.duration_seconds, 5);
}

#[test]
fn test_short_session_before_idle_depends_on_threshold() {
    let start = t0();
    let idle_at = start + ChronoDuration::seconds(1);

    let mut strict = session_tracker();
    strict.focus(&Surface::new(1, "https://x.test/"), start);
    assert!(matches!(strict.end(idle_at), SessionEnd::Suppressed { .. }));

    let config = TrackerConfig {
        min_duration_seconds: 0,
        ..TrackerConfig::default()
    };
    let mut lenient = SessionTracker::new(SessionFilter::new(&config).unwrap());
    lenient.focus(&Surface::new(1, "https://x.test/"), start);
    match lenient.end(idle_at) {
        SessionEnd::Emitted(record) => assert_eq!(record.duration_seconds, 1),
        other => panic!("expected an emitted record, got {:?}", other),
    }
}

#[test]
fn test_internal_page_never_opens_a_session() {
    let mut tracker = session_tracker();
    let start = t0();

    let transition = tracker.focus(&Surface::new(1, "chrome://settings"), start);
    assert!(!transition.started);
    assert!(tracker.active().is_none());

    let ended = tracker.end(start + ChronoDuration::hours(2));
    assert_eq!(ended, SessionEnd::NoSession);
}

#[test]
fn test_reactivating_the_same_page_keeps_one_session() {
    let mut tracker = session_tracker();
    let start = t0();
    let surface = Surface::new(1, "https://x.test/");

    tracker.focus(&surface, start);
    let again = tracker.focus(&surface, start + ChronoDuration::seconds(3));
    assert!(again.record().is_none());
    assert!(!again.started);
    assert_eq!(tracker.active().map(|s| s.started_at), Some(start));
}

#[tokio::test]
async fn test_lines_feed_is_delivered_in_token_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ext/log"))
        .and(body_partial_json(json!({"url": "https://x.test/", "duration": 5})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/ext/log"))
        .and(body_partial_json(json!({"url": "https://y.test/", "duration": 5})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let feed = concat!(
        r#"{"type":"surface_activated","surface":{"id":1,"url":"https://x.test/"}}"#,
        "\n",
        "not json\n",
        r#"{"type":"surface_activated","surface":{"id":2,"url":"https://y.test/"}}"#,
        "\n",
    );

    let identity: Arc<dyn IdentityProvider> = Arc::new(FixedIdentity::signed_out());
    let service = TrackerService::new(
        session_tracker(),
        http_dispatcher(
            &server.uri(),
            DispatchConfig::token("team-1", "member-7"),
            identity.clone(),
        ),
        Arc::new(FocusCache::new()),
        identity,
        Arc::new(SteppingClock::new(t0(), 5)),
    );

    let summary = service
        .run(
            event_stream(Cursor::new(feed.as_bytes().to_vec()), Framing::Lines),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(summary.events, 2);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.sessions_started, 2);
    assert_eq!(summary.records_emitted, 2);
    assert_eq!(summary.delivered, 2);
}

#[tokio::test]
async fn test_idle_and_focus_loss_end_sessions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let clock = ManualClock::new(t0());
    let identity: Arc<dyn IdentityProvider> = Arc::new(FixedIdentity::signed_out());
    let mut service = TrackerService::new(
        session_tracker(),
        http_dispatcher(
            &server.uri(),
            DispatchConfig::token("team-1", "member-7"),
            identity.clone(),
        ),
        Arc::new(FocusCache::new()),
        identity,
        Arc::new(clock.clone()),
    );

    service.handle_event(activated(1, "https://x.test/")).await;
    clock.advance(ChronoDuration::seconds(10));
    service
        .handle_event(BrowserEvent::IdleStateChanged {
            state: IdleState::Idle,
        })
        .await;
    assert!(service.tracker().active().is_none());

    // Back from idle: the last active tab resumes.
    service
        .handle_event(BrowserEvent::IdleStateChanged {
            state: IdleState::Active,
        })
        .await;
    assert_eq!(service.tracker().active().map(|s| s.surface_id), Some(1));

    clock.advance(ChronoDuration::seconds(4));
    service
        .handle_event(BrowserEvent::WindowFocusChanged { window_id: None })
        .await;
    assert!(service.tracker().active().is_none());

    service.drain().await;
    assert_eq!(service.summary().records_emitted, 2);
    assert_eq!(service.summary().delivered, 2);
}

#[tokio::test]
async fn test_closing_the_tracked_tab_ends_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"duration": 7})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let clock = ManualClock::new(t0());
    let identity: Arc<dyn IdentityProvider> = Arc::new(FixedIdentity::signed_out());
    let mut service = TrackerService::new(
        session_tracker(),
        http_dispatcher(
            &server.uri(),
            DispatchConfig::token("team-1", "member-7"),
            identity.clone(),
        ),
        Arc::new(FocusCache::new()),
        identity,
        Arc::new(clock.clone()),
    );

    service.handle_event(activated(3, "https://x.test/")).await;
    clock.advance(ChronoDuration::seconds(7));
    service
        .handle_event(BrowserEvent::SurfaceRemoved { surface_id: 99 })
        .await;
    assert!(service.tracker().active().is_some());

    service
        .handle_event(BrowserEvent::SurfaceRemoved { surface_id: 3 })
        .await;
    assert!(service.tracker().active().is_none());

    service.drain().await;
    assert_eq!(service.summary().delivered, 1);
}

#[tokio::test]
async fn test_sign_out_ends_the_open_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ext/log"))
        .and(body_partial_json(json!({"duration": 6})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let clock = ManualClock::new(t0());
    let fixed = Arc::new(FixedIdentity::signed_in("tok"));
    let identity: Arc<dyn IdentityProvider> = fixed.clone();
    let service = TrackerService::new(
        session_tracker(),
        http_dispatcher(
            &server.uri(),
            DispatchConfig::token("team-1", "member-7"),
            identity.clone(),
        ),
        Arc::new(FocusCache::new()),
        identity,
        Arc::new(clock.clone()),
    );

    let (tx, rx) = futures::channel::mpsc::unbounded();
    let events: EventStream = rx.map(Ok::<_, TrackerError>).boxed();
    let handle = tokio::spawn(service.run(events, CancellationToken::new()));

    tx.unbounded_send(activated(1, "https://x.test/")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    clock.advance(ChronoDuration::seconds(6));
    fixed.sign_out();
    tokio::time::sleep(Duration::from_millis(50)).await;

    clock.advance(ChronoDuration::seconds(30));
    drop(tx);
    let summary = handle.await.unwrap();

    assert_eq!(summary.sessions_started, 1);
    assert_eq!(summary.records_emitted, 1);
    assert_eq!(summary.delivered, 1);
}

#[tokio::test]
async fn test_cancel_flushes_open_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let clock = ManualClock::new(t0());
    let identity: Arc<dyn IdentityProvider> = Arc::new(FixedIdentity::signed_out());
    let service = TrackerService::new(
        session_tracker(),
        http_dispatcher(
            &server.uri(),
            DispatchConfig::token("team-1", "member-7"),
            identity.clone(),
        ),
        Arc::new(FocusCache::new()),
        identity,
        Arc::new(clock.clone()),
    );

    let (tx, rx) = futures::channel::mpsc::unbounded();
    let events: EventStream = rx.map(Ok::<_, TrackerError>).boxed();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(service.run(events, cancel.clone()));

    tx.unbounded_send(activated(1, "https://x.test/")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    clock.advance(ChronoDuration::seconds(12));
    cancel.cancel();

    let summary = handle.await.unwrap();
    assert_eq!(summary.records_emitted, 1);
    assert_eq!(summary.delivered, 1);
}

#[tokio::test]
async fn test_idle_cycle_after_focus_loss_stays_without_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"duration": 5})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let clock = ManualClock::new(t0());
    let mut service = token_service(&server, &clock);

    service
        .handle_event(BrowserEvent::SurfaceActivated {
            surface: in_window(1, "https://x.test/", 10),
        })
        .await;
    clock.advance(ChronoDuration::seconds(5));
    service
        .handle_event(BrowserEvent::WindowFocusChanged { window_id: None })
        .await;

    clock.advance(ChronoDuration::seconds(60));
    service
        .handle_event(BrowserEvent::IdleStateChanged {
            state: IdleState::Idle,
        })
        .await;
    clock.advance(ChronoDuration::seconds(60));
    service
        .handle_event(BrowserEvent::IdleStateChanged {
            state: IdleState::Active,
        })
        .await;
    assert!(service.tracker().active().is_none());

    service.drain().await;
    assert_eq!(service.summary().sessions_started, 1);
    assert_eq!(service.summary().records_emitted, 1);
}

#[tokio::test]
async fn test_window_focus_resumes_that_windows_tab() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let clock = ManualClock::new(t0());
    let mut service = token_service(&server, &clock);

    service
        .handle_event(BrowserEvent::SurfaceActivated {
            surface: in_window(1, "https://x.test/", 10),
        })
        .await;
    clock.advance(ChronoDuration::seconds(3));
    service
        .handle_event(BrowserEvent::SurfaceActivated {
            surface: in_window(2, "https://y.test/", 20),
        })
        .await;
    clock.advance(ChronoDuration::seconds(4));
    service
        .handle_event(BrowserEvent::WindowFocusChanged { window_id: None })
        .await;
    assert!(service.tracker().active().is_none());

    clock.advance(ChronoDuration::seconds(10));
    service
        .handle_event(BrowserEvent::WindowFocusChanged {
            window_id: Some(10),
        })
        .await;

    let active = service.tracker().active().expect("window 10 tab resumed");
    assert_eq!(active.surface_id, 1);
    assert_eq!(active.url, "https://x.test/");
    assert_eq!(active.started_at, clock.now());

    service.drain().await;
    assert_eq!(service.summary().sessions_started, 3);
    assert_eq!(service.summary().delivered, 2);
}

#[tokio::test]
async fn test_completed_load_after_activation_is_counted_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"url": "https://x.test/", "duration": 6})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let clock = ManualClock::new(t0());
    let mut service = token_service(&server, &clock);

    service.handle_event(activated(1, "https://x.test/")).await;
    clock.advance(ChronoDuration::seconds(1));
    service
        .handle_event(BrowserEvent::SurfaceUpdated {
            surface: Surface::new(1, "https://x.test/"),
            status: Some(LoadStatus::Complete),
            active: true,
        })
        .await;
    assert_eq!(service.tracker().active().map(|s| s.started_at), Some(t0()));

    clock.advance(ChronoDuration::seconds(5));
    service.handle_event(activated(2, "https://y.test/")).await;

    service.drain().await;
    assert_eq!(service.summary().sessions_started, 2);
    assert_eq!(service.summary().records_emitted, 1);
    assert_eq!(service.summary().delivered, 1);
}
