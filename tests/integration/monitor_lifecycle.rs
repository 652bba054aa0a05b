//! Per-application monitor: polling, event window and end of life

use std::time::Duration;

use appwatch::actors::app_monitor::AppMonitorHandle;
use appwatch::actors::messages::{MonitorExit, MonitorState};
use appwatch::cloudfoundry::AppEvent;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

const NEVER: Duration = Duration::from_secs(3600);

async fn spawn_monitor(fixture: &Fixture, guid: &str) -> AppMonitorHandle {
    fixture.registry.insert_new(vec![app(guid)], |_| {}).await;
    AppMonitorHandle::spawn(app(guid), fixture.ctx.clone(), CancellationToken::new())
}

fn restart_event() -> AppEvent {
    AppEvent {
        event_type: "audit.app.restage".into(),
        actor_name: "admin".into(),
        actor_type: "user".into(),
        actee_name: "app-a".into(),
        actee_type: "app".into(),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_summary_metrics_precede_event_metrics() {
    let fixture = Fixture::new(FakeControlPlane::with_apps(&["a"]), NEVER);
    fixture.control_plane.push_summary("a", Ok(summary(1, 3)));
    fixture.control_plane.push_events("a", Ok(vec![restart_event()]));

    let handle = spawn_monitor(&fixture, "a").await;
    wait_until("three metrics", || fixture.recorded.lock().unwrap().len() == 3).await;

    assert_eq!(
        services(&fixture.recorded),
        vec![
            "instance running_count",
            "instance configured_count",
            "app event"
        ]
    );

    let recorded = fixture.recorded.lock().unwrap().clone();
    assert_eq!(recorded[0].state, "warn");
    assert_eq!(recorded[1].state, "warn");
    assert_eq!(recorded[0].host, "app-a");
    assert_eq!(recorded[0].attributes["application_id"], "a");

    let event = &recorded[2];
    assert_eq!(event.state, "ok");
    assert_eq!(event.time, restart_event().timestamp.timestamp());
    assert_eq!(event.attributes["event"], "audit.app.restage");
    assert_eq!(event.attributes["actor"], "admin");

    assert_eq!(handle.state(), MonitorState::Active);
    handle.cancel();
    assert_eq!(handle.join().await.unwrap(), MonitorExit::Cancelled);
}

#[tokio::test]
async fn test_not_found_stops_and_leaves_the_set() {
    let fixture = Fixture::new(FakeControlPlane::with_apps(&["a"]), NEVER);
    fixture.control_plane.delete("a");

    let handle = spawn_monitor(&fixture, "a").await;
    let state = handle.watch_state();

    assert_eq!(handle.join().await.unwrap(), MonitorExit::NotFound);
    assert_eq!(*state.borrow(), MonitorState::Stopped);
    assert!(!fixture.registry.contains("a").await);

    // terminated on the first tick, without asking for events
    assert_eq!(fixture.control_plane.summary_calls("a"), 1);
    assert!(fixture.control_plane.event_queries("a").is_empty());
    assert!(fixture.recorded.lock().unwrap().is_empty());

    // the stream consumer was cancelled with the monitor
    assert!(fixture.stream.opened("a").iter().all(|s| s.is_closed()));
}

#[tokio::test]
async fn test_transient_summary_error_keeps_monitoring() {
    let fixture = Fixture::new(FakeControlPlane::with_apps(&["a"]), NEVER);
    fixture.control_plane.push_summary("a", Err(transient_error()));
    fixture.control_plane.push_events("a", Ok(vec![restart_event()]));

    let handle = spawn_monitor(&fixture, "a").await;

    // events are still fetched on a tick whose summary failed
    wait_until("the event metric", || {
        services(&fixture.recorded) == vec!["app event"]
    })
    .await;
    assert_eq!(handle.state(), MonitorState::Active);
    assert!(fixture.registry.contains("a").await);

    handle.cancel();
    assert_eq!(handle.join().await.unwrap(), MonitorExit::Cancelled);
    assert!(!fixture.registry.contains("a").await);
}

#[tokio::test(start_paused = true)]
async fn test_event_window_advances_only_after_success() {
    let poll = Duration::from_secs(5);
    let fixture = Fixture::new(FakeControlPlane::with_apps(&["a"]), poll);
    fixture.control_plane.push_events("a", Ok(vec![]));
    fixture.control_plane.push_events("a", Err(transient_error()));
    fixture.control_plane.push_events("a", Ok(vec![]));

    let handle = spawn_monitor(&fixture, "a").await;

    for tick in 1..=4 {
        if tick > 1 {
            tokio::time::advance(poll).await;
        }
        wait_until("the next events query", || {
            fixture.control_plane.event_queries("a").len() == tick
        })
        .await;
    }

    let queries = fixture.control_plane.event_queries("a");
    // first tick queries from its own time, the failed second query is
    // repeated with the same bound by the third
    assert_eq!(queries[1], queries[0]);
    assert_eq!(queries[2], queries[0]);
    assert!(queries[3] > queries[0]);

    handle.cancel();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_event_recorded_during_a_tick_is_reported_once() {
    let poll = Duration::from_millis(50);
    let fixture = Fixture::new(FakeControlPlane::with_apps(&["a"]), poll);
    fixture
        .control_plane
        .record_event_during_next_summary("a", restart_event());

    let handle = spawn_monitor(&fixture, "a").await;
    wait_until("the event metric", || {
        services(&fixture.recorded).contains(&"app event".to_string())
    })
    .await;

    // several more windows go by
    let queries = fixture.control_plane.event_queries("a").len();
    wait_until("three more event queries", || {
        fixture.control_plane.event_queries("a").len() >= queries + 3
    })
    .await;

    let reported = services(&fixture.recorded)
        .into_iter()
        .filter(|service| service == "app event")
        .count();
    assert_eq!(reported, 1);

    handle.cancel();
    assert_eq!(handle.join().await.unwrap(), MonitorExit::Cancelled);
}

#[tokio::test]
async fn test_cancel_stops_stream_consumer() {
    let fixture = Fixture::new(FakeControlPlane::with_apps(&["a"]), NEVER);
    let handle = spawn_monitor(&fixture, "a").await;

    wait_until("the stream to open", || fixture.stream.opened("a").len() == 1).await;
    let stream = fixture.stream.opened("a").remove(0);
    assert_eq!(stream.token, "token");
    assert!(!stream.is_closed());

    handle.cancel();
    assert_eq!(handle.join().await.unwrap(), MonitorExit::Cancelled);

    assert!(stream.is_closed());
    assert!(!fixture.registry.contains("a").await);
}

#[tokio::test(start_paused = true)]
async fn test_ended_stream_consumer_is_restarted_on_next_tick() {
    let poll = Duration::from_secs(5);
    let fixture = Fixture::new(FakeControlPlane::with_apps(&["a"]), poll);
    fixture.tokens.fail_next(1);

    let handle = spawn_monitor(&fixture, "a").await;
    wait_until("the failed token request", || fixture.tokens.calls() >= 1).await;

    tokio::time::advance(poll).await;
    wait_until("the stream to reopen", || fixture.stream.opened("a").len() == 1).await;
    assert_eq!(fixture.tokens.calls(), 2);

    handle.cancel();
    handle.join().await.unwrap();
}
