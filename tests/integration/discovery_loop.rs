//! Discovery loop against a scripted control plane

use std::time::Duration;

use appwatch::actors::discovery::{Cancelled, DiscoveryActor, DiscoveryHandle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

const NEVER: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_each_application_is_monitored_once() {
    let fixture = Fixture::new(FakeControlPlane::with_apps(&["a", "b"]), NEVER);
    let handle = DiscoveryHandle::spawn(
        ORG,
        SPACE,
        fixture.ctx.clone(),
        NEVER,
        CancellationToken::new(),
    );

    // the first tick has already listed {a, b}
    assert_eq!(handle.discover_now().await.unwrap(), 0);
    assert_eq!(handle.discover_now().await.unwrap(), 0);

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.monitors_spawned, 2);
    assert_eq!(stats.monitored, 2);
    assert_eq!(fixture.control_plane.listings(), 3);

    assert!(fixture.registry.contains("a").await);
    assert!(fixture.registry.contains("b").await);

    wait_until("both monitors to poll", || {
        fixture.control_plane.summary_calls("a") == 1
            && fixture.control_plane.summary_calls("b") == 1
    })
    .await;

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_new_application_is_picked_up() {
    let fixture = Fixture::new(FakeControlPlane::with_apps(&["a"]), NEVER);
    let handle = DiscoveryHandle::spawn(
        ORG,
        SPACE,
        fixture.ctx.clone(),
        NEVER,
        CancellationToken::new(),
    );
    assert_eq!(handle.discover_now().await.unwrap(), 0);

    fixture.control_plane.set_apps(&["a", "c"]);
    assert_eq!(handle.discover_now().await.unwrap(), 1);
    assert!(fixture.registry.contains("c").await);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_listing_is_skipped() {
    let control_plane = FakeControlPlane::with_apps(&["a", "b"]);
    control_plane.fail_next_listings(1);
    let fixture = Fixture::new(control_plane, NEVER);
    let handle = DiscoveryHandle::spawn(
        ORG,
        SPACE,
        fixture.ctx.clone(),
        NEVER,
        CancellationToken::new(),
    );

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.failed_listings, 1);
    assert_eq!(stats.monitored, 0);

    assert_eq!(handle.discover_now().await.unwrap(), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_deleted_application_leaves_and_can_return() {
    let fixture = Fixture::new(FakeControlPlane::with_apps(&["a"]), NEVER);
    fixture.control_plane.delete("a");

    let handle = DiscoveryHandle::spawn(
        ORG,
        SPACE,
        fixture.ctx.clone(),
        NEVER,
        CancellationToken::new(),
    );
    assert_eq!(handle.stats().await.unwrap().monitors_spawned, 1);

    // the monitor sees the 404 on its first tick and removes itself
    wait_for_monitored(&fixture.registry, 0).await;

    fixture.control_plane.restore("a");
    assert_eq!(handle.discover_now().await.unwrap(), 1);
    assert!(fixture.registry.contains("a").await);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_every_monitor() {
    let fixture = Fixture::new(FakeControlPlane::with_apps(&["a", "b", "c"]), NEVER);
    let handle = DiscoveryHandle::spawn(
        ORG,
        SPACE,
        fixture.ctx.clone(),
        NEVER,
        CancellationToken::new(),
    );
    assert_eq!(handle.stats().await.unwrap().monitored, 3);

    handle.shutdown().await.unwrap();

    wait_for_monitored(&fixture.registry, 0).await;
    wait_until("every stream consumer to stop", || {
        ["a", "b", "c"].iter().all(|guid| {
            fixture
                .stream
                .opened(guid)
                .iter()
                .all(|stream| stream.is_closed())
        })
    })
    .await;
}

#[tokio::test]
async fn test_run_returns_cancelled() {
    let fixture = Fixture::new(FakeControlPlane::with_apps(&[]), NEVER);
    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let actor = DiscoveryActor::new(ORG, SPACE, fixture.ctx.clone(), NEVER, cmd_rx);

    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(actor.run(cancel).await, Err(Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_listing_follows_the_interval() {
    let fixture = Fixture::new(FakeControlPlane::with_apps(&[]), NEVER);
    let handle = DiscoveryHandle::spawn(
        ORG,
        SPACE,
        fixture.ctx.clone(),
        Duration::from_secs(5),
        CancellationToken::new(),
    );

    // stats round-trips through the actor, so the first tick has run
    assert_eq!(handle.stats().await.unwrap().ticks, 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(handle.stats().await.unwrap().ticks, 2);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(handle.stats().await.unwrap().ticks, 3);

    handle.shutdown().await.unwrap();
}
