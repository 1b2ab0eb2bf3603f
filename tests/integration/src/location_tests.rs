//! Own-location tracking and readiness publishing through a live session

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;

use tacsync_core::Coordinate;
use tacsync_domain::Snapshot;
use tacsync_location::{PublishOutcome, TrackingMode};
use tacsync_stream::ConnectionState;

use crate::test_utils::{harness, settle, Harness};

const INTERVAL: Duration = Duration::from_millis(5000);

async fn started() -> Harness {
    let h = harness(Snapshot::default());
    h.session.start("tok").await.unwrap();
    settle().await;
    assert_eq!(h.session.connection_state(), ConnectionState::Open);
    // the first fix may or may not beat the handshake
    h.connector.sent_frames();
    h
}

fn payloads(frames: Vec<String>) -> Vec<Value> {
    frames
        .iter()
        .map(|f| serde_json::from_str::<Value>(f).unwrap())
        .inspect(|v| assert_eq!(v["topic"], "mog.updated"))
        .map(|v| v["payload"].clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_next_tick_publishes_nothing_more() {
    let h = started().await;

    tokio::time::advance(INTERVAL).await;
    settle().await;
    let published = payloads(h.connector.sent_frames());
    assert_eq!(published.len(), 1);
    assert_eq!(published[0]["username"], "mobile_user");
    let reads = h.gps.reads.load(Ordering::SeqCst);

    h.session.tracker().stop();
    let last = h.session.tracker().own_location().coordinate;

    tokio::time::advance(INTERVAL * 4).await;
    settle().await;
    assert!(h.connector.sent_frames().is_empty());
    assert_eq!(h.gps.reads.load(Ordering::SeqCst), reads);
    assert_eq!(h.session.tracker().mode(), TrackingMode::Stopped);
    // stop keeps the last fix
    assert_eq!(h.session.tracker().own_location().coordinate, last);

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_placement_overrides_sampling() {
    let h = started().await;
    let tracker = h.session.tracker();
    assert_eq!(tracker.mode(), TrackingMode::AutoTracking);
    h.connector.sent_frames();

    let outcome = tracker.place_manually(Coordinate::new(10.0, 20.0)).unwrap();
    assert_eq!(outcome, PublishOutcome::Sent);
    assert_eq!(tracker.mode(), TrackingMode::ManualOverride);
    assert_eq!(tracker.own_location().coordinate, Some(Coordinate::new(10.0, 20.0)));

    let published = payloads(h.connector.sent_frames());
    assert_eq!(published.len(), 1);
    assert_eq!(published[0]["coordinates"]["lat"], 10.0);
    assert_eq!(published[0]["coordinates"]["lng"], 20.0);

    // sampler stays suspended across ticks and further placements
    let reads = h.gps.reads.load(Ordering::SeqCst);
    tokio::time::advance(INTERVAL * 3).await;
    settle().await;
    tracker.place_manually(Coordinate::new(11.0, 21.0)).unwrap();
    assert_eq!(h.gps.reads.load(Ordering::SeqCst), reads);
    assert_eq!(tracker.mode(), TrackingMode::ManualOverride);

    assert!(tracker.resume_automatic().await);
    assert_eq!(tracker.mode(), TrackingMode::AutoTracking);
    tokio::time::advance(INTERVAL).await;
    settle().await;
    assert_eq!(h.gps.reads.load(Ordering::SeqCst), reads + 2);

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_ready_toggle_uses_manual_position() {
    let h = started().await;
    h.session
        .tracker()
        .place_manually(Coordinate::new(10.0, 20.0))
        .unwrap();
    h.connector.sent_frames();
    let reads = h.gps.reads.load(Ordering::SeqCst);

    let toggle = h.session.ready().toggle_ready().await.unwrap();
    assert!(toggle.ready);
    assert_eq!(toggle.outcome, PublishOutcome::Sent);
    assert_eq!(h.gps.reads.load(Ordering::SeqCst), reads);

    let published = payloads(h.connector.sent_frames());
    assert_eq!(published.len(), 1);
    assert_eq!(published[0]["ready"], true);
    assert_eq!(published[0]["coordinates"]["lat"], 10.0);

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_modes_are_exclusive_across_transitions() {
    let h = started().await;
    let tracker = h.session.tracker();
    let mut modes = tracker.subscribe();

    tracker.place_manually(Coordinate::new(10.0, 20.0)).unwrap();
    assert_eq!(modes.borrow_and_update().tracking_mode, TrackingMode::ManualOverride);
    assert!(tracker.start().await);
    assert_eq!(modes.borrow_and_update().tracking_mode, TrackingMode::AutoTracking);
    tracker.stop();
    tracker.stop();
    assert_eq!(modes.borrow_and_update().tracking_mode, TrackingMode::Stopped);

    h.session.shutdown().await;
}
