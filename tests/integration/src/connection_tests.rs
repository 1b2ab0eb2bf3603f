//! Connection lifecycle: bounded reconnect, credential rotation, dropped sends

use std::time::Duration;

use tacsync_core::{ReconnectConfig, SyncConfig};
use tacsync_domain::Snapshot;
use tacsync_location::PublishOutcome;
use tacsync_stream::ConnectionState;

use crate::test_utils::{harness, harness_with, settle, FakeConnector};

const DELAY: Duration = Duration::from_millis(7000);

fn config(max_attempts: u32) -> SyncConfig {
    let mut config = SyncConfig::local();
    config.reconnect = ReconnectConfig {
        delay_ms: 7000,
        max_attempts,
    };
    config
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_stops_after_budget() {
    let h = harness_with(Snapshot::default(), FakeConnector::refusing(), config(3));
    h.session.start("tok").await.unwrap();
    settle().await;
    assert_eq!(h.connector.attempts(), 1);

    for expected in 2..=4 {
        tokio::time::advance(DELAY).await;
        settle().await;
        assert_eq!(h.connector.attempts(), expected);
    }

    tokio::time::advance(DELAY * 10).await;
    settle().await;
    assert_eq!(h.connector.attempts(), 4);
    assert_eq!(h.session.connection_state(), ConnectionState::Errored);

    // only an explicit connect resumes
    h.session.connection().connect(None).unwrap();
    settle().await;
    assert_eq!(h.connector.attempts(), 5);

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_uses_rotated_token() {
    let h = harness_with(Snapshot::default(), FakeConnector::default(), config(5));
    h.session.start("first").await.unwrap();
    settle().await;
    assert_eq!(h.session.connection_state(), ConnectionState::Open);

    // rotation does not interrupt the open stream
    h.session.update_token("second").unwrap();
    settle().await;
    assert_eq!(h.session.connection_state(), ConnectionState::Open);
    assert_eq!(h.connector.attempts(), 1);
    assert_eq!(h.rest.token.lock().unwrap().as_deref(), Some("second"));

    h.connector.close();
    settle().await;
    assert_eq!(h.session.connection_state(), ConnectionState::Closed);

    tokio::time::advance(DELAY).await;
    settle().await;
    assert_eq!(h.connector.attempts(), 2);
    assert_eq!(h.session.connection_state(), ConnectionState::Open);

    let peers = h.connector.peers.lock().unwrap();
    let token_of = |i: usize| {
        peers[i]
            .url
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
    };
    assert_eq!(token_of(0).as_deref(), Some("Bearer first"));
    assert_eq!(token_of(1).as_deref(), Some("Bearer second"));
    drop(peers);

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let h = harness_with(Snapshot::default(), FakeConnector::refusing(), config(5));
    h.session.start("tok").await.unwrap();
    settle().await;
    assert_eq!(h.connector.attempts(), 1);

    h.session.shutdown().await;
    tokio::time::advance(DELAY * 5).await;
    settle().await;
    assert_eq!(h.connector.attempts(), 1);
    assert!(!h.session.connection_state().is_active());
}

#[tokio::test(start_paused = true)]
async fn test_publish_while_down_is_dropped() {
    let h = harness_with(Snapshot::default(), FakeConnector::refusing(), config(1));
    h.session.start("tok").await.unwrap();
    settle().await;

    let toggle = h.session.ready().toggle_ready().await.unwrap();
    assert!(toggle.ready);
    assert_eq!(toggle.outcome, PublishOutcome::Dropped);
    assert!(h.session.tracker().profile().is_ready());
    // position still recorded locally
    assert!(h.session.tracker().own_location().coordinate.is_some());

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_isolated() {
    let a = harness(Snapshot::default());
    let b = harness(Snapshot::default());
    a.session.start("a").await.unwrap();
    b.session.start("b").await.unwrap();
    settle().await;

    a.connector.push_frame(
        r#"{"topic":"refpoint.created","payload":{"lat":1.0,"lng":2.0}}"#,
    );
    settle().await;
    assert!(a.session.model().read(|m| m.reference_point.is_some()).unwrap());
    assert!(b.session.model().read(|m| m.reference_point.is_none()).unwrap());

    a.session.shutdown().await;
    b.session.shutdown().await;
}
