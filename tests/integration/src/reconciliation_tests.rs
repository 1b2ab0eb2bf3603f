//! Snapshot seeding and delta reconciliation over the streaming path

use serde_json::json;

use tacsync_domain::{Classification, TaskStatus};

use crate::test_utils::{frame, harness, settle, snapshot};

const TWO_AIRCRAFT: &str = r#"{
    "aircrafts": [
        {"aircraftId": "A1", "type": "ENEMY", "coordinates": [{"lat": 50.0, "lng": 30.0}]},
        {"aircraftId": "A2", "type": "FRIENDLY", "coordinates": {"lat": 51.0, "lng": 31.0}},
        {"aircraftId": "A3", "type": "NEW", "coordinates": {"lat": 52.0, "lng": 32.0}}
    ],
    "tasks": [
        {"id": "T1", "type": "TO_AIRCRAFT", "aircraftId": "A3", "status": "PENDING"},
        {"id": "T2", "type": "TO_POINT", "coordinates": {"lat": 49.0, "lng": 29.0}, "status": "PENDING"}
    ],
    "mogs": [
        {"username": "bravo", "callSign": "B", "ready": false, "connected": true,
         "coordinates": {"lat": 48.0, "lng": 28.0}}
    ]
}"#;

#[tokio::test(start_paused = true)]
async fn test_update_grows_only_its_own_history() {
    let h = harness(snapshot(TWO_AIRCRAFT));
    h.session.start("tok").await.unwrap();
    settle().await;

    let before = h.session.model().snapshot().unwrap();
    let a2_before = before.aircraft("A2").cloned().unwrap();
    assert_eq!(before.aircraft("A1").unwrap().coordinate_history.len(), 1);

    h.connector.push_frame(&frame(
        "aircraft.updated",
        json!({"aircraftId": "A1", "coordinates": {"lat": 50.01, "lng": 30.02}, "speed": 210.0}),
    ));
    settle().await;

    let after = h.session.model().snapshot().unwrap();
    let a1 = after.aircraft("A1").unwrap();
    assert_eq!(a1.coordinate_history.len(), 2);
    assert_eq!(a1.last_position().unwrap().lat, 50.01);
    assert_eq!(a1.classification, Classification::Hostile);
    assert_eq!(a1.speed, Some(210.0));
    assert_eq!(after.aircraft("A2"), Some(&a2_before));

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_task_removal_takes_its_aircraft_in_one_step() {
    let h = harness(snapshot(TWO_AIRCRAFT));
    h.session.start("tok").await.unwrap();
    settle().await;

    let start = h.session.model().revision();

    h.connector.push_frame(&frame("task.removed", json!({"id": "T1"})));
    settle().await;

    // one revision covers both removals
    assert_eq!(h.session.model().revision(), start + 1);
    let model = h.session.model().snapshot().unwrap();
    assert!(model.task("T1").is_none());
    assert!(model.aircraft("A3").is_none());
    assert!(model.aircraft("A1").is_some());
    assert!(model.task("T2").is_some());

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_repeated_status_event_is_idempotent() {
    let h = harness(snapshot(TWO_AIRCRAFT));
    h.session.start("tok").await.unwrap();
    settle().await;

    let accepted = frame("task.accepted", json!({"id": "T2"}));
    h.connector.push_frame(&accepted);
    settle().await;
    let once = h.session.model().snapshot().unwrap();

    h.connector.push_frame(&accepted);
    settle().await;
    let twice = h.session.model().snapshot().unwrap();

    assert_eq!(once.task("T2").unwrap().status, TaskStatus::Accepted);
    assert_eq!(once.tasks, twice.tasks);

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_bad_frames_do_not_disturb_later_ones() {
    let h = harness(snapshot(TWO_AIRCRAFT));
    h.session.start("tok").await.unwrap();
    settle().await;

    h.connector.push_frame("{not json");
    h.connector.push_frame(&frame("weather.updated", json!({})));
    h.connector.push_frame(&frame("mog.updated", json!({"callSign": "no username"})));
    h.connector.push_frame(&frame("mog.disconnected", json!({"username": "bravo"})));
    settle().await;

    let model = h.session.model().snapshot().unwrap();
    assert!(!model.operator("bravo").unwrap().connected);

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_operator_and_reference_point_lifecycle() {
    let h = harness(snapshot(TWO_AIRCRAFT));
    h.session.start("tok").await.unwrap();
    settle().await;

    h.connector.push_frame(&frame(
        "mog.entered",
        json!({"username": "charlie", "callSign": "C", "coordinates": {"lat": 47.0, "lng": 27.0}}),
    ));
    h.connector.push_frame(&frame("mog.quit", json!({"username": "bravo"})));
    h.connector.push_frame(&frame("refpoint.created", json!({"lat": 50.0, "lng": 30.0})));
    settle().await;

    let model = h.session.model().snapshot().unwrap();
    assert!(model.operator("charlie").unwrap().connected);
    assert!(model.operator("bravo").is_none());
    let (distance, _bearing) = model
        .relative_to_reference(&model.aircraft("A1").unwrap().last_position().unwrap())
        .unwrap();
    assert!(distance < 1.0);

    h.connector.push_frame(&frame("refpoint.deleted", json!(null)));
    settle().await;
    assert!(h.session.model().read(|m| m.reference_point.is_none()).unwrap());

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_task_command_goes_local_then_remote() {
    let h = harness(snapshot(TWO_AIRCRAFT));
    h.session.start("tok").await.unwrap();

    h.session.tasks().accept("T1").await.unwrap();
    let status = h
        .session
        .model()
        .read(|m| m.task("T1").map(|t| t.status))
        .unwrap();
    assert_eq!(status, Some(TaskStatus::Accepted));
    assert_eq!(
        *h.rest.status_calls.lock().unwrap(),
        vec![("T1".to_string(), TaskStatus::Accepted)]
    );
    assert_eq!(h.rest.token.lock().unwrap().as_deref(), Some("tok"));

    h.session.shutdown().await;
}
