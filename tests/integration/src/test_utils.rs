//! In-memory collaborators for session scenarios

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use url::Url;

use tacsync_core::{Coordinate, SyncConfig};
use tacsync_domain::{Snapshot, Task, TaskStatus};
use tacsync_location::{LocationError, PositionProvider, PositionSample};
use tacsync_rest::{Credentials, RestError, SnapshotSource, TaskApi};
use tacsync_session::{Collaborators, SyncSession};
use tacsync_stream::{ConnectionError, Connector, TransportEvent, TransportHalves};

/// Server side of one accepted transport.
pub struct Peer {
    pub url: Url,
    pub sent: mpsc::UnboundedReceiver<String>,
    pub inbound: mpsc::UnboundedSender<TransportEvent>,
}

/// Loopback connector. Refuses every attempt while `refuse` is set.
#[derive(Default)]
pub struct FakeConnector {
    pub refuse: AtomicBool,
    pub attempts: AtomicUsize,
    pub peers: Mutex<Vec<Peer>>,
}

impl FakeConnector {
    pub fn refusing() -> Self {
        Self {
            refuse: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Deliver a text frame on the most recent transport.
    pub fn push_frame(&self, text: &str) {
        let peers = self.peers.lock().unwrap();
        let peer = peers.last().expect("no transport open");
        peer.inbound
            .send(TransportEvent::Frame(text.to_string()))
            .unwrap();
    }

    /// Close the most recent transport from the server side.
    pub fn close(&self) {
        let peers = self.peers.lock().unwrap();
        let peer = peers.last().expect("no transport open");
        let _ = peer.inbound.send(TransportEvent::Closed {
            code: Some(1006),
            reason: "server gone".to_string(),
        });
    }

    /// Drain every frame the client has sent on any transport.
    pub fn sent_frames(&self) -> Vec<String> {
        let mut peers = self.peers.lock().unwrap();
        let mut frames = Vec::new();
        for peer in peers.iter_mut() {
            while let Ok(frame) = peer.sent.try_recv() {
                frames.push(frame);
            }
        }
        frames
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: Url) -> Result<TransportHalves, ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ConnectionError::Transport("connection refused".to_string()));
        }
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        self.peers.lock().unwrap().push(Peer {
            url,
            sent: out_rx,
            inbound: in_tx,
        });
        Ok(TransportHalves {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// GPS walking north by 0.001 degrees per read from (50, 30).
#[derive(Default)]
pub struct FakeGps {
    pub reads: AtomicUsize,
}

#[async_trait]
impl PositionProvider for FakeGps {
    async fn request_permission(&self) -> Result<bool, LocationError> {
        Ok(true)
    }

    async fn current_position(&self) -> Result<PositionSample, LocationError> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(PositionSample::at(Coordinate::new(50.0 + n as f64 * 0.001, 30.0)))
    }
}

/// Fixed snapshot plus a task API that always succeeds.
pub struct FakeRest {
    pub snapshot: Snapshot,
    pub token: Mutex<Option<String>>,
    pub status_calls: Mutex<Vec<(String, TaskStatus)>>,
}

impl FakeRest {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            token: Mutex::new(None),
            status_calls: Mutex::new(Vec::new()),
        }
    }
}

impl Credentials for FakeRest {
    fn set_token(&self, token: &str) {
        *self.token.lock().unwrap() = Some(token.to_string());
    }
}

#[async_trait]
impl SnapshotSource for FakeRest {
    async fn fetch_snapshot(&self) -> Result<Snapshot, RestError> {
        Ok(self.snapshot.clone())
    }
}

#[async_trait]
impl TaskApi for FakeRest {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, RestError> {
        Ok(self.snapshot.tasks.clone())
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<(), RestError> {
        self.status_calls.lock().unwrap().push((id.to_string(), status));
        Ok(())
    }

    async fn delete_task(&self, _id: &str) -> Result<(), RestError> {
        Ok(())
    }
}

/// A session and handles to its fakes.
pub struct Harness {
    pub session: SyncSession,
    pub connector: Arc<FakeConnector>,
    pub gps: Arc<FakeGps>,
    pub rest: Arc<FakeRest>,
}

pub fn snapshot(json: &str) -> Snapshot {
    serde_json::from_str(json).unwrap()
}

/// Build a session over fresh fakes. Must run inside a tokio runtime.
pub fn harness(snapshot: Snapshot) -> Harness {
    harness_with(snapshot, FakeConnector::default(), SyncConfig::local())
}

pub fn harness_with(snapshot: Snapshot, connector: FakeConnector, config: SyncConfig) -> Harness {
    let connector = Arc::new(connector);
    let gps = Arc::new(FakeGps::default());
    let rest = Arc::new(FakeRest::new(snapshot));
    let session = SyncSession::new(
        config,
        Collaborators {
            connector: Arc::clone(&connector),
            rest: Arc::clone(&rest),
            positions: gps.clone(),
        },
    )
    .unwrap();
    Harness {
        session,
        connector,
        gps,
        rest,
    }
}

/// Let spawned tasks run to their next suspension point.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Wrap a payload into a wire frame.
pub fn frame(topic: &str, payload: serde_json::Value) -> String {
    serde_json::json!({ "topic": topic, "payload": payload }).to_string()
}
