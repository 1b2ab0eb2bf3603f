//! Explicit session object.
//!
//! A session owns one shared model, one topic router, one connection and one
//! location tracker. Nothing here is global; tests build as many isolated
//! sessions as they like.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{info, warn};

use tacsync_core::SyncConfig;
use tacsync_domain::SharedModel;
use tacsync_location::{
    LocationTracker, NoPositionProvider, OperatorProfile, PositionProvider, PresenceSink,
    ReadyStatusPublisher, StaticPositionProvider,
};
use tacsync_rest::{Credentials, RestClient, SnapshotLoader, SnapshotSource, TaskApi, TaskCommands};
use tacsync_stream::{
    ConnectionHandle, ConnectionManager, ConnectionState, Connector, HandlerError, SubscriptionId,
    Topic, TopicRouter, WsConnector,
};

use crate::error::{Result, SessionError};

/// Everything a session talks to outside the process.
pub struct Collaborators<C, R> {
    /// Opens the streaming transport
    pub connector: Arc<C>,
    /// Snapshot fetch, task API and the bearer credential they share
    pub rest: Arc<R>,
    /// Device position source
    pub positions: Arc<dyn PositionProvider>,
}

#[derive(Default)]
struct Lifecycle {
    started: bool,
    subscriptions: Vec<(Topic, SubscriptionId)>,
}

pub struct SyncSession {
    config: SyncConfig,
    model: SharedModel,
    router: Arc<TopicRouter>,
    connection: ConnectionHandle,
    tracker: LocationTracker,
    ready: ReadyStatusPublisher,
    tasks: TaskCommands,
    loader: SnapshotLoader,
    credentials: Arc<dyn Credentials>,
    lifecycle: Mutex<Lifecycle>,
}

impl SyncSession {
    /// Wire a session over the given collaborators. Nothing is fetched or
    /// opened until [`SyncSession::start`].
    ///
    /// Must be called inside a tokio runtime.
    pub fn new<C, R>(config: SyncConfig, collaborators: Collaborators<C, R>) -> Result<Self>
    where
        C: Connector,
        R: SnapshotSource + TaskApi + Credentials + 'static,
    {
        config.validate()?;

        let model = SharedModel::default();
        let router = Arc::new(TopicRouter::new());
        let connection = ConnectionManager::spawn(
            collaborators.connector,
            &config.server.ws_url,
            config.reconnect.clone(),
            Arc::clone(&router),
        )?;

        let sink: Arc<dyn PresenceSink> = Arc::new(connection.clone());
        let tracker = LocationTracker::new(
            collaborators.positions,
            sink,
            OperatorProfile::from_config(&config.operator),
            Duration::from_millis(config.location.sample_interval_ms),
        );
        let ready = ReadyStatusPublisher::new(tracker.clone());

        let snapshots: Arc<dyn SnapshotSource> = collaborators.rest.clone();
        let task_api: Arc<dyn TaskApi> = collaborators.rest.clone();
        let credentials: Arc<dyn Credentials> = collaborators.rest;

        Ok(Self {
            loader: SnapshotLoader::new(snapshots, model.clone()),
            tasks: TaskCommands::new(task_api, model.clone()),
            config,
            model,
            router,
            connection,
            tracker,
            ready,
            credentials,
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// Session over a WebSocket connector and the HTTP REST client.
    ///
    /// Uses the configured fixed position when there is one; otherwise the
    /// node has no position source and tracking stays off.
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        let rest = Arc::new(RestClient::new(&config.server.api_base_url)?);
        let positions: Arc<dyn PositionProvider> = match config.location.fixed_position {
            Some(position) => Arc::new(StaticPositionProvider::new(position)?),
            None => Arc::new(NoPositionProvider),
        };
        Self::new(
            config,
            Collaborators {
                connector: Arc::new(WsConnector),
                rest,
                positions,
            },
        )
    }

    /// Authenticate, seed the model, attach the topic handlers, open the
    /// stream and start location tracking, in that order.
    ///
    /// Handlers are attached only after the snapshot is in place so no delta
    /// lands on an empty model. A failed snapshot load aborts the start and
    /// leaves the connection closed.
    pub async fn start(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        {
            let mut lifecycle = self.lock();
            if lifecycle.started {
                return Err(SessionError::AlreadyStarted);
            }
            lifecycle.started = true;
        }

        self.credentials.set_token(&token);
        if let Err(e) = self.loader.load().await {
            self.lock().started = false;
            return Err(e.into());
        }

        self.attach_handlers();
        self.connection.connect(Some(token))?;

        if !self.tracker.start().await {
            warn!(
                error = ?self.tracker.own_location().last_error,
                "Location tracking not started"
            );
        }
        info!(username = %self.tracker.profile().username(), "Session started");
        Ok(())
    }

    /// Replace the credential for REST calls and the next stream (re)connect.
    /// An open stream is not interrupted.
    pub fn update_token(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        self.credentials.set_token(&token);
        self.connection.update_token(token)?;
        Ok(())
    }

    /// Stop tracking, close the stream and detach handlers. Idempotent.
    pub async fn shutdown(&self) {
        self.tracker.stop();
        self.connection.disconnect().await;

        let subscriptions = {
            let mut lifecycle = self.lock();
            lifecycle.started = false;
            std::mem::take(&mut lifecycle.subscriptions)
        };
        for (topic, id) in subscriptions {
            self.router.unsubscribe(topic, id);
        }
        info!("Session shut down");
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    pub fn router(&self) -> &Arc<TopicRouter> {
        &self.router
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn tracker(&self) -> &LocationTracker {
        &self.tracker
    }

    pub fn ready(&self) -> &ReadyStatusPublisher {
        &self.ready
    }

    pub fn tasks(&self) -> &TaskCommands {
        &self.tasks
    }

    fn attach_handlers(&self) {
        let mut lifecycle = self.lock();
        if !lifecycle.subscriptions.is_empty() {
            return;
        }
        for topic in Topic::ALL {
            let model = self.model.clone();
            let id = self.router.subscribe(topic, move |event| {
                model.apply(event).map(|_| ()).map_err(HandlerError::from)
            });
            lifecycle.subscriptions.push((topic, id));
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("connection", &self.connection.state())
            .field("tracking", &self.tracker.mode())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tacsync_core::Coordinate;
    use tacsync_domain::{Snapshot, Task, TaskStatus};
    use tacsync_location::TrackingMode;
    use tacsync_rest::RestError;
    use tacsync_stream::{ConnectionError, TransportEvent, TransportHalves};
    use tokio::sync::mpsc;
    use url::Url;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Loopback {
        log: Log,
        peers: Mutex<Vec<(mpsc::UnboundedReceiver<String>, mpsc::UnboundedSender<TransportEvent>)>>,
    }

    #[async_trait]
    impl Connector for Loopback {
        async fn connect(&self, url: Url) -> std::result::Result<TransportHalves, ConnectionError> {
            self.log.lock().unwrap().push(format!("connect {}", url.query().unwrap_or("")));
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            self.peers.lock().unwrap().push((out_rx, in_tx));
            Ok(TransportHalves {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
    }

    struct FakeRest {
        log: Log,
        snapshot: Option<Snapshot>,
    }

    impl Credentials for FakeRest {
        fn set_token(&self, token: &str) {
            self.log.lock().unwrap().push(format!("token {}", token));
        }
    }

    #[async_trait]
    impl SnapshotSource for FakeRest {
        async fn fetch_snapshot(&self) -> tacsync_rest::Result<Snapshot> {
            self.log.lock().unwrap().push("snapshot".into());
            self.snapshot.clone().ok_or(RestError::Unauthorized)
        }
    }

    #[async_trait]
    impl TaskApi for FakeRest {
        async fn fetch_tasks(&self) -> tacsync_rest::Result<Vec<Task>> {
            Ok(Vec::new())
        }

        async fn update_task_status(&self, _id: &str, _status: TaskStatus) -> tacsync_rest::Result<()> {
            Ok(())
        }

        async fn delete_task(&self, _id: &str) -> tacsync_rest::Result<()> {
            Ok(())
        }
    }

    fn session(snapshot: Option<Snapshot>) -> (SyncSession, Arc<Loopback>, Log) {
        let log: Log = Arc::default();
        let connector = Arc::new(Loopback {
            log: Arc::clone(&log),
            peers: Mutex::new(Vec::new()),
        });
        let rest = Arc::new(FakeRest {
            log: Arc::clone(&log),
            snapshot,
        });
        let session = SyncSession::new(
            SyncConfig::local(),
            Collaborators {
                connector: Arc::clone(&connector),
                rest,
                positions: Arc::new(StaticPositionProvider::new(Coordinate::new(50.0, 30.0)).unwrap()),
            },
        )
        .unwrap();
        (session, connector, log)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_loads_snapshot_before_streaming() {
        let (session, connector, log) = session(Some(Snapshot::default()));
        session.start("abc").await.unwrap();
        settle().await;

        let log = log.lock().unwrap().clone();
        assert_eq!(log[0], "token abc");
        assert_eq!(log[1], "snapshot");
        assert!(log[2].starts_with("connect token=Bearer"));
        assert_eq!(session.connection_state(), ConnectionState::Open);
        assert_eq!(session.router().handler_count(Topic::AircraftUpdated), 1);
        assert_eq!(session.tracker().mode(), TrackingMode::AutoTracking);

        // the first fix raced the handshake; the next tick goes out as presence
        tokio::time::advance(Duration::from_millis(5000)).await;
        settle().await;
        let mut peers = connector.peers.lock().unwrap();
        let frame = peers[0].0.try_recv().unwrap();
        assert!(frame.contains("mog.updated"));
        session.tracker().stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_snapshot_aborts_start() {
        let (session, connector, _log) = session(None);
        let err = session.start("abc").await.unwrap_err();
        assert!(matches!(err, SessionError::Rest(RestError::Unauthorized)));
        settle().await;
        assert!(connector.peers.lock().unwrap().is_empty());
        assert_eq!(session.router().handler_count(Topic::TaskCreated), 0);
        assert_eq!(session.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_reach_model_and_shutdown_detaches() {
        let (session, connector, _log) = session(Some(Snapshot::default()));
        session.start("abc").await.unwrap();
        settle().await;

        let frame = r#"{"topic":"aircraft.updated","payload":{"aircraftId":"A9","type":"ENEMY","coordinates":{"lat":1.0,"lng":2.0}}}"#;
        connector.peers.lock().unwrap()[0]
            .1
            .send(TransportEvent::Frame(frame.to_string()))
            .unwrap();
        settle().await;
        assert!(session.model().read(|m| m.aircraft("A9").is_some()).unwrap());

        session.shutdown().await;
        session.shutdown().await;
        assert_eq!(session.router().handler_count(Topic::AircraftUpdated), 0);
        assert_eq!(session.tracker().mode(), TrackingMode::Stopped);
        assert!(!session.connection_state().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let (session, _connector, _log) = session(Some(Snapshot::default()));
        session.start("abc").await.unwrap();
        assert!(matches!(session.start("abc").await, Err(SessionError::AlreadyStarted)));
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_token_reaches_rest() {
        let (session, _connector, log) = session(Some(Snapshot::default()));
        session.update_token("fresh").unwrap();
        assert_eq!(log.lock().unwrap().as_slice(), ["token fresh"]);
    }
}
