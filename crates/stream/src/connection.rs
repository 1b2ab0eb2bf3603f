//! Streaming connection manager.
//!
//! One background task owns the socket, the reconnect timer and the attempt
//! counter. Callers talk to it through a cloneable [`ConnectionHandle`].
//!
//! Lifecycle:
//! `Idle -> Connecting -> Open -> Closed|Errored -> Connecting (after delay) -> ...`
//! and back to `Idle` on [`ConnectionHandle::disconnect`].
//!
//! Each transition into `Closed`/`Errored` schedules one reconnect while the
//! attempt budget lasts. Once it is spent the manager stays down until
//! [`ConnectionHandle::connect`] is called again. At most one reconnect timer
//! exists at a time; scheduling a new one aborts the old one.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use tacsync_core::ReconnectConfig;

use crate::error::{ConnectionError, SendError};
use crate::router::TopicRouter;
use crate::transport::{Connector, TransportEvent, TransportHalves};

/// Connectivity as seen by the rest of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or disconnected on request
    Idle,
    /// Opening a transport
    Connecting,
    /// Transport open, frames flowing
    Open,
    /// Peer closed the transport
    Closed,
    /// Transport failed to open or broke
    Errored,
}

impl ConnectionState {
    /// True while a transport is open or being opened.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

enum Command {
    Connect { token: Option<String> },
    UpdateToken(String),
    Disconnect { done: oneshot::Sender<()> },
}

enum Internal {
    Opened {
        generation: u64,
        result: Result<TransportHalves, ConnectionError>,
    },
    ReconnectDue {
        generation: u64,
    },
}

type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

/// Cloneable handle to a running connection manager.
#[derive(Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    outbound: OutboundSlot,
}

impl ConnectionHandle {
    /// Open the connection, using `token` if given.
    ///
    /// Resets the reconnect budget and re-enables automatic reconnects.
    /// Ignored while a transport is already open or opening.
    pub fn connect(&self, token: Option<String>) -> Result<(), ConnectionError> {
        self.commands
            .send(Command::Connect { token })
            .map_err(|_| ConnectionError::Stopped)
    }

    /// Replace the credential used by the next (re)connect.
    pub fn update_token(&self, token: impl Into<String>) -> Result<(), ConnectionError> {
        self.commands
            .send(Command::UpdateToken(token.into()))
            .map_err(|_| ConnectionError::Stopped)
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// Idempotent. Returns once the manager has dropped the transport.
    pub async fn disconnect(&self) {
        let (done, wait) = oneshot::channel();
        if self.commands.send(Command::Disconnect { done }).is_ok() {
            let _ = wait.await;
        }
    }

    /// Send a text frame if the connection is open.
    ///
    /// No outbound queue: while the connection is down the frame is dropped.
    pub fn send(&self, text: String) -> Result<(), SendError> {
        let slot = lock_slot(&self.outbound);
        match slot.as_ref() {
            Some(tx) if self.is_open() => tx.send(text).map_err(|_| {
                warn!("Cannot send message: transport already closed");
                SendError::NotConnected
            }),
            _ => {
                warn!(state = ?self.state(), "Cannot send message: socket not connected");
                Err(SendError::NotConnected)
            }
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// True while the transport is open.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Builder/spawner for the connection task.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Spawn the connection task. It starts `Idle`; call
    /// [`ConnectionHandle::connect`] to open the stream.
    ///
    /// Must be called inside a tokio runtime. The task ends when every
    /// handle has been dropped.
    pub fn spawn<C: Connector>(
        connector: Arc<C>,
        ws_url: &str,
        reconnect: ReconnectConfig,
        router: Arc<TopicRouter>,
    ) -> Result<ConnectionHandle, ConnectionError> {
        let ws_url = Url::parse(ws_url)?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let outbound: OutboundSlot = Arc::new(Mutex::new(None));

        let actor = Actor {
            connector,
            ws_url,
            token: None,
            reconnect_delay: Duration::from_millis(reconnect.delay_ms),
            max_attempts: reconnect.max_attempts,
            router,
            state: state_tx,
            outbound: Arc::clone(&outbound),
            attempts: 0,
            should_reconnect: true,
            generation: 0,
            reconnect_timer: None,
            connect_task: None,
            inbound: None,
            internal_tx,
        };
        tokio::spawn(actor.run(commands_rx, internal_rx));

        Ok(ConnectionHandle {
            commands: commands_tx,
            state: state_rx,
            outbound,
        })
    }
}

/// Stream URL with the bearer credential as the `token` query parameter.
pub fn authenticated_url(base: &Url, token: Option<&str>) -> Url {
    let mut url = base.clone();
    if let Some(token) = token {
        url.query_pairs_mut()
            .append_pair("token", &format!("Bearer {}", token));
    }
    url
}

struct Actor<C: Connector> {
    connector: Arc<C>,
    ws_url: Url,
    token: Option<String>,
    reconnect_delay: Duration,
    max_attempts: u32,
    router: Arc<TopicRouter>,
    state: watch::Sender<ConnectionState>,
    outbound: OutboundSlot,
    attempts: u32,
    should_reconnect: bool,
    /// Bumped on every open attempt and on disconnect; stale results are dropped.
    generation: u64,
    reconnect_timer: Option<JoinHandle<()>>,
    connect_task: Option<JoinHandle<()>>,
    inbound: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl<C: Connector> Actor<C> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(event) = internal.recv() => self.on_internal(event),
                event = next_inbound(&mut self.inbound) => self.on_transport(event),
            }
        }
        self.teardown();
        debug!("Connection task stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect { token } => {
                if token.is_some() {
                    self.token = token;
                }
                self.should_reconnect = true;
                self.attempts = 0;
                let state = *self.state.borrow();
                if state.is_active() {
                    warn!(?state, "WebSocket already connected or connecting");
                    return;
                }
                self.open();
            }
            Command::UpdateToken(token) => {
                debug!("Stream credential replaced");
                self.token = Some(token);
            }
            Command::Disconnect { done } => {
                self.should_reconnect = false;
                self.teardown();
                self.set_state(ConnectionState::Idle);
                info!("Connection closed on request");
                let _ = done.send(());
            }
        }
    }

    fn on_internal(&mut self, event: Internal) {
        match event {
            Internal::Opened { generation, result } => {
                if generation != self.generation {
                    debug!(generation, "Discarding stale connection result");
                    return;
                }
                self.connect_task = None;
                match result {
                    Ok(halves) => {
                        self.attempts = 0;
                        self.cancel_reconnect();
                        *lock_slot(&self.outbound) = Some(halves.outbound);
                        self.inbound = Some(halves.inbound);
                        self.set_state(ConnectionState::Open);
                        info!("Connection to server established");
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to open connection");
                        self.on_lost(ConnectionState::Errored);
                    }
                }
            }
            Internal::ReconnectDue { generation } => {
                self.reconnect_timer = None;
                if generation != self.generation || !self.should_reconnect {
                    return;
                }
                if self.state.borrow().is_active() {
                    return;
                }
                info!(attempt = self.attempts, max = self.max_attempts, "Reconnecting");
                self.open();
            }
        }
    }

    fn on_transport(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Frame(text)) => {
                let _ = self.router.route_text(&text);
            }
            Some(TransportEvent::Closed { code, reason }) => {
                warn!(?code, %reason, "Connection closed");
                self.on_lost(ConnectionState::Closed);
            }
            Some(TransportEvent::Error(e)) => {
                error!(error = %e, "Connection error");
                self.on_lost(ConnectionState::Errored);
            }
            None => {
                warn!("Transport ended without close frame");
                self.on_lost(ConnectionState::Closed);
            }
        }
    }

    fn open(&mut self) {
        self.cancel_reconnect();
        self.drop_transport();
        self.generation += 1;
        self.set_state(ConnectionState::Connecting);

        let generation = self.generation;
        let url = authenticated_url(&self.ws_url, self.token.as_deref());
        let connector = Arc::clone(&self.connector);
        let internal = self.internal_tx.clone();
        self.connect_task = Some(tokio::spawn(async move {
            let result = connector.connect(url).await;
            let _ = internal.send(Internal::Opened { generation, result });
        }));
    }

    fn on_lost(&mut self, state: ConnectionState) {
        self.drop_transport();
        self.set_state(state);
        if self.should_reconnect {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();
        if self.attempts >= self.max_attempts {
            error!(max = self.max_attempts, "Exhausted reconnect attempts");
            return;
        }
        self.attempts += 1;
        debug!(attempt = self.attempts, delay_ms = self.reconnect_delay.as_millis() as u64, "Reconnect scheduled");

        let generation = self.generation;
        let deadline = Instant::now() + self.reconnect_delay;
        let internal = self.internal_tx.clone();
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = internal.send(Internal::ReconnectDue { generation });
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    fn drop_transport(&mut self) {
        *lock_slot(&self.outbound) = None;
        self.inbound = None;
    }

    fn teardown(&mut self) {
        self.generation += 1;
        self.cancel_reconnect();
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.drop_transport();
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!(from = ?*current, to = ?state, "Connection state changed");
                *current = state;
                true
            }
        });
    }
}

async fn next_inbound(
    inbound: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn lock_slot(slot: &OutboundSlot) -> MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Connector that fails every attempt and counts them.
    #[derive(Default)]
    struct RefusingConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: Url) -> Result<TransportHalves, ConnectionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ConnectionError::Transport("refused".into()))
        }
    }

    /// Connector that opens in-memory transports and keeps the peer side.
    #[derive(Default)]
    struct LoopbackConnector {
        urls: Mutex<Vec<Url>>,
        peers: Mutex<Vec<(mpsc::UnboundedReceiver<String>, mpsc::UnboundedSender<TransportEvent>)>>,
    }

    #[async_trait]
    impl Connector for LoopbackConnector {
        async fn connect(&self, url: Url) -> Result<TransportHalves, ConnectionError> {
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            self.urls.lock().unwrap().push(url);
            self.peers.lock().unwrap().push((out_rx, in_tx));
            Ok(TransportHalves {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
    }

    fn config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            delay_ms: 7000,
            max_attempts,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_attempts_are_bounded() {
        let connector = Arc::new(RefusingConnector::default());
        let handle = ConnectionManager::spawn(
            Arc::clone(&connector),
            "ws://127.0.0.1:8000/ws/mog",
            config(3),
            Arc::new(TopicRouter::new()),
        )
        .unwrap();

        handle.connect(Some("tok".into())).unwrap();
        settle().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);

        for expected in 2..=4 {
            tokio::time::advance(Duration::from_millis(7000)).await;
            settle().await;
            assert_eq!(connector.attempts.load(Ordering::SeqCst), expected);
        }

        // budget spent: no further automatic attempt
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(handle.state(), ConnectionState::Errored);

        // explicit connect resumes
        handle.connect(None).unwrap();
        settle().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let connector = Arc::new(RefusingConnector::default());
        let handle = ConnectionManager::spawn(
            Arc::clone(&connector),
            "ws://127.0.0.1:8000/ws/mog",
            config(5),
            Arc::new(TopicRouter::new()),
        )
        .unwrap();

        handle.connect(None).unwrap();
        settle().await;
        handle.disconnect().await;
        handle.disconnect().await;
        assert_eq!(handle.state(), ConnectionState::Idle);

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_routes_frames_and_sends() {
        let connector = Arc::new(LoopbackConnector::default());
        let router = Arc::new(TopicRouter::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        router.subscribe(crate::Topic::ReferencePointDeleted, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let handle = ConnectionManager::spawn(
            Arc::clone(&connector),
            "ws://127.0.0.1:8000/ws/mog",
            config(5),
            router,
        )
        .unwrap();

        assert!(matches!(handle.send("early".into()), Err(SendError::NotConnected)));
        let states = handle.subscribe_state();

        handle.connect(Some("abc".into())).unwrap();
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Open);
        assert_eq!(*states.borrow(), ConnectionState::Open);

        let url = connector.urls.lock().unwrap()[0].clone();
        let token = url.query_pairs().find(|(k, _)| k == "token").map(|(_, v)| v.into_owned());
        assert_eq!(token.as_deref(), Some("Bearer abc"));

        handle.send("hello".into()).unwrap();
        {
            let mut peers = connector.peers.lock().unwrap();
            let (out_rx, in_tx) = &mut peers[0];
            assert_eq!(out_rx.try_recv().unwrap(), "hello");
            in_tx
                .send(TransportEvent::Frame(r#"{"topic":"refpoint.deleted","payload":{}}"#.into()))
                .unwrap();
        }
        settle().await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_reconnects_and_resets_attempts() {
        let connector = Arc::new(LoopbackConnector::default());
        let handle = ConnectionManager::spawn(
            Arc::clone(&connector),
            "ws://127.0.0.1:8000/ws/mog",
            config(1),
            Arc::new(TopicRouter::new()),
        )
        .unwrap();

        handle.connect(None).unwrap();
        settle().await;

        for round in 1..=3 {
            {
                let peers = connector.peers.lock().unwrap();
                let (_, in_tx) = &peers[round - 1];
                in_tx
                    .send(TransportEvent::Closed {
                        code: Some(1006),
                        reason: "gone".into(),
                    })
                    .unwrap();
            }
            settle().await;
            assert_eq!(handle.state(), ConnectionState::Closed);
            assert!(matches!(handle.send("x".into()), Err(SendError::NotConnected)));

            tokio::time::advance(Duration::from_millis(7000)).await;
            settle().await;
            // one attempt allowed, but each successful open resets the budget
            assert_eq!(handle.state(), ConnectionState::Open);
            assert_eq!(connector.peers.lock().unwrap().len(), round + 1);
        }
    }

    #[test]
    fn test_authenticated_url_encodes_bearer() {
        let base = Url::parse("ws://10.0.0.5:8000/ws/mog").unwrap();
        let url = authenticated_url(&base, Some("a b"));
        assert!(url.as_str().starts_with("ws://10.0.0.5:8000/ws/mog?token="));
        assert_eq!(
            url.query_pairs().next().map(|(_, v)| v.into_owned()),
            Some("Bearer a b".to_string())
        );
        assert_eq!(authenticated_url(&base, None), base);
    }
}
