//! Transport seam between the connection manager and the socket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ConnectionError;

/// Something the open transport reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Inbound text frame
    Frame(String),
    /// Peer closed the connection
    Closed {
        /// Close code, when the peer sent one
        code: Option<u16>,
        /// Close reason
        reason: String,
    },
    /// Transport failed
    Error(String),
}

/// Channels of an open transport.
///
/// Dropping `outbound` closes the connection.
#[derive(Debug)]
pub struct TransportHalves {
    /// Text frames to send
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames and lifecycle events from the peer
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens streaming transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`.
    async fn connect(&self, url: Url) -> Result<TransportHalves, ConnectionError>;
}

/// WebSocket connector over tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: Url) -> Result<TransportHalves, ConnectionError> {
        debug!(host = url.host_str().unwrap_or_default(), "Opening WebSocket");
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        info!("WebSocket connection established");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = ws_sender.send(Message::Text(text)).await {
                    warn!("Error sending frame: {}", e);
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(TransportEvent::Frame(text)).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                            .unwrap_or((None, String::new()));
                        let _ = inbound_tx.send(TransportEvent::Closed { code, reason });
                        return;
                    }
                    Err(e) => {
                        let _ = inbound_tx.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                    _ => {}
                }
            }
            let _ = inbound_tx.send(TransportEvent::Closed {
                code: None,
                reason: "stream ended".to_string(),
            });
        });

        Ok(TransportHalves {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
