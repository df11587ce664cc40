//! WebSocket transport for the client.
//!
//! Provides [`ConnectedClient`] which handles WebSocket I/O for text frames.
//! This is a thin layer that just sends/receives frames - connection
//! lifecycle and validation remain in the Sans-IO
//! [`SyncController`](crate::SyncController).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

/// Frames buffered in each direction between the socket task and the caller.
const CHANNEL_CAPACITY: usize = 32;

/// Default bound on the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Handshake did not finish in time.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// Connection task is gone.
    #[error("connection closed")]
    Closed,
}

/// Handle to a connected relay with WebSocket transport.
///
/// Provides channels for frame transport. Text frames are sent/received via
/// the channels, and an internal task handles the WebSocket I/O. When the
/// socket closes, `from_relay` yields `None`.
pub struct ConnectedClient {
    /// Send text frames to the relay.
    pub to_relay: mpsc::Sender<String>,
    /// Receive text frames from the relay.
    pub from_relay: mpsc::Receiver<String>,
    /// Abort handle to stop the connection task.
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Queue a text frame for the relay.
    pub async fn send(&self, text: String) -> Result<(), TransportError> {
        self.to_relay.send(text).await.map_err(|_| TransportError::Closed)
    }

    /// Next text frame from the relay. `None` once the connection closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_relay.recv().await
    }

    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Connect to a relay via WebSocket.
///
/// `url` is the full session URL, e.g. `ws://localhost:8080/ws?user_id=7`.
/// Returns a [`ConnectedClient`] with channels for frame transport.
pub async fn connect(url: &str, timeout: Duration) -> Result<ConnectedClient, TransportError> {
    let (socket, _response) = tokio::time::timeout(timeout, connect_async(url))
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
        .map_err(|e| TransportError::Connection(e.to_string()))?;

    let (to_relay_tx, to_relay_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
    let (from_relay_tx, from_relay_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    let handle = tokio::spawn(run_connection(socket, to_relay_rx, from_relay_tx));

    Ok(ConnectedClient {
        to_relay: to_relay_tx,
        from_relay: from_relay_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Run the connection, bridging between channels and the socket.
///
/// Returns when either side goes away; dropping `from_relay` tells the
/// caller the connection is gone.
async fn run_connection(
    socket: RelaySocket,
    mut to_relay: mpsc::Receiver<String>,
    from_relay: mpsc::Sender<String>,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outgoing = to_relay.recv() => {
                let Some(text) = outgoing else {
                    let _ = sink.close().await;
                    break;
                };
                if let Err(e) = sink.send(Message::text(text)).await {
                    tracing::warn!(error = %e, "send failed");
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if from_relay.send(text.to_string()).await.is_err() {
                        break;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "relay closed the connection");
                    break;
                },
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(len = data.len(), "ignoring binary frame");
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {},
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "receive failed");
                    break;
                },
                None => break,
            },
        }
    }
}
