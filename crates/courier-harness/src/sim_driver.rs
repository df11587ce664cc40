//! Scripted relay and the driver that connects to it.
//!
//! [`SimRelay`] stands in for the WebSocket relay. Tests hold the relay to
//! push frames, cut connections and refuse dials, while the runtime owns a
//! [`SimDriver`] attached to it. Every frame the client sends is decoded and
//! recorded per connection, so tests can assert on exactly what reached the
//! wire after each reconnect.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Duration, TimeZone, Utc};
use courier_app::Driver;
use courier_proto::{ChannelId, InboundFrame, MessageEvent, OutboundFrame, UserId};
use tokio::sync::mpsc;

/// Error type for the simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// One accepted connection as the relay sees it.
#[derive(Debug, Default)]
struct RelayConnection {
    user_id: UserId,
    received: Vec<OutboundFrame>,
    subscriptions: BTreeSet<ChannelId>,
}

/// Shared relay state.
#[derive(Default)]
struct RelayState {
    connections: Vec<RelayConnection>,
    urls: Vec<String>,
    /// Sender half of the live connection's inbound stream.
    inbound: Option<mpsc::UnboundedSender<String>>,
    refuse_dials: u32,
    /// Dials never complete while set.
    stall_dials: bool,
    echo: bool,
    clock: i64,
}

impl RelayState {
    fn live(&mut self) -> Option<&mut RelayConnection> {
        if self.inbound.is_some() { self.connections.last_mut() } else { None }
    }

    fn push(&mut self, event: MessageEvent) -> bool {
        let Ok(text) = InboundFrame::Message(event).encode() else {
            return false;
        };
        self.inbound.as_ref().is_some_and(|tx| tx.send(text).is_ok())
    }

    /// Relay-side handling of a client frame.
    fn accept(&mut self, frame: OutboundFrame) {
        let echo = self.echo;
        let Some(connection) = self.live() else {
            return;
        };
        connection.received.push(frame.clone());

        match frame {
            OutboundFrame::Subscribe { channel_id } => {
                connection.subscriptions.insert(channel_id);
            },
            OutboundFrame::Unsubscribe { channel_id } => {
                connection.subscriptions.remove(&channel_id);
            },
            OutboundFrame::Message { channel_id, text } => {
                if echo && connection.subscriptions.contains(&channel_id) {
                    let sender_id = connection.user_id;
                    self.clock += 1;
                    let created_at = relay_epoch() + Duration::seconds(self.clock);
                    self.push(MessageEvent { channel_id, sender_id, content: text, created_at });
                }
            },
        }
    }
}

/// First timestamp the relay stamps on echoed messages.
pub fn relay_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_557_600, 0).single().unwrap_or_default()
}

fn user_from_url(url: &str) -> UserId {
    url.rsplit_once("user_id=").and_then(|(_, id)| id.parse().ok()).unwrap_or_default()
}

/// Scripted relay shared between a test and its [`SimDriver`].
#[derive(Clone, Default)]
pub struct SimRelay {
    state: Arc<Mutex<RelayState>>,
}

impl SimRelay {
    /// Relay that accepts every dial and does not echo.
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcast posted messages back to the poster's subscribed connection,
    /// the way the real relay fans out to subscribers.
    #[must_use]
    pub fn with_echo(self) -> Self {
        self.lock().echo = true;
        self
    }

    /// Driver attached to this relay.
    pub fn driver(&self) -> SimDriver {
        SimDriver { relay: self.clone(), inbound: None }
    }

    /// Refuse the next `count` dials.
    pub fn refuse_dials(&self, count: u32) {
        self.lock().refuse_dials = count;
    }

    /// Leave every following dial hanging, like an unresponsive host.
    pub fn stall_dials(&self, stall: bool) {
        self.lock().stall_dials = stall;
    }

    /// Push a live message to the current connection.
    ///
    /// Returns `false` when no connection is up.
    pub fn push(&self, event: MessageEvent) -> bool {
        self.lock().push(event)
    }

    /// Push raw text to the current connection, e.g. a malformed frame.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.lock().inbound.as_ref().is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    /// Cut the current connection from the relay side.
    ///
    /// Returns `false` when no connection was up.
    pub fn drop_connection(&self) -> bool {
        self.lock().inbound.take().is_some()
    }

    /// Whether a connection is up.
    pub fn is_connected(&self) -> bool {
        self.lock().inbound.is_some()
    }

    /// Connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Every URL dialed, refused ones included.
    pub fn dialed_urls(&self) -> Vec<String> {
        self.lock().urls.clone()
    }

    /// Frames received on the `index`-th accepted connection.
    pub fn frames(&self, index: usize) -> Vec<OutboundFrame> {
        self.lock().connections.get(index).map(|c| c.received.clone()).unwrap_or_default()
    }

    /// Channels subscribed on the `index`-th accepted connection.
    pub fn subscriptions(&self, index: usize) -> Vec<ChannelId> {
        self.lock()
            .connections
            .get(index)
            .map(|c| c.subscriptions.iter().copied().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Simulation driver for deterministic testing.
///
/// Implements [`Driver`] so the same [`courier_app::Runtime`] orchestration
/// code runs against the real WebSocket and in simulation tests.
pub struct SimDriver {
    relay: SimRelay,
    inbound: Option<mpsc::UnboundedReceiver<String>>,
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    async fn connect(&mut self, url: &str) -> Result<(), Self::Error> {
        let stalled = {
            let mut state = self.relay.lock();
            state.urls.push(url.to_string());
            state.stall_dials
        };
        if stalled {
            return std::future::pending().await;
        }

        let mut state = self.relay.lock();
        if state.refuse_dials > 0 {
            state.refuse_dials -= 1;
            return Err(SimDriverError("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.inbound = Some(tx);
        state.connections.push(RelayConnection { user_id: user_from_url(url), ..Default::default() });
        drop(state);

        self.inbound = Some(rx);
        Ok(())
    }

    async fn send_text(&mut self, text: String) -> Result<(), Self::Error> {
        if self.inbound.is_none() {
            return Err(SimDriverError("not connected".to_string()));
        }

        let mut state = self.relay.lock();
        if state.inbound.is_none() {
            return Err(SimDriverError("connection reset".to_string()));
        }

        let frame: OutboundFrame =
            serde_json::from_str(&text).map_err(|e| SimDriverError(e.to_string()))?;
        state.accept(frame);
        Ok(())
    }

    async fn recv_text(&mut self) -> Option<String> {
        match self.inbound.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    fn is_connected(&self) -> bool {
        self.inbound.is_some()
    }

    fn disconnect(&mut self) {
        if self.inbound.take().is_some() {
            self.relay.lock().inbound = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(channel_id: ChannelId, content: &str) -> MessageEvent {
        MessageEvent { channel_id, sender_id: 5, content: content.into(), created_at: relay_epoch() }
    }

    #[tokio::test]
    async fn records_frames_per_connection() {
        let relay = SimRelay::new();
        let mut driver = relay.driver();

        driver.connect("ws://relay/ws?user_id=7").await.unwrap();
        driver.send_text(r#"{"type":"subscribe","channelID":1}"#.into()).await.unwrap();
        driver.disconnect();
        driver.connect("ws://relay/ws?user_id=7").await.unwrap();

        assert_eq!(relay.connection_count(), 2);
        assert_eq!(relay.frames(0), vec![OutboundFrame::Subscribe { channel_id: 1 }]);
        assert!(relay.frames(1).is_empty());
        assert_eq!(relay.subscriptions(0), vec![1]);
    }

    #[tokio::test]
    async fn refused_dial_is_recorded() {
        let relay = SimRelay::new();
        relay.refuse_dials(1);
        let mut driver = relay.driver();

        assert!(driver.connect("ws://relay/ws?user_id=7").await.is_err());
        assert!(!driver.is_connected());
        assert!(driver.connect("ws://relay/ws?user_id=7").await.is_ok());
        assert_eq!(relay.dialed_urls().len(), 2);
        assert_eq!(relay.connection_count(), 1);
    }

    #[tokio::test]
    async fn relay_drop_ends_stream() {
        let relay = SimRelay::new();
        let mut driver = relay.driver();
        driver.connect("ws://relay/ws?user_id=7").await.unwrap();

        assert!(relay.push(event(1, "hi")));
        assert!(relay.drop_connection());

        assert!(driver.recv_text().await.is_some());
        assert_eq!(driver.recv_text().await, None);
        assert!(!relay.push(event(1, "late")));
    }

    #[tokio::test]
    async fn echo_reaches_subscribers_only() {
        let relay = SimRelay::new().with_echo();
        let mut driver = relay.driver();
        driver.connect("ws://relay/ws?user_id=7").await.unwrap();

        driver.send_text(r#"{"type":"message","channelID":2,"text":"lost"}"#.into()).await.unwrap();
        driver.send_text(r#"{"type":"subscribe","channelID":1}"#.into()).await.unwrap();
        driver.send_text(r#"{"type":"message","channelID":1,"text":"hi"}"#.into()).await.unwrap();
        relay.drop_connection();

        let text = driver.recv_text().await.unwrap();
        let InboundFrame::Message(event) = InboundFrame::decode(&text).unwrap() else {
            panic!("expected message frame");
        };
        assert_eq!((event.channel_id, event.sender_id, event.content.as_str()), (1, 7, "hi"));
        assert_eq!(driver.recv_text().await, None);
    }
}
