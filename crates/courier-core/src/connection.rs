//! Transport state machine.
//!
//! Owns the lifecycle of the single relay connection: dialing, the bounded
//! outbound queue, reconnection with backoff, and terminal close. Uses the
//! action pattern: methods take inputs (including entropy for jitter) and
//! return actions for the driver to execute. No I/O happens here.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect ┌────────────┐  opened   ┌──────┐
//! │ Disconnected │────────>│ Connecting │──────────>│ Open │
//! └──────────────┘         └────────────┘           └──────┘
//!                                │ lost                │ lost
//!                                ↓                     ↓
//!                          ┌──────────────┐  opened    │
//!                          │ Reconnecting │────────────┘ (back to Open)
//!                          └──────────────┘
//!
//!         close() from any state ──> Closed (terminal until connect)
//! ```
//!
//! # Invariants
//!
//! - Every state change produces exactly one [`ConnectionAction::StateChanged`],
//!   in transition order.
//! - Frames queued while not Open are sent in enqueue order, before anything
//!   sent after the transition to Open.
//! - After `close()`, no reconnect is ever scheduled or dialed.

use std::{collections::VecDeque, time::Duration};

use courier_proto::{InboundFrame, OutboundFrame, UserId};

use crate::{
    backoff::{Backoff, BackoffPolicy},
    error::ConnectionError,
};

/// Default relay endpoint (scheme, host and port; the path is appended).
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080";

/// Default number of frames held while the connection is not Open.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Actions returned by the connection state machine.
///
/// The driver executes these actions:
/// - `Dial`: open a duplex connection to the URL
/// - `Send`: serialize and transmit the frame
/// - `Disconnect`: close the underlying connection
/// - `ScheduleReconnect`: after `delay`, call
///   [`Connection::handle_reconnect_timer`] with `attempt`
/// - `StateChanged`: notify observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a connection to this URL.
    Dial {
        /// Full session URL including the identity parameter
        url: String,
    },

    /// Transmit this frame.
    Send(OutboundFrame),

    /// Tear down the underlying connection.
    Disconnect,

    /// Arm a reconnect timer.
    ScheduleReconnect {
        /// How long to wait before dialing again
        delay: Duration,
        /// Timer identity; stale timers are ignored
        attempt: u32,
    },

    /// Connection state changed.
    StateChanged(ConnectionState),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection attempted yet
    Disconnected,
    /// First dial in progress
    Connecting,
    /// Handshake complete, frames flow both ways
    Open,
    /// Connection lost, retrying with backoff
    Reconnecting,
    /// Closed by the owner; no retries
    Closed,
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Relay base URL, e.g. `ws://localhost:8080`
    pub endpoint: String,
    /// Maximum frames held while not Open
    pub queue_capacity: usize,
    /// Reconnect schedule
    pub backoff: BackoffPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl ConnectionConfig {
    /// Session URL for `identity`: `<endpoint>/ws?user_id=<identity>`.
    pub fn session_url(&self, identity: UserId) -> String {
        format!("{}/ws?user_id={identity}", self.endpoint.trim_end_matches('/'))
    }
}

/// Connection state machine
///
/// Manages the lifecycle of exactly one relay connection per session.
/// This is a pure state machine: entropy for jitter is passed in, timers and
/// sockets are the driver's job.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Current state
    state: ConnectionState,
    /// Configuration
    config: ConnectionConfig,
    /// Validated session identity. `None` until `connect`.
    identity: Option<UserId>,
    /// Frames waiting for the connection to open
    queue: VecDeque<OutboundFrame>,
    /// Reconnect schedule
    backoff: Backoff,
    /// Attempt number of the armed reconnect timer
    pending_reconnect: Option<u32>,
}

impl Connection {
    /// Create a new connection in [`ConnectionState::Disconnected`] state
    pub fn new(config: ConnectionConfig) -> Self {
        let backoff = Backoff::new(config.backoff);
        Self {
            state: ConnectionState::Disconnected,
            config,
            identity: None,
            queue: VecDeque::new(),
            backoff,
            pending_reconnect: None,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if frames are sent immediately.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Session identity. `None` before `connect`.
    pub fn identity(&self) -> Option<UserId> {
        self.identity
    }

    /// Number of frames waiting for the connection to open.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Reconnect attempts since the connection was last Open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    /// Begin connecting as `identity`.
    ///
    /// Transitions to Connecting and returns a `Dial` action. Allowed from
    /// Disconnected and from Closed (re-connecting a closed session).
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidIdentity` if `identity` is not positive
    /// - `ConnectionError::InvalidState` if a connection is already live
    pub fn connect(&mut self, identity: i64) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let identity = validate_identity(identity)?;

        if !matches!(self.state, ConnectionState::Disconnected | ConnectionState::Closed) {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "connect" });
        }

        self.identity = Some(identity);
        self.backoff.reset();
        self.pending_reconnect = None;

        let mut actions = Vec::new();
        self.transition(ConnectionState::Connecting, &mut actions);
        actions.push(ConnectionAction::Dial { url: self.config.session_url(identity) });

        Ok(actions)
    }

    /// Handshake completed.
    ///
    /// Transitions to Open and flushes the queue in enqueue order.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` unless Connecting or Reconnecting
    ///   (e.g. a dial that completes after `close()`)
    pub fn handle_open(&mut self) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Reconnecting) {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "open" });
        }

        let mut actions = Vec::new();
        self.transition(ConnectionState::Open, &mut actions);
        self.backoff.reset();
        self.pending_reconnect = None;

        actions.extend(self.queue.drain(..).map(ConnectionAction::Send));
        Ok(actions)
    }

    /// Connection dropped, errored, or a dial failed.
    ///
    /// Enters Reconnecting and schedules the next attempt. Ignored when the
    /// connection is Closed or was never started.
    pub fn handle_closed(&mut self, reason: &str, entropy: u64) -> Vec<ConnectionAction> {
        if matches!(self.state, ConnectionState::Closed | ConnectionState::Disconnected) {
            tracing::debug!(state = ?self.state, %reason, "ignoring close for inactive connection");
            return Vec::new();
        }

        let mut actions = Vec::new();
        self.transition(ConnectionState::Reconnecting, &mut actions);

        let attempt = self.backoff.attempts();
        let delay = self.backoff.next_delay(entropy);
        self.pending_reconnect = Some(attempt);

        tracing::warn!(%reason, attempt, ?delay, "connection lost, scheduling reconnect");
        actions.push(ConnectionAction::ScheduleReconnect { delay, attempt });
        actions
    }

    /// A reconnect timer fired.
    ///
    /// Returns a `Dial` action if `attempt` is the armed timer and the
    /// connection is still Reconnecting; stale timers yield nothing.
    pub fn handle_reconnect_timer(&mut self, attempt: u32) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Reconnecting || self.pending_reconnect != Some(attempt) {
            tracing::debug!(attempt, state = ?self.state, "ignoring stale reconnect timer");
            return Vec::new();
        }

        let Some(identity) = self.identity else {
            return Vec::new();
        };

        self.pending_reconnect = None;
        vec![ConnectionAction::Dial { url: self.config.session_url(identity) }]
    }

    /// Send a frame, or queue it until the connection opens.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` if Closed or never connected
    /// - `ConnectionError::QueueFull` if the queue bound is reached
    pub fn send(&mut self, frame: OutboundFrame) -> Result<Vec<ConnectionAction>, ConnectionError> {
        match self.state {
            ConnectionState::Open => Ok(vec![ConnectionAction::Send(frame)]),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                if self.queue.len() >= self.config.queue_capacity {
                    return Err(ConnectionError::QueueFull { capacity: self.config.queue_capacity });
                }
                self.queue.push_back(frame);
                Ok(Vec::new())
            },
            ConnectionState::Disconnected | ConnectionState::Closed => {
                Err(ConnectionError::NotConnected { state: self.state })
            },
        }
    }

    /// Validate one inbound text frame.
    ///
    /// Malformed frames are logged and dropped; the connection is unaffected.
    pub fn handle_text(&mut self, text: &str) -> Option<InboundFrame> {
        if self.state != ConnectionState::Open {
            tracing::debug!(state = ?self.state, "dropping frame received while not open");
            return None;
        }

        match InboundFrame::decode(text) {
            Ok(frame) => Some(frame),
            Err(error) => {
                tracing::warn!(%error, len = text.len(), "dropping malformed frame");
                None
            },
        }
    }

    /// Close the connection for good.
    ///
    /// Drops queued frames and cancels any pending reconnect. Idempotent.
    pub fn close(&mut self) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }

        let dropped = self.queue.len();
        if dropped > 0 {
            tracing::debug!(dropped, "discarding queued frames on close");
        }

        self.queue.clear();
        self.pending_reconnect = None;

        let mut actions = Vec::new();
        self.transition(ConnectionState::Closed, &mut actions);
        actions.push(ConnectionAction::Disconnect);
        actions
    }

    fn transition(&mut self, to: ConnectionState, actions: &mut Vec<ConnectionAction>) {
        if self.state == to {
            return;
        }

        tracing::debug!(from = ?self.state, ?to, "connection state change");
        self.state = to;
        actions.push(ConnectionAction::StateChanged(to));
    }
}

/// Validate a raw session identity.
///
/// # Errors
///
/// - `ConnectionError::InvalidIdentity` if `identity` is zero or negative
pub fn validate_identity(identity: i64) -> Result<UserId, ConnectionError> {
    u64::try_from(identity)
        .ok()
        .filter(|id| *id > 0)
        .ok_or(ConnectionError::InvalidIdentity(identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_connection() -> Connection {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.connect(7).unwrap();
        conn.handle_open().unwrap();
        conn
    }

    fn subscribe(channel_id: u64) -> OutboundFrame {
        OutboundFrame::Subscribe { channel_id }
    }

    #[test]
    fn connection_lifecycle() {
        let mut conn = Connection::new(ConnectionConfig::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let actions = conn.connect(7).unwrap();
        assert_eq!(actions, vec![
            ConnectionAction::StateChanged(ConnectionState::Connecting),
            ConnectionAction::Dial { url: "ws://localhost:8080/ws?user_id=7".to_string() },
        ]);

        let actions = conn.handle_open().unwrap();
        assert_eq!(actions, vec![ConnectionAction::StateChanged(ConnectionState::Open)]);
        assert_eq!(conn.identity(), Some(7));

        let actions = conn.close();
        assert_eq!(actions, vec![
            ConnectionAction::StateChanged(ConnectionState::Closed),
            ConnectionAction::Disconnect,
        ]);
    }

    #[test]
    fn connect_rejects_non_positive_identity() {
        let mut conn = Connection::new(ConnectionConfig::default());

        assert_eq!(conn.connect(0), Err(ConnectionError::InvalidIdentity(0)));
        assert_eq!(conn.connect(-3), Err(ConnectionError::InvalidIdentity(-3)));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_twice_is_invalid() {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.connect(1).unwrap();

        let result = conn.connect(1);
        assert!(matches!(result, Err(ConnectionError::InvalidState { operation: "connect", .. })));
    }

    #[test]
    fn send_while_open_is_immediate() {
        let mut conn = open_connection();
        assert_eq!(conn.send(subscribe(1)).unwrap(), vec![ConnectionAction::Send(subscribe(1))]);
    }

    #[test]
    fn queued_frames_flush_in_order_on_open() {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.connect(7).unwrap();

        for id in 1..=3 {
            assert!(conn.send(subscribe(id)).unwrap().is_empty());
        }
        assert_eq!(conn.queued(), 3);

        let actions = conn.handle_open().unwrap();
        assert_eq!(actions, vec![
            ConnectionAction::StateChanged(ConnectionState::Open),
            ConnectionAction::Send(subscribe(1)),
            ConnectionAction::Send(subscribe(2)),
            ConnectionAction::Send(subscribe(3)),
        ]);
        assert_eq!(conn.queued(), 0);
    }

    #[test]
    fn queue_is_bounded() {
        let config = ConnectionConfig { queue_capacity: 2, ..ConnectionConfig::default() };
        let mut conn = Connection::new(config);
        conn.connect(7).unwrap();

        conn.send(subscribe(1)).unwrap();
        conn.send(subscribe(2)).unwrap();
        assert_eq!(conn.send(subscribe(3)), Err(ConnectionError::QueueFull { capacity: 2 }));
    }

    #[test]
    fn send_when_closed_fails() {
        let mut conn = open_connection();
        conn.close();

        let err = conn.send(subscribe(1)).unwrap_err();
        assert_eq!(err, ConnectionError::NotConnected { state: ConnectionState::Closed });
        assert!(err.is_transient());
    }

    #[test]
    fn loss_schedules_reconnect_with_backoff() {
        let config = ConnectionConfig {
            backoff: BackoffPolicy::fixed(Duration::from_millis(500), Duration::from_secs(30)),
            ..ConnectionConfig::default()
        };
        let mut conn = Connection::new(config);
        conn.connect(7).unwrap();
        conn.handle_open().unwrap();

        let actions = conn.handle_closed("reset by peer", 0);
        assert_eq!(actions, vec![
            ConnectionAction::StateChanged(ConnectionState::Reconnecting),
            ConnectionAction::ScheduleReconnect { delay: Duration::from_millis(500), attempt: 0 },
        ]);

        // Dial fails again: no duplicate state change, longer delay
        let actions = conn.handle_reconnect_timer(0);
        assert!(matches!(actions.as_slice(), [ConnectionAction::Dial { .. }]));
        let actions = conn.handle_closed("refused", 0);
        assert_eq!(actions, vec![ConnectionAction::ScheduleReconnect {
            delay: Duration::from_secs(1),
            attempt: 1,
        }]);

        // Success resets the schedule
        conn.handle_reconnect_timer(1);
        conn.handle_open().unwrap();
        assert_eq!(conn.reconnect_attempts(), 0);
    }

    #[test]
    fn stale_reconnect_timer_ignored() {
        let mut conn = open_connection();
        conn.handle_closed("lost", 0);

        assert!(conn.handle_reconnect_timer(5).is_empty());
    }

    #[test]
    fn close_is_terminal_for_retries() {
        let mut conn = open_connection();
        conn.handle_closed("lost", 0);
        conn.close();

        assert!(conn.handle_reconnect_timer(0).is_empty());
        assert!(conn.handle_closed("lost again", 0).is_empty());
        assert!(conn.handle_open().is_err());
        assert!(conn.close().is_empty());
    }

    #[test]
    fn close_drops_queue() {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.connect(7).unwrap();
        conn.send(subscribe(1)).unwrap();

        conn.close();
        assert_eq!(conn.queued(), 0);
    }

    #[test]
    fn reconnect_after_close_is_allowed() {
        let mut conn = open_connection();
        conn.close();

        assert!(conn.connect(7).is_ok());
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn malformed_text_is_dropped() {
        let mut conn = open_connection();

        assert!(conn.handle_text(r#"{"type":"message","channelID":"x"}"#).is_none());
        assert!(conn.handle_text("{").is_none());
        assert_eq!(conn.state(), ConnectionState::Open);

        let valid = r#"{"type":"message","channelID":1,"senderID":2,"content":"ok","created_at":"2024-05-01T10:00:00Z"}"#;
        assert!(matches!(conn.handle_text(valid), Some(InboundFrame::Message(_))));
    }

    #[test]
    fn session_url_trims_trailing_slash() {
        let config =
            ConnectionConfig { endpoint: "wss://relay.example:443/".to_string(), ..Default::default() };
        assert_eq!(config.session_url(3), "wss://relay.example:443/ws?user_id=3");
    }
}
