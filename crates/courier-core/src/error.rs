//! Error types for the Courier core.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors returned by the connection state machine.
///
/// Only caller mistakes and visible send failures are errors. Network
/// failures are not: they drive the machine into
/// [`ConnectionState::Reconnecting`] instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Session identity is not a positive integer.
    ///
    /// Fatal for the connect attempt; the caller must supply a valid identity.
    #[error("invalid identity {0}: must be a positive integer")]
    InvalidIdentity(i64),

    /// Connection is closed or was never opened.
    ///
    /// Transient: call `connect` again, then retry.
    #[error("not connected (state {state:?})")]
    NotConnected {
        /// State when the send was attempted
        state: ConnectionState,
    },

    /// Outbound queue is full while the connection is being (re)established.
    #[error("send queue full ({capacity} frames pending)")]
    QueueFull {
        /// Configured queue bound
        capacity: usize,
    },

    /// Operation not valid in the current state.
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

impl ConnectionError {
    /// Returns true if retrying later may succeed without caller changes.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotConnected { .. } | Self::QueueFull { .. })
    }
}
