//! Client error types.

use courier_core::ConnectionError;
use courier_proto::ProtocolError;
use thiserror::Error;

use crate::event::SyncState;

/// Errors returned when the controller rejects an event.
///
/// Network failures are not errors here: they surface as
/// [`ClientAction`](crate::ClientAction)s and are retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Rejected by the transport (bad identity, not connected, queue full).
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Message text is empty or only whitespace.
    #[error("message text is empty")]
    EmptyMessage,

    /// Channel creation request breaks the directory's rules.
    #[error("invalid channel request: {reason}")]
    InvalidChannelRequest {
        /// Which rule was broken
        reason: String,
    },

    /// Operation not valid in the current sync state.
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        /// Current sync state
        state: SyncState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::InvalidChannelRequest { reason: err.to_string() }
    }
}

/// A directory request failed (network, HTTP status, or decoding).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestFailed {
    /// Could not reach the directory.
    #[error("network error: {0}")]
    Network(String),

    /// Directory answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Response body did not match the expected shape.
    #[error("invalid response: {0}")]
    Decode(String),
}
