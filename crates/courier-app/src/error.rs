//! Runtime and session handle errors.

use courier_client::ClientError;
use thiserror::Error;

/// Errors that end [`Runtime::run`](crate::Runtime::run).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The session could not start (e.g. invalid identity).
    #[error("session failed to start: {0}")]
    Start(#[from] ClientError),
}

/// Errors returned by [`SessionHandle`](crate::SessionHandle) requests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The controller rejected the request.
    #[error(transparent)]
    Rejected(#[from] ClientError),

    /// The runtime is no longer running.
    #[error("session closed")]
    Closed,
}
