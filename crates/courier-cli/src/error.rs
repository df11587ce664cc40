//! CLI errors.

use courier_app::RuntimeError;
use courier_client::RequestFailed;
use thiserror::Error;

/// Errors that end the CLI.
#[derive(Error, Debug)]
pub enum CliError {
    /// Terminal I/O failed.
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The user could not be looked up or registered.
    #[error("login failed: {0}")]
    Login(#[from] RequestFailed),

    /// The directory returned an identity the relay cannot accept.
    #[error("user id {0} out of range")]
    InvalidUserId(u64),

    /// The session runtime failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The session task panicked or was cancelled.
    #[error("session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
