//! Courier core
//!
//! Pure building blocks of the synchronization client:
//!
//! - [`env::Environment`]: time, sleep, and randomness behind a trait so the
//!   same logic runs against the system clock or a seeded simulation
//! - [`backoff`]: exponential backoff with jitter shared by reconnection and
//!   directory retries
//! - [`connection::Connection`]: the transport state machine (dial, queue,
//!   flush, reconnect, close) with no I/O of its own
//! - [`message`]: the stored message model and its dedupe key
//!
//! Everything here follows the action pattern: methods take inputs and return
//! actions for a driver to execute.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod backoff;
pub mod connection;
pub mod env;
pub mod error;
pub mod message;

pub use backoff::{Backoff, BackoffPolicy};
pub use connection::{Connection, ConnectionAction, ConnectionConfig, ConnectionState};
pub use error::ConnectionError;
pub use message::{DedupeKey, Message, Origin};
