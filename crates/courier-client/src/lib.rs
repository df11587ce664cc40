//! Client
//!
//! Action-based synchronization client for the Courier relay. Maintains the
//! desired subscription set, the per-channel message views, and the session
//! lifecycle over one relay connection.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and Action-Based patterns as
//! [`courier_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`]) for
//! the caller to execute.
//!
//! # Components
//!
//! - [`SyncController`]: Top-level session state machine
//! - [`SubscriptionRegistry`]: Desired subscriptions, replayed on reconnect
//! - [`MessageStore`]: Ordered, deduplicated per-channel views
//! - [`Directory`]: The REST collaborator (channels, history, users)
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectedClient`]: WebSocket connection handle
//! - [`transport::connect`]: Connect to a relay
//!
//! With the `rest` feature enabled, `rest::RestDirectory` implements
//! [`Directory`] over HTTP.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod directory;
mod error;
mod event;
mod store;
mod subscription;

#[cfg(feature = "rest")]
pub mod rest;
#[cfg(feature = "transport")]
pub mod transport;

pub use client::{DEFAULT_REQUEST_ATTEMPTS, SyncConfig, SyncController};
pub use courier_core::{ConnectionState, Message, Origin, env::Environment};
pub use directory::Directory;
pub use error::{ClientError, RequestFailed};
pub use event::{ClientAction, ClientEvent, RequestId, SyncState};
pub use store::{ChannelView, MergeOutcome, MessageStore, StoreConfig, StoreViolation};
pub use subscription::SubscriptionRegistry;
