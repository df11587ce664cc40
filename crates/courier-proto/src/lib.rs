//! Courier protocol
//!
//! Wire types shared by every layer of the Courier client: the JSON text
//! frames exchanged over the relay's duplex connection, and the payloads of
//! the REST collaborators (channel directory, message history, users).
//!
//! # Frames
//!
//! Frames are self-describing JSON objects discriminated by a `type` field.
//! Outbound frames ([`OutboundFrame`]) are produced by the client; inbound
//! frames ([`InboundFrame`]) are validated on arrival and rejected with a
//! [`ProtocolError`] when malformed. Unknown `type` values decode to
//! [`InboundFrame::Unknown`] so newer relays stay compatible with older
//! clients.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub mod errors;
pub mod frame;
pub mod rest;

pub use channel::{Channel, ChannelId, ChannelType, UserId};
pub use errors::ProtocolError;
pub use frame::{InboundFrame, MessageEvent, OutboundFrame};
