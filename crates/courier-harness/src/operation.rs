//! Operations a simulation can apply to a [`crate::SimWorld`].
//!
//! Operations mix user intents, relay behavior and scheduling decisions, so
//! one generated sequence explores interleavings of all three.

use courier_proto::ChannelId;

use crate::sim_directory::DirectoryOp;

/// One step of a simulated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// User opens a channel.
    OpenChannel(ChannelId),
    /// User closes a channel.
    CloseChannel(ChannelId),
    /// User posts a message.
    SendMessage {
        /// Target channel
        channel_id: ChannelId,
        /// Body
        text: String,
    },
    /// Relay pushes a live message.
    Push {
        /// Target channel
        channel_id: ChannelId,
        /// Author
        sender_id: u64,
        /// Seconds after the relay epoch
        second: i64,
        /// Body
        content: String,
    },
    /// Relay pushes a frame that does not parse.
    PushMalformed,
    /// Relay cuts the connection.
    DropConnection,
    /// Relay refuses the next dials.
    RefuseDials(u32),
    /// Directory fails the next calls of one operation.
    FailDirectory {
        /// Which operation
        op: DirectoryOp,
        /// How many calls
        count: u32,
    },
    /// Deliver the oldest in-flight directory response.
    DeliverDirectory,
    /// Fire the earliest pending timer.
    FireTimer,
    /// Run until nothing is in flight and no timer is pending.
    Settle,
    /// User ends the session.
    Stop {
        /// Drop stored messages
        clear_store: bool,
    },
}
