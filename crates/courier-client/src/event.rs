//! Controller events and actions.

use std::time::Duration;

use courier_core::{ConnectionAction, ConnectionError, ConnectionState};
use courier_proto::{
    Channel, ChannelId, OutboundFrame, UserId,
    rest::{CreateChannelRequest, HistoryRecord},
};

use crate::error::RequestFailed;

/// Identifies one outstanding directory request.
///
/// Results and retry timers carrying an id the controller no longer waits
/// for are dropped.
pub type RequestId = u64;

/// Sync controller state.
///
/// ```text
/// Idle ──start──> Starting ──open──> Syncing ──channels──> Active
///                                       ↑                     │ lost
///                                       └──open── Recovering <┘
///
/// any ──stop──> Stopped (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// Not started
    Idle,
    /// First connection attempt in progress
    Starting,
    /// Connection open, channel list being applied
    Syncing,
    /// Channel list applied, live messages flowing
    Active,
    /// Connection lost, transport reconnecting
    Recovering,
    /// Session over
    Stopped,
}

impl SyncState {
    /// Check if the session accepts intents and inbound messages.
    pub fn is_running(self) -> bool {
        !matches!(self, Self::Idle | Self::Stopped)
    }
}

/// Events the caller feeds into the controller.
///
/// The caller is responsible for:
/// - Reporting transport lifecycle (opened, closed) and inbound text frames
/// - Firing timers requested by [`ClientAction::ScheduleReconnect`] and the
///   retry actions
/// - Completing directory requests and feeding back their results
/// - Forwarding application intents (open channel, send message, etc.)
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Begin the session as `identity`.
    Start {
        /// Session user; must be positive
        identity: i64,
    },

    /// The transport finished its handshake.
    TransportOpened,

    /// The transport dropped, errored, or a dial failed.
    TransportClosed {
        /// Human-readable cause
        reason: String,
    },

    /// A frame handed out in [`ClientAction::Send`] never reached the relay.
    ///
    /// Message frames are queued again for the next open; subscriptions are
    /// replayed from the registry anyway.
    SendFailed {
        /// Frame that was not sent
        frame: OutboundFrame,
        /// Human-readable cause
        reason: String,
    },

    /// A text frame arrived from the relay.
    FrameReceived(String),

    /// A reconnect timer fired.
    ReconnectTimerFired {
        /// Attempt from the matching `ScheduleReconnect`
        attempt: u32,
    },

    /// Channel list fetch completed.
    ChannelsFetched {
        /// Request from the matching `FetchChannels`
        request: RequestId,
        /// Channels or failure
        result: Result<Vec<Channel>, RequestFailed>,
    },

    /// Channel list retry timer fired.
    DirectoryRetryFired {
        /// Request from the matching `ScheduleDirectoryRetry`
        request: RequestId,
    },

    /// History fetch completed.
    HistoryFetched {
        /// Channel the history belongs to
        channel_id: ChannelId,
        /// Request from the matching `FetchHistory`
        request: RequestId,
        /// Records or failure
        result: Result<Vec<HistoryRecord>, RequestFailed>,
    },

    /// History retry timer fired.
    HistoryRetryFired {
        /// Channel to retry
        channel_id: ChannelId,
        /// Request from the matching `ScheduleHistoryRetry`
        request: RequestId,
    },

    /// Channel creation completed.
    ChannelCreated {
        /// New channel or failure
        result: Result<ChannelId, RequestFailed>,
    },

    /// Member addition completed.
    MemberAdded {
        /// Target channel
        channel_id: ChannelId,
        /// Added user
        user_id: UserId,
        /// Outcome
        result: Result<(), RequestFailed>,
    },

    /// Application opened a channel: subscribe and load its history.
    OpenChannel {
        /// Channel to open
        channel_id: ChannelId,
    },

    /// Application closed a channel: stop live updates.
    CloseChannel {
        /// Channel to close
        channel_id: ChannelId,
    },

    /// Application wants to send a message.
    SendMessage {
        /// Target channel
        channel_id: ChannelId,
        /// Message body
        text: String,
    },

    /// Application wants to create a channel.
    CreateChannel(CreateChannelRequest),

    /// Application wants to add a member to a channel.
    AddMember {
        /// Target channel
        channel_id: ChannelId,
        /// User to add
        user_id: UserId,
    },

    /// End the session.
    Stop {
        /// Drop every stored message
        clear_store: bool,
    },
}

/// Actions the controller produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Open a connection to this URL.
    Dial {
        /// Full session URL
        url: String,
    },

    /// Transmit a frame.
    Send(OutboundFrame),

    /// Tear down the connection.
    Disconnect,

    /// After `delay`, feed back [`ClientEvent::ReconnectTimerFired`].
    ScheduleReconnect {
        /// Backoff delay
        delay: Duration,
        /// Timer identity
        attempt: u32,
    },

    /// Fetch the user's channels, then feed back
    /// [`ClientEvent::ChannelsFetched`].
    FetchChannels {
        /// Session user
        user_id: UserId,
        /// Request identity
        request: RequestId,
    },

    /// After `delay`, feed back [`ClientEvent::DirectoryRetryFired`].
    ScheduleDirectoryRetry {
        /// Backoff delay
        delay: Duration,
        /// Request identity
        request: RequestId,
    },

    /// Fetch a channel's history, then feed back
    /// [`ClientEvent::HistoryFetched`].
    FetchHistory {
        /// Channel to load
        channel_id: ChannelId,
        /// Request identity
        request: RequestId,
    },

    /// After `delay`, feed back [`ClientEvent::HistoryRetryFired`].
    ScheduleHistoryRetry {
        /// Channel to retry
        channel_id: ChannelId,
        /// Backoff delay
        delay: Duration,
        /// Request identity
        request: RequestId,
    },

    /// Create a channel, then feed back [`ClientEvent::ChannelCreated`].
    CreateChannel(CreateChannelRequest),

    /// Add a member, then feed back [`ClientEvent::MemberAdded`].
    AddMember {
        /// Target channel
        channel_id: ChannelId,
        /// User to add
        user_id: UserId,
    },

    /// Transport state changed.
    ConnectionChanged(ConnectionState),

    /// Controller state changed.
    SyncChanged(SyncState),

    /// The channel list changed.
    ChannelsUpdated,

    /// A channel's view changed.
    MessagesUpdated {
        /// Affected channel
        channel_id: ChannelId,
    },

    /// A channel was created and opened.
    ChannelCreated {
        /// New channel
        channel_id: ChannelId,
    },

    /// A member was added.
    MemberAdded {
        /// Target channel
        channel_id: ChannelId,
        /// Added user
        user_id: UserId,
    },

    /// A message that failed to reach the relay could not be queued again.
    MessageDropped {
        /// Target channel
        channel_id: ChannelId,
        /// Why it could not be queued
        error: ConnectionError,
    },

    /// A directory request gave up after retries. Not fatal.
    RequestFailed {
        /// Which request
        operation: &'static str,
        /// Last failure
        error: RequestFailed,
    },

    /// The channel list could not be loaded. The session cannot sync.
    SyncUnavailable {
        /// Last failure
        error: RequestFailed,
    },
}

impl From<ConnectionAction> for ClientAction {
    fn from(action: ConnectionAction) -> Self {
        match action {
            ConnectionAction::Dial { url } => Self::Dial { url },
            ConnectionAction::Send(frame) => Self::Send(frame),
            ConnectionAction::Disconnect => Self::Disconnect,
            ConnectionAction::ScheduleReconnect { delay, attempt } => {
                Self::ScheduleReconnect { delay, attempt }
            },
            ConnectionAction::StateChanged(state) => Self::ConnectionChanged(state),
        }
    }
}
