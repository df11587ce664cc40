//! Presentation-facing session surface.
//!
//! The presentation layer never touches the controller or the connection.
//! It holds a [`SessionHandle`] to issue intents and drains
//! [`SessionUpdate`]s to refresh what it shows.

use courier_client::{ClientEvent, ConnectionState, Message, RequestFailed, SyncState};
use courier_core::ConnectionError;
use courier_proto::{Channel, ChannelId, UserId, rest::CreateChannelRequest};
use tokio::sync::{mpsc, oneshot};

use crate::error::SessionError;

/// Receiving side of the session's update stream.
pub type SessionUpdates = mpsc::UnboundedReceiver<SessionUpdate>;

/// Something the presentation layer may want to redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Transport state changed.
    Connection(ConnectionState),

    /// Sync state changed.
    Sync(SyncState),

    /// Current channel list.
    Channels(Vec<Channel>),

    /// Current ordered view of one channel.
    Messages {
        /// Channel the view belongs to
        channel_id: ChannelId,
        /// Snapshot of the view, oldest first
        messages: Vec<Message>,
    },

    /// A channel was created and opened.
    ChannelCreated {
        /// New channel
        channel_id: ChannelId,
    },

    /// A member was added to a channel.
    MemberAdded {
        /// Target channel
        channel_id: ChannelId,
        /// Added user
        user_id: UserId,
    },

    /// A message never reached the relay and could not be queued again.
    MessageDropped {
        /// Target channel
        channel_id: ChannelId,
        /// Why it was dropped
        error: ConnectionError,
    },

    /// A directory request gave up. The session keeps running.
    RequestFailed {
        /// Which request
        operation: &'static str,
        /// Last failure
        error: RequestFailed,
    },

    /// The channel list could not be loaded; the session should be stopped.
    SyncUnavailable {
        /// Last failure
        error: RequestFailed,
    },
}

/// An intent plus the channel its outcome is reported on.
#[derive(Debug)]
pub(crate) struct SessionCommand {
    pub(crate) event: ClientEvent,
    pub(crate) reply: oneshot::Sender<Result<(), courier_client::ClientError>>,
}

impl SessionCommand {
    pub(crate) fn is_stop(&self) -> bool {
        matches!(self.event, ClientEvent::Stop { .. })
    }
}

/// Handle for issuing intents into a running session.
///
/// Cheap to clone. Every request resolves once the runtime processed it;
/// rejections (empty text, queue full, closed session) come back as errors.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn new(commands: mpsc::Sender<SessionCommand>) -> Self {
        Self { commands }
    }

    /// Subscribe to a channel and load its history.
    pub async fn open_channel(&self, channel_id: ChannelId) -> Result<(), SessionError> {
        self.request(ClientEvent::OpenChannel { channel_id }).await
    }

    /// Stop live updates for a channel.
    pub async fn close_channel(&self, channel_id: ChannelId) -> Result<(), SessionError> {
        self.request(ClientEvent::CloseChannel { channel_id }).await
    }

    /// Send a message to a channel.
    ///
    /// Queued while the connection is re-established.
    pub async fn send_message(
        &self,
        channel_id: ChannelId,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.request(ClientEvent::SendMessage { channel_id, text: text.into() }).await
    }

    /// Create a channel. The session user is always a member.
    pub async fn create_channel(&self, request: CreateChannelRequest) -> Result<(), SessionError> {
        self.request(ClientEvent::CreateChannel(request)).await
    }

    /// Add a user to a channel.
    pub async fn add_member(&self, channel_id: ChannelId, user_id: UserId) -> Result<(), SessionError> {
        self.request(ClientEvent::AddMember { channel_id, user_id }).await
    }

    /// End the session, optionally dropping every stored message.
    pub async fn stop(&self, clear_store: bool) -> Result<(), SessionError> {
        self.request(ClientEvent::Stop { clear_store }).await
    }

    async fn request(&self, event: ClientEvent) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(SessionCommand { event, reply }).await.map_err(|_| SessionError::Closed)?;

        response.await.map_err(|_| SessionError::Closed)?.map_err(SessionError::from)
    }
}
