//! Sync controller state machine.
//!
//! The `SyncController` is the top-level state machine of a session. It owns
//! the transport [`Connection`], the [`SubscriptionRegistry`] and the
//! [`MessageStore`], and orchestrates them: on every transition into Open it
//! replays the desired subscriptions, pulls the channel list from the
//! directory, and routes inbound frames into the store.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use courier_core::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, Message, env::Environment,
};
use courier_proto::{
    Channel, ChannelId, InboundFrame, OutboundFrame, UserId,
    rest::{CreateChannelRequest, HistoryRecord},
};

use crate::{
    error::{ClientError, RequestFailed},
    event::{ClientAction, ClientEvent, RequestId, SyncState},
    store::{MessageStore, StoreConfig},
    subscription::SubscriptionRegistry,
};

/// Default number of attempts for a directory request before giving up.
pub const DEFAULT_REQUEST_ATTEMPTS: u32 = 5;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Transport settings; its backoff policy also paces directory retries
    pub connection: ConnectionConfig,
    /// Message store settings
    pub store: StoreConfig,
    /// Attempts per directory request (at least one)
    pub request_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            store: StoreConfig::default(),
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
        }
    }
}

/// A directory request the controller is waiting on.
#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    /// Identity of the current attempt or armed retry timer
    request: RequestId,
    /// Failed attempts so far
    failures: u32,
}

/// Channel synchronization controller.
///
/// Pure state machine: feed it [`ClientEvent`]s, execute the returned
/// [`ClientAction`]s. Time and jitter come from the [`Environment`].
///
/// # Invariants
///
/// - The desired set is replayed exactly once per transition into Open
/// - Results for requests the controller stopped waiting for are dropped
/// - Nothing is emitted for transport or directory events after Stopped
pub struct SyncController<E: Environment> {
    /// Environment for jitter entropy and time.
    env: E,

    /// Session configuration.
    config: SyncConfig,

    /// Controller state.
    state: SyncState,

    /// Transport state machine. Sole owner of the connection lifecycle.
    connection: Connection,

    /// Channels that should receive live messages.
    registry: SubscriptionRegistry,

    /// Per-channel message views.
    store: MessageStore,

    /// Channel list from the last successful directory fetch.
    channels: Vec<Channel>,

    /// Last request id handed out.
    last_request: RequestId,

    /// Outstanding channel list fetch.
    channel_fetch: Option<PendingRequest>,

    /// Outstanding history fetches per channel.
    history_fetches: HashMap<ChannelId, PendingRequest>,

    /// Channels whose history was merged this session.
    history_loaded: HashSet<ChannelId>,

    /// When the connection was lost, for downtime reporting.
    lost_at: Option<E::Instant>,
}

impl<E: Environment> SyncController<E> {
    /// Create an idle controller.
    pub fn new(env: E, config: SyncConfig) -> Self {
        let connection = Connection::new(config.connection.clone());
        let store = MessageStore::new(config.store);

        Self {
            env,
            config,
            state: SyncState::Idle,
            connection,
            registry: SubscriptionRegistry::new(),
            store,
            channels: Vec::new(),
            last_request: 0,
            channel_fetch: None,
            history_fetches: HashMap::new(),
            history_loaded: HashSet::new(),
            lost_at: None,
        }
    }

    /// Current controller state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Current transport state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Session user. `None` before `Start`.
    pub fn identity(&self) -> Option<UserId> {
        self.connection.identity()
    }

    /// Desired subscriptions.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Message views.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Ordered messages of `channel_id`.
    pub fn view(&self, channel_id: ChannelId) -> &[Message] {
        self.store.view(channel_id)
    }

    /// Channel list from the last successful directory fetch.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Process an event and return resulting actions.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::Start { identity } => self.handle_start(identity),
            ClientEvent::TransportOpened => Ok(self.handle_transport_opened()),
            ClientEvent::TransportClosed { reason } => Ok(self.handle_transport_closed(&reason)),
            ClientEvent::SendFailed { frame, reason } => Ok(self.handle_send_failed(frame, &reason)),
            ClientEvent::FrameReceived(text) => Ok(self.handle_frame(&text)),
            ClientEvent::ReconnectTimerFired { attempt } => Ok(self.handle_reconnect_timer(attempt)),
            ClientEvent::ChannelsFetched { request, result } => {
                Ok(self.handle_channels_fetched(request, result))
            },
            ClientEvent::DirectoryRetryFired { request } => Ok(self.handle_directory_retry(request)),
            ClientEvent::HistoryFetched { channel_id, request, result } => {
                Ok(self.handle_history_fetched(channel_id, request, result))
            },
            ClientEvent::HistoryRetryFired { channel_id, request } => {
                Ok(self.handle_history_retry(channel_id, request))
            },
            ClientEvent::ChannelCreated { result } => Ok(self.handle_channel_created(result)),
            ClientEvent::MemberAdded { channel_id, user_id, result } => {
                Ok(self.handle_member_added(channel_id, user_id, result))
            },
            ClientEvent::OpenChannel { channel_id } => self.handle_open_channel(channel_id),
            ClientEvent::CloseChannel { channel_id } => self.handle_close_channel(channel_id),
            ClientEvent::SendMessage { channel_id, text } => self.handle_send_message(channel_id, text),
            ClientEvent::CreateChannel(request) => self.handle_create_channel(request),
            ClientEvent::AddMember { channel_id, user_id } => self.handle_add_member(channel_id, user_id),
            ClientEvent::Stop { clear_store } => Ok(self.handle_stop(clear_store)),
        }
    }

    fn handle_start(&mut self, identity: i64) -> Result<Vec<ClientAction>, ClientError> {
        if self.state != SyncState::Idle {
            return Err(ClientError::InvalidState { state: self.state, operation: "start" });
        }

        let connection_actions = self.connection.connect(identity)?;

        let mut actions = Vec::new();
        self.transition(SyncState::Starting, &mut actions);
        extend_connection(&mut actions, connection_actions);

        tracing::info!(identity, "session starting");
        Ok(actions)
    }

    fn handle_transport_opened(&mut self) -> Vec<ClientAction> {
        if !self.state.is_running() {
            tracing::debug!(state = ?self.state, "ignoring transport open");
            return Vec::new();
        }

        let connection_actions = match self.connection.handle_open() {
            Ok(actions) => actions,
            Err(error) => {
                tracing::warn!(%error, "ignoring transport open");
                return Vec::new();
            },
        };

        let mut actions = Vec::new();
        extend_connection(&mut actions, connection_actions);

        if let Some(lost_at) = self.lost_at.take() {
            let downtime = self.env.now() - lost_at;
            tracing::info!(?downtime, "connection restored");
        }

        // Once per Open, before any channel fetched below is subscribed
        for frame in self.registry.resubscribe_all() {
            self.send_frame(frame, &mut actions);
        }

        self.transition(SyncState::Syncing, &mut actions);
        self.start_channel_fetch(&mut actions);
        actions
    }

    fn handle_transport_closed(&mut self, reason: &str) -> Vec<ClientAction> {
        if !self.state.is_running() {
            tracing::debug!(state = ?self.state, %reason, "ignoring transport close");
            return Vec::new();
        }

        let entropy = self.env.random_u64();
        let mut actions = Vec::new();
        extend_connection(&mut actions, self.connection.handle_closed(reason, entropy));

        if let Some(pending) = self.channel_fetch.take() {
            tracing::debug!(request = pending.request, "abandoning channel list fetch");
        }

        if matches!(self.state, SyncState::Syncing | SyncState::Active) {
            self.lost_at = Some(self.env.now());
            self.transition(SyncState::Recovering, &mut actions);
        }
        actions
    }

    fn handle_send_failed(&mut self, frame: OutboundFrame, reason: &str) -> Vec<ClientAction> {
        if !self.state.is_running() {
            tracing::debug!(state = ?self.state, "dropping unsent frame");
            return Vec::new();
        }

        // Later frames of the same batch fail after the loss was recorded
        let mut actions =
            if self.connection.is_open() { self.handle_transport_closed(reason) } else { Vec::new() };

        if let OutboundFrame::Message { channel_id, .. } = &frame {
            let channel_id = *channel_id;
            match self.connection.send(frame) {
                Ok(connection_actions) => extend_connection(&mut actions, connection_actions),
                Err(error) => {
                    tracing::warn!(channel_id, %error, "unsent message dropped");
                    actions.push(ClientAction::MessageDropped { channel_id, error });
                },
            }
        }
        actions
    }

    fn handle_reconnect_timer(&mut self, attempt: u32) -> Vec<ClientAction> {
        if !self.state.is_running() {
            return Vec::new();
        }

        self.connection.handle_reconnect_timer(attempt).into_iter().map(ClientAction::from).collect()
    }

    fn handle_frame(&mut self, text: &str) -> Vec<ClientAction> {
        if !self.state.is_running() {
            tracing::debug!(state = ?self.state, "dropping frame");
            return Vec::new();
        }

        let Some(frame) = self.connection.handle_text(text) else {
            return Vec::new();
        };

        match frame {
            InboundFrame::Message(event) => {
                let channel_id = event.channel_id;
                if !self.registry.is_desired(channel_id) {
                    tracing::debug!(channel_id, "ignoring message for unsubscribed channel");
                    return Vec::new();
                }

                if self.store.append_live(Message::live(event)) {
                    vec![ClientAction::MessagesUpdated { channel_id }]
                } else {
                    Vec::new()
                }
            },
            InboundFrame::Unknown { kind } => {
                tracing::debug!(%kind, "ignoring unknown frame type");
                Vec::new()
            },
        }
    }

    fn handle_channels_fetched(
        &mut self,
        request: RequestId,
        result: Result<Vec<Channel>, RequestFailed>,
    ) -> Vec<ClientAction> {
        let Some(pending) =
            self.channel_fetch.as_mut().filter(|p| p.request == request && self.state.is_running())
        else {
            tracing::debug!(request, "dropping stale channel list");
            return Vec::new();
        };

        let mut actions = Vec::new();
        match result {
            Ok(channels) => {
                self.channel_fetch = None;

                let open = self.connection.is_open();
                for channel in &channels {
                    if let Some(frame) = self.registry.subscribe_listed(channel.id, open) {
                        self.send_frame(frame, &mut actions);
                    }
                }

                tracing::debug!(count = channels.len(), "channel list applied");
                self.channels = channels;
                actions.push(ClientAction::ChannelsUpdated);

                if self.state == SyncState::Syncing {
                    self.transition(SyncState::Active, &mut actions);
                }
            },
            Err(error) => {
                pending.failures += 1;
                let failures = pending.failures;

                if failures < self.config.request_attempts {
                    let delay = self.retry_delay(failures);
                    tracing::warn!(%error, failures, ?delay, "channel list fetch failed, retrying");
                    actions.push(ClientAction::ScheduleDirectoryRetry { delay, request });
                    return actions;
                }

                self.channel_fetch = None;
                if matches!(self.state, SyncState::Starting | SyncState::Syncing) {
                    tracing::error!(%error, failures, "channel list unavailable");
                    actions.push(ClientAction::SyncUnavailable { error });
                    self.transition(SyncState::Stopped, &mut actions);
                } else {
                    tracing::warn!(%error, failures, "channel list refresh failed");
                    actions.push(ClientAction::RequestFailed { operation: "fetch_channels", error });
                }
            },
        }
        actions
    }

    fn handle_directory_retry(&mut self, request: RequestId) -> Vec<ClientAction> {
        let next = self.last_request + 1;
        let (Some(pending), Some(user_id)) = (
            self.channel_fetch.as_mut().filter(|p| p.request == request && self.state.is_running()),
            self.connection.identity(),
        ) else {
            return Vec::new();
        };

        self.last_request = next;
        pending.request = next;
        vec![ClientAction::FetchChannels { user_id, request: next }]
    }

    fn handle_history_fetched(
        &mut self,
        channel_id: ChannelId,
        request: RequestId,
        result: Result<Vec<HistoryRecord>, RequestFailed>,
    ) -> Vec<ClientAction> {
        let Some(pending) = self
            .history_fetches
            .get_mut(&channel_id)
            .filter(|p| p.request == request && self.state.is_running())
        else {
            tracing::debug!(channel_id, request, "dropping stale history");
            return Vec::new();
        };

        match result {
            Ok(records) => {
                self.history_fetches.remove(&channel_id);
                self.history_loaded.insert(channel_id);

                let messages = records.into_iter().map(Message::history).collect();
                let outcome = self.store.merge_history(channel_id, messages);

                if outcome.inserted > 0 {
                    vec![ClientAction::MessagesUpdated { channel_id }]
                } else {
                    Vec::new()
                }
            },
            Err(error) => {
                pending.failures += 1;
                let failures = pending.failures;

                if failures < self.config.request_attempts {
                    let delay = self.retry_delay(failures);
                    tracing::warn!(channel_id, %error, failures, ?delay, "history fetch failed, retrying");
                    return vec![ClientAction::ScheduleHistoryRetry { channel_id, delay, request }];
                }

                self.history_fetches.remove(&channel_id);
                tracing::warn!(channel_id, %error, failures, "history unavailable");
                vec![ClientAction::RequestFailed { operation: "fetch_messages", error }]
            },
        }
    }

    fn handle_history_retry(&mut self, channel_id: ChannelId, request: RequestId) -> Vec<ClientAction> {
        let next = self.last_request + 1;
        let Some(pending) = self
            .history_fetches
            .get_mut(&channel_id)
            .filter(|p| p.request == request && self.state.is_running())
        else {
            return Vec::new();
        };

        self.last_request = next;
        pending.request = next;
        vec![ClientAction::FetchHistory { channel_id, request: next }]
    }

    fn handle_channel_created(&mut self, result: Result<ChannelId, RequestFailed>) -> Vec<ClientAction> {
        if !self.state.is_running() {
            return Vec::new();
        }

        match result {
            Ok(channel_id) => {
                tracing::info!(channel_id, "channel created");
                let mut actions = vec![ClientAction::ChannelCreated { channel_id }];
                self.open_channel(channel_id, &mut actions);

                if self.state == SyncState::Active && self.channel_fetch.is_none() {
                    self.start_channel_fetch(&mut actions);
                }
                actions
            },
            Err(error) => {
                tracing::warn!(%error, "channel creation failed");
                vec![ClientAction::RequestFailed { operation: "create_channel", error }]
            },
        }
    }

    fn handle_member_added(
        &mut self,
        channel_id: ChannelId,
        user_id: UserId,
        result: Result<(), RequestFailed>,
    ) -> Vec<ClientAction> {
        if !self.state.is_running() {
            return Vec::new();
        }

        match result {
            Ok(()) => vec![ClientAction::MemberAdded { channel_id, user_id }],
            Err(error) => {
                tracing::warn!(channel_id, user_id, %error, "adding member failed");
                vec![ClientAction::RequestFailed { operation: "add_member", error }]
            },
        }
    }

    fn handle_open_channel(&mut self, channel_id: ChannelId) -> Result<Vec<ClientAction>, ClientError> {
        self.require_running("open channel")?;

        let mut actions = Vec::new();
        self.open_channel(channel_id, &mut actions);
        Ok(actions)
    }

    fn handle_close_channel(&mut self, channel_id: ChannelId) -> Result<Vec<ClientAction>, ClientError> {
        self.require_running("close channel")?;

        let mut actions = Vec::new();
        if let Some(frame) = self.registry.unsubscribe(channel_id, self.connection.is_open()) {
            self.send_frame(frame, &mut actions);
        }
        Ok(actions)
    }

    fn handle_send_message(
        &mut self,
        channel_id: ChannelId,
        text: String,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if self.state == SyncState::Stopped {
            return Err(ClientError::InvalidState { state: self.state, operation: "send message" });
        }

        let connection_actions = self.connection.send(OutboundFrame::Message { channel_id, text })?;
        Ok(connection_actions.into_iter().map(ClientAction::from).collect())
    }

    fn handle_create_channel(
        &mut self,
        request: CreateChannelRequest,
    ) -> Result<Vec<ClientAction>, ClientError> {
        self.require_running("create channel")?;
        let Some(user_id) = self.connection.identity() else {
            return Err(ClientError::InvalidState { state: self.state, operation: "create channel" });
        };

        let request = request.including(user_id);
        request.validate()?;

        Ok(vec![ClientAction::CreateChannel(request)])
    }

    fn handle_add_member(
        &mut self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> Result<Vec<ClientAction>, ClientError> {
        self.require_running("add member")?;
        Ok(vec![ClientAction::AddMember { channel_id, user_id }])
    }

    fn handle_stop(&mut self, clear_store: bool) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        extend_connection(&mut actions, self.connection.close());

        self.channel_fetch = None;
        self.history_fetches.clear();
        self.lost_at = None;

        if clear_store {
            self.store.clear(None);
            self.history_loaded.clear();
        }

        tracing::info!(clear_store, "session stopped");
        self.transition(SyncState::Stopped, &mut actions);
        actions
    }

    /// Subscribe and load history once per session.
    fn open_channel(&mut self, channel_id: ChannelId, actions: &mut Vec<ClientAction>) {
        if let Some(frame) = self.registry.subscribe(channel_id, self.connection.is_open()) {
            self.send_frame(frame, actions);
        }

        if self.history_loaded.contains(&channel_id) || self.history_fetches.contains_key(&channel_id) {
            return;
        }

        let request = self.next_request();
        self.history_fetches.insert(channel_id, PendingRequest { request, failures: 0 });
        actions.push(ClientAction::FetchHistory { channel_id, request });
    }

    fn start_channel_fetch(&mut self, actions: &mut Vec<ClientAction>) {
        let Some(user_id) = self.connection.identity() else {
            return;
        };

        let request = self.next_request();
        self.channel_fetch = Some(PendingRequest { request, failures: 0 });
        actions.push(ClientAction::FetchChannels { user_id, request });
    }

    fn send_frame(&mut self, frame: OutboundFrame, actions: &mut Vec<ClientAction>) {
        match self.connection.send(frame) {
            Ok(connection_actions) => extend_connection(actions, connection_actions),
            Err(error) => tracing::warn!(%error, "dropping control frame"),
        }
    }

    fn next_request(&mut self) -> RequestId {
        self.last_request += 1;
        self.last_request
    }

    fn retry_delay(&self, failures: u32) -> Duration {
        self.config.connection.backoff.delay(failures.saturating_sub(1), self.env.random_u64())
    }

    fn require_running(&self, operation: &'static str) -> Result<(), ClientError> {
        if self.state.is_running() {
            Ok(())
        } else {
            Err(ClientError::InvalidState { state: self.state, operation })
        }
    }

    fn transition(&mut self, to: SyncState, actions: &mut Vec<ClientAction>) {
        if self.state == to {
            return;
        }

        tracing::debug!(from = ?self.state, ?to, "sync state change");
        self.state = to;
        actions.push(ClientAction::SyncChanged(to));
    }
}

fn extend_connection(actions: &mut Vec<ClientAction>, connection_actions: Vec<ConnectionAction>) {
    actions.extend(connection_actions.into_iter().map(ClientAction::from));
}
