//! Generic runtime for session orchestration.
//!
//! The Runtime drives the session event loop, coordinating between:
//! - [`SyncController`]: the Sans-IO session state machine
//! - [`Driver`]: the relay connection
//! - [`Directory`]: the REST collaborator
//! - [`SessionHandle`]: intents from the presentation layer
//!
//! Everything runs on one logical thread of control: a single
//! `tokio::select!` loop owns the controller, so nothing is locked. Timers
//! and directory requests run as tasks in a [`JoinSet`] whose results are
//! fed back into the loop, so inbound frames keep flowing while they are in
//! flight. Dials keep listening for intents, so a stop never waits for a
//! handshake.

use std::{collections::VecDeque, time::Duration};

use courier_client::{
    ClientAction, ClientEvent, Directory, Environment, SyncConfig, SyncController, SyncState,
};
use tokio::{
    sync::mpsc,
    task::{JoinError, JoinSet},
};

use crate::{
    driver::Driver,
    error::RuntimeError,
    session::{SessionCommand, SessionHandle, SessionUpdate, SessionUpdates},
};

/// Pending intents buffered between handles and the loop.
const COMMAND_CAPACITY: usize = 32;

/// One wake-up of the event loop.
enum Step {
    Command(Option<SessionCommand>),
    Task(Result<ClientEvent, JoinError>),
    Frame(Option<String>),
}

/// Generic runtime that orchestrates controller, driver and directory.
///
/// # Type Parameters
///
/// - `D`: Relay connection driver
/// - `E`: Environment for time, sleep and jitter
/// - `R`: Directory collaborator
pub struct Runtime<D, E, R>
where
    D: Driver,
    E: Environment,
    R: Directory,
{
    driver: D,
    env: E,
    directory: R,
    controller: SyncController<E>,
    commands: mpsc::Receiver<SessionCommand>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    tasks: JoinSet<ClientEvent>,
    /// Intents that arrived during a dial, served before new ones.
    deferred: VecDeque<SessionCommand>,
    /// Every handle is gone; the session winds down.
    handles_dropped: bool,
}

impl<D, E, R> Runtime<D, E, R>
where
    D: Driver,
    E: Environment,
    R: Directory,
{
    /// Create a runtime with its session handle and update stream.
    pub fn new(driver: D, env: E, directory: R, config: SyncConfig) -> (Self, SessionHandle, SessionUpdates) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (updates, update_rx) = mpsc::unbounded_channel();
        let controller = SyncController::new(env.clone(), config);

        let runtime = Self {
            driver,
            env,
            directory,
            controller,
            commands,
            updates,
            tasks: JoinSet::new(),
            deferred: VecDeque::new(),
            handles_dropped: false,
        };
        (runtime, SessionHandle::new(command_tx), update_rx)
    }

    /// Get a reference to the controller.
    pub fn controller(&self) -> &SyncController<E> {
        &self.controller
    }

    /// Run the session as `identity` until it is stopped.
    ///
    /// The loop ends after a stop request, or when every [`SessionHandle`] is
    /// dropped. Pending timers and requests are aborted on the way out.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot start (e.g. invalid identity).
    pub async fn run(mut self, identity: i64) -> Result<(), RuntimeError> {
        let actions = self.controller.handle(ClientEvent::Start { identity })?;
        self.execute(actions).await;

        loop {
            match self.next_step().await {
                Step::Command(Some(command)) => {
                    let stop = command.is_stop();
                    let result = match self.controller.handle(command.event) {
                        Ok(actions) => {
                            self.execute(actions).await;
                            Ok(())
                        },
                        Err(error) => {
                            tracing::debug!(%error, "command rejected");
                            Err(error)
                        },
                    };

                    // Requester may have given up waiting
                    let _ = command.reply.send(result);
                    if stop {
                        break;
                    }
                },
                Step::Command(None) => {
                    tracing::debug!("all session handles dropped, stopping");
                    self.dispatch(ClientEvent::Stop { clear_store: false }).await;
                    break;
                },
                Step::Task(Ok(event)) => self.dispatch(event).await,
                Step::Task(Err(error)) => {
                    if !error.is_cancelled() {
                        tracing::error!(%error, "session task failed");
                    }
                },
                Step::Frame(Some(text)) => self.dispatch(ClientEvent::FrameReceived(text)).await,
                Step::Frame(None) => {
                    self.driver.disconnect();
                    let reason = "connection closed".to_string();
                    self.dispatch(ClientEvent::TransportClosed { reason }).await;
                },
            }
        }

        self.shutdown();
        Ok(())
    }

    async fn next_step(&mut self) -> Step {
        if let Some(command) = self.deferred.pop_front() {
            return Step::Command(Some(command));
        }
        if self.handles_dropped {
            return Step::Command(None);
        }

        let connected = self.driver.is_connected() && self.controller.state() != SyncState::Stopped;
        let has_tasks = !self.tasks.is_empty();

        tokio::select! {
            biased;
            command = self.commands.recv() => Step::Command(command),
            Some(joined) = self.tasks.join_next(), if has_tasks => Step::Task(joined),
            text = self.driver.recv_text(), if connected => Step::Frame(text),
        }
    }

    /// Feed an internal event to the controller and execute the result.
    async fn dispatch(&mut self, event: ClientEvent) {
        match self.controller.handle(event) {
            Ok(actions) => self.execute(actions).await,
            Err(error) => tracing::warn!(%error, "event rejected"),
        }
    }

    /// Execute actions, including those produced by their follow-up events.
    async fn execute(&mut self, actions: Vec<ClientAction>) {
        let mut pending: VecDeque<ClientAction> = actions.into();

        while let Some(action) = pending.pop_front() {
            let Some(event) = self.execute_one(action).await else {
                continue;
            };

            match self.controller.handle(event) {
                Ok(actions) => pending.extend(actions),
                Err(error) => tracing::warn!(%error, "event rejected"),
            }
        }
    }

    /// Execute one action. Returns the follow-up event of I/O that completed
    /// inline (dials and failed sends).
    async fn execute_one(&mut self, action: ClientAction) -> Option<ClientEvent> {
        match action {
            ClientAction::Dial { url } => {
                tracing::debug!(%url, "dialing relay");
                match self.dial(&url).await? {
                    Ok(()) => Some(ClientEvent::TransportOpened),
                    Err(error) => Some(ClientEvent::TransportClosed { reason: error.to_string() }),
                }
            },
            ClientAction::Send(frame) => {
                if !self.driver.is_connected() {
                    tracing::debug!(channel_id = frame.channel_id(), "transport down, returning frame");
                    return Some(ClientEvent::SendFailed { frame, reason: "transport down".to_string() });
                }

                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(error) => {
                        tracing::error!(%error, "failed to encode frame");
                        return None;
                    },
                };

                match self.driver.send_text(text).await {
                    Ok(()) => None,
                    Err(error) => {
                        self.driver.disconnect();
                        Some(ClientEvent::SendFailed { frame, reason: error.to_string() })
                    },
                }
            },
            ClientAction::Disconnect => {
                self.driver.disconnect();
                None
            },
            ClientAction::ScheduleReconnect { delay, attempt } => {
                tracing::debug!(?delay, attempt, "reconnect scheduled");
                self.spawn_timer(delay, ClientEvent::ReconnectTimerFired { attempt });
                None
            },
            ClientAction::ScheduleDirectoryRetry { delay, request } => {
                self.spawn_timer(delay, ClientEvent::DirectoryRetryFired { request });
                None
            },
            ClientAction::ScheduleHistoryRetry { channel_id, delay, request } => {
                self.spawn_timer(delay, ClientEvent::HistoryRetryFired { channel_id, request });
                None
            },
            ClientAction::FetchChannels { user_id, request } => {
                let directory = self.directory.clone();
                self.tasks.spawn(async move {
                    let result = directory.fetch_channels(user_id).await;
                    ClientEvent::ChannelsFetched { request, result }
                });
                None
            },
            ClientAction::FetchHistory { channel_id, request } => {
                let directory = self.directory.clone();
                self.tasks.spawn(async move {
                    let result = directory.fetch_messages(channel_id).await;
                    ClientEvent::HistoryFetched { channel_id, request, result }
                });
                None
            },
            ClientAction::CreateChannel(request) => {
                let directory = self.directory.clone();
                self.tasks.spawn(async move {
                    let result = directory.create_channel(request).await;
                    ClientEvent::ChannelCreated { result }
                });
                None
            },
            ClientAction::AddMember { channel_id, user_id } => {
                let directory = self.directory.clone();
                self.tasks.spawn(async move {
                    let result = directory.add_member(channel_id, user_id).await;
                    ClientEvent::MemberAdded { channel_id, user_id, result }
                });
                None
            },
            ClientAction::ConnectionChanged(state) => {
                self.publish(SessionUpdate::Connection(state));
                None
            },
            ClientAction::SyncChanged(state) => {
                self.publish(SessionUpdate::Sync(state));
                None
            },
            ClientAction::ChannelsUpdated => {
                self.publish(SessionUpdate::Channels(self.controller.channels().to_vec()));
                None
            },
            ClientAction::MessagesUpdated { channel_id } => {
                let messages = self.controller.view(channel_id).to_vec();
                self.publish(SessionUpdate::Messages { channel_id, messages });
                None
            },
            ClientAction::ChannelCreated { channel_id } => {
                self.publish(SessionUpdate::ChannelCreated { channel_id });
                None
            },
            ClientAction::MemberAdded { channel_id, user_id } => {
                self.publish(SessionUpdate::MemberAdded { channel_id, user_id });
                None
            },
            ClientAction::MessageDropped { channel_id, error } => {
                self.publish(SessionUpdate::MessageDropped { channel_id, error });
                None
            },
            ClientAction::RequestFailed { operation, error } => {
                self.publish(SessionUpdate::RequestFailed { operation, error });
                None
            },
            ClientAction::SyncUnavailable { error } => {
                self.publish(SessionUpdate::SyncUnavailable { error });
                None
            },
        }
    }

    /// Dial the relay while still accepting intents.
    ///
    /// Intents arriving mid-dial are held for the loop. A stop, or every
    /// handle going away, abandons the dial: it returns `None` and the
    /// handshake result is never observed.
    async fn dial(&mut self, url: &str) -> Option<Result<(), D::Error>> {
        if self.handles_dropped || self.deferred.iter().any(SessionCommand::is_stop) {
            return None;
        }

        let dial = self.driver.connect(url);
        tokio::pin!(dial);

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => {
                        let stop = command.is_stop();
                        self.deferred.push_back(command);
                        if stop {
                            tracing::debug!("stop requested, abandoning dial");
                            return None;
                        }
                    },
                    None => {
                        self.handles_dropped = true;
                        return None;
                    },
                },
                result = &mut dial => return Some(result),
            }
        }
    }

    fn spawn_timer(&mut self, delay: Duration, event: ClientEvent) {
        let env = self.env.clone();
        self.tasks.spawn(async move {
            env.sleep(delay).await;
            event
        });
    }

    fn publish(&self, update: SessionUpdate) {
        if self.updates.send(update).is_err() {
            tracing::trace!("no update listener");
        }
    }

    fn shutdown(&mut self) {
        let aborted = self.tasks.len();
        self.tasks.abort_all();
        self.driver.disconnect();
        tracing::debug!(aborted, "session runtime stopped");
    }
}
