//! Synchronous simulation world.
//!
//! [`SimWorld`] drives a [`SyncController`] against a [`SimRelay`] and a
//! [`SimDirectory`] without an async runtime. Directory responses are held
//! in flight until delivered and timers fire in virtual time, so a test
//! decides the exact interleaving of responses, frames and reconnects. The
//! standard invariants are checked after every step.

use std::{
    collections::VecDeque,
    future::Future,
    pin::pin,
    task::{Context, Poll, Waker},
    time::Duration,
};

use courier_app::Driver;
use courier_client::{ClientAction, ClientError, ClientEvent, Directory, SyncConfig, SyncController, SyncState};
use courier_proto::MessageEvent;

use crate::{
    invariants::{InvariantRegistry, SessionSnapshot},
    operation::Operation,
    sim_directory::SimDirectory,
    sim_driver::{SimDriver, SimRelay, relay_epoch},
    sim_env::SimEnv,
};

/// Upper bound on steps taken by [`SimWorld::settle`].
const MAX_SETTLE_STEPS: usize = 1_000;

/// Poll a future once. Simulation doubles never suspend on I/O, so their
/// futures are ready on the first poll unless they wait for input.
fn resolve<F: Future>(future: F) -> Option<F::Output> {
    let mut cx = Context::from_waker(Waker::noop());
    match pin!(future).poll(&mut cx) {
        Poll::Ready(output) => Some(output),
        Poll::Pending => None,
    }
}

/// Timer armed by the controller.
#[derive(Debug)]
struct Timer {
    due: Duration,
    seq: u64,
    event: ClientEvent,
}

/// Deterministic single-session world.
pub struct SimWorld {
    controller: SyncController<SimEnv>,
    relay: SimRelay,
    driver: SimDriver,
    directory: SimDirectory,
    invariants: InvariantRegistry,
    now: Duration,
    timers: Vec<Timer>,
    next_timer: u64,
    in_flight: VecDeque<ClientEvent>,
    notifications: Vec<ClientAction>,
    sync_history: Vec<SyncState>,
}

impl SimWorld {
    /// World over `relay` and `directory` with a seeded environment.
    pub fn new(seed: u64, relay: SimRelay, directory: SimDirectory, config: SyncConfig) -> Self {
        let controller = SyncController::new(SimEnv::with_seed(seed), config);
        let driver = relay.driver();

        Self {
            controller,
            relay,
            driver,
            directory,
            invariants: InvariantRegistry::standard(),
            now: Duration::ZERO,
            timers: Vec::new(),
            next_timer: 0,
            in_flight: VecDeque::new(),
            notifications: Vec::new(),
            sync_history: vec![SyncState::Idle],
        }
    }

    /// Start the session as `identity`.
    pub fn start(&mut self, identity: i64) -> Result<(), ClientError> {
        self.apply(ClientEvent::Start { identity })
    }

    /// Feed an event and execute everything it causes synchronously.
    ///
    /// Directory responses stay in flight and timers stay armed.
    pub fn apply(&mut self, event: ClientEvent) -> Result<(), ClientError> {
        let actions = self.controller.handle(event)?;
        self.execute(actions);
        self.pump_inbound();
        self.check("after event");
        Ok(())
    }

    /// Apply one generated operation. Rejected intents are reported, not
    /// treated as failures of the simulation.
    pub fn apply_operation(&mut self, operation: Operation) -> Result<(), ClientError> {
        match operation {
            Operation::OpenChannel(channel_id) => self.apply(ClientEvent::OpenChannel { channel_id }),
            Operation::CloseChannel(channel_id) => self.apply(ClientEvent::CloseChannel { channel_id }),
            Operation::SendMessage { channel_id, text } => {
                self.apply(ClientEvent::SendMessage { channel_id, text })
            },
            Operation::Push { channel_id, sender_id, second, content } => {
                let created_at = relay_epoch() + chrono::Duration::seconds(second);
                self.relay.push(MessageEvent { channel_id, sender_id, content, created_at });
                self.pump_inbound();
                Ok(())
            },
            Operation::PushMalformed => {
                self.relay.push_text("{\"type\":");
                self.pump_inbound();
                Ok(())
            },
            Operation::DropConnection => {
                self.relay.drop_connection();
                self.pump_inbound();
                Ok(())
            },
            Operation::RefuseDials(count) => {
                self.relay.refuse_dials(count);
                Ok(())
            },
            Operation::FailDirectory { op, count } => {
                self.directory.fail_next(op, count);
                Ok(())
            },
            Operation::DeliverDirectory => {
                self.deliver_next();
                Ok(())
            },
            Operation::FireTimer => {
                self.fire_next_timer();
                Ok(())
            },
            Operation::Settle => {
                self.settle();
                Ok(())
            },
            Operation::Stop { clear_store } => self.apply(ClientEvent::Stop { clear_store }),
        }
    }

    /// Deliver the oldest in-flight directory response.
    ///
    /// Returns `false` when nothing was in flight.
    pub fn deliver_next(&mut self) -> bool {
        let Some(event) = self.in_flight.pop_front() else {
            return false;
        };
        self.dispatch(event);
        true
    }

    /// Advance virtual time to the earliest timer and fire it.
    ///
    /// Returns `false` when no timer was armed.
    pub fn fire_next_timer(&mut self) -> bool {
        let Some(index) = self
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(index, _)| index)
        else {
            return false;
        };

        let timer = self.timers.swap_remove(index);
        self.now = self.now.max(timer.due);
        self.dispatch(timer.event);
        true
    }

    /// Deliver responses and fire timers until the world is quiet.
    pub fn settle(&mut self) {
        for _ in 0..MAX_SETTLE_STEPS {
            self.pump_inbound();
            if !self.deliver_next() && !self.fire_next_timer() {
                return;
            }
        }
        tracing::warn!(steps = MAX_SETTLE_STEPS, "world did not settle");
    }

    /// The controller under test.
    pub fn controller(&self) -> &SyncController<SimEnv> {
        &self.controller
    }

    /// The scripted relay.
    pub fn relay(&self) -> &SimRelay {
        &self.relay
    }

    /// The in-memory directory.
    pub fn directory(&self) -> &SimDirectory {
        &self.directory
    }

    /// Virtual time elapsed.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Armed timers.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Directory responses waiting for delivery.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Drain notifications emitted for the presentation layer.
    pub fn take_notifications(&mut self) -> Vec<ClientAction> {
        std::mem::take(&mut self.notifications)
    }

    /// Observable state, including the sync state history.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from_controller(&self.controller).with_history(&self.sync_history)
    }

    fn check(&self, context: &str) {
        self.invariants.assert_all(&self.snapshot(), context);
    }

    fn dispatch(&mut self, event: ClientEvent) {
        match self.controller.handle(event) {
            Ok(actions) => self.execute(actions),
            Err(error) => tracing::warn!(%error, "event rejected"),
        }
        self.pump_inbound();
        self.check("after internal event");
    }

    /// Drain frames the relay already pushed, and notice a dropped
    /// connection.
    fn pump_inbound(&mut self) {
        while self.driver.is_connected() && self.controller.state() != SyncState::Stopped {
            let event = match resolve(self.driver.recv_text()) {
                Some(Some(text)) => ClientEvent::FrameReceived(text),
                Some(None) => {
                    self.driver.disconnect();
                    ClientEvent::TransportClosed { reason: "connection closed".to_string() }
                },
                None => return,
            };

            match self.controller.handle(event) {
                Ok(actions) => self.execute(actions),
                Err(error) => tracing::warn!(%error, "event rejected"),
            }
        }
    }

    fn execute(&mut self, actions: Vec<ClientAction>) {
        let mut pending: VecDeque<ClientAction> = actions.into();

        while let Some(action) = pending.pop_front() {
            let Some(event) = self.execute_one(action) else {
                continue;
            };

            match self.controller.handle(event) {
                Ok(actions) => pending.extend(actions),
                Err(error) => tracing::warn!(%error, "event rejected"),
            }
        }
    }

    fn execute_one(&mut self, action: ClientAction) -> Option<ClientEvent> {
        match action {
            ClientAction::Dial { url } => match resolve(self.driver.connect(&url)) {
                Some(Ok(())) => Some(ClientEvent::TransportOpened),
                Some(Err(error)) => Some(ClientEvent::TransportClosed { reason: error.to_string() }),
                None => None,
            },
            ClientAction::Send(frame) => {
                if !self.driver.is_connected() {
                    return Some(ClientEvent::SendFailed { frame, reason: "transport down".to_string() });
                }
                let text = frame.encode().ok()?;
                match resolve(self.driver.send_text(text)) {
                    Some(Err(error)) => {
                        self.driver.disconnect();
                        Some(ClientEvent::SendFailed { frame, reason: error.to_string() })
                    },
                    _ => None,
                }
            },
            ClientAction::Disconnect => {
                self.driver.disconnect();
                None
            },
            ClientAction::ScheduleReconnect { delay, attempt } => {
                self.arm(delay, ClientEvent::ReconnectTimerFired { attempt });
                None
            },
            ClientAction::ScheduleDirectoryRetry { delay, request } => {
                self.arm(delay, ClientEvent::DirectoryRetryFired { request });
                None
            },
            ClientAction::ScheduleHistoryRetry { channel_id, delay, request } => {
                self.arm(delay, ClientEvent::HistoryRetryFired { channel_id, request });
                None
            },
            ClientAction::FetchChannels { user_id, request } => {
                if let Some(result) = resolve(self.directory.fetch_channels(user_id)) {
                    self.in_flight.push_back(ClientEvent::ChannelsFetched { request, result });
                }
                None
            },
            ClientAction::FetchHistory { channel_id, request } => {
                if let Some(result) = resolve(self.directory.fetch_messages(channel_id)) {
                    self.in_flight.push_back(ClientEvent::HistoryFetched { channel_id, request, result });
                }
                None
            },
            ClientAction::CreateChannel(request) => {
                if let Some(result) = resolve(self.directory.create_channel(request)) {
                    self.in_flight.push_back(ClientEvent::ChannelCreated { result });
                }
                None
            },
            ClientAction::AddMember { channel_id, user_id } => {
                if let Some(result) = resolve(self.directory.add_member(channel_id, user_id)) {
                    self.in_flight.push_back(ClientEvent::MemberAdded { channel_id, user_id, result });
                }
                None
            },
            notification => {
                if let ClientAction::SyncChanged(state) = notification {
                    self.sync_history.push(state);
                }
                self.notifications.push(notification);
                None
            },
        }
    }

    fn arm(&mut self, delay: Duration, event: ClientEvent) {
        self.next_timer += 1;
        self.timers.push(Timer { due: self.now + delay, seq: self.next_timer, event });
    }
}
