//! Line-oriented session console.
//!
//! Reads commands from stdin and prints session updates as they arrive.
//! Message views are replayed whole on every update, so the console keeps
//! the dedupe keys it already printed and shows only what is new.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io::Write,
};

use courier_app::{SessionError, SessionHandle, SessionUpdate, SessionUpdates};
use courier_client::{ConnectionState, Message, SyncState};
use courier_core::DedupeKey;
use courier_proto::{ChannelId, UserId, rest::CreateChannelRequest};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    command::{Command, HELP},
    error::CliError,
};

/// Whether the console keeps going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// End the session.
    Quit,
}

/// Terminal state of one session.
pub struct Console<W> {
    out: W,
    user_id: UserId,
    active: Option<ChannelId>,
    channels: BTreeMap<ChannelId, String>,
    shown: HashMap<ChannelId, HashSet<DedupeKey>>,
}

impl<W: Write> Console<W> {
    /// Console writing to `out` for the session of `user_id`.
    pub fn new(out: W, user_id: UserId) -> Self {
        Self { out, user_id, active: None, channels: BTreeMap::new(), shown: HashMap::new() }
    }

    /// Channel text is sent to.
    pub fn active(&self) -> Option<ChannelId> {
        self.active
    }

    /// Consume the console, returning its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print one session update.
    pub fn render(&mut self, update: &SessionUpdate) -> std::io::Result<Flow> {
        match update {
            SessionUpdate::Connection(ConnectionState::Open) => writeln!(self.out, "* connected")?,
            SessionUpdate::Connection(ConnectionState::Reconnecting) => {
                writeln!(self.out, "* connection lost, reconnecting")?;
            },
            SessionUpdate::Connection(_) => {},
            SessionUpdate::Sync(SyncState::Active) => writeln!(self.out, "* in sync")?,
            SessionUpdate::Sync(_) => {},
            SessionUpdate::Channels(channels) => {
                let known = self.channels.len();
                self.channels = channels.iter().map(|c| (c.id, c.display_name())).collect();
                if self.channels.len() != known {
                    writeln!(self.out, "* {} channels, /channels to list", self.channels.len())?;
                }
            },
            SessionUpdate::Messages { channel_id, messages } => self.render_messages(*channel_id, messages)?,
            SessionUpdate::ChannelCreated { channel_id } => {
                self.active = Some(*channel_id);
                writeln!(self.out, "* created channel {channel_id}, now active")?;
            },
            SessionUpdate::MemberAdded { channel_id, user_id } => {
                let label = self.label(*channel_id);
                writeln!(self.out, "* added user {user_id} to {label}")?;
            },
            SessionUpdate::MessageDropped { channel_id, error } => {
                let label = self.label(*channel_id);
                writeln!(self.out, "! message to {label} not sent: {error}")?;
            },
            SessionUpdate::RequestFailed { operation, error } => {
                writeln!(self.out, "! {operation} failed: {error}")?;
            },
            SessionUpdate::SyncUnavailable { error } => {
                writeln!(self.out, "! cannot load channels: {error}")?;
                return Ok(Flow::Quit);
            },
        }
        Ok(Flow::Continue)
    }

    /// Execute one command against the session.
    pub async fn execute(&mut self, handle: &SessionHandle, command: Command) -> std::io::Result<Flow> {
        let result = match command {
            Command::Channels => {
                self.list_channels()?;
                Ok(())
            },
            Command::Open(channel_id) => {
                let result = handle.open_channel(channel_id).await;
                if result.is_ok() {
                    self.active = Some(channel_id);
                    let label = self.label(channel_id);
                    writeln!(self.out, "* now in {label}")?;
                }
                result
            },
            Command::Leave(channel_id) => {
                let Some(channel_id) = channel_id.or(self.active) else {
                    writeln!(self.out, "! no active channel")?;
                    return Ok(Flow::Continue);
                };
                if self.active == Some(channel_id) {
                    self.active = None;
                }
                handle.close_channel(channel_id).await
            },
            Command::CreateGroup { name, members } => {
                handle.create_channel(CreateChannelRequest::group(name, members)).await
            },
            Command::CreateDirect(other) => {
                handle.create_channel(CreateChannelRequest::direct(self.user_id, other)).await
            },
            Command::Add { user_id, channel_id } => {
                let Some(channel_id) = channel_id.or(self.active) else {
                    writeln!(self.out, "! no active channel")?;
                    return Ok(Flow::Continue);
                };
                handle.add_member(channel_id, user_id).await
            },
            Command::Help => {
                writeln!(self.out, "{HELP}")?;
                Ok(())
            },
            Command::Quit => return Ok(Flow::Quit),
            Command::Say(text) => {
                let Some(channel_id) = self.active else {
                    writeln!(self.out, "! open a channel first, /help for commands")?;
                    return Ok(Flow::Continue);
                };
                handle.send_message(channel_id, text).await
            },
        };

        match result {
            Ok(()) => Ok(Flow::Continue),
            Err(SessionError::Closed) => Ok(Flow::Quit),
            Err(SessionError::Rejected(error)) => {
                writeln!(self.out, "! {error}")?;
                Ok(Flow::Continue)
            },
        }
    }

    /// Print a notice.
    pub fn note(&mut self, text: &str) -> std::io::Result<()> {
        writeln!(self.out, "! {text}")
    }

    fn list_channels(&mut self) -> std::io::Result<()> {
        if self.channels.is_empty() {
            return writeln!(self.out, "* no channels yet, /create one");
        }
        for (id, name) in &self.channels {
            let marker = if self.active == Some(*id) { '>' } else { ' ' };
            writeln!(self.out, "{marker} {id:>4}  {name}")?;
        }
        Ok(())
    }

    fn render_messages(&mut self, channel_id: ChannelId, messages: &[Message]) -> std::io::Result<()> {
        let label = self.label(channel_id);
        let shown = self.shown.entry(channel_id).or_default();

        for message in messages {
            if !shown.insert(message.key()) {
                continue;
            }

            let time = message.created_at.format("%H:%M");
            if message.sender_id == self.user_id {
                writeln!(self.out, "[{label}] {time} you: {}", message.content)?;
            } else {
                writeln!(self.out, "[{label}] {time} user {}: {}", message.sender_id, message.content)?;
            }
        }
        Ok(())
    }

    fn label(&self, channel_id: ChannelId) -> String {
        self.channels.get(&channel_id).cloned().unwrap_or_else(|| format!("Channel {channel_id}"))
    }
}

/// Run the console until the user quits, stdin closes or the session ends.
///
/// The session is stopped on the way out.
pub async fn run<W: Write>(
    handle: SessionHandle,
    mut updates: SessionUpdates,
    user_id: UserId,
    out: W,
) -> Result<(), CliError> {
    let mut console = Console::new(out, user_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let flow = tokio::select! {
            update = updates.recv() => match update {
                Some(update) => console.render(&update)?,
                None => Flow::Quit,
            },
            line = lines.next_line() => match line? {
                Some(line) => match Command::parse(&line) {
                    Some(Ok(command)) => console.execute(&handle, command).await?,
                    Some(Err(error)) => {
                        console.note(&error.to_string())?;
                        Flow::Continue
                    },
                    None => Flow::Continue,
                },
                None => Flow::Quit,
            },
        };

        if flow == Flow::Quit {
            break;
        }
    }

    match handle.stop(false).await {
        Ok(()) | Err(SessionError::Closed) => Ok(()),
        Err(SessionError::Rejected(error)) => {
            tracing::warn!(%error, "stop rejected");
            Ok(())
        },
    }
}
