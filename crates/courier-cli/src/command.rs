//! Input line parsing.
//!
//! Lines starting with `/` are commands; anything else is a message for the
//! active channel.

use courier_proto::{ChannelId, UserId};
use thiserror::Error;

/// Usage text printed by `/help`.
pub const HELP: &str = "\
/channels                      list your channels
/open <channel>                subscribe and switch to a channel
/leave [channel]               stop live updates (default: active channel)
/create group <name> <user>... create a group channel with the given users
/create direct <user>          create a direct channel with one user
/add <user> [channel]          add a user (default: active channel)
/quit                          end the session
<text>                         send to the active channel";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the channel list.
    Channels,
    /// Subscribe to a channel and make it active.
    Open(ChannelId),
    /// Unsubscribe from a channel.
    Leave(Option<ChannelId>),
    /// Create a group channel.
    CreateGroup {
        /// Display name
        name: String,
        /// Other members
        members: Vec<UserId>,
    },
    /// Create a direct channel with one other user.
    CreateDirect(UserId),
    /// Add a user to a channel.
    Add {
        /// User to add
        user_id: UserId,
        /// Target channel, the active one if absent
        channel_id: Option<ChannelId>,
    },
    /// Print usage.
    Help,
    /// End the session.
    Quit,
    /// Send text to the active channel.
    Say(String),
}

/// Input that is not a valid command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Unrecognized `/` command.
    #[error("unknown command /{0}, try /help")]
    Unknown(String),

    /// Missing or malformed argument.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// An identifier that is not a positive integer.
    #[error("invalid id {0:?}")]
    InvalidId(String),
}

impl Command {
    /// Parse one input line. Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Result<Self, CommandError>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Some(Ok(Self::Say(line.to_string())));
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        Some(parse_command(name, &args))
    }
}

fn parse_command(name: &str, args: &[&str]) -> Result<Command, CommandError> {
    match (name, args) {
        ("channels", []) => Ok(Command::Channels),
        ("open", [channel]) => Ok(Command::Open(parse_id(channel)?)),
        ("open", _) => Err(CommandError::Usage("/open <channel>")),
        ("leave", []) => Ok(Command::Leave(None)),
        ("leave", [channel]) => Ok(Command::Leave(Some(parse_id(channel)?))),
        ("leave", _) => Err(CommandError::Usage("/leave [channel]")),
        ("create", ["group", name, members @ ..]) if !members.is_empty() => Ok(Command::CreateGroup {
            name: (*name).to_string(),
            members: members.iter().map(|m| parse_id(m)).collect::<Result<_, _>>()?,
        }),
        ("create", ["direct", user]) => Ok(Command::CreateDirect(parse_id(user)?)),
        ("create", _) => Err(CommandError::Usage("/create group <name> <user>... | /create direct <user>")),
        ("add", [user]) => Ok(Command::Add { user_id: parse_id(user)?, channel_id: None }),
        ("add", [user, channel]) => {
            Ok(Command::Add { user_id: parse_id(user)?, channel_id: Some(parse_id(channel)?) })
        },
        ("add", _) => Err(CommandError::Usage("/add <user> [channel]")),
        ("help", _) => Ok(Command::Help),
        ("quit" | "exit", _) => Ok(Command::Quit),
        (other, _) => Err(CommandError::Unknown(other.to_string())),
    }
}

fn parse_id(word: &str) -> Result<u64, CommandError> {
    word.parse::<u64>().ok().filter(|id| *id > 0).ok_or_else(|| CommandError::InvalidId(word.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, CommandError> {
        Command::parse(line).unwrap()
    }

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse("  hello there "), Ok(Command::Say("hello there".into())));
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn channel_commands() {
        assert_eq!(parse("/open 3"), Ok(Command::Open(3)));
        assert_eq!(parse("/leave"), Ok(Command::Leave(None)));
        assert_eq!(parse("/leave 4"), Ok(Command::Leave(Some(4))));
        assert_eq!(parse("/channels"), Ok(Command::Channels));
    }

    #[test]
    fn create_commands() {
        assert_eq!(
            parse("/create group launch 8 9"),
            Ok(Command::CreateGroup { name: "launch".into(), members: vec![8, 9] })
        );
        assert_eq!(parse("/create direct 8"), Ok(Command::CreateDirect(8)));
        assert!(matches!(parse("/create group launch"), Err(CommandError::Usage(_))));
    }

    #[test]
    fn invalid_ids_rejected() {
        assert_eq!(parse("/open x"), Err(CommandError::InvalidId("x".into())));
        assert_eq!(parse("/open 0"), Err(CommandError::InvalidId("0".into())));
        assert_eq!(parse("/add 8 -1"), Err(CommandError::InvalidId("-1".into())));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(parse("/dance"), Err(CommandError::Unknown("dance".into())));
    }
}
