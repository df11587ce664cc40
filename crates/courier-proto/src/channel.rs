//! Channels as served by the channel directory.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel identifier assigned by the directory.
pub type ChannelId = u64;

/// User identifier assigned by the directory.
pub type UserId = u64;

/// Channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelType {
    /// Exactly two participants.
    Direct,
    /// Any number of participants, with a display name.
    Group,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("DIRECT"),
            Self::Group => f.write_str("GROUP"),
        }
    }
}

/// A channel the user belongs to.
///
/// Fetched from the directory, never owned by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Directory-assigned identifier.
    pub id: ChannelId,
    /// Display name. Direct channels carry a placeholder name.
    #[serde(rename = "channel_name", default)]
    pub name: String,
    /// Direct or group.
    #[serde(rename = "channel_type")]
    pub kind: ChannelType,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Channel {
    /// Name to show in a channel list.
    ///
    /// Falls back to `Channel <id>` for anonymous channels.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() { format!("Channel {}", self.id) } else { self.name.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_directory_record() {
        let json = r#"{"id":7,"channel_name":"ops","channel_type":"GROUP","created_at":"2024-05-01T10:00:00Z"}"#;
        let channel: Channel = serde_json::from_str(json).unwrap();

        assert_eq!(channel.id, 7);
        assert_eq!(channel.kind, ChannelType::Group);
        assert_eq!(channel.display_name(), "ops");
    }

    #[test]
    fn anonymous_channel_display_name() {
        let json = r#"{"id":3,"channel_name":"","channel_type":"DIRECT","created_at":"2024-05-01T10:00:00Z"}"#;
        let channel: Channel = serde_json::from_str(json).unwrap();

        assert_eq!(channel.display_name(), "Channel 3");
    }

    #[test]
    fn rejects_unknown_channel_type() {
        let json = r#"{"id":3,"channel_name":"x","channel_type":"BROADCAST","created_at":"2024-05-01T10:00:00Z"}"#;
        assert!(serde_json::from_str::<Channel>(json).is_err());
    }
}
