//! Stored message model.

use chrono::{DateTime, Utc};
use courier_proto::{ChannelId, MessageEvent, UserId, rest::HistoryRecord};

/// Where a stored message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Bulk history fetch.
    History,
    /// Live push over the relay connection.
    Live,
}

/// A message as held by the message store.
///
/// Immutable once stored. The relay assigns no sequence number, so identity is
/// the [`DedupeKey`] tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel the message belongs to
    pub channel_id: ChannelId,
    /// Author
    pub sender_id: UserId,
    /// Body
    pub content: String,
    /// Server timestamp
    pub created_at: DateTime<Utc>,
    /// Source of this copy
    pub origin: Origin,
}

/// Identity of a message in the absence of a server-assigned sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupeKey {
    /// Channel the message belongs to
    pub channel_id: ChannelId,
    /// Author
    pub sender_id: UserId,
    /// Server timestamp
    pub created_at: DateTime<Utc>,
    /// Body
    pub content: String,
}

impl Message {
    /// Message received over the live stream.
    pub fn live(event: MessageEvent) -> Self {
        Self {
            channel_id: event.channel_id,
            sender_id: event.sender_id,
            content: event.content,
            created_at: event.created_at,
            origin: Origin::Live,
        }
    }

    /// Message returned by a history fetch.
    pub fn history(record: HistoryRecord) -> Self {
        Self {
            channel_id: record.channel_id,
            sender_id: record.sender_id,
            content: record.content,
            created_at: record.created_at,
            origin: Origin::History,
        }
    }

    /// Dedupe key of this message.
    pub fn key(&self) -> DedupeKey {
        DedupeKey {
            channel_id: self.channel_id,
            sender_id: self.sender_id,
            created_at: self.created_at,
            content: self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn live_and_history_copies_share_a_key() {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let live = Message::live(MessageEvent {
            channel_id: 1,
            sender_id: 5,
            content: "hi".into(),
            created_at,
        });
        let history = Message::history(HistoryRecord {
            id: 44,
            channel_id: 1,
            sender_id: 5,
            content: "hi".into(),
            created_at,
        });

        assert_eq!(live.key(), history.key());
        assert_ne!(live.origin, history.origin);
    }
}
