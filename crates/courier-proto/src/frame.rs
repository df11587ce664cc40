//! JSON text frames carried over the relay connection.
//!
//! The relay speaks one JSON object per WebSocket text message. The `type`
//! field selects the frame kind; the remaining fields are frame specific.
//!
//! ```text
//! client -> relay   {"type":"subscribe","channelID":1}
//! client -> relay   {"type":"unsubscribe","channelID":1}
//! client -> relay   {"type":"message","channelID":1,"text":"hi"}
//! relay  -> client  {"type":"message","channelID":1,"senderID":5,
//!                    "content":"hi","created_at":"2024-05-01T10:05:00Z"}
//! ```
//!
//! # Invariants
//!
//! - [`InboundFrame::decode`] never panics and never returns a partially
//!   validated frame: either every required field of a known frame type is
//!   present and well typed, or an error is returned.
//! - Unknown `type` values are not errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    ChannelId, UserId,
    errors::{ProtocolError, Result},
};

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Ask the relay to push live messages for a channel.
    Subscribe {
        /// Target channel
        #[serde(rename = "channelID")]
        channel_id: ChannelId,
    },
    /// Ask the relay to stop pushing a channel.
    Unsubscribe {
        /// Target channel
        #[serde(rename = "channelID")]
        channel_id: ChannelId,
    },
    /// Post a message to a channel.
    Message {
        /// Target channel
        #[serde(rename = "channelID")]
        channel_id: ChannelId,
        /// Message body
        text: String,
    },
}

impl OutboundFrame {
    /// Channel this frame addresses.
    pub fn channel_id(&self) -> ChannelId {
        match self {
            Self::Subscribe { channel_id }
            | Self::Unsubscribe { channel_id }
            | Self::Message { channel_id, .. } => *channel_id,
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// A live message pushed by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Channel the message was posted to
    #[serde(rename = "channelID")]
    pub channel_id: ChannelId,
    /// Author of the message
    #[serde(rename = "senderID")]
    pub sender_id: UserId,
    /// Message body
    pub content: String,
    /// Server timestamp
    pub created_at: DateTime<Utc>,
}

/// Frames received from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Live message for a subscribed channel.
    Message(MessageEvent),
    /// Well-formed frame with a `type` this client does not understand.
    Unknown {
        /// Value of the `type` field
        kind: String,
    },
}

/// Serialization shape for inbound frames (used by relays and test doubles).
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TaggedInbound<'a> {
    Message(&'a MessageEvent),
}

impl InboundFrame {
    /// Validate and decode one text frame.
    ///
    /// # Errors
    ///
    /// - `InvalidJson` if the text is not JSON
    /// - `NotAnObject` if the JSON is not an object
    /// - `MissingField`/`InvalidField` if `type` is absent or not a string
    /// - `InvalidPayload` if a known frame type has missing or ill-typed fields
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        let Value::Object(object) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let kind = frame_kind(&object)?;

        match kind.as_str() {
            "message" => {
                let event: MessageEvent = serde_json::from_value(Value::Object(object))
                    .map_err(|e| ProtocolError::InvalidPayload {
                        kind: "message",
                        reason: e.to_string(),
                    })?;
                Ok(Self::Message(event))
            },
            _ => Ok(Self::Unknown { kind }),
        }
    }

    /// Serialize to JSON text, as the relay would send it.
    ///
    /// # Errors
    ///
    /// - `Encode` for [`InboundFrame::Unknown`], which carries no body
    pub fn encode(&self) -> Result<String> {
        match self {
            Self::Message(event) => serde_json::to_string(&TaggedInbound::Message(event))
                .map_err(|e| ProtocolError::Encode(e.to_string())),
            Self::Unknown { kind } => {
                Err(ProtocolError::Encode(format!("cannot encode unknown frame type {kind:?}")))
            },
        }
    }
}

fn frame_kind(object: &Map<String, Value>) -> Result<String> {
    match object.get("type") {
        Some(Value::String(kind)) => Ok(kind.clone()),
        Some(other) => Err(ProtocolError::InvalidField {
            field: "type",
            reason: format!("expected string, got {other}"),
        }),
        None => Err(ProtocolError::MissingField("type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_message_event() {
        let text = r#"{"type":"message","channelID":1,"senderID":5,"content":"hi","created_at":"2024-05-01T10:05:00Z"}"#;

        let InboundFrame::Message(event) = InboundFrame::decode(text).unwrap() else {
            panic!("expected message frame");
        };
        assert_eq!(event.channel_id, 1);
        assert_eq!(event.sender_id, 5);
        assert_eq!(event.content, "hi");
    }

    #[test]
    fn decode_accepts_zero_timestamp() {
        let text = r#"{"type":"message","channelID":1,"senderID":5,"content":"hi","created_at":"0001-01-01T00:00:00Z"}"#;
        assert!(matches!(InboundFrame::decode(text), Ok(InboundFrame::Message(_))));
    }

    #[test]
    fn decode_rejects_string_channel_id() {
        let text = r#"{"type":"message","channelID":"x"}"#;
        let err = InboundFrame::decode(text).unwrap_err();

        assert!(matches!(err, ProtocolError::InvalidPayload { kind: "message", .. }));
        assert!(err.is_malformed_frame());
    }

    #[test]
    fn decode_rejects_missing_type() {
        let err = InboundFrame::decode(r#"{"channelID":1}"#).unwrap_err();
        assert_eq!(err, ProtocolError::MissingField("type"));
    }

    #[test]
    fn decode_rejects_non_object() {
        assert_eq!(InboundFrame::decode("[1,2]").unwrap_err(), ProtocolError::NotAnObject);
        assert!(matches!(InboundFrame::decode("not json"), Err(ProtocolError::InvalidJson(_))));
    }

    #[test]
    fn decode_unknown_type_is_not_an_error() {
        let frame = InboundFrame::decode(r#"{"type":"typing","channelID":1}"#).unwrap();
        assert_eq!(frame, InboundFrame::Unknown { kind: "typing".to_string() });
    }

    #[test]
    fn outbound_channel_id() {
        let frame = OutboundFrame::Message { channel_id: 9, text: "x".into() };
        assert_eq!(frame.channel_id(), 9);
    }
}
