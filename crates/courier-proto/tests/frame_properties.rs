//! Property-based tests for frame validation.
//!
//! Inbound validation must hold for ALL inputs: arbitrary text never panics
//! the decoder, and every accepted `message` frame carries its full body.

use courier_proto::{InboundFrame, MessageEvent, OutboundFrame, ProtocolError};
use proptest::prelude::*;

/// Strategy for arbitrary JSON-ish values placed in a field.
fn arbitrary_field_value() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<u64>().prop_map(|n| n.to_string()),
        any::<i64>().prop_map(|n| n.to_string()),
        "[a-z]{0,8}".prop_map(|s| format!("\"{s}\"")),
        Just("null".to_string()),
        Just("[]".to_string()),
        Just("{}".to_string()),
        Just("true".to_string()),
    ]
}

proptest! {
    #[test]
    fn prop_decode_never_panics(text in ".*") {
        let _ = InboundFrame::decode(&text);
    }

    /// Property: a message frame whose channelID is not an unsigned integer is
    /// always rejected as malformed
    #[test]
    fn prop_non_integer_channel_id_rejected(value in arbitrary_field_value()) {
        prop_assume!(value.parse::<u64>().is_err());

        let text = format!(
            r#"{{"type":"message","channelID":{value},"senderID":1,"content":"x","created_at":"2024-05-01T10:00:00Z"}}"#
        );
        let result = InboundFrame::decode(&text);

        let rejected = matches!(result, Err(ProtocolError::InvalidPayload { kind: "message", .. }));
        prop_assert!(rejected);
    }

    /// Property: any well-typed message frame is accepted with its fields intact
    #[test]
    fn prop_well_typed_message_accepted(
        channel_id in any::<u64>(),
        sender_id in any::<u64>(),
        content in "[ -~]{0,64}",
        secs in 0i64..4_000_000_000,
    ) {
        let created_at = chrono::DateTime::from_timestamp(secs, 0).unwrap();
        let event = MessageEvent { channel_id, sender_id, content, created_at };
        let text = InboundFrame::Message(event.clone()).encode().unwrap();

        prop_assert_eq!(InboundFrame::decode(&text).unwrap(), InboundFrame::Message(event));
    }

    /// Property: unknown frame types are never errors
    #[test]
    fn prop_unknown_types_ignored(kind in "[a-z_]{1,12}") {
        prop_assume!(kind != "message");

        let text = format!(r#"{{"type":"{kind}","channelID":"anything"}}"#);
        prop_assert_eq!(InboundFrame::decode(&text).unwrap(), InboundFrame::Unknown { kind });
    }
}

#[test]
fn subscribe_wire_format() {
    let text = OutboundFrame::Subscribe { channel_id: 1 }.encode().unwrap();
    insta::assert_snapshot!(text, @r#"{"type":"subscribe","channelID":1}"#);
}

#[test]
fn unsubscribe_wire_format() {
    let text = OutboundFrame::Unsubscribe { channel_id: 2 }.encode().unwrap();
    insta::assert_snapshot!(text, @r#"{"type":"unsubscribe","channelID":2}"#);
}

#[test]
fn message_wire_format() {
    let text = OutboundFrame::Message { channel_id: 1, text: "hi".to_string() }.encode().unwrap();
    insta::assert_snapshot!(text, @r#"{"type":"message","channelID":1,"text":"hi"}"#);
}

#[test]
fn scenario_e_non_integer_channel_is_dropped() {
    let err = InboundFrame::decode(r#"{"type":"message","channelID":"x"}"#).unwrap_err();
    assert!(err.is_malformed_frame());
}
