//! Fuzz target for the Connection state machine
//!
//! # Strategy
//!
//! Arbitrary interleavings of connects, opens, closes, timer firings
//! (current and stale), sends and inbound text.
//!
//! # Invariants
//!
//! - Frames are only handed to the socket while Open
//! - Queued frames never exceed the configured capacity
//! - Reconnect delays never exceed the backoff cap
//! - close() always lands in Closed with an empty queue

#![no_main]

use arbitrary::Arbitrary;
use courier_core::{Connection, ConnectionAction, ConnectionConfig, ConnectionState};
use courier_proto::OutboundFrame;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum ConnectionOp {
    Connect { identity: i64 },
    Open,
    Closed { entropy: u64 },
    Timer { attempt: u8 },
    CurrentTimer,
    Send { channel_id: u8 },
    Text(String),
    Close,
}

fuzz_target!(|ops: Vec<ConnectionOp>| {
    let config = ConnectionConfig { queue_capacity: 4, ..ConnectionConfig::default() };
    let cap = config.backoff.cap;
    let mut conn = Connection::new(config);

    for op in ops {
        let was_open = conn.is_open();
        let actions = match op {
            ConnectionOp::Connect { identity } => conn.connect(identity).unwrap_or_default(),
            ConnectionOp::Open => conn.handle_open().unwrap_or_default(),
            ConnectionOp::Closed { entropy } => conn.handle_closed("fuzz", entropy),
            ConnectionOp::Timer { attempt } => conn.handle_reconnect_timer(u32::from(attempt)),
            ConnectionOp::CurrentTimer => conn.handle_reconnect_timer(conn.reconnect_attempts().saturating_sub(1)),
            ConnectionOp::Send { channel_id } => conn
                .send(OutboundFrame::Message { channel_id: u64::from(channel_id), text: "x".into() })
                .unwrap_or_default(),
            ConnectionOp::Text(text) => {
                let _ = conn.handle_text(&text);
                Vec::new()
            },
            ConnectionOp::Close => {
                let actions = conn.close();
                assert_eq!(conn.state(), ConnectionState::Closed);
                assert_eq!(conn.queued(), 0);
                actions
            },
        };

        for action in &actions {
            match action {
                ConnectionAction::Send(_) => {
                    assert!(was_open || conn.is_open(), "send while {:?}", conn.state());
                },
                ConnectionAction::ScheduleReconnect { delay, .. } => assert!(*delay <= cap),
                _ => {},
            }
        }

        assert!(conn.queued() <= 4);
    }
});
