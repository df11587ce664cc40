//! Fuzz target for MessageStore merging
//!
//! # Strategy
//!
//! Live pushes and history batches over a tiny key space so duplicates,
//! timestamp ties and cross-channel entries are frequent. Half the runs use
//! a per-channel cap.
//!
//! # Invariants
//!
//! - Views never hold a dedupe key twice
//! - Views stay ordered by timestamp
//! - Views never exceed the cap

#![no_main]

use arbitrary::Arbitrary;
use chrono::{DateTime, TimeDelta, Utc};
use courier_client::{MessageStore, StoreConfig};
use courier_core::{Message, Origin};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct SmallMessage {
    channel_id: u8,
    sender_id: u8,
    minute: u8,
    content: u8,
}

#[derive(Debug, Clone, Arbitrary)]
enum StoreOp {
    Live(SmallMessage),
    History { channel_id: u8, batch: Vec<SmallMessage> },
    Clear { channel_id: Option<u8> },
}

fn message(m: &SmallMessage, origin: Origin) -> Message {
    Message {
        channel_id: u64::from(m.channel_id % 3),
        sender_id: u64::from(m.sender_id % 4),
        content: format!("m{}", m.content % 3),
        created_at: DateTime::<Utc>::UNIX_EPOCH + TimeDelta::minutes(i64::from(m.minute % 16)),
        origin,
    }
}

fuzz_target!(|input: (Option<u8>, Vec<StoreOp>)| {
    let (cap, ops) = input;
    let cap = cap.map(|c| usize::from(c % 8) + 1);
    let mut store = MessageStore::new(StoreConfig { max_per_channel: cap });

    for op in ops {
        match op {
            StoreOp::Live(m) => {
                store.append_live(message(&m, Origin::Live));
            },
            StoreOp::History { channel_id, batch } => {
                let batch = batch.iter().map(|m| message(m, Origin::History)).collect();
                store.merge_history(u64::from(channel_id % 3), batch);
            },
            StoreOp::Clear { channel_id } => store.clear(channel_id.map(|c| u64::from(c % 3))),
        }

        if let Err(violation) = store.check_invariants() {
            panic!("store invariant violated: {violation}");
        }
        if let Some(cap) = cap {
            assert!((0..3).all(|c| store.len(c) <= cap));
        }
    }
});
