//! Property-based tests for the message store and subscription registry.
//!
//! Random interleavings of history merges and live pushes must always leave
//! every view deduplicated and ordered, whatever order copies arrive in.

use chrono::{DateTime, Duration, TimeZone, Utc};
use courier_client::{MessageStore, StoreConfig, SubscriptionRegistry};
use courier_core::{Message, Origin};
use courier_proto::OutboundFrame;
use proptest::prelude::*;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

/// Small value space so duplicates and timestamp ties are common.
fn message() -> impl Strategy<Value = Message> {
    (1u64..3, 1u64..4, 0i64..6, prop_oneof![Just("hi"), Just("yo"), Just("ok")], any::<bool>())
        .prop_map(|(channel_id, sender_id, minute, content, live)| Message {
            channel_id,
            sender_id,
            content: content.to_string(),
            created_at: base() + Duration::minutes(minute),
            origin: if live { Origin::Live } else { Origin::History },
        })
}

#[derive(Debug, Clone)]
enum Op {
    Live(Message),
    History(u64, Vec<Message>),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => message().prop_map(Op::Live),
        1 => (1u64..3, prop::collection::vec(message(), 0..6)).prop_map(|(c, ms)| Op::History(c, ms)),
    ]
}

fn apply(store: &mut MessageStore, op: Op) {
    match op {
        Op::Live(message) => {
            store.append_live(message);
        },
        Op::History(channel_id, messages) => {
            store.merge_history(channel_id, messages);
        },
    }
}

proptest! {
    /// Property: no view ever holds two entries sharing a dedupe key, and
    /// every view is ordered by timestamp
    #[test]
    fn prop_views_deduplicated_and_ordered(ops in prop::collection::vec(op(), 0..60)) {
        let mut store = MessageStore::default();

        for op in ops {
            apply(&mut store, op);
            prop_assert!(store.check_invariants().is_ok(), "{:?}", store.check_invariants());
        }

        for channel_id in [1, 2] {
            let view = store.view(channel_id);
            let mut keys: Vec<_> = view.iter().map(Message::key).collect();
            let len = keys.len();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), len);
            prop_assert!(view.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        }
    }

    /// Property: the set of stored keys does not depend on arrival order
    #[test]
    fn prop_content_independent_of_arrival_order(messages in prop::collection::vec(message(), 0..30)) {
        let mut forward = MessageStore::default();
        let mut backward = MessageStore::default();

        for m in messages.iter().cloned() {
            forward.append_live(m);
        }
        for m in messages.iter().rev().cloned() {
            backward.append_live(m);
        }

        for channel_id in [1, 2] {
            let mut a: Vec<_> = forward.view(channel_id).iter().map(Message::key).collect();
            let mut b: Vec<_> = backward.view(channel_id).iter().map(Message::key).collect();
            a.sort();
            b.sort();
            prop_assert_eq!(a, b);
        }
    }

    /// Property: the cap is never exceeded and keeps the newest entries
    #[test]
    fn prop_cap_respected(messages in prop::collection::vec(message(), 0..40), cap in 1usize..5) {
        let mut store = MessageStore::new(StoreConfig { max_per_channel: Some(cap) });

        for m in messages {
            store.append_live(m);
            prop_assert!(store.check_invariants().is_ok());
        }
        prop_assert!(store.len(1) <= cap && store.len(2) <= cap);
    }

    /// Property: subscribing N times yields one frame per open
    #[test]
    fn prop_subscribe_idempotent(ids in prop::collection::vec(1u64..5, 1..20), opens in 1usize..4) {
        let mut registry = SubscriptionRegistry::new();
        for id in &ids {
            registry.subscribe(*id, false);
        }

        let mut distinct = ids.clone();
        distinct.sort_unstable();
        distinct.dedup();

        for _ in 0..opens {
            let frames: Vec<u64> = registry
                .resubscribe_all()
                .into_iter()
                .map(|f| f.channel_id())
                .collect();
            prop_assert_eq!(&frames, &distinct);

            // Repeats while open add nothing
            for id in &ids {
                prop_assert_eq!(registry.subscribe(*id, true), None::<OutboundFrame>);
            }
        }
    }
}

#[test]
fn history_then_live_scenario() {
    let mut store = MessageStore::default();
    let ten = base();

    store.merge_history(1, vec![Message {
        channel_id: 1,
        sender_id: 3,
        content: "m".into(),
        created_at: ten,
        origin: Origin::History,
    }]);
    store.append_live(Message {
        channel_id: 1,
        sender_id: 5,
        content: "hi".into(),
        created_at: ten + Duration::minutes(5),
        origin: Origin::Live,
    });

    let times: Vec<_> = store.view(1).iter().map(|m| m.created_at).collect();
    assert_eq!(times, vec![ten, ten + Duration::minutes(5)]);
}

#[test]
fn identical_live_message_scenario() {
    let mut store = MessageStore::default();
    let live = Message {
        channel_id: 1,
        sender_id: 5,
        content: "hi".into(),
        created_at: base() + Duration::minutes(5),
        origin: Origin::Live,
    };

    store.append_live(live.clone());
    store.append_live(live);

    assert_eq!(store.len(1), 1);
}
