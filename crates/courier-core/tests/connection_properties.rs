//! Property-based tests for the connection state machine.
//!
//! Drives random sequences of sends, losses, timer firings and opens and
//! checks the transport guarantees after every step.

use std::time::Duration;

use courier_core::{
    BackoffPolicy, Connection, ConnectionAction, ConnectionConfig, ConnectionError,
    ConnectionState,
};
use courier_proto::OutboundFrame;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Send,
    Lost(u64),
    TimerFired,
    Opened,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => Just(Step::Send),
        1 => any::<u64>().prop_map(Step::Lost),
        1 => Just(Step::TimerFired),
        1 => Just(Step::Opened),
    ]
}

fn config(capacity: usize) -> ConnectionConfig {
    ConnectionConfig { queue_capacity: capacity, ..ConnectionConfig::default() }
}

proptest! {
    /// Property: every frame accepted by `send` is transmitted exactly once,
    /// in the order it was accepted
    #[test]
    fn prop_accepted_frames_sent_in_order(
        steps in prop::collection::vec(step(), 1..80),
        capacity in 1usize..8,
    ) {
        let mut conn = Connection::new(config(capacity));
        let mut actions = conn.connect(1).unwrap();

        let mut accepted = Vec::new();
        let mut next_channel = 0u64;
        let mut pending_timer = None;

        for step in steps {
            match step {
                Step::Send => {
                    next_channel += 1;
                    let frame = OutboundFrame::Subscribe { channel_id: next_channel };
                    match conn.send(frame.clone()) {
                        Ok(out) => {
                            accepted.push(frame);
                            actions.extend(out);
                        },
                        Err(ConnectionError::QueueFull { capacity: c }) => {
                            prop_assert_eq!(c, capacity);
                            prop_assert_eq!(conn.queued(), capacity);
                        },
                        Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                    }
                },
                Step::Lost(entropy) => {
                    let out = conn.handle_closed("lost", entropy);
                    for action in &out {
                        if let ConnectionAction::ScheduleReconnect { attempt, .. } = action {
                            pending_timer = Some(*attempt);
                        }
                    }
                    actions.extend(out);
                },
                Step::TimerFired => {
                    if let Some(attempt) = pending_timer.take() {
                        actions.extend(conn.handle_reconnect_timer(attempt));
                    }
                },
                Step::Opened => {
                    if let Ok(out) = conn.handle_open() {
                        actions.extend(out);
                    }
                },
            }
        }

        // Force a final open so anything still queued is flushed
        if conn.state() != ConnectionState::Open {
            if conn.state() == ConnectionState::Reconnecting {
                if let Some(attempt) = pending_timer {
                    actions.extend(conn.handle_reconnect_timer(attempt));
                }
            }
            actions.extend(conn.handle_open().unwrap());
        }

        let sent: Vec<OutboundFrame> = actions
            .into_iter()
            .filter_map(|a| match a {
                ConnectionAction::Send(frame) => Some(frame),
                _ => None,
            })
            .collect();

        prop_assert_eq!(sent, accepted);
    }

    /// Property: state change actions never repeat the current state
    #[test]
    fn prop_state_changes_are_transitions(steps in prop::collection::vec(step(), 1..60)) {
        let mut conn = Connection::new(config(16));
        let mut actions = conn.connect(1).unwrap();

        for step in steps {
            match step {
                Step::Send => {
                    let _ = conn.send(OutboundFrame::Subscribe { channel_id: 1 });
                },
                Step::Lost(entropy) => actions.extend(conn.handle_closed("lost", entropy)),
                Step::TimerFired => actions.extend(conn.handle_reconnect_timer(0)),
                Step::Opened => {
                    if let Ok(out) = conn.handle_open() {
                        actions.extend(out);
                    }
                },
            }
        }
        actions.extend(conn.close());

        let mut previous = ConnectionState::Disconnected;
        for action in actions {
            if let ConnectionAction::StateChanged(state) = action {
                prop_assert_ne!(state, previous);
                previous = state;
            }
        }
        prop_assert_eq!(previous, ConnectionState::Closed);
    }

    /// Property: reconnect delays never exceed the policy cap
    #[test]
    fn prop_reconnect_delay_capped(entropies in prop::collection::vec(any::<u64>(), 1..40)) {
        let policy = BackoffPolicy::default();
        let mut conn = Connection::new(ConnectionConfig { backoff: policy, ..ConnectionConfig::default() });
        conn.connect(1).unwrap();

        for entropy in entropies {
            for action in conn.handle_closed("lost", entropy) {
                if let ConnectionAction::ScheduleReconnect { delay, attempt } = action {
                    prop_assert!(delay <= policy.cap);
                    prop_assert!(delay >= Duration::from_millis(400) || attempt > 0);
                    conn.handle_reconnect_timer(attempt);
                }
            }
        }
    }
}
