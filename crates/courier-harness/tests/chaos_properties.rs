//! Property-based chaos tests over the simulation world.
//!
//! Random interleavings of user intents, relay pushes, dropped connections,
//! refused dials and directory outages. The world checks the standard
//! invariants after every step; these properties add what must hold once
//! the dust settles.

use courier_client::{SyncConfig, SyncState};
use courier_harness::{DirectoryOp, Operation, SimDirectory, SimRelay, SimWorld};
use proptest::prelude::*;

const ALICE: i64 = 7;

fn directory() -> SimDirectory {
    let directory = SimDirectory::new();
    directory.add_channel(1, "ops", &[7, 8]);
    directory.add_channel(2, "dev", &[7]);
    directory.add_channel(3, "other", &[8]);
    directory.add_history(1, 8, "hi", courier_harness::relay_epoch());
    directory
}

fn directory_op() -> impl Strategy<Value = DirectoryOp> {
    prop_oneof![Just(DirectoryOp::FetchChannels), Just(DirectoryOp::FetchMessages)]
}

fn operation() -> impl Strategy<Value = Operation> {
    let content = prop_oneof![Just("hi".to_string()), Just("yo".to_string())];
    prop_oneof![
        2 => (1u64..5).prop_map(Operation::OpenChannel),
        1 => (1u64..5).prop_map(Operation::CloseChannel),
        2 => (1u64..4, content.clone())
            .prop_map(|(channel_id, text)| Operation::SendMessage { channel_id, text }),
        4 => (1u64..4, 7u64..9, 0i64..5, content).prop_map(|(channel_id, sender_id, second, content)| {
            Operation::Push { channel_id, sender_id, second, content }
        }),
        1 => Just(Operation::PushMalformed),
        2 => Just(Operation::DropConnection),
        1 => (1u32..4).prop_map(Operation::RefuseDials),
        1 => (directory_op(), 1u32..4).prop_map(|(op, count)| Operation::FailDirectory { op, count }),
        3 => Just(Operation::DeliverDirectory),
        2 => Just(Operation::FireTimer),
        1 => Just(Operation::Settle),
    ]
}

fn run(seed: u64, operations: &[Operation]) -> SimWorld {
    let mut world = SimWorld::new(seed, SimRelay::new(), directory(), SyncConfig::default());
    world.start(ALICE).unwrap();

    for operation in operations {
        // Rejected intents (queue full, stopped session) are expected outcomes
        let _ = world.apply_operation(operation.clone());
    }
    world.settle();
    world
}

proptest! {
    /// Property: a settled session that is still running is Active over an
    /// open connection whose relay-side subscriptions match the desired set
    #[test]
    fn prop_settled_session_converges(
        seed in any::<u64>(),
        operations in prop::collection::vec(operation(), 0..60),
    ) {
        let world = run(seed, &operations);
        let controller = world.controller();

        // Enough consecutive directory failures legitimately stop the session
        if controller.state() == SyncState::Stopped {
            return Ok(());
        }
        prop_assert_eq!(controller.state(), SyncState::Active);
        prop_assert!(world.relay().is_connected());

        let last = world.relay().connection_count() - 1;
        let desired: Vec<u64> = controller.registry().desired().collect();
        prop_assert_eq!(world.relay().subscriptions(last), desired);
        prop_assert_eq!(world.pending_timers(), 0);
    }

    /// Property: the same seed and operations replay identically
    #[test]
    fn prop_simulation_deterministic(
        seed in any::<u64>(),
        operations in prop::collection::vec(operation(), 0..40),
    ) {
        let a = run(seed, &operations);
        let b = run(seed, &operations);

        prop_assert_eq!(a.now(), b.now());
        prop_assert_eq!(a.relay().connection_count(), b.relay().connection_count());
        for index in 0..a.relay().connection_count() {
            prop_assert_eq!(a.relay().frames(index), b.relay().frames(index));
        }
        for channel_id in 1..5 {
            prop_assert_eq!(a.controller().view(channel_id), b.controller().view(channel_id));
        }
    }

    /// Property: live messages for channels never opened or listed are
    /// never stored
    #[test]
    fn prop_foreign_channels_stay_empty(
        seed in any::<u64>(),
        operations in prop::collection::vec(operation(), 0..60),
    ) {
        let operations: Vec<_> = operations
            .into_iter()
            .filter(|op| !matches!(op, Operation::OpenChannel(3)))
            .collect();
        let world = run(seed, &operations);

        prop_assert!(world.controller().view(3).is_empty());
    }
}
