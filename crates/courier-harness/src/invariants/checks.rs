//! Concrete invariant implementations.

use std::collections::HashSet;

use courier_client::{ConnectionState, SyncState};

use super::{Invariant, InvariantResult, SessionSnapshot, Violation};

/// No view holds two messages with the same dedupe key.
pub struct UniqueMessages;

impl Invariant for UniqueMessages {
    fn name(&self) -> &'static str {
        "unique_messages"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        for view in &state.views {
            let mut seen = HashSet::new();
            if let Some(key) = view.keys.iter().find(|key| !seen.insert(*key)) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("channel {} holds {key:?} twice", view.channel_id),
                });
            }
        }
        Ok(())
    }
}

/// Every view is ordered by timestamp, oldest first.
pub struct OrderedViews;

impl Invariant for OrderedViews {
    fn name(&self) -> &'static str {
        "ordered_views"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        for view in &state.views {
            if let Some(index) = view.timestamps.windows(2).position(|w| w[0] > w[1]) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "channel {} out of order at {index}: {} after {}",
                        view.channel_id,
                        view.timestamps[index + 1],
                        view.timestamps[index]
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The store's index agrees with its views.
pub struct StoreConsistency;

impl Invariant for StoreConsistency {
    fn name(&self) -> &'static str {
        "store_consistency"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        state
            .store_check
            .clone()
            .map_err(|violation| Violation { invariant: self.name(), message: violation.to_string() })
    }
}

/// Active sync implies an open connection.
pub struct ActiveMeansOpen;

impl Invariant for ActiveMeansOpen {
    fn name(&self) -> &'static str {
        "active_means_open"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.sync_state == SyncState::Active && state.connection_state != ConnectionState::Open {
            return Err(Violation {
                invariant: self.name(),
                message: format!("active while connection is {:?}", state.connection_state),
            });
        }
        Ok(())
    }
}

/// Once stopped, a session never runs again and never redials.
pub struct StopIsTerminal;

impl Invariant for StopIsTerminal {
    fn name(&self) -> &'static str {
        "stop_is_terminal"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let stopped_at = state.sync_history.iter().position(|s| *s == SyncState::Stopped);

        if let Some(index) = stopped_at
            && let Some(later) = state.sync_history[index..].iter().find(|s| **s != SyncState::Stopped)
        {
            return Err(Violation { invariant: self.name(), message: format!("{later:?} after Stopped") });
        }

        if state.sync_state == SyncState::Stopped
            && matches!(state.connection_state, ConnectionState::Connecting | ConnectionState::Reconnecting)
        {
            return Err(Violation {
                invariant: self.name(),
                message: format!("stopped with connection {:?}", state.connection_state),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use courier_core::DedupeKey;

    use super::*;
    use crate::invariants::ViewSnapshot;

    fn snapshot(views: Vec<ViewSnapshot>) -> SessionSnapshot {
        SessionSnapshot {
            sync_state: SyncState::Active,
            connection_state: ConnectionState::Open,
            desired: vec![1],
            listed: vec![1],
            views,
            store_check: Ok(()),
            sync_history: vec![SyncState::Active],
        }
    }

    fn key(content: &str, minute: u32) -> DedupeKey {
        DedupeKey {
            channel_id: 1,
            sender_id: 5,
            content: content.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
        }
    }

    #[test]
    fn duplicate_key_detected() {
        let view = ViewSnapshot { channel_id: 1, keys: vec![key("hi", 0), key("hi", 0)], timestamps: vec![] };

        assert!(UniqueMessages.check(&snapshot(vec![view])).is_err());
    }

    #[test]
    fn out_of_order_detected() {
        let later = Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let view = ViewSnapshot { channel_id: 1, keys: vec![], timestamps: vec![later, earlier] };

        let err = OrderedViews.check(&snapshot(vec![view])).unwrap_err();
        assert_eq!(err.invariant, "ordered_views");
    }

    #[test]
    fn active_without_connection_detected() {
        let mut state = snapshot(vec![]);
        state.connection_state = ConnectionState::Reconnecting;

        assert!(ActiveMeansOpen.check(&state).is_err());
    }

    #[test]
    fn restart_after_stop_detected() {
        let mut state = snapshot(vec![]);
        state.sync_history = vec![SyncState::Active, SyncState::Stopped, SyncState::Syncing];

        assert!(StopIsTerminal.check(&state).is_err());
    }
}
