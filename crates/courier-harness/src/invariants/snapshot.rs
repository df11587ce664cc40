//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of a session at a point in time.
//! Invariants operate on snapshots rather than live state so every check
//! sees one consistent picture.

use chrono::{DateTime, Utc};
use courier_client::{ConnectionState, Environment, StoreViolation, SyncController, SyncState};
use courier_core::DedupeKey;
use courier_proto::ChannelId;

/// Snapshot of one session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Controller state.
    pub sync_state: SyncState,
    /// Transport state.
    pub connection_state: ConnectionState,
    /// Channels in the subscription registry, ascending.
    pub desired: Vec<ChannelId>,
    /// Channels from the last directory fetch.
    pub listed: Vec<ChannelId>,
    /// Per-channel views.
    pub views: Vec<ViewSnapshot>,
    /// Outcome of the store's own consistency check.
    pub store_check: Result<(), StoreViolation>,
    /// Every sync state observed so far, oldest first.
    pub sync_history: Vec<SyncState>,
}

impl SessionSnapshot {
    /// Capture the observable state of `controller`.
    pub fn from_controller<E: Environment>(controller: &SyncController<E>) -> Self {
        let store = controller.store();
        let mut channels: Vec<ChannelId> = store.channels().collect();
        channels.sort_unstable();

        let views = channels
            .into_iter()
            .map(|channel_id| {
                let messages = store.view(channel_id);
                ViewSnapshot {
                    channel_id,
                    keys: messages.iter().map(courier_client::Message::key).collect(),
                    timestamps: messages.iter().map(|m| m.created_at).collect(),
                }
            })
            .collect();

        Self {
            sync_state: controller.state(),
            connection_state: controller.connection_state(),
            desired: controller.registry().desired().collect(),
            listed: controller.channels().iter().map(|c| c.id).collect(),
            views,
            store_check: store.check_invariants(),
            sync_history: vec![controller.state()],
        }
    }

    /// Attach the sync states observed before this snapshot.
    #[must_use]
    pub fn with_history(mut self, history: &[SyncState]) -> Self {
        self.sync_history = history.to_vec();
        self.sync_history.push(self.sync_state);
        self
    }
}

/// Snapshot of one channel view.
#[derive(Debug, Clone, Default)]
pub struct ViewSnapshot {
    /// Channel the view belongs to.
    pub channel_id: ChannelId,
    /// Dedupe keys in view order.
    pub keys: Vec<DedupeKey>,
    /// Timestamps in view order.
    pub timestamps: Vec<DateTime<Utc>>,
}
