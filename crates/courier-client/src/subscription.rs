//! Desired subscription set.
//!
//! The registry is the single source of truth for which channels should
//! receive live messages. It is independent of connection state: intents
//! recorded while the connection is down are replayed by
//! [`SubscriptionRegistry::resubscribe_all`] on the next transition to Open.
//!
//! # Invariants
//!
//! - At most one logical subscription per channel
//! - `resubscribe_all` yields each desired channel exactly once, ascending
//! - A channel left with `unsubscribe` is only re-added by `subscribe`,
//!   never by a directory refresh

use std::collections::BTreeSet;

use courier_proto::{ChannelId, OutboundFrame};

/// Tracks the channels the user wants live updates for.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    /// Desired channels. Ordered so replays are deterministic.
    desired: BTreeSet<ChannelId>,
    /// Channels the user left. Directory listings do not re-add them.
    declined: BTreeSet<ChannelId>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record interest in `channel_id`.
    ///
    /// Returns a subscribe frame only if the channel was newly added and the
    /// connection is open. Otherwise the intent is recorded and replayed on
    /// the next open.
    pub fn subscribe(&mut self, channel_id: ChannelId, connection_open: bool) -> Option<OutboundFrame> {
        self.declined.remove(&channel_id);
        self.insert(channel_id, connection_open)
    }

    /// Record interest in a channel the directory listed for the user.
    ///
    /// Same as [`Self::subscribe`], except that channels the user explicitly
    /// left stay unsubscribed.
    pub fn subscribe_listed(&mut self, channel_id: ChannelId, connection_open: bool) -> Option<OutboundFrame> {
        if self.declined.contains(&channel_id) {
            tracing::trace!(channel_id, "listed channel was left, not subscribing");
            return None;
        }
        self.insert(channel_id, connection_open)
    }

    fn insert(&mut self, channel_id: ChannelId, connection_open: bool) -> Option<OutboundFrame> {
        let added = self.desired.insert(channel_id);
        if added {
            tracing::debug!(channel_id, "subscription added");
        }

        (added && connection_open).then_some(OutboundFrame::Subscribe { channel_id })
    }

    /// Drop interest in `channel_id` until it is subscribed again.
    ///
    /// Returns an unsubscribe frame if the channel was desired and the
    /// connection is open. Live frames for the channel are filtered out by
    /// the caller either way.
    pub fn unsubscribe(&mut self, channel_id: ChannelId, connection_open: bool) -> Option<OutboundFrame> {
        self.declined.insert(channel_id);
        let removed = self.desired.remove(&channel_id);
        if removed {
            tracing::debug!(channel_id, "subscription removed");
        }

        (removed && connection_open).then_some(OutboundFrame::Unsubscribe { channel_id })
    }

    /// One subscribe frame per desired channel, ascending by channel.
    ///
    /// Call exactly once per transition into Open.
    pub fn resubscribe_all(&self) -> Vec<OutboundFrame> {
        self.desired.iter().map(|&channel_id| OutboundFrame::Subscribe { channel_id }).collect()
    }

    /// Check if live messages for `channel_id` are wanted.
    pub fn is_desired(&self, channel_id: ChannelId) -> bool {
        self.desired.contains(&channel_id)
    }

    /// Desired channels, ascending.
    pub fn desired(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.desired.iter().copied()
    }

    /// Number of desired channels.
    pub fn len(&self) -> usize {
        self.desired.len()
    }

    /// Check if no channel is desired.
    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_while_open_emits_once() {
        let mut registry = SubscriptionRegistry::new();

        assert_eq!(registry.subscribe(1, true), Some(OutboundFrame::Subscribe { channel_id: 1 }));
        assert_eq!(registry.subscribe(1, true), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn subscribe_while_closed_is_recorded() {
        let mut registry = SubscriptionRegistry::new();

        assert_eq!(registry.subscribe(1, false), None);
        assert!(registry.is_desired(1));
    }

    #[test]
    fn replay_covers_desired_set_in_order() {
        let mut registry = SubscriptionRegistry::new();
        for id in [2, 1, 2, 1, 1] {
            registry.subscribe(id, false);
        }

        assert_eq!(registry.resubscribe_all(), vec![
            OutboundFrame::Subscribe { channel_id: 1 },
            OutboundFrame::Subscribe { channel_id: 2 },
        ]);
    }

    #[test]
    fn unsubscribe_removes_from_replay() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(1, false);
        registry.subscribe(2, false);

        assert_eq!(registry.unsubscribe(1, true), Some(OutboundFrame::Unsubscribe { channel_id: 1 }));
        assert_eq!(registry.unsubscribe(1, true), None);
        assert_eq!(registry.unsubscribe(2, false), None);

        assert!(registry.resubscribe_all().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn left_channel_ignores_listing_until_reopened() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe_listed(1, false);
        registry.subscribe_listed(2, false);
        registry.unsubscribe(2, true);

        assert_eq!(registry.subscribe_listed(2, true), None);
        assert_eq!(registry.resubscribe_all(), vec![OutboundFrame::Subscribe { channel_id: 1 }]);

        assert_eq!(registry.subscribe(2, true), Some(OutboundFrame::Subscribe { channel_id: 2 }));
        registry.unsubscribe(2, false);
        registry.subscribe(2, false);
        assert_eq!(registry.subscribe_listed(2, true), None);
        assert!(registry.is_desired(2));
    }
}
