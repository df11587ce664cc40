//! Per-channel message log.
//!
//! Reconciles the two sources of messages (bulk history fetches and the live
//! push stream) into one ordered, deduplicated view per channel. Without a
//! server-assigned sequence number, identity is the [`DedupeKey`] tuple.
//!
//! # Invariants
//!
//! - A view never holds two entries with the same dedupe key
//! - Entries are ordered by `created_at` ascending; ties keep arrival order
//! - The first copy of a message wins: history never overwrites a live
//!   arrival and vice versa
//!
//! Checked after every mutation in debug builds and exposed as
//! [`MessageStore::check_invariants`].

use std::collections::{HashMap, HashSet};

use courier_core::{DedupeKey, Message};
use courier_proto::ChannelId;
use thiserror::Error;

/// Message store configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum messages kept per channel. `None` keeps everything for the
    /// session; otherwise the oldest entries are evicted first.
    pub max_per_channel: Option<usize>,
}

/// Broken store invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreViolation {
    /// Two entries share a dedupe key.
    #[error("channel {channel_id}: duplicate entry at index {index}")]
    Duplicate {
        /// Affected channel
        channel_id: ChannelId,
        /// Index of the second copy
        index: usize,
    },

    /// An entry is older than its predecessor.
    #[error("channel {channel_id}: entry {index} is out of order")]
    OutOfOrder {
        /// Affected channel
        channel_id: ChannelId,
        /// Index of the misplaced entry
        index: usize,
    },

    /// An entry sits in the wrong channel's view.
    #[error("channel {channel_id}: entry {index} belongs to channel {actual}")]
    WrongChannel {
        /// View holding the entry
        channel_id: ChannelId,
        /// Index of the entry
        index: usize,
        /// Channel the entry names
        actual: ChannelId,
    },

    /// Key index and entries disagree.
    #[error("channel {channel_id}: {keys} keys for {entries} entries")]
    IndexMismatch {
        /// Affected channel
        channel_id: ChannelId,
        /// Size of the key index
        keys: usize,
        /// Number of entries
        entries: usize,
    },

    /// More entries than the configured cap.
    #[error("channel {channel_id}: {entries} entries exceed cap {cap}")]
    OverCap {
        /// Affected channel
        channel_id: ChannelId,
        /// Number of entries
        entries: usize,
        /// Configured cap
        cap: usize,
    },
}

/// Outcome of a history merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// New entries added to the view
    pub inserted: usize,
    /// Entries already present (kept as they were)
    pub duplicates: usize,
    /// Entries naming a different channel (dropped)
    pub rejected: usize,
}

/// Ordered, deduplicated messages of one channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelView {
    messages: Vec<Message>,
    keys: HashSet<DedupeKey>,
}

impl ChannelView {
    /// Entries, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Check if a message with this key is stored.
    pub fn contains(&self, key: &DedupeKey) -> bool {
        self.keys.contains(key)
    }

    /// Insert at the `created_at` position, after existing entries with the
    /// same timestamp. Returns false for a duplicate.
    fn insert(&mut self, message: Message) -> bool {
        if !self.keys.insert(message.key()) {
            return false;
        }

        let index = self.messages.partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(index, message);
        true
    }

    fn evict_oldest(&mut self, cap: usize) -> usize {
        let excess = self.messages.len().saturating_sub(cap);
        for message in self.messages.drain(..excess) {
            self.keys.remove(&message.key());
        }
        excess
    }

    fn check(&self, channel_id: ChannelId, cap: Option<usize>) -> Result<(), StoreViolation> {
        let mut seen = HashSet::with_capacity(self.messages.len());

        for (index, message) in self.messages.iter().enumerate() {
            if message.channel_id != channel_id {
                return Err(StoreViolation::WrongChannel { channel_id, index, actual: message.channel_id });
            }
            if !seen.insert(message.key()) {
                return Err(StoreViolation::Duplicate { channel_id, index });
            }
            if index > 0 && self.messages[index - 1].created_at > message.created_at {
                return Err(StoreViolation::OutOfOrder { channel_id, index });
            }
        }

        if seen != self.keys {
            return Err(StoreViolation::IndexMismatch {
                channel_id,
                keys: self.keys.len(),
                entries: self.messages.len(),
            });
        }

        match cap {
            Some(cap) if self.messages.len() > cap => {
                Err(StoreViolation::OverCap { channel_id, entries: self.messages.len(), cap })
            },
            _ => Ok(()),
        }
    }
}

/// Message log for every channel of a session.
///
/// Mutated only through [`merge_history`](Self::merge_history),
/// [`append_live`](Self::append_live) and [`clear`](Self::clear); read-only
/// to the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    config: StoreConfig,
    channels: HashMap<ChannelId, ChannelView>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new(config: StoreConfig) -> Self {
        Self { config, channels: HashMap::new() }
    }

    /// Merge a history batch into `channel_id`'s view.
    ///
    /// Entries already present are kept as they are. Entries naming another
    /// channel are dropped with a warning.
    pub fn merge_history(&mut self, channel_id: ChannelId, messages: Vec<Message>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let view = self.channels.entry(channel_id).or_default();

        for message in messages {
            if message.channel_id != channel_id {
                tracing::warn!(
                    channel_id,
                    actual = message.channel_id,
                    "dropping history entry for another channel"
                );
                outcome.rejected += 1;
                continue;
            }

            if view.insert(message) {
                outcome.inserted += 1;
            } else {
                outcome.duplicates += 1;
            }
        }

        self.enforce_cap(channel_id);
        self.debug_check(channel_id);

        tracing::debug!(
            channel_id,
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            "history merged"
        );
        outcome
    }

    /// Insert one live message. Returns false if it was a duplicate.
    pub fn append_live(&mut self, message: Message) -> bool {
        let channel_id = message.channel_id;
        let inserted = self.channels.entry(channel_id).or_default().insert(message);

        if inserted {
            self.enforce_cap(channel_id);
            self.debug_check(channel_id);
        } else {
            tracing::debug!(channel_id, "duplicate live message ignored");
        }
        inserted
    }

    /// Ordered entries of `channel_id`. Empty if nothing is stored.
    pub fn view(&self, channel_id: ChannelId) -> &[Message] {
        self.channels.get(&channel_id).map(ChannelView::messages).unwrap_or_default()
    }

    /// The view of `channel_id`, if anything was ever stored for it.
    pub fn channel(&self, channel_id: ChannelId) -> Option<&ChannelView> {
        self.channels.get(&channel_id)
    }

    /// Number of entries stored for `channel_id`.
    pub fn len(&self, channel_id: ChannelId) -> usize {
        self.channels.get(&channel_id).map_or(0, ChannelView::len)
    }

    /// Check if no message is stored at all.
    pub fn is_empty(&self) -> bool {
        self.channels.values().all(ChannelView::is_empty)
    }

    /// Channels with a view, in no particular order.
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.keys().copied()
    }

    /// Evict one channel, or everything when `channel_id` is `None`.
    pub fn clear(&mut self, channel_id: Option<ChannelId>) {
        match channel_id {
            Some(channel_id) => {
                self.channels.remove(&channel_id);
            },
            None => self.channels.clear(),
        }
    }

    /// Verify every view against the store invariants.
    pub fn check_invariants(&self) -> Result<(), StoreViolation> {
        self.channels.iter().try_for_each(|(&channel_id, view)| {
            view.check(channel_id, self.config.max_per_channel)
        })
    }

    fn enforce_cap(&mut self, channel_id: ChannelId) {
        let Some(cap) = self.config.max_per_channel else {
            return;
        };

        if let Some(view) = self.channels.get_mut(&channel_id) {
            let evicted = view.evict_oldest(cap);
            if evicted > 0 {
                tracing::debug!(channel_id, evicted, cap, "evicted oldest messages");
            }
        }
    }

    fn debug_check(&self, channel_id: ChannelId) {
        if cfg!(debug_assertions)
            && let Some(view) = self.channels.get(&channel_id)
        {
            let result = view.check(channel_id, self.config.max_per_channel);
            debug_assert!(result.is_ok(), "store invariant broken: {result:?}");
        }
    }
}
