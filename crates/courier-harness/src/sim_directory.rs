//! In-memory channel directory.
//!
//! Holds channels, memberships, users and history the way the REST service
//! would, and lets tests fail the next N calls of a given operation.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use courier_client::{Directory, RequestFailed};
use courier_proto::{
    Channel, ChannelId, ChannelType, UserId,
    rest::{CreateChannelRequest, DIRECT_CHANNEL_NAME, HistoryRecord},
};

use crate::sim_driver::relay_epoch;

/// Directory operation, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryOp {
    /// `fetch_channels`
    FetchChannels,
    /// `fetch_messages`
    FetchMessages,
    /// `create_channel`
    CreateChannel,
    /// `create_user_if_not_exists`
    CreateUser,
    /// `add_member`
    AddMember,
}

#[derive(Default)]
struct DirectoryState {
    channels: BTreeMap<ChannelId, Channel>,
    members: BTreeMap<ChannelId, BTreeSet<UserId>>,
    history: HashMap<ChannelId, Vec<HistoryRecord>>,
    users: BTreeMap<String, UserId>,
    failures: HashMap<DirectoryOp, u32>,
    calls: HashMap<DirectoryOp, u32>,
    next_record: u64,
}

impl DirectoryState {
    /// Count the call and consume one injected failure, if any.
    fn enter(&mut self, op: DirectoryOp) -> Result<(), RequestFailed> {
        *self.calls.entry(op).or_default() += 1;

        match self.failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(RequestFailed::Status { status: 503, body: "unavailable".to_string() })
            },
            _ => Ok(()),
        }
    }

    fn next_channel_id(&self) -> ChannelId {
        self.channels.keys().next_back().map_or(1, |id| id + 1)
    }
}

/// In-memory [`Directory`] shared between a test and its runtime.
#[derive(Clone, Default)]
pub struct SimDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl SimDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group channel with `members`.
    pub fn add_channel(&self, id: ChannelId, name: &str, members: &[UserId]) -> Channel {
        let channel = Channel { id, name: name.to_string(), kind: ChannelType::Group, created_at: relay_epoch() };
        let mut state = self.lock();
        state.channels.insert(id, channel.clone());
        state.members.entry(id).or_default().extend(members.iter().copied());
        channel
    }

    /// Append a stored message to a channel's history.
    pub fn add_history(&self, channel_id: ChannelId, sender_id: UserId, content: &str, created_at: DateTime<Utc>) {
        let mut state = self.lock();
        state.next_record += 1;
        let id = state.next_record;
        state.history.entry(channel_id).or_default().push(HistoryRecord {
            id,
            channel_id,
            sender_id,
            content: content.to_string(),
            created_at,
        });
    }

    /// Fail the next `count` calls of `op` with a 503.
    pub fn fail_next(&self, op: DirectoryOp, count: u32) {
        self.lock().failures.insert(op, count);
    }

    /// Calls of `op` so far, failed ones included.
    pub fn calls(&self, op: DirectoryOp) -> u32 {
        self.lock().calls.get(&op).copied().unwrap_or_default()
    }

    /// Members of a channel.
    pub fn members(&self, channel_id: ChannelId) -> Vec<UserId> {
        self.lock().members.get(&channel_id).map(|m| m.iter().copied().collect()).unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Directory for SimDirectory {
    async fn fetch_channels(&self, user_id: UserId) -> Result<Vec<Channel>, RequestFailed> {
        let mut state = self.lock();
        state.enter(DirectoryOp::FetchChannels)?;

        let channels = state
            .channels
            .values()
            .filter(|c| state.members.get(&c.id).is_some_and(|m| m.contains(&user_id)))
            .cloned()
            .collect();
        Ok(channels)
    }

    async fn fetch_messages(&self, channel_id: ChannelId) -> Result<Vec<HistoryRecord>, RequestFailed> {
        let mut state = self.lock();
        state.enter(DirectoryOp::FetchMessages)?;

        let mut records = state.history.get(&channel_id).cloned().unwrap_or_default();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn create_channel(&self, request: CreateChannelRequest) -> Result<ChannelId, RequestFailed> {
        let mut state = self.lock();
        state.enter(DirectoryOp::CreateChannel)?;

        if let Err(error) = request.validate() {
            return Err(RequestFailed::Status { status: 400, body: error.to_string() });
        }

        let id = state.next_channel_id();
        let name = match request.channel_type {
            ChannelType::Direct => DIRECT_CHANNEL_NAME.to_string(),
            ChannelType::Group => request.channel_name,
        };
        state
            .channels
            .insert(id, Channel { id, name, kind: request.channel_type, created_at: relay_epoch() });
        state.members.insert(id, request.user_ids.into_iter().collect());
        Ok(id)
    }

    async fn create_user_if_not_exists(&self, username: String) -> Result<UserId, RequestFailed> {
        let mut state = self.lock();
        state.enter(DirectoryOp::CreateUser)?;

        let next = state.users.len() as UserId + 1;
        Ok(*state.users.entry(username).or_insert(next))
    }

    async fn add_member(&self, channel_id: ChannelId, user_id: UserId) -> Result<(), RequestFailed> {
        let mut state = self.lock();
        state.enter(DirectoryOp::AddMember)?;

        let Some(members) = state.members.get_mut(&channel_id) else {
            return Err(RequestFailed::Status { status: 404, body: "channel not found".to_string() });
        };
        members.insert(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_member_channels() {
        let directory = SimDirectory::new();
        directory.add_channel(1, "ops", &[7, 8]);
        directory.add_channel(2, "dev", &[8]);

        let ids: Vec<_> = directory.fetch_channels(7).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let directory = SimDirectory::new();
        directory.fail_next(DirectoryOp::FetchChannels, 2);

        assert!(directory.fetch_channels(7).await.is_err());
        assert!(directory.fetch_channels(7).await.is_err());
        assert!(directory.fetch_channels(7).await.is_ok());
        assert_eq!(directory.calls(DirectoryOp::FetchChannels), 3);
    }

    #[tokio::test]
    async fn users_are_registered_once() {
        let directory = SimDirectory::new();

        let alice = directory.create_user_if_not_exists("alice".into()).await.unwrap();
        let bob = directory.create_user_if_not_exists("bob".into()).await.unwrap();
        assert_ne!(alice, bob);
        assert_eq!(directory.create_user_if_not_exists("alice".into()).await.unwrap(), alice);
    }

    #[tokio::test]
    async fn direct_channels_get_placeholder_name() {
        let directory = SimDirectory::new();
        let id = directory.create_channel(CreateChannelRequest::direct(7, 8)).await.unwrap();

        let channels = directory.fetch_channels(8).await.unwrap();
        assert_eq!(channels[0].id, id);
        assert_eq!(channels[0].name, DIRECT_CHANNEL_NAME);
        assert_eq!(directory.members(id), vec![7, 8]);
    }
}
