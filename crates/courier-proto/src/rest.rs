//! Request and response bodies for the REST collaborators.
//!
//! Field names follow the directory service's snake_case JSON.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ChannelId, ChannelType, UserId,
    errors::{ProtocolError, Result},
};

/// Placeholder name the directory stores for direct channels.
pub const DIRECT_CHANNEL_NAME: &str = "direct";

/// A stored message returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Storage row identifier (not used for deduplication)
    #[serde(default)]
    pub id: u64,
    /// Channel the message belongs to
    pub channel_id: ChannelId,
    /// Author of the message
    pub sender_id: UserId,
    /// Message body
    pub content: String,
    /// Server timestamp
    pub created_at: DateTime<Utc>,
}

/// Body of a channel creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChannelRequest {
    /// Direct or group
    pub channel_type: ChannelType,
    /// Group name; ignored for direct channels
    pub channel_name: String,
    /// Members, including the creator
    pub user_ids: Vec<UserId>,
}

impl CreateChannelRequest {
    /// Direct channel between two users.
    pub fn direct(a: UserId, b: UserId) -> Self {
        Self {
            channel_type: ChannelType::Direct,
            channel_name: DIRECT_CHANNEL_NAME.to_string(),
            user_ids: vec![a, b],
        }
    }

    /// Named group channel.
    pub fn group(name: impl Into<String>, user_ids: Vec<UserId>) -> Self {
        Self { channel_type: ChannelType::Group, channel_name: name.into(), user_ids }
    }

    /// Make sure `user` is a member, appending it if absent.
    #[must_use]
    pub fn including(mut self, user: UserId) -> Self {
        if !self.user_ids.contains(&user) {
            self.user_ids.push(user);
        }
        self
    }

    /// Check the directory's creation rules locally.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if a direct channel does not have exactly two
    ///   distinct members
    /// - `InvalidRequest` if a group channel has no name or fewer than two
    ///   distinct members
    pub fn validate(&self) -> Result<()> {
        let distinct: BTreeSet<UserId> = self.user_ids.iter().copied().collect();

        match self.channel_type {
            ChannelType::Direct if distinct.len() != 2 => Err(ProtocolError::InvalidRequest(
                format!("direct channel requires exactly two users, got {}", distinct.len()),
            )),
            ChannelType::Group if self.channel_name.trim().is_empty() => {
                Err(ProtocolError::InvalidRequest("group channel requires a name".to_string()))
            },
            ChannelType::Group if distinct.len() < 2 => Err(ProtocolError::InvalidRequest(
                format!("group channel requires at least two users, got {}", distinct.len()),
            )),
            ChannelType::Direct | ChannelType::Group => Ok(()),
        }
    }
}

/// Response to a channel creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChannelResponse {
    /// Identifier of the new channel
    pub channel_id: ChannelId,
}

/// Response of the user existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLookup {
    /// Whether the username is registered
    pub exists: bool,
    /// User identifier when it exists
    #[serde(default)]
    pub id: Option<UserId>,
}

/// Body of a user creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserRequest {
    /// Requested username
    pub username: String,
}

/// Response to a user creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserResponse {
    /// Identifier of the new user
    pub user_id: UserId,
}

/// Body of an add-member request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMemberRequest {
    /// User to add
    pub user_id: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_requires_two_distinct_users() {
        assert!(CreateChannelRequest::direct(1, 2).validate().is_ok());
        assert!(CreateChannelRequest::direct(1, 1).validate().is_err());
    }

    #[test]
    fn group_requires_name_and_members() {
        assert!(CreateChannelRequest::group("ops", vec![1, 2]).validate().is_ok());
        assert!(CreateChannelRequest::group(" ", vec![1, 2]).validate().is_err());
        assert!(CreateChannelRequest::group("ops", vec![1]).validate().is_err());
    }

    #[test]
    fn including_adds_creator_once() {
        let request = CreateChannelRequest::group("ops", vec![2]).including(1).including(1);
        assert_eq!(request.user_ids, vec![2, 1]);
    }

    #[test]
    fn user_lookup_without_id() {
        let lookup: UserLookup = serde_json::from_str(r#"{"exists":false}"#).unwrap();
        assert!(!lookup.exists);
        assert_eq!(lookup.id, None);
    }
}
