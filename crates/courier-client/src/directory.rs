//! Channel directory collaborator.
//!
//! The directory is the REST side of the system: channel lists, message
//! history, channel creation and user lookup. The controller never calls it
//! directly; it emits fetch actions and the runtime feeds results back as
//! events.

use std::future::Future;

use courier_proto::{
    Channel, ChannelId, UserId,
    rest::{CreateChannelRequest, HistoryRecord},
};

use crate::error::RequestFailed;

/// Abstracts the directory service.
///
/// # Implementations
///
/// - **REST**: `rest::RestDirectory` behind the `rest` feature
/// - **Simulation**: an in-memory directory with injectable failures
pub trait Directory: Clone + Send + Sync + 'static {
    /// Channels `user_id` belongs to.
    fn fetch_channels(&self, user_id: UserId) -> impl Future<Output = Result<Vec<Channel>, RequestFailed>> + Send;

    /// Stored messages of `channel_id`, oldest first.
    fn fetch_messages(
        &self,
        channel_id: ChannelId,
    ) -> impl Future<Output = Result<Vec<HistoryRecord>, RequestFailed>> + Send;

    /// Create a channel. Returns the new channel's identifier.
    fn create_channel(
        &self,
        request: CreateChannelRequest,
    ) -> impl Future<Output = Result<ChannelId, RequestFailed>> + Send;

    /// Look up `username`, registering it when absent. Returns its identifier.
    fn create_user_if_not_exists(
        &self,
        username: String,
    ) -> impl Future<Output = Result<UserId, RequestFailed>> + Send;

    /// Add `user_id` to `channel_id`.
    fn add_member(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> impl Future<Output = Result<(), RequestFailed>> + Send;
}
