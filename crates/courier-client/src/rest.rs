//! HTTP implementation of the channel directory.

use courier_proto::{
    Channel, ChannelId, UserId,
    rest::{
        AddMemberRequest, CreateChannelRequest, CreateChannelResponse, CreateUserRequest,
        CreateUserResponse, HistoryRecord, UserLookup,
    },
};
use reqwest::{Response, StatusCode};

use crate::{directory::Directory, error::RequestFailed};

/// Longest error body kept in a [`RequestFailed::Status`].
const MAX_ERROR_BODY: usize = 256;

/// Directory backed by the relay's REST routes.
#[derive(Debug, Clone)]
pub struct RestDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl RestDirectory {
    /// Directory at `base_url`, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Directory using a preconfigured HTTP client.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Directory for RestDirectory {
    async fn fetch_channels(&self, user_id: UserId) -> Result<Vec<Channel>, RequestFailed> {
        let response = self
            .http
            .get(self.url("/my_channels"))
            .query(&[("user_id", user_id)])
            .send()
            .await
            .map_err(from_reqwest)?;

        // An empty list is serialized as null
        let channels: Option<Vec<Channel>> = decode(response).await?;
        Ok(channels.unwrap_or_default())
    }

    async fn fetch_messages(&self, channel_id: ChannelId) -> Result<Vec<HistoryRecord>, RequestFailed> {
        let response = self
            .http
            .get(self.url("/fetch_messages"))
            .query(&[("channel_id", channel_id)])
            .send()
            .await
            .map_err(from_reqwest)?;

        let records: Option<Vec<HistoryRecord>> = decode(response).await?;
        Ok(records.unwrap_or_default())
    }

    async fn create_channel(&self, request: CreateChannelRequest) -> Result<ChannelId, RequestFailed> {
        let response = self
            .http
            .post(self.url("/create_channel"))
            .json(&request)
            .send()
            .await
            .map_err(from_reqwest)?;

        let created: CreateChannelResponse = decode(response).await?;
        Ok(created.channel_id)
    }

    async fn create_user_if_not_exists(&self, username: String) -> Result<UserId, RequestFailed> {
        let response = self
            .http
            .get(self.url("/check_user"))
            .query(&[("username", username.as_str())])
            .send()
            .await
            .map_err(from_reqwest)?;

        let lookup: UserLookup = decode(response).await?;
        if lookup.exists {
            return lookup
                .id
                .ok_or_else(|| RequestFailed::Decode("existing user without id".to_string()));
        }

        tracing::info!(%username, "registering new user");
        let response = self
            .http
            .post(self.url("/users"))
            .json(&CreateUserRequest { username })
            .send()
            .await
            .map_err(from_reqwest)?;

        let created: CreateUserResponse = decode(response).await?;
        Ok(created.user_id)
    }

    async fn add_member(&self, channel_id: ChannelId, user_id: UserId) -> Result<(), RequestFailed> {
        let response = self
            .http
            .post(self.url(&format!("/channels/{channel_id}/members")))
            .json(&AddMemberRequest { user_id })
            .send()
            .await
            .map_err(from_reqwest)?;

        check_status(response).await.map(|_| ())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, RequestFailed> {
    check_status(response).await?.json().await.map_err(from_reqwest)
}

async fn check_status(response: Response) -> Result<Response, RequestFailed> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }

    Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> RequestFailed {
    RequestFailed::Status { status: status.as_u16(), body: body.trim().to_string() }
}

fn from_reqwest(err: reqwest::Error) -> RequestFailed {
    if err.is_decode() {
        RequestFailed::Decode(err.to_string())
    } else {
        RequestFailed::Network(err.to_string())
    }
}
