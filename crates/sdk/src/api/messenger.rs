//! Messenger and member directory endpoints.

use crate::client::DoorayClient;
use crate::error::DoorayResult;
use crate::types::{Page, Paging};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Messenger API for channels, messages and member lookup.
pub struct MessengerApi<'a> {
    client: &'a DoorayClient,
}

impl<'a> MessengerApi<'a> {
    pub(crate) fn new(client: &'a DoorayClient) -> Self {
        Self { client }
    }

    /// Search organization members.
    pub async fn search_members(&self, query: &MemberQuery) -> DoorayResult<Page> {
        let response = self
            .client
            .http
            .get_with_query(&["common", "v1", "members"], query)
            .await?;
        Ok(response.into_page())
    }

    /// List channels the token owner has joined.
    pub async fn channels(&self, paging: Paging) -> DoorayResult<Page> {
        let response = self
            .client
            .http
            .get_with_query(&["messenger", "v1", "channels"], &paging)
            .await?;
        Ok(response.into_page())
    }

    /// Create a channel. `id_type` says how `member_ids` are spelled
    /// (`email` or `memberId`); Dooray assumes member ids when absent.
    pub async fn create_channel(
        &self,
        request: &CreateChannelRequest,
        id_type: Option<&str>,
    ) -> DoorayResult<Value> {
        let query = CreateChannelQuery { id_type };
        let response = self
            .client
            .http
            .post_with_query(&["messenger", "v1", "channels"], &query, request)
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// Post a message to a channel.
    pub async fn send_channel_message(&self, channel_id: &str, text: &str) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .post(
                &["messenger", "v1", "channels", channel_id, "logs"],
                &json!({ "text": text }),
            )
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// Send a one-to-one message to an organization member.
    pub async fn send_direct_message(
        &self,
        organization_member_id: &str,
        text: &str,
    ) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .post(
                &["messenger", "v1", "channels", "direct-send"],
                &json!({ "text": text, "organizationMemberId": organization_member_id }),
            )
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateChannelQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id_type: Option<&'a str>,
}

/// Request to create a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelRequest {
    /// `private` or `direct`.
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub member_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
}

/// Member search filter. At least one criterion should be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Comma-separated e-mail addresses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_email_addresses: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}
