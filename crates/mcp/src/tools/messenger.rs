// Messenger tools: member lookup, channels and messages

use super::{page_json, paging, paging_properties, parse_args, respond, with_properties};
use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{json_schema_array, json_schema_object, json_schema_string, Tool, ToolContext};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use dooray_sdk::api::{CreateChannelRequest, MemberQuery};
use dooray_sdk::{DoorayClient, Page, Paging};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

fn message_text_schema() -> Value {
    json!({"type": "string", "minLength": 1, "description": "Message text"})
}

fn channel_list_properties() -> Value {
    with_properties(
        paging_properties(),
        json!({
            "recent_months": {
                "type": "integer",
                "minimum": 1,
                "description": "Only channels updated within this many months (30-day months)"
            }
        }),
    )
}

/// Keep the channels whose `updatedAt` falls within the last `months` 30-day
/// months of `now`. Channels without a parseable timestamp are dropped, and
/// `totalCount` becomes the filtered count.
fn updated_within(page: Page, months: u32, now: DateTime<Utc>) -> Page {
    let cutoff = now - Duration::days(i64::from(months) * 30);
    let before = page.items.len();
    let items: Vec<Value> = page
        .items
        .into_iter()
        .filter(|channel| {
            let updated = channel.get("updatedAt").and_then(Value::as_str);
            match updated.map(DateTime::parse_from_rfc3339) {
                Some(Ok(at)) => at.with_timezone(&Utc) > cutoff,
                Some(Err(e)) => {
                    tracing::warn!(channel_id = ?channel.get("id"), error = %e, "Unparseable channel updatedAt");
                    false
                }
                None => false,
            }
        })
        .collect();

    tracing::debug!(before, after = items.len(), months, "Filtered channels by last update");
    Page {
        total_count: Some(items.len() as u64),
        items,
    }
}

/// The summary fields of a channel plus its participant count.
fn simplify_channel(channel: &Value) -> Value {
    let participants = channel
        .pointer("/users/participants")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    json!({
        "id": channel.get("id"),
        "title": channel.get("title"),
        "type": channel.get("type"),
        "status": channel.get("status"),
        "updatedAt": channel.get("updatedAt"),
        "participantCount": participants,
    })
}

/// Tool to search organization members
pub struct MessengerSearchMembersTool {
    client: Arc<DoorayClient>,
}

impl MessengerSearchMembersTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct SearchMembersArgs {
    name: Option<String>,
    email: Option<String>,
    user_code: Option<String>,
    page: Option<u32>,
    size: Option<u32>,
}

#[async_trait::async_trait]
impl Tool for MessengerSearchMembersTool {
    fn schema(&self) -> ToolSchema {
        let properties = with_properties(
            json!({
                "name": json_schema_string("Member name"),
                "email": json_schema_string("E-mail address (comma-separated for several)"),
                "user_code": json_schema_string("Organization user code")
            }),
            paging_properties(),
        );

        ToolSchema {
            name: "dooray_messenger_search_members".to_string(),
            description: "Search organization members by name, e-mail or user code. The returned ids are used for direct messages.".to_string(),
            input_schema: json_schema_object(properties, vec![]),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: SearchMembersArgs = parse_args("dooray_messenger_search_members", arguments)?;
        if args.name.is_none() && args.email.is_none() && args.user_code.is_none() {
            return Ok(CallToolResult::error(
                "Provide at least one of name, email or user_code",
            ));
        }

        let query = MemberQuery {
            name: args.name,
            external_email_addresses: args.email,
            user_code: args.user_code,
            page: args.page,
            size: args.size,
        };
        let members = self.client.messenger().search_members(&query).await;
        respond(members.map(page_json))
    }
}

/// Tool to list joined channels
pub struct MessengerGetChannelsTool {
    client: Arc<DoorayClient>,
}

impl MessengerGetChannelsTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelsArgs {
    page: Option<u32>,
    size: Option<u32>,
    recent_months: Option<u32>,
}

/// Fetch one page of channels, narrowed to `recent_months` when given.
async fn list_channels(client: &DoorayClient, paging: Paging, recent_months: Option<u32>) -> dooray_sdk::DoorayResult<Page> {
    let page = client.messenger().channels(paging).await?;
    Ok(match recent_months {
        Some(months) => updated_within(page, months, Utc::now()),
        None => page,
    })
}

#[async_trait::async_trait]
impl Tool for MessengerGetChannelsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_messenger_get_channels".to_string(),
            description: "List messenger channels you have joined, optionally only those updated in the last N months.".to_string(),
            input_schema: json_schema_object(channel_list_properties(), vec![]),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: ChannelsArgs = parse_args("dooray_messenger_get_channels", arguments)?;
        let channels = list_channels(&self.client, paging(args.page, args.size), args.recent_months).await;
        respond(channels.map(page_json))
    }
}

/// Tool to list channels with only their summary fields
pub struct MessengerGetSimpleChannelsTool {
    client: Arc<DoorayClient>,
}

impl MessengerGetSimpleChannelsTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for MessengerGetSimpleChannelsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_messenger_get_simple_channels".to_string(),
            description: "List joined channels with only id, title, type, status, updatedAt and participant count.".to_string(),
            input_schema: json_schema_object(channel_list_properties(), vec![]),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: ChannelsArgs = parse_args("dooray_messenger_get_simple_channels", arguments)?;
        let paging = Paging::new(args.page.unwrap_or(0), args.size.unwrap_or(50));
        let channels = list_channels(&self.client, paging, args.recent_months).await;
        respond(channels.map(|page| {
            page_json(Page {
                items: page.items.iter().map(simplify_channel).collect(),
                total_count: page.total_count,
            })
        }))
    }
}

/// Tool to read one channel. Dooray has no single-channel endpoint, so this
/// looks the id up in the joined channel list.
pub struct MessengerGetChannelTool {
    client: Arc<DoorayClient>,
}

impl MessengerGetChannelTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelArgs {
    channel_id: String,
}

#[async_trait::async_trait]
impl Tool for MessengerGetChannelTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_messenger_get_channel".to_string(),
            description: "Get the full details of a joined channel, including its members.".to_string(),
            input_schema: json_schema_object(
                json!({ "channel_id": json_schema_string("Channel ID") }),
                vec!["channel_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: ChannelArgs = parse_args("dooray_messenger_get_channel", arguments)?;
        let page = match self.client.messenger().channels(Paging::default()).await {
            Ok(page) => page,
            Err(e) if e.is_api_error() => return Ok(CallToolResult::error(e.to_string())),
            Err(e) => return Err(e.into()),
        };

        let found = page
            .items
            .into_iter()
            .find(|channel| channel.get("id").and_then(Value::as_str) == Some(args.channel_id.as_str()));
        match found {
            Some(channel) => Ok(CallToolResult::json(&channel)),
            None => {
                tracing::warn!(channel_id = %args.channel_id, "Channel not found");
                Ok(CallToolResult::error(format!("Channel not found: {}", args.channel_id)))
            }
        }
    }
}

/// Tool to open a new channel
pub struct MessengerCreateChannelTool {
    client: Arc<DoorayClient>,
}

impl MessengerCreateChannelTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct CreateChannelArgs {
    #[serde(rename = "type")]
    kind: String,
    title: String,
    member_ids: Vec<String>,
    capacity: Option<String>,
    id_type: Option<String>,
}

#[async_trait::async_trait]
impl Tool for MessengerCreateChannelTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_messenger_create_channel".to_string(),
            description: "Create a private or direct messenger channel and invite members.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "type": {"type": "string", "enum": ["private", "direct"], "description": "Channel type"},
                    "title": {"type": "string", "minLength": 1, "description": "Channel title"},
                    "member_ids": json_schema_array(json!({"type": "string"}), "Members to invite"),
                    "capacity": json_schema_string("Maximum number of members"),
                    "id_type": {
                        "type": "string",
                        "enum": ["email", "memberId"],
                        "description": "How member_ids are given (default: memberId)"
                    }
                }),
                vec!["type", "title", "member_ids"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: CreateChannelArgs = parse_args("dooray_messenger_create_channel", arguments)?;
        let request = CreateChannelRequest {
            kind: args.kind,
            title: args.title,
            member_ids: args.member_ids,
            capacity: args.capacity,
        };
        respond(
            self.client
                .messenger()
                .create_channel(&request, args.id_type.as_deref())
                .await,
        )
    }
}

/// Tool to post into a channel
pub struct MessengerSendChannelMessageTool {
    client: Arc<DoorayClient>,
}

impl MessengerSendChannelMessageTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelMessageArgs {
    channel_id: String,
    text: String,
}

#[async_trait::async_trait]
impl Tool for MessengerSendChannelMessageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_messenger_send_channel_message".to_string(),
            description: "Send a message to a messenger channel.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "channel_id": json_schema_string("Channel ID"),
                    "text": message_text_schema()
                }),
                vec!["channel_id", "text"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: ChannelMessageArgs = parse_args("dooray_messenger_send_channel_message", arguments)?;
        respond(
            self.client
                .messenger()
                .send_channel_message(&args.channel_id, &args.text)
                .await,
        )
    }
}

/// Tool to send a direct message
pub struct MessengerSendDirectMessageTool {
    client: Arc<DoorayClient>,
}

impl MessengerSendDirectMessageTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct DirectMessageArgs {
    organization_member_id: String,
    text: String,
}

#[async_trait::async_trait]
impl Tool for MessengerSendDirectMessageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_messenger_send_direct_message".to_string(),
            description: "Send a one-to-one message to an organization member.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "organization_member_id": json_schema_string("Recipient member ID (see dooray_messenger_search_members)"),
                    "text": message_text_schema()
                }),
                vec!["organization_member_id", "text"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: DirectMessageArgs = parse_args("dooray_messenger_send_direct_message", arguments)?;
        respond(
            self.client
                .messenger()
                .send_direct_message(&args.organization_member_id, &args.text)
                .await,
        )
    }
}
