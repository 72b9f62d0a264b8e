// Calendar tools

use super::{page_json, parse_args, respond};
use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{json_schema_boolean, json_schema_object, json_schema_string, Tool, ToolContext};
use anyhow::Result;
use dooray_sdk::api::{CreateEventRequest, EventQuery};
use dooray_sdk::DoorayClient;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Error result for the first field that is not RFC 3339 with an offset.
fn check_timestamps<'a>(fields: impl IntoIterator<Item = (&'a str, &'a String)>) -> Option<CallToolResult> {
    fields.into_iter().find_map(|(field, value)| {
        chrono::DateTime::parse_from_rfc3339(value).is_err().then(|| {
            CallToolResult::error(format!(
                "{} must be an ISO-8601 timestamp with offset, got '{}'",
                field, value
            ))
        })
    })
}

/// Tool to list calendars
pub struct CalendarListTool {
    client: Arc<DoorayClient>,
}

impl CalendarListTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for CalendarListTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_calendar_list".to_string(),
            description: "List the calendars you can access.".to_string(),
            input_schema: json_schema_object(json!({}), vec![]),
        }
    }

    async fn execute(&self, _arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        respond(self.client.calendar().list().await.map(page_json))
    }
}

/// Tool to read one calendar
pub struct CalendarDetailTool {
    client: Arc<DoorayClient>,
}

impl CalendarDetailTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct CalendarArgs {
    calendar_id: String,
}

#[async_trait::async_trait]
impl Tool for CalendarDetailTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_calendar_detail".to_string(),
            description: "Get the details of a calendar, including its members.".to_string(),
            input_schema: json_schema_object(
                json!({ "calendar_id": json_schema_string("Calendar ID") }),
                vec!["calendar_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: CalendarArgs = parse_args("dooray_calendar_detail", arguments)?;
        respond(self.client.calendar().calendar(&args.calendar_id).await)
    }
}

/// Tool to list events in a time window
pub struct CalendarEventsTool {
    client: Arc<DoorayClient>,
}

impl CalendarEventsTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct EventsArgs {
    time_min: String,
    time_max: String,
    calendar_ids: Option<String>,
    category: Option<String>,
}

#[async_trait::async_trait]
impl Tool for CalendarEventsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_calendar_events".to_string(),
            description: "List calendar events between time_min and time_max (ISO-8601 with offset, e.g. 2025-01-01T00:00:00+09:00).".to_string(),
            input_schema: json_schema_object(
                json!({
                    "time_min": json_schema_string("Window start, inclusive"),
                    "time_max": json_schema_string("Window end, exclusive"),
                    "calendar_ids": json_schema_string("Comma-separated calendar IDs (default: all)"),
                    "category": {
                        "type": "string",
                        "enum": ["general", "post", "milestone"],
                        "description": "Event category"
                    }
                }),
                vec!["time_min", "time_max"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: EventsArgs = parse_args("dooray_calendar_events", arguments)?;
        if let Some(invalid) = check_timestamps([("time_min", &args.time_min), ("time_max", &args.time_max)]) {
            return Ok(invalid);
        }

        let query = EventQuery {
            time_min: args.time_min,
            time_max: args.time_max,
            calendars: args.calendar_ids,
            post_type: None,
            category: args.category,
        };
        respond(self.client.calendar().events(&query).await.map(page_json))
    }
}

/// Tool to read one event
pub struct CalendarEventDetailTool {
    client: Arc<DoorayClient>,
}

impl CalendarEventDetailTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct EventArgs {
    calendar_id: String,
    event_id: String,
}

#[async_trait::async_trait]
impl Tool for CalendarEventDetailTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_calendar_event_detail".to_string(),
            description: "Get the details of a calendar event.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "calendar_id": json_schema_string("Calendar ID"),
                    "event_id": json_schema_string("Event ID")
                }),
                vec!["calendar_id", "event_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: EventArgs = parse_args("dooray_calendar_event_detail", arguments)?;
        respond(
            self.client
                .calendar()
                .event(&args.calendar_id, &args.event_id)
                .await,
        )
    }
}

/// Tool to schedule an event
pub struct CalendarCreateEventTool {
    client: Arc<DoorayClient>,
}

impl CalendarCreateEventTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct CreateEventArgs {
    calendar_id: String,
    subject: String,
    started_at: String,
    ended_at: String,
    content: Option<String>,
    location: Option<String>,
    #[serde(default)]
    whole_day_flag: bool,
}

#[async_trait::async_trait]
impl Tool for CalendarCreateEventTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_calendar_create_event".to_string(),
            description: "Create a calendar event such as a meeting or appointment. Times are ISO-8601 with offset, e.g. 2025-04-11T14:00:00+09:00.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "calendar_id": json_schema_string("Calendar to create the event in"),
                    "subject": {"type": "string", "minLength": 1, "description": "Event title"},
                    "content": json_schema_string("Event description"),
                    "started_at": json_schema_string("Start time"),
                    "ended_at": json_schema_string("End time"),
                    "location": json_schema_string("Location"),
                    "whole_day_flag": json_schema_boolean("All-day event (default: false)")
                }),
                vec!["calendar_id", "subject", "started_at", "ended_at"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: CreateEventArgs = parse_args("dooray_calendar_create_event", arguments)?;
        if let Some(invalid) = check_timestamps([("started_at", &args.started_at), ("ended_at", &args.ended_at)]) {
            return Ok(invalid);
        }

        let request = CreateEventRequest {
            subject: args.subject,
            started_at: args.started_at,
            ended_at: args.ended_at,
            whole_day_flag: args.whole_day_flag,
            content: args.content,
            location: args.location,
        };
        respond(self.client.calendar().create_event(&args.calendar_id, &request).await)
    }
}
