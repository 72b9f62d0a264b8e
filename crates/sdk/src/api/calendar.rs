//! Calendar API endpoints.

use crate::client::DoorayClient;
use crate::error::DoorayResult;
use crate::types::Page;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Calendar API for calendars and their events.
pub struct CalendarApi<'a> {
    client: &'a DoorayClient,
}

impl<'a> CalendarApi<'a> {
    pub(crate) fn new(client: &'a DoorayClient) -> Self {
        Self { client }
    }

    /// List calendars visible to the token owner.
    pub async fn list(&self) -> DoorayResult<Page> {
        let response = self
            .client
            .http
            .get(&["calendar", "v1", "calendars"])
            .await?;
        Ok(response.into_page())
    }

    /// Get a single calendar.
    pub async fn calendar(&self, calendar_id: &str) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .get(&["calendar", "v1", "calendars", calendar_id])
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// List events across calendars in a time window.
    pub async fn events(&self, query: &EventQuery) -> DoorayResult<Page> {
        let response = self
            .client
            .http
            .get_with_query(&["calendar", "v1", "calendars", "*", "events"], query)
            .await?;
        Ok(response.into_page())
    }

    /// Get a single event.
    pub async fn event(&self, calendar_id: &str, event_id: &str) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .get(&["calendar", "v1", "calendars", calendar_id, "events", event_id])
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// Create an event in a calendar.
    pub async fn create_event(&self, calendar_id: &str, request: &CreateEventRequest) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .post(&["calendar", "v1", "calendars", calendar_id, "events"], request)
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }
}

/// Event listing window. Times are ISO-8601 with offset, e.g.
/// `2025-01-01T00:00:00+09:00`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    pub time_min: String,
    pub time_max: String,
    /// Comma-separated calendar ids; all calendars when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendars: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Request to create an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub subject: String,
    pub started_at: String,
    pub ended_at: String,
    #[serde(default)]
    pub whole_day_flag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}
