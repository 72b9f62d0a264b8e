pub mod calendar;
pub mod messenger;
pub mod project;
pub(crate) mod registry;
pub mod schema;
pub mod wiki;

pub use calendar::{
    CalendarCreateEventTool, CalendarDetailTool, CalendarEventDetailTool, CalendarEventsTool,
    CalendarListTool,
};
pub use messenger::{
    MessengerCreateChannelTool, MessengerGetChannelTool, MessengerGetChannelsTool,
    MessengerGetSimpleChannelsTool, MessengerSearchMembersTool, MessengerSendChannelMessageTool,
    MessengerSendDirectMessageTool,
};
pub use project::{
    ProjectCreateCommentTool, ProjectCreatePostTool, ProjectDeleteCommentTool, ProjectExportPostsTool,
    ProjectGetCommentsTool, ProjectGetPostTool, ProjectListPostsTool, ProjectListProjectsTool,
    ProjectSetPostDoneTool, ProjectSetWorkflowTool, ProjectUpdateCommentTool, ProjectUpdatePostTool,
};
pub use registry::{
    json_schema_array, json_schema_boolean, json_schema_integer, json_schema_number,
    json_schema_object, json_schema_string, Tool, ToolContext, ToolRegistry,
};
pub use wiki::{WikiCreatePageTool, WikiGetPageTool, WikiListPagesTool, WikiListProjectsTool, WikiUpdatePageTool};

use crate::error::McpError;
use crate::protocol::CallToolResult;
use anyhow::{Context, Result};
use dooray_sdk::{DoorayClient, DoorayResult, Page};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

/// Register every Dooray tool, in the order `tools/list` reports them.
pub fn register_all(registry: &mut ToolRegistry, client: Arc<DoorayClient>) -> Result<(), McpError> {
    let tools: Vec<Arc<dyn Tool>> = vec![
        // Wiki
        Arc::new(WikiListProjectsTool::new(client.clone())),
        Arc::new(WikiListPagesTool::new(client.clone())),
        Arc::new(WikiGetPageTool::new(client.clone())),
        Arc::new(WikiCreatePageTool::new(client.clone())),
        Arc::new(WikiUpdatePageTool::new(client.clone())),
        // Project
        Arc::new(ProjectListProjectsTool::new(client.clone())),
        Arc::new(ProjectListPostsTool::new(client.clone())),
        Arc::new(ProjectGetPostTool::new(client.clone())),
        Arc::new(ProjectCreatePostTool::new(client.clone())),
        Arc::new(ProjectUpdatePostTool::new(client.clone())),
        Arc::new(ProjectSetWorkflowTool::new(client.clone())),
        Arc::new(ProjectSetPostDoneTool::new(client.clone())),
        Arc::new(ProjectCreateCommentTool::new(client.clone())),
        Arc::new(ProjectGetCommentsTool::new(client.clone())),
        Arc::new(ProjectUpdateCommentTool::new(client.clone())),
        Arc::new(ProjectDeleteCommentTool::new(client.clone())),
        Arc::new(ProjectExportPostsTool::new(client.clone())),
        // Messenger
        Arc::new(MessengerSearchMembersTool::new(client.clone())),
        Arc::new(MessengerSendDirectMessageTool::new(client.clone())),
        Arc::new(MessengerGetChannelsTool::new(client.clone())),
        Arc::new(MessengerGetSimpleChannelsTool::new(client.clone())),
        Arc::new(MessengerGetChannelTool::new(client.clone())),
        Arc::new(MessengerCreateChannelTool::new(client.clone())),
        Arc::new(MessengerSendChannelMessageTool::new(client.clone())),
        // Calendar
        Arc::new(CalendarListTool::new(client.clone())),
        Arc::new(CalendarDetailTool::new(client.clone())),
        Arc::new(CalendarEventsTool::new(client.clone())),
        Arc::new(CalendarEventDetailTool::new(client.clone())),
        Arc::new(CalendarCreateEventTool::new(client)),
    ];

    for tool in tools {
        registry.register(tool)?;
    }
    Ok(())
}

/// Deserialize already-validated arguments into the tool's argument struct.
pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments).with_context(|| format!("Invalid arguments for {}", tool))
}

/// Map a Dooray call onto a tool result. Rejections by Dooray are reported to
/// the model as `isError` results; transport failures propagate.
pub(crate) fn respond(result: DoorayResult<Value>) -> Result<CallToolResult> {
    match result {
        Ok(value) => Ok(CallToolResult::json(&value)),
        Err(e) if e.is_api_error() => Ok(CallToolResult::error(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn page_json(page: Page) -> Value {
    json!({
        "totalCount": page.total_count,
        "count": page.items.len(),
        "items": page.items,
    })
}

pub(crate) fn paging_properties() -> Value {
    json!({
        "page": {"type": "integer", "minimum": 0, "description": "Page number, starting at 0 (default: 0)"},
        "size": {"type": "integer", "minimum": 1, "maximum": 100, "description": "Results per page (default: 20, max: 100)"}
    })
}

pub(crate) fn paging(page: Option<u32>, size: Option<u32>) -> dooray_sdk::Paging {
    dooray_sdk::Paging::new(page.unwrap_or(0), size.unwrap_or(20))
}

/// Merge extra properties into a base `properties` object.
pub(crate) fn with_properties(mut base: Value, extra: Value) -> Value {
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

#[cfg(test)]
pub(crate) mod test_support {
    use dooray_sdk::{DoorayClient, RetryConfig};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use wiremock::{MockServer, ResponseTemplate};

    pub fn client(server: &MockServer) -> Arc<DoorayClient> {
        Arc::new(
            DoorayClient::builder()
                .base_url(server.uri())
                .api_key("test-token")
                .retry_config(RetryConfig::no_retry())
                .build()
                .unwrap(),
        )
    }

    pub fn ok(result: Value, total: Option<u64>) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "header": {"isSuccessful": true, "resultCode": 0, "resultMessage": ""},
            "result": result,
            "totalCount": total,
        }))
    }

    pub fn rejected(message: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "header": {"isSuccessful": false, "resultCode": -100, "resultMessage": message},
            "result": null,
        }))
    }

    pub fn text(result: &crate::protocol::CallToolResult) -> Value {
        match &result.content[0] {
            crate::protocol::ToolContent::Text { text } => {
                serde_json::from_str(text).unwrap_or(Value::String(text.clone()))
            }
        }
    }
}
