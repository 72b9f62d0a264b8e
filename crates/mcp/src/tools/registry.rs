// MCP tool contract and the registry that dispatches to tools

use crate::error::McpError;
use crate::protocol::{CallToolResult, JsonRpcNotification, ToolSchema};
use crate::transport::NotificationSink;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a tool invocation gets besides its arguments.
#[derive(Clone)]
pub struct ToolContext {
    /// Fires when the request, its connection or its session goes away.
    pub cancel: CancellationToken,
    pub session_id: Option<String>,
    pub notifier: Option<Arc<dyn NotificationSink>>,
    pub progress_token: Option<Value>,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            session_id: None,
            notifier: None,
            progress_token: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Emit a `notifications/progress` message when the caller asked for
    /// progress and the transport can carry it. Otherwise a no-op.
    pub fn report_progress(&self, progress: f64, total: Option<f64>, message: Option<&str>) {
        if let (Some(notifier), Some(token)) = (&self.notifier, &self.progress_token) {
            let note = JsonRpcNotification::progress(token.clone(), progress, total, message);
            notifier.notify(note.to_value());
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_id", &self.session_id)
            .field("progress_token", &self.progress_token)
            .field("has_notifier", &self.notifier.is_some())
            .finish()
    }
}

/// Tool executor trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with schema-validated arguments
    async fn execute(&self, arguments: Value, ctx: ToolContext) -> Result<CallToolResult>;

    /// Whether the tool emits progress before its final result
    fn streaming(&self) -> bool {
        false
    }
}

struct RegisteredTool {
    schema: ToolSchema,
    tool: Arc<dyn Tool>,
}

/// Name to tool mapping, filled once at startup and read-only afterwards.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. A second tool with the same name is rejected and the
    /// first one stays.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), McpError> {
        let schema = tool.schema();
        if self.index.contains_key(&schema.name) {
            return Err(McpError::DuplicateTool(schema.name));
        }

        self.index.insert(schema.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool { schema, tool });
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.entry(name).map(|t| t.tool.clone())
    }

    fn entry(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Tool schemas in registration order
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema.clone()).collect()
    }

    pub fn is_streaming(&self, name: &str) -> bool {
        self.get(name).is_some_and(|tool| tool.streaming())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate `arguments` and run the tool on its own task. Handler errors
    /// and panics come back as [`McpError::ToolExecution`]; cancellation
    /// stops the task at its next await point.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<Value>,
        ctx: ToolContext,
    ) -> Result<CallToolResult, McpError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;

        let arguments = arguments.unwrap_or_else(|| Value::Object(Default::default()));
        super::schema::validate(&entry.schema.input_schema, &arguments)
            .map_err(|e| McpError::InvalidParams(format!("{} arguments {}", name, e)))?;

        let cancel = ctx.cancel.clone();
        if cancel.is_cancelled() {
            return Err(McpError::Cancelled);
        }

        // The task watches the token itself so it stops even when the caller
        // is dropped instead of awaiting it.
        let tool = entry.tool.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                result = tool.execute(arguments, ctx) => Some(result),
                _ = cancel.cancelled() => None,
            }
        });

        match handle.await {
            Ok(Some(Ok(result))) => Ok(result),
            Ok(Some(Err(e))) => {
                tracing::warn!(tool = %name, error = %format!("{:#}", e), "Tool failed");
                Err(McpError::ToolExecution {
                    tool: name.to_string(),
                    cause: format!("{:#}", e),
                })
            }
            Ok(None) => {
                tracing::info!(tool = %name, "Tool call cancelled");
                Err(McpError::Cancelled)
            }
            Err(e) if e.is_panic() => {
                tracing::error!(tool = %name, "Tool panicked");
                Err(McpError::ToolExecution {
                    tool: name.to_string(),
                    cause: "tool handler panicked".to_string(),
                })
            }
            Err(_) => Err(McpError::Cancelled),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_integer(description: &str) -> Value {
    serde_json::json!({
        "type": "integer",
        "description": description
    })
}

pub fn json_schema_number(description: &str) -> Value {
    serde_json::json!({
        "type": "number",
        "description": description
    })
}

pub fn json_schema_boolean(description: &str) -> Value {
    serde_json::json!({
        "type": "boolean",
        "description": description
    })
}

pub fn json_schema_array(items: Value, description: &str) -> Value {
    serde_json::json!({
        "type": "array",
        "items": items,
        "description": description
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes its `text` argument and counts invocations.
    pub(crate) struct EchoTool {
        pub name: &'static str,
        pub calls: Arc<AtomicUsize>,
    }

    impl EchoTool {
        pub(crate) fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.name.to_string(),
                description: "Echo the text back".to_string(),
                input_schema: json_schema_object(
                    json!({"text": json_schema_string("Text to echo")}),
                    vec!["text"],
                ),
            }
        }

        async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = arguments["text"].as_str().unwrap_or_default();
            Ok(CallToolResult::text(text))
        }
    }

    /// Sleeps, reports progress, fails or panics depending on `mode`.
    pub(crate) struct ScriptedTool {
        pub mode: &'static str,
    }

    #[async_trait::async_trait]
    impl Tool for ScriptedTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: format!("scripted_{}", self.mode),
                description: "Test tool".to_string(),
                input_schema: json!({"type": "object", "properties": {}}),
            }
        }

        async fn execute(&self, _arguments: Value, ctx: ToolContext) -> Result<CallToolResult> {
            match self.mode {
                "fail" => anyhow::bail!("upstream exploded"),
                "panic" => panic!("handler bug"),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(CallToolResult::text("late"))
                }
                "delayed" => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(CallToolResult::text("delayed"))
                }
                _ => {
                    for step in 1..=3 {
                        ctx.report_progress(step as f64, Some(3.0), None);
                    }
                    Ok(CallToolResult::text("done"))
                }
            }
        }

        fn streaming(&self) -> bool {
            self.mode == "progress"
        }
    }

    pub(crate) struct CollectingSink(pub Mutex<Vec<Value>>);

    impl NotificationSink for CollectingSink {
        fn notify(&self, message: Value) {
            self.0.lock().push(message);
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(CancellationToken::new())
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut registry = ToolRegistry::new();
        let first = Arc::new(EchoTool::new("echo"));
        registry.register(first.clone()).unwrap();

        let err = registry.register(Arc::new(EchoTool::new("echo"))).unwrap_err();
        assert!(matches!(err, McpError::DuplicateTool(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(
            &registry.get("echo").unwrap(),
            &(first as Arc<dyn Tool>)
        ));
    }

    #[test]
    fn test_list_in_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(Arc::new(EchoTool::new(name))).unwrap();
        }

        let names: Vec<_> = registry.list_schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_invoke_validates_before_running() {
        let mut registry = ToolRegistry::new();
        let echo = Arc::new(EchoTool::new("echo"));
        let calls = echo.calls.clone();
        registry.register(echo).unwrap();

        let err = registry.invoke("echo", Some(json!({"text": 1})), ctx()).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));

        let err = registry.invoke("echo", None, ctx()).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let result = registry
            .invoke("echo", Some(json!({"text": "hi"})), ctx())
            .await
            .unwrap();
        assert_eq!(result.content[0], crate::protocol::ToolContent::text("hi"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("missing_tool", None, ctx()).await.unwrap_err();
        assert!(matches!(err, McpError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_handler_failure_and_panic_are_normalized() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ScriptedTool { mode: "fail" })).unwrap();
        registry.register(Arc::new(ScriptedTool { mode: "panic" })).unwrap();

        match registry.invoke("scripted_fail", None, ctx()).await {
            Err(McpError::ToolExecution { cause, .. }) => assert!(cause.contains("upstream exploded")),
            other => panic!("Expected ToolExecution, got {:?}", other),
        }
        assert!(matches!(
            registry.invoke("scripted_panic", None, ctx()).await,
            Err(McpError::ToolExecution { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancellation_stops_handler() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ScriptedTool { mode: "slow" })).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = registry
            .invoke("scripted_slow", None, ToolContext::new(cancel))
            .await;
        assert!(matches!(result, Err(McpError::Cancelled)));
    }

    #[tokio::test]
    async fn test_progress_reaches_notifier() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ScriptedTool { mode: "progress" })).unwrap();
        assert!(registry.is_streaming("scripted_progress"));

        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));
        let mut context = ctx();
        context.notifier = Some(sink.clone());
        context.progress_token = Some(json!("tok"));

        registry.invoke("scripted_progress", None, context).await.unwrap();

        let notes = sink.0.lock();
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[2]["params"]["progress"], 3.0);
        assert_eq!(notes[0]["params"]["progressToken"], "tok");
    }
}
