// MCP server: JSON-RPC envelope validation and method routing.
// Transports own framing and hand parsed payloads to `McpServer`.

use crate::error::McpError;
use crate::protocol::{
    negotiate_version, CallToolParams, InitializeParams, InitializeResult, JsonRpcResponse,
    ListToolsResult, ServerCapabilities, ServerInfo, ToolsCapability, JSONRPC_VERSION,
};
use crate::session::{Session, SessionManager};
use crate::tools::{ToolContext, ToolRegistry};
use crate::transport::NotificationSink;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// A decoded request body: one message or a non-empty batch.
#[derive(Debug, Clone)]
pub enum Payload {
    Single(Value),
    Batch(Vec<Value>),
}

impl Payload {
    pub fn messages(&self) -> &[Value] {
        match self {
            Self::Single(message) => std::slice::from_ref(message),
            Self::Batch(messages) => messages,
        }
    }

    pub fn contains_initialize(&self) -> bool {
        self.messages()
            .iter()
            .any(|m| m.get("method").and_then(Value::as_str) == Some("initialize"))
    }

    /// Tool name when this is a single `tools/call` request.
    pub fn single_tool_call(&self) -> Option<&str> {
        match self {
            Self::Single(m)
                if m.get("id").is_some()
                    && m.get("method").and_then(Value::as_str) == Some("tools/call") =>
            {
                m.get("params")?.get("name")?.as_str()
            }
            _ => None,
        }
    }
}

/// Outbound reply to a payload, mirroring its shape.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

/// Per-call context supplied by the transport.
#[derive(Clone)]
pub struct RequestContext {
    pub session: Arc<Session>,
    /// Child of the session token; transports may cancel it on disconnect.
    pub cancel: CancellationToken,
    pub notifier: Option<Arc<dyn NotificationSink>>,
}

impl RequestContext {
    pub fn new(session: Arc<Session>) -> Self {
        let cancel = session.cancellation().child_token();
        Self {
            session,
            cancel,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

pub struct McpServer {
    registry: ToolRegistry,
    sessions: Arc<SessionManager>,
    info: ServerInfo,
    instructions: Option<String>,
}

impl McpServer {
    pub fn new(registry: ToolRegistry, sessions: Arc<SessionManager>) -> Self {
        Self {
            registry,
            sessions,
            info: ServerInfo::default(),
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Decode raw text into a payload. Malformed JSON and empty batches come
    /// back as ready-to-send error responses.
    pub fn parse(text: &str) -> Result<Payload, JsonRpcResponse> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            tracing::debug!(error = %e, "Malformed JSON-RPC input");
            JsonRpcResponse::error(Value::Null, McpError::Parse(e.to_string()).to_jsonrpc())
        })?;

        match value {
            Value::Array(items) if items.is_empty() => Err(JsonRpcResponse::error(
                Value::Null,
                McpError::InvalidRequest("empty batch".to_string()).to_jsonrpc(),
            )),
            Value::Array(items) => Ok(Payload::Batch(items)),
            other => Ok(Payload::Single(other)),
        }
    }

    /// Parse and handle one framed message.
    pub async fn handle_text(&self, text: &str, ctx: &RequestContext) -> Option<Reply> {
        match Self::parse(text) {
            Ok(payload) => self.handle_payload(payload, ctx).await,
            Err(response) => Some(Reply::Single(response)),
        }
    }

    /// [`parse`](Self::parse) for raw bytes. Input that is not UTF-8 is a
    /// parse error like any other malformed JSON.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Payload, JsonRpcResponse> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            tracing::debug!(error = %e, "JSON-RPC input is not UTF-8");
            JsonRpcResponse::error(Value::Null, McpError::Parse(e.to_string()).to_jsonrpc())
        })?;
        Self::parse(text)
    }

    /// Handle a payload. Batch elements run concurrently and their responses
    /// keep input order; notifications produce nothing.
    pub async fn handle_payload(&self, payload: Payload, ctx: &RequestContext) -> Option<Reply> {
        match payload {
            Payload::Single(message) => self.handle_message(message, ctx).await.map(Reply::Single),
            Payload::Batch(messages) => {
                let responses: Vec<JsonRpcResponse> = futures::future::join_all(
                    messages.into_iter().map(|m| self.handle_message(m, ctx)),
                )
                .await
                .into_iter()
                .flatten()
                .collect();

                if responses.is_empty() {
                    None
                } else {
                    Some(Reply::Batch(responses))
                }
            }
        }
    }

    /// Validate one envelope and route it.
    pub async fn handle_message(&self, message: Value, ctx: &RequestContext) -> Option<JsonRpcResponse> {
        let object = match message.as_object() {
            Some(object) => object,
            None => {
                return Some(invalid_request(Value::Null, "message must be an object"));
            }
        };

        let id = match object.get("id") {
            None => None,
            Some(id @ (Value::Number(_) | Value::String(_))) => Some(id.clone()),
            Some(_) => return Some(invalid_request(Value::Null, "id must be a number or string")),
        };
        let reply_id = id.clone().unwrap_or(Value::Null);

        match object.get("jsonrpc") {
            None => {}
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(_) => return Some(invalid_request(reply_id, "jsonrpc must be \"2.0\"")),
        }

        let method = match object.get("method") {
            Some(Value::String(method)) => method.as_str(),
            None if object.contains_key("result") || object.contains_key("error") => {
                tracing::debug!(id = %reply_id, "Ignoring client response");
                return None;
            }
            _ => return Some(invalid_request(reply_id, "method must be a string")),
        };

        let params = match object.get("params") {
            None | Some(Value::Null) => None,
            Some(p @ (Value::Object(_) | Value::Array(_))) => Some(p.clone()),
            Some(_) => return Some(invalid_request(reply_id, "params must be an object or array")),
        };

        let id = match id {
            Some(id) => id,
            None => {
                self.handle_notification(method, params, ctx);
                return None;
            }
        };

        let started = Instant::now();
        let outcome = self.route(method, params, &id, ctx).await;
        tracing::debug!(
            method,
            id = %id,
            session_id = %ctx.session.id(),
            ok = outcome.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request handled"
        );

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::error(id, e.to_jsonrpc()),
        })
    }

    async fn route(
        &self,
        method: &str,
        params: Option<Value>,
        id: &Value,
        ctx: &RequestContext,
    ) -> Result<Value, McpError> {
        match method {
            "initialize" => self.initialize(params, ctx),
            "ping" => Ok(json!({})),
            "tools/list" => to_result(&ListToolsResult {
                tools: self.registry.list_schemas(),
            }),
            "tools/call" => self.call_tool(params, id, ctx).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    fn initialize(&self, params: Option<Value>, ctx: &RequestContext) -> Result<Value, McpError> {
        let params: InitializeParams = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| McpError::InvalidParams(e.to_string()))?,
            None => InitializeParams::default(),
        };

        let version = negotiate_version(params.protocol_version.as_deref());
        tracing::info!(
            session_id = %ctx.session.id(),
            client = ?params.client_info.as_ref().map(|c| c.name.as_str()),
            protocol_version = version,
            "Client initialized"
        );
        ctx.session.set_client_info(params.client_info);

        to_result(&InitializeResult {
            protocol_version: version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        })
    }

    async fn call_tool(&self, params: Option<Value>, id: &Value, ctx: &RequestContext) -> Result<Value, McpError> {
        let params: CallToolParams = params
            .ok_or_else(|| McpError::InvalidParams("missing params".to_string()))
            .and_then(|p| serde_json::from_value(p).map_err(|e| McpError::InvalidParams(e.to_string())))?;

        let inflight = ctx
            .session
            .register_request(request_key(id), &ctx.cancel)
            .ok_or_else(|| McpError::InvalidRequest(format!("request id {} is already in flight", id)))?;
        let progress_token = params
            .meta
            .and_then(|m| m.progress_token)
            .unwrap_or_else(|| id.clone());

        let tool_ctx = ToolContext {
            cancel: inflight.token().clone(),
            session_id: Some(ctx.session.id().to_string()),
            notifier: ctx.notifier.clone(),
            progress_token: Some(progress_token),
        };

        tracing::info!(tool = %params.name, session_id = %ctx.session.id(), "Calling tool");
        let result = self.registry.invoke(&params.name, params.arguments, tool_ctx).await?;
        drop(inflight);

        to_result(&result)
    }

    fn handle_notification(&self, method: &str, params: Option<Value>, ctx: &RequestContext) {
        match method {
            "notifications/initialized" => {
                tracing::debug!(session_id = %ctx.session.id(), "Client ready");
            }
            "notifications/cancelled" => {
                let request_id = params.as_ref().and_then(|p| p.get("requestId"));
                match request_id {
                    Some(id) if ctx.session.cancel_request(&request_key(id)) => {
                        tracing::info!(session_id = %ctx.session.id(), request_id = %id, "Request cancelled by client");
                    }
                    Some(id) => {
                        tracing::debug!(request_id = %id, "Cancellation for unknown request");
                    }
                    None => tracing::debug!("Cancellation without requestId"),
                }
            }
            other => {
                tracing::debug!(method = other, "Ignoring notification");
            }
        }
    }
}

/// In-flight table key. Uses the JSON text so `1` and `"1"` stay distinct.
fn request_key(id: &Value) -> String {
    id.to_string()
}

fn invalid_request(id: Value, reason: &str) -> JsonRpcResponse {
    JsonRpcResponse::error(id, McpError::InvalidRequest(reason.to_string()).to_jsonrpc())
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::Internal(e.to_string()))
}

impl From<JsonRpcResponse> for Reply {
    fn from(response: JsonRpcResponse) -> Self {
        Reply::Single(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TransportKind;
    use crate::tools::registry::tests::{EchoTool, ScriptedTool};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn server_with_echo() -> (McpServer, Arc<std::sync::atomic::AtomicUsize>) {
        let mut registry = ToolRegistry::new();
        let echo = Arc::new(EchoTool::new("echo"));
        let calls = echo.calls.clone();
        registry.register(echo).unwrap();
        registry.register(Arc::new(ScriptedTool { mode: "slow" })).unwrap();
        let server = McpServer::new(registry, Arc::new(SessionManager::default()))
            .with_instructions("Use the echo tool");
        (server, calls)
    }

    fn context(server: &McpServer) -> RequestContext {
        RequestContext::new(server.sessions().create(TransportKind::Stdio).unwrap())
    }

    async fn call(server: &McpServer, ctx: &RequestContext, text: &str) -> Value {
        let reply = server.handle_text(text, ctx).await;
        serde_json::to_value(reply).unwrap()
    }

    #[tokio::test]
    async fn test_id_type_round_trips() {
        let (server, _) = server_with_echo();
        let ctx = context(&server);

        let numeric = call(&server, &ctx, r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).await;
        let string = call(&server, &ctx, r#"{"jsonrpc":"2.0","id":"7","method":"ping"}"#).await;
        let float = call(&server, &ctx, r#"{"jsonrpc":"2.0","id":1.5,"method":"ping"}"#).await;

        assert_eq!(numeric["id"], json!(7));
        assert_eq!(string["id"], json!("7"));
        assert_eq!(float["id"], json!(1.5));
    }

    #[tokio::test]
    async fn test_invalid_envelopes() {
        let (server, _) = server_with_echo();
        let ctx = context(&server);

        let bad_version = call(&server, &ctx, r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).await;
        assert_eq!(bad_version["error"]["code"], -32600);
        assert_eq!(bad_version["id"], 1);

        let no_method = call(&server, &ctx, r#"{"jsonrpc":"2.0","id":2}"#).await;
        assert_eq!(no_method["error"]["code"], -32600);

        let bad_id = call(&server, &ctx, r#"{"jsonrpc":"2.0","id":{"x":1},"method":"ping"}"#).await;
        assert_eq!(bad_id["error"]["code"], -32600);
        assert!(bad_id["id"].is_null());

        let scalar = call(&server, &ctx, "42").await;
        assert_eq!(scalar["error"]["code"], -32600);

        let parse = call(&server, &ctx, "{\"jsonrpc\":").await;
        assert_eq!(parse["error"]["code"], -32700);
        assert!(parse["id"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (server, _) = server_with_echo();
        let ctx = context(&server);

        let reply = call(&server, &ctx, r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#).await;
        assert_eq!(reply["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_initialize_records_client() {
        let (server, _) = server_with_echo();
        let ctx = context(&server);

        let reply = call(
            &server,
            &ctx,
            r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2025-03-26","capabilities":{},"clientInfo":{"name":"inspector","version":"1.0"}}}"#,
        )
        .await;

        assert_eq!(reply["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(reply["result"]["serverInfo"]["name"], "dooray-mcp-server");
        assert_eq!(reply["result"]["capabilities"]["tools"]["listChanged"], false);
        assert_eq!(reply["result"]["instructions"], "Use the echo tool");
        assert_eq!(ctx.session.client_info().unwrap().name, "inspector");
    }

    #[tokio::test]
    async fn test_tool_call_shapes() {
        let (server, calls) = server_with_echo();
        let ctx = context(&server);

        let ok = call(
            &server,
            &ctx,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo","arguments":{"text":"hi"}}}"#,
        )
        .await;
        assert_eq!(ok["result"]["content"][0]["text"], "hi");

        let bad_args = call(
            &server,
            &ctx,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{}}}"#,
        )
        .await;
        assert_eq!(bad_args["error"]["code"], -32602);

        let missing = call(
            &server,
            &ctx,
            r#"{"id":2,"method":"tools/call","params":{"name":"missing_tool","arguments":{}}}"#,
        )
        .await;
        assert_eq!(missing["id"], 2);
        assert_eq!(missing["error"]["code"], -32602);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_order_and_notifications() {
        let (server, _) = server_with_echo();
        let ctx = context(&server);

        let reply = call(
            &server,
            &ctx,
            r#"[
                {"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"echo","arguments":{"text":"first"}}},
                {"jsonrpc":"2.0","method":"notifications/initialized"},
                {"jsonrpc":"2.0","id":"b","method":"ping"},
                {"jsonrpc":"2.0","id":"c","method":"nope"}
            ]"#,
        )
        .await;

        let items = reply.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["id"], "a");
        assert_eq!(items[1]["id"], "b");
        assert_eq!(items[2]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_empty_batch_and_notification_only_batch() {
        let (server, _) = server_with_echo();
        let ctx = context(&server);

        let empty = call(&server, &ctx, "[]").await;
        assert_eq!(empty["error"]["code"], -32600);

        let silent = server
            .handle_text(r#"[{"jsonrpc":"2.0","method":"notifications/initialized"}]"#, &ctx)
            .await;
        assert!(silent.is_none());
    }

    #[tokio::test]
    async fn test_client_responses_are_ignored() {
        let (server, _) = server_with_echo();
        let ctx = context(&server);

        let reply = server
            .handle_text(r#"{"jsonrpc":"2.0","id":5,"result":{}}"#, &ctx)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_notification_stops_call() {
        let (server, _) = server_with_echo();
        let server = Arc::new(server);
        let ctx = context(&server);

        let pending = {
            let server = server.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                server
                    .handle_text(
                        r#"{"jsonrpc":"2.0","id":"slow-1","method":"tools/call","params":{"name":"scripted_slow"}}"#,
                        &ctx,
                    )
                    .await
            })
        };

        while ctx.session.inflight_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let none = server
            .handle_text(
                r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":"slow-1"}}"#,
                &ctx,
            )
            .await;
        assert!(none.is_none());

        let reply = serde_json::to_value(pending.await.unwrap()).unwrap();
        assert_eq!(reply["id"], "slow-1");
        assert_eq!(reply["error"]["code"], -32800);
    }

    #[tokio::test]
    async fn test_duplicate_inflight_id_keeps_first_cancellable() {
        let (server, _) = server_with_echo();
        let server = Arc::new(server);
        let ctx = context(&server);
        let slow = r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"scripted_slow"}}"#;

        let pending = {
            let server = server.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { server.handle_text(slow, &ctx).await })
        };
        while ctx.session.inflight_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let duplicate = call(&server, &ctx, slow).await;
        assert_eq!(duplicate["id"], 9);
        assert_eq!(duplicate["error"]["code"], -32600);

        server
            .handle_text(r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":9}}"#, &ctx)
            .await;
        let reply = serde_json::to_value(pending.await.unwrap()).unwrap();
        assert_eq!(reply["error"]["code"], -32800);
    }

    #[test]
    fn test_payload_helpers() {
        let payload = McpServer::parse(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo"}}"#,
        )
        .unwrap();
        assert_eq!(payload.single_tool_call(), Some("echo"));
        assert!(!payload.contains_initialize());

        let batch = McpServer::parse(r#"[{"method":"initialize","id":1},{"method":"notifications/initialized"}]"#).unwrap();
        assert!(batch.contains_initialize());
        assert!(batch.single_tool_call().is_none());
    }

    #[test]
    fn test_parse_bytes_rejects_non_utf8() {
        let err = McpServer::parse_bytes(b"{\xff\xfe}").unwrap_err();
        assert_eq!(err.error.unwrap().code, -32700);
        assert!(err.id.is_null());

        assert!(McpServer::parse_bytes(br#"{"id":1,"method":"ping"}"#).is_ok());
    }
}
