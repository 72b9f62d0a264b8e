// Protocol-level errors and their JSON-RPC encoding

use crate::protocol::JsonRpcError;
use serde_json::json;

/// JSON-RPC error codes used by the server.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const TOOL_EXECUTION: i32 = -32000;
    pub const SESSION_NOT_FOUND: i32 = -32001;
    pub const REQUEST_CANCELLED: i32 = -32800;
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Handler failure. `cause` travels as opaque data, never in the message.
    #[error("Tool execution failed: {tool}")]
    ToolExecution { tool: String, cause: String },

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => codes::PARSE_ERROR,
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) | Self::ToolNotFound(_) => codes::INVALID_PARAMS,
            Self::ToolExecution { .. } => codes::TOOL_EXECUTION,
            Self::Cancelled => codes::REQUEST_CANCELLED,
            Self::DuplicateTool(_) | Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    pub fn to_jsonrpc(&self) -> JsonRpcError {
        let error = JsonRpcError::custom(self.code(), self.to_string());
        match self {
            Self::ToolNotFound(tool) => error.with_data(json!({ "tool": tool })),
            Self::ToolExecution { tool, cause } => JsonRpcError::custom(
                self.code(),
                "Tool execution failed",
            )
            .with_data(json!({ "tool": tool, "cause": cause })),
            _ => error,
        }
    }
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        err.to_jsonrpc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_is_invalid_params_range() {
        let err = McpError::ToolNotFound("missing_tool".to_string()).to_jsonrpc();

        assert_eq!(err.code, codes::INVALID_PARAMS);
        assert_eq!(err.data, Some(json!({"tool": "missing_tool"})));
    }

    #[test]
    fn test_tool_execution_hides_cause_in_data() {
        let err = McpError::ToolExecution {
            tool: "t".to_string(),
            cause: "connection refused".to_string(),
        }
        .to_jsonrpc();

        assert_eq!(err.code, codes::TOOL_EXECUTION);
        assert!(!err.message.contains("connection refused"));
        assert_eq!(err.data.unwrap()["cause"], "connection refused");
    }
}
