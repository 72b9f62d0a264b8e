// MCP (Model Context Protocol) server for Dooray.
// Protocol core shared by the stdio binary and the HTTP/SSE server crate.

pub mod error;
pub mod events;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use error::McpError;
pub use server::{McpServer, Payload, Reply, RequestContext};
pub use session::{Session, SessionConfig, SessionError, SessionManager, TransportKind};

/// Instructions returned from `initialize`.
pub const SERVER_INSTRUCTIONS: &str = "Tools for the Dooray collaboration suite. \
Look up ids with the list tools (projects, wikis, channels, members) before calling \
tools that need them.";

/// Build a server with every Dooray tool registered.
pub fn build_server(
    client: std::sync::Arc<dooray_sdk::DoorayClient>,
    sessions: std::sync::Arc<SessionManager>,
) -> Result<McpServer, McpError> {
    let mut registry = tools::ToolRegistry::new();
    tools::register_all(&mut registry, client)?;
    tracing::info!("Registered {} tools", registry.len());

    Ok(McpServer::new(registry, sessions).with_instructions(SERVER_INSTRUCTIONS))
}
