// Standalone MCP server binary (stdio transport)

use anyhow::{Context, Result};
use dooray_mcp::transport::{serve, LineChannel};
use dooray_mcp::{build_server, SessionManager};
use dooray_sdk::DoorayClient;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries protocol messages only; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dooray_mcp=info,dooray_sdk=warn".into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();

    tracing::info!("Dooray MCP server starting (stdio)");

    let client = DoorayClient::from_env().context("Failed to configure Dooray client")?;
    let sessions = Arc::new(SessionManager::default());
    let server = Arc::new(build_server(Arc::new(client), sessions.clone())?);

    serve(server, LineChannel::stdio())
        .await
        .context("stdio transport failed")?;

    sessions.close_all();
    tracing::info!("Dooray MCP server stopped");
    Ok(())
}
