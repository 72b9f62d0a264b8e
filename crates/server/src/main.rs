use anyhow::{Context, Result};
use clap::Parser;
use dooray_mcp::{build_server, SessionManager};
use dooray_sdk::{DoorayClient, API_KEY_ENV, BASE_URL_ENV};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod api;
mod config;
mod middleware;
mod sse;

use config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "dooray-mcp-http")]
#[command(about = "Dooray MCP tool server over HTTP with SSE streaming", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "DOORAY_MCP_CONFIG", default_value = "dooray-mcp.toml")]
    config: PathBuf,

    /// Host to bind to (overrides the file)
    #[arg(long, env = "DOORAY_MCP_HOST")]
    host: Option<String>,

    /// Port to listen on (overrides the file)
    #[arg(short, long, env = "DOORAY_MCP_PORT")]
    port: Option<u16>,

    /// MCP endpoint path (overrides the file)
    #[arg(long, env = "DOORAY_MCP_PATH")]
    path: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "DOORAY_MCP_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) -> Result<()> {
        if let Some(host) = &self.host {
            config.http.host = host.clone();
        }
        if let Some(port) = self.port {
            config.http.port = port;
        }
        if let Some(path) = &self.path {
            config.http.path = path.clone();
        }
        config.validate()
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dooray_mcp=info,dooray_mcp_server=info,tower_http=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn dooray_client(config: &ServerConfig) -> Result<DoorayClient> {
    let api_key = std::env::var(API_KEY_ENV).with_context(|| format!("{} is required", API_KEY_ENV))?;

    let mut builder = DoorayClient::builder()
        .api_key(api_key)
        .timeout(Duration::from_secs(config.dooray.timeout_secs));
    if let Some(base_url) = std::env::var(BASE_URL_ENV).ok().or_else(|| config.dooray.base_url.clone()) {
        builder = builder.base_url(base_url);
    }
    builder.build().context("Failed to configure Dooray client")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting Dooray MCP HTTP server");

    // Load configuration
    let mut config = ServerConfig::load(&args.config)?;
    args.apply(&mut config)?;

    let client = dooray_client(&config)?;
    tracing::info!(base_url = %client.base_url(), "Dooray client ready");

    let sessions = Arc::new(SessionManager::new(config.session_config()));
    let server = Arc::new(build_server(Arc::new(client), sessions)?);

    api::serve(config, server).await?;

    Ok(())
}
