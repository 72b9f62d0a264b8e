use crate::config::{AppState, ServerConfig};
use crate::middleware::check_origin;
use crate::sse;
use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dooray_mcp::error::codes;
use dooray_mcp::protocol::{JsonRpcError, JsonRpcResponse, SERVER_NAME};
use dooray_mcp::{McpServer, SessionError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

pub(crate) mod handlers;

/// Start the HTTP server and run it until Ctrl-C or SIGTERM.
pub async fn serve(config: ServerConfig, server: Arc<McpServer>) -> Result<()> {
    let addr = config.bind_addr();
    let path = config.http.path.clone();
    let sweep_interval = config.sweep_interval();
    let state = AppState::new(server.clone(), config)?;

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("MCP endpoint listening on http://{}{}", addr, path);

    let shutdown = CancellationToken::new();
    let sweeper = server.sessions().spawn_sweeper(sweep_interval, shutdown.clone());
    tokio::spawn(wait_for_signal(shutdown.clone()));

    // Closing the sessions ends their event streams so the drain can finish
    let sessions = server.sessions().clone();
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.cancelled().await;
            let closed = sessions.close_all();
            tracing::info!(closed, "Shutting down, sessions closed");
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Session sweeper ended abnormally");
    }
    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    shutdown.cancel();
}

/// Create the router: `/health` and the MCP endpoint, both behind the Origin
/// check. CORS sits outermost so preflights are answered from the same
/// allow-list.
pub fn create_router(state: AppState) -> Router {
    let cors = state.origins.cors_layer();

    Router::new()
        .route("/health", get(health_check))
        .route(
            &state.config.http.path,
            post(handlers::post_message)
                .get(sse::stream_events)
                .delete(handlers::delete_session),
        )
        .route_layer(middleware::from_fn_with_state(state.origins.clone(), check_origin))
        // Middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "server": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Error type for API handlers. Session failures map to their HTTP status
/// before the dispatcher is reached.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Session(e @ (SessionError::NotFound(_) | SessionError::Expired(_))) => {
                tracing::debug!(error = %e, "Rejected request for unknown session");
                let error = JsonRpcError::custom(codes::SESSION_NOT_FOUND, e.to_string());
                (StatusCode::NOT_FOUND, Json(JsonRpcResponse::error(Value::Null, error))).into_response()
            }
            Self::Session(e @ SessionError::TooManySessions(_)) => {
                tracing::warn!(error = %e, "Session limit reached");
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse::new(e.to_string()))).into_response()
            }
            Self::Session(e @ SessionError::StreamAlreadyAttached(_)) => {
                (StatusCode::CONFLICT, Json(ErrorResponse::new(e.to_string()))).into_response()
            }
            Self::Session(e @ SessionError::NoEventStream(_)) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))).into_response()
            }
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
            }
            Self::Internal(e) => {
                let error_msg = e.to_string();
                let details = e.chain().skip(1).map(|e| e.to_string()).collect::<Vec<_>>().join(": ");
                tracing::error!(error = %error_msg, details = %details, "Request failed");

                let response = if details.is_empty() {
                    ErrorResponse::new(error_msg)
                } else {
                    ErrorResponse::with_details(error_msg, details)
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
