use super::{ApiError, ApiResult};
use crate::config::{AppState, StreamingMode};
use crate::middleware::origin::SESSION_HEADER;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dooray_mcp::transport::{NotificationSink, SessionEvents};
use dooray_mcp::{McpServer, Payload, RequestContext, Session, TransportKind};
use std::sync::Arc;

/// Value of the `Mcp-Session-Id` request header, if any.
pub(crate) fn session_id(headers: &HeaderMap) -> ApiResult<Option<&str>> {
    match headers.get(SESSION_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|id| Some(id.trim()))
            .map_err(|_| ApiError::BadRequest("Mcp-Session-Id header is not valid ASCII".to_string())),
    }
}

/// Session named by the request header, or a fresh one when the header is
/// absent. The flag tells whether the session was created here.
pub(crate) fn resolve_session(state: &AppState, headers: &HeaderMap) -> ApiResult<(Arc<Session>, bool)> {
    let sessions = state.server.sessions();
    match session_id(headers)? {
        Some(id) => {
            let session = sessions.lookup(id)?;
            session.touch();
            Ok((session, false))
        }
        None => Ok((sessions.create(TransportKind::Http)?, true)),
    }
}

fn context_for(session: &Arc<Session>) -> RequestContext {
    RequestContext::new(session.clone()).with_notifier(Arc::new(SessionEvents(session.clone())))
}

/// `POST <path>`: one JSON-RPC message or a batch.
pub async fn post_message(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Response> {
    let payload = match McpServer::parse_bytes(&body) {
        Ok(payload) => payload,
        Err(response) => return Ok((StatusCode::BAD_REQUEST, Json(response)).into_response()),
    };

    let (session, created) = resolve_session(&state, &headers)?;
    if created {
        tracing::debug!(session_id = %session.id(), initialize = payload.contains_initialize(), "Session opened by POST");
    }
    let session_header = [(SESSION_HEADER, session.id().to_string())];

    if state.streaming_mode() == StreamingMode::Ack && is_streaming_call(&state, &payload) {
        acknowledge(state.server.clone(), session, payload);
        return Ok((StatusCode::ACCEPTED, session_header).into_response());
    }

    let ctx = context_for(&session);
    // Dropped along with this future when the client goes away mid-call
    let disconnect = ctx.cancel.clone().drop_guard();
    let reply = state.server.handle_payload(payload, &ctx).await;
    disconnect.disarm();

    Ok(match reply {
        Some(reply) => (StatusCode::OK, session_header, Json(reply)).into_response(),
        None => (StatusCode::ACCEPTED, session_header).into_response(),
    })
}

fn is_streaming_call(state: &AppState, payload: &Payload) -> bool {
    payload
        .single_tool_call()
        .is_some_and(|name| state.server.registry().is_streaming(name))
}

/// Run a streaming call in the background; its response joins the progress
/// notifications on the session stream.
fn acknowledge(server: Arc<McpServer>, session: Arc<Session>, payload: Payload) {
    tracing::debug!(session_id = %session.id(), "Streaming call acknowledged");
    tokio::spawn(async move {
        let ctx = context_for(&session);
        let Some(reply) = server.handle_payload(payload, &ctx).await else {
            return;
        };
        match serde_json::to_value(&reply) {
            Ok(value) => SessionEvents(session).notify(value),
            Err(e) => tracing::error!(error = %e, "Failed to serialize reply"),
        }
    });
}

/// `DELETE <path>`: end the session named by the header.
pub async fn delete_session(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<StatusCode> {
    let id = session_id(&headers)?
        .ok_or_else(|| ApiError::BadRequest("Mcp-Session-Id header is required".to_string()))?;

    state.server.sessions().close(id)?;
    Ok(StatusCode::NO_CONTENT)
}
