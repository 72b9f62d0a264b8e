// `GET <path>`: the per-session Server-Sent-Events stream

use crate::api::handlers::resolve_session;
use crate::api::{ApiError, ApiResult};
use crate::config::AppState;
use crate::middleware::origin::{LAST_EVENT_ID_HEADER, SESSION_HEADER};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use dooray_mcp::session::StreamGuard;
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "lastEventId")]
    pub last_event_id: Option<String>,
}

/// Resume point: `Last-Event-ID` header first, then the `lastEventId` query
/// parameter, else 0 (everything still retained).
fn resume_cursor(headers: &HeaderMap, query: &StreamQuery) -> ApiResult<u64> {
    let raw = match headers.get(LAST_EVENT_ID_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| ApiError::BadRequest("Last-Event-ID is not valid ASCII".to_string()))?,
        ),
        None => query.last_event_id.as_deref(),
    };

    match raw.map(str::trim) {
        None | Some("") => Ok(0),
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("invalid last event id {:?}", raw))),
    }
}

pub async fn stream_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Response> {
    let cursor = resume_cursor(&headers, &query)?;
    let (session, created) = resolve_session(&state, &headers)?;
    let guard = session.attach_stream()?;
    let cursor = session.events().map_or(cursor, |queue| queue.clamp(cursor));

    tracing::info!(session_id = %session.id(), cursor, "Event stream attached");

    let sse = Sse::new(event_stream(guard, cursor, created))
        .keep_alive(KeepAlive::new().interval(state.config.keep_alive()).text("ping"));

    Ok(([(SESSION_HEADER, session.id().to_string())], sse).into_response())
}

/// Replay what is retained after `cursor`, then follow the queue until the
/// session closes or the client goes away (dropping the stream releases the
/// guard).
fn event_stream(guard: StreamGuard, mut cursor: u64, announce: bool) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let session = guard.session().clone();

        if announce {
            let data = serde_json::json!({ "sessionId": session.id() });
            yield Ok(Event::default().event("session").data(data.to_string()));
        }

        let Some(queue) = session.events() else {
            return;
        };

        while let Some(delivery) = queue.recv_after(cursor).await {
            if let Some(gap) = delivery.gap {
                tracing::warn!(session_id = %session.id(), from = gap.from, to = gap.to, "Stream reader missed evicted events");
                let data = serde_json::to_string(&gap).unwrap_or_default();
                yield Ok(Event::default().event("gap").id(gap.to.to_string()).data(data));
            }

            for event in &delivery.events {
                yield Ok(Event::default()
                    .event("message")
                    .id(event.id.to_string())
                    .data(event.payload.to_string()));
            }

            if let Some(last) = delivery.last_id() {
                cursor = last;
            }
            session.touch();
        }

        tracing::info!(session_id = %session.id(), "Event stream finished");
        drop(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::tests::{app, app_with, post};
    use crate::config::ServerConfig;
    use axum::body::{Body, BodyDataStream};
    use axum::http::{header, Request, StatusCode};
    use futures::StreamExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn get(session: Option<&str>, last_event_id: Option<&str>) -> Request<Body> {
        let mut builder = Request::get("/mcp").header(header::ACCEPT, "text/event-stream");
        if let Some(id) = session {
            builder = builder.header(SESSION_HEADER, id);
        }
        if let Some(last) = last_event_id {
            builder = builder.header(LAST_EVENT_ID_HEADER, last);
        }
        builder.body(Body::empty()).unwrap()
    }

    /// One parsed SSE record.
    #[derive(Debug)]
    struct Record {
        event: String,
        id: Option<String>,
        data: Value,
    }

    /// Reads records off a response body, skipping keep-alive comments.
    struct Reader {
        body: BodyDataStream,
        buffer: String,
    }

    impl Reader {
        fn new(response: Response) -> Self {
            Self {
                body: response.into_body().into_data_stream(),
                buffer: String::new(),
            }
        }

        async fn next(&mut self) -> Option<Record> {
            loop {
                if let Some(end) = self.buffer.find("\n\n") {
                    let block: String = self.buffer.drain(..end + 2).collect();
                    let mut event = "message".to_string();
                    let mut id = None;
                    let mut data = None;
                    for line in block.lines() {
                        if let Some(v) = line.strip_prefix("event: ") {
                            event = v.to_string();
                        } else if let Some(v) = line.strip_prefix("id: ") {
                            id = Some(v.to_string());
                        } else if let Some(v) = line.strip_prefix("data: ") {
                            data = Some(serde_json::from_str(v).unwrap());
                        }
                    }
                    match data {
                        Some(data) => return Some(Record { event, id, data }),
                        None => continue,
                    }
                }
                let chunk = self.body.next().await?.ok()?;
                self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
            }
        }
    }

    fn push(state: &AppState, session: &str, payload: Value) -> u64 {
        let session = state.server.sessions().lookup(session).unwrap();
        session.events().unwrap().push(payload).unwrap()
    }

    #[tokio::test]
    async fn test_stream_without_session_announces_new_one() {
        let app = app();

        let response = app.router.clone().oneshot(get(None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();

        let mut reader = Reader::new(response);
        let first = reader.next().await.unwrap();
        assert_eq!(first.event, "session");
        assert_eq!(first.data["sessionId"], id.as_str());

        push(&app.state, &id, json!({"n": 1}));
        let record = reader.next().await.unwrap();
        assert_eq!(record.event, "message");
        assert_eq!(record.id.as_deref(), Some("1"));
        assert_eq!(record.data, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_resume_replays_after_last_event_id() {
        let app = app();
        let response = app.router.clone().oneshot(post(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, None)).await.unwrap();
        let id = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();
        for n in 1..=3 {
            push(&app.state, &id, json!({"n": n}));
        }

        let response = app.router.clone().oneshot(get(Some(&id), Some("1"))).await.unwrap();
        let mut reader = Reader::new(response);

        let second = reader.next().await.unwrap();
        let third = reader.next().await.unwrap();
        assert_eq!(second.id.as_deref(), Some("2"));
        assert_eq!(third.id.as_deref(), Some("3"));
        assert_eq!(third.data["n"], 3);
    }

    #[tokio::test]
    async fn test_resume_cursor_past_newest_follows_new_events() {
        let app = app();
        let response = app.router.clone().oneshot(post(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, None)).await.unwrap();
        let id = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();
        push(&app.state, &id, json!({"n": 1}));

        let response = app.router.clone().oneshot(get(Some(&id), Some("50"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut reader = Reader::new(response);

        push(&app.state, &id, json!({"n": 2}));
        let record = tokio::time::timeout(std::time::Duration::from_secs(1), reader.next())
            .await
            .expect("stream delivered the new event")
            .unwrap();
        assert_eq!(record.id.as_deref(), Some("2"));
        assert_eq!(record.data["n"], 2);
    }

    #[tokio::test]
    async fn test_evicted_events_surface_as_gap() {
        let mut config = ServerConfig::default();
        config.session.event_capacity = 2;
        let app = app_with(config);
        let response = app.router.clone().oneshot(post(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, None)).await.unwrap();
        let id = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();
        for n in 1..=5 {
            push(&app.state, &id, json!({"n": n}));
        }

        let request = Request::get("/mcp?lastEventId=1")
            .header(SESSION_HEADER, id.as_str())
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        let mut reader = Reader::new(response);

        let gap = reader.next().await.unwrap();
        assert_eq!(gap.event, "gap");
        assert_eq!(gap.id.as_deref(), Some("3"));
        assert_eq!(gap.data, json!({"from": 2, "to": 3}));

        let next = reader.next().await.unwrap();
        assert_eq!(next.id.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_second_stream_conflicts_until_first_drops() {
        let app = app();
        let response = app.router.clone().oneshot(get(None, None)).await.unwrap();
        let id = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();

        let second = app.router.clone().oneshot(get(Some(&id), None)).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        drop(response);
        let third = app.router.clone().oneshot(get(Some(&id), None)).await.unwrap();
        assert_eq!(third.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stream_ends_when_session_deleted() {
        let app = app();
        let response = app.router.clone().oneshot(get(None, None)).await.unwrap();
        let id = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();
        let mut reader = Reader::new(response);
        assert_eq!(reader.next().await.unwrap().event, "session");

        app.state.server.sessions().close(&id).unwrap();

        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_session_and_bad_cursor() {
        let app = app();

        let response = app.router.clone().oneshot(get(Some("missing"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.router.clone().oneshot(get(None, Some("abc"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.state.server.sessions().is_empty());
    }
}
