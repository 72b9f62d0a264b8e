// Origin allow-list for the MCP endpoint (DNS-rebinding protection) and the
// CORS layer derived from it.

use crate::api::ErrorResponse;
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use url::Url;

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

#[derive(Debug, thiserror::Error)]
pub enum OriginPolicyError {
    #[error("invalid origin entry {0:?}, expected scheme://host[:port]")]
    InvalidEntry(String),
}

#[derive(Debug, Clone, PartialEq)]
struct OriginEntry {
    scheme: String,
    host: String,
    /// `None` matches any port.
    port: Option<u16>,
}

impl OriginEntry {
    fn parse(entry: &str) -> Result<Self, OriginPolicyError> {
        let invalid = || OriginPolicyError::InvalidEntry(entry.to_string());

        let (scheme, authority) = entry.trim().split_once("://").ok_or_else(invalid)?;
        let authority = authority.trim_end_matches('/');

        let (host, port) = match authority.rsplit_once(':') {
            // The colon belongs to an IPv6 literal, not a port
            Some((_, tail)) if tail.contains(']') => (authority, None),
            Some((host, "*")) => (host, None),
            Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
            None => (authority, None),
        };

        if scheme.is_empty() || host.is_empty() || host.contains('/') {
            return Err(invalid());
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
        })
    }

    fn matches(&self, origin: &Url) -> bool {
        origin.scheme() == self.scheme
            && origin.host_str().is_some_and(|h| h.eq_ignore_ascii_case(&self.host))
            && self.port.is_none_or(|p| origin.port_or_known_default() == Some(p))
    }
}

/// Set of origins allowed to talk to the MCP endpoint.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    any: bool,
    entries: Vec<OriginEntry>,
}

impl OriginPolicy {
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Result<Self, OriginPolicyError> {
        let mut policy = Self {
            any: false,
            entries: Vec::new(),
        };
        for entry in entries {
            match entry.as_ref().trim() {
                "*" => policy.any = true,
                other => policy.entries.push(OriginEntry::parse(other)?),
            }
        }
        Ok(policy)
    }

    pub fn allows(&self, origin: &str) -> bool {
        if self.any {
            return true;
        }
        match Url::parse(origin) {
            Ok(url) => self.entries.iter().any(|entry| entry.matches(&url)),
            Err(_) => false,
        }
    }

    pub fn allows_header(&self, origin: &HeaderValue) -> bool {
        origin.to_str().is_ok_and(|o| self.allows(o))
    }

    /// CORS answering preflights for allowed origins only, without credentials.
    pub fn cors_layer(self: &Arc<Self>) -> CorsLayer {
        let policy = self.clone();
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(
                move |origin: &HeaderValue, _: &axum::http::request::Parts| policy.allows_header(origin),
            ))
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::ACCEPT,
                HeaderName::from_static(SESSION_HEADER),
                HeaderName::from_static(LAST_EVENT_ID_HEADER),
            ])
            .expose_headers([HeaderName::from_static(SESSION_HEADER)])
    }
}

/// Reject requests whose `Origin` is present but not allowed. Requests
/// without the header (non-browser clients) pass.
pub async fn check_origin(State(policy): State<Arc<OriginPolicy>>, req: Request, next: Next) -> Response {
    if let Some(origin) = req.headers().get(header::ORIGIN) {
        if !policy.allows_header(origin) {
            tracing::warn!(origin = ?origin, path = %req.uri().path(), "Rejected request from disallowed origin");
            return (StatusCode::FORBIDDEN, Json(ErrorResponse::new("Origin not allowed"))).into_response();
        }
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> OriginPolicy {
        OriginPolicy::new(&["http://localhost", "http://127.0.0.1", "http://[::1]"]).unwrap()
    }

    #[test]
    fn test_loopback_any_port() {
        let policy = loopback();

        assert!(policy.allows("http://localhost"));
        assert!(policy.allows("http://localhost:3000"));
        assert!(policy.allows("http://127.0.0.1:8000"));
        assert!(policy.allows("http://[::1]:5173"));
        assert!(policy.allows("http://LOCALHOST:3000"));
    }

    #[test]
    fn test_rejects_foreign_and_lookalike_origins() {
        let policy = loopback();

        assert!(!policy.allows("http://evil.example.com"));
        assert!(!policy.allows("http://localhost.evil.example.com"));
        assert!(!policy.allows("http://127.0.0.1.nip.io"));
        assert!(!policy.allows("https://localhost"));
        assert!(!policy.allows("null"));
        assert!(!policy.allows("not a url"));
    }

    #[test]
    fn test_explicit_port_must_match() {
        let policy = OriginPolicy::new(&["https://app.example.com:8443", "https://docs.example.com"]).unwrap();

        assert!(policy.allows("https://app.example.com:8443"));
        assert!(!policy.allows("https://app.example.com"));
        assert!(policy.allows("https://docs.example.com"));
        assert!(policy.allows("https://docs.example.com:9000"));
    }

    #[test]
    fn test_wildcard_and_invalid_entries() {
        assert!(OriginPolicy::new(&["*"]).unwrap().allows("https://anything.example"));
        assert!(OriginPolicy::new(&["localhost"]).is_err());
        assert!(OriginPolicy::new(&["http://localhost:http"]).is_err());
        assert!(OriginPolicy::new(&["http://localhost:*"]).unwrap().allows("http://localhost:1"));
    }
}
