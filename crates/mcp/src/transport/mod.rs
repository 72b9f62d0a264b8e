// Transport abstraction shared by the stdio and HTTP/SSE front ends

pub mod stdio;

use crate::events::EventQueue;
use crate::session::{Session, SessionError};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use stdio::{serve, LineChannel, MAX_LINE_BYTES};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("message exceeds {max} bytes")]
    MessageTooLong { max: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// Framing problems affect one message only; the channel keeps serving.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MessageTooLong { .. } | Self::Malformed(_))
    }
}

/// A bidirectional, message-framed connection to one peer.
#[async_trait::async_trait]
pub trait MessageChannel: Send {
    /// Next inbound message; `None` at end of input.
    async fn receive(&mut self) -> Option<Result<String, TransportError>>;

    /// Write one outbound message and flush it.
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;
}

/// Destination for server-originated notifications (progress and the like).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: Value);
}

impl NotificationSink for mpsc::UnboundedSender<String> {
    fn notify(&self, message: Value) {
        if self.send(message.to_string()).is_err() {
            tracing::debug!("Notification dropped, writer is gone");
        }
    }
}

impl NotificationSink for EventQueue {
    fn notify(&self, message: Value) {
        if self.push(message).is_none() {
            tracing::debug!("Notification dropped, event queue closed");
        }
    }
}

/// Routes notifications into a session's event queue (the SSE stream).
#[derive(Clone)]
pub struct SessionEvents(pub Arc<Session>);

impl NotificationSink for SessionEvents {
    fn notify(&self, message: Value) {
        match self.0.events() {
            Some(events) => events.notify(message),
            None => tracing::debug!(session_id = %self.0.id(), "Session has no event stream"),
        }
    }
}
