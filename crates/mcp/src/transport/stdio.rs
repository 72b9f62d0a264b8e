// Newline-delimited JSON-RPC over a byte stream (stdin/stdout in production)

use super::{MessageChannel, TransportError};
use crate::error::McpError;
use crate::protocol::JsonRpcResponse;
use crate::server::{McpServer, RequestContext};
use crate::session::TransportKind;
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};

/// Longest accepted input line.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

enum Frame {
    Line(String),
    TooLong,
    Malformed(String),
}

/// [`LinesCodec`] that reports over-long and non-UTF-8 lines as frames
/// instead of failing the whole stream.
struct FrameCodec {
    inner: LinesCodec,
}

impl FrameCodec {
    fn new(max: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max),
        }
    }

    fn map(result: Result<Option<String>, LinesCodecError>) -> Result<Option<Frame>, std::io::Error> {
        match result {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::TooLong)),
            Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                Ok(Some(Frame::Malformed(e.to_string())))
            }
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        Self::map(self.inner.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        Self::map(self.inner.decode_eof(src))
    }
}

/// [`MessageChannel`] over an `AsyncRead`/`AsyncWrite` pair, one message per line.
pub struct LineChannel<R, W> {
    reader: FramedRead<R, FrameCodec>,
    writer: FramedWrite<W, LinesCodec>,
    max: usize,
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_max_length(reader, writer, MAX_LINE_BYTES)
    }

    pub fn with_max_length(reader: R, writer: W, max: usize) -> Self {
        Self {
            reader: FramedRead::new(reader, FrameCodec::new(max)),
            writer: FramedWrite::new(writer, LinesCodec::new()),
            max,
        }
    }
}

impl LineChannel<tokio::io::Stdin, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

#[async_trait::async_trait]
impl<R, W> MessageChannel for LineChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> Option<Result<String, TransportError>> {
        match self.reader.next().await? {
            Ok(Frame::Line(line)) => Some(Ok(line)),
            Ok(Frame::TooLong) => Some(Err(TransportError::MessageTooLong { max: self.max })),
            Ok(Frame::Malformed(reason)) => Some(Err(TransportError::Malformed(reason))),
            Err(e) => Some(Err(e.into())),
        }
    }

    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        self.writer.send(message).await.map_err(|e| match e {
            LinesCodecError::Io(e) => TransportError::Io(e),
            LinesCodecError::MaxLineLengthExceeded => TransportError::MessageTooLong { max: usize::MAX },
        })
    }
}

fn parse_error_line(reason: &str) -> String {
    let response = JsonRpcResponse::error(
        Value::Null,
        McpError::Parse(reason.to_string()).to_jsonrpc(),
    );
    serde_json::to_string(&response).unwrap_or_default()
}

/// Serve one peer until end of input.
///
/// The process-wide session is created here and closed on exit. Each message
/// is dispatched on its own task; replies and notifications share one writer,
/// so responses go out in completion order. At end of input in-flight calls
/// are drained and pending output flushed before returning. When the channel
/// fails instead, in-flight calls are cancelled before the drain.
pub async fn serve<C: MessageChannel>(server: Arc<McpServer>, mut channel: C) -> Result<(), TransportError> {
    let session = server.sessions().create(TransportKind::Stdio)?;
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let context = RequestContext::new(session.clone()).with_notifier(Arc::new(tx.clone()));
    let mut tasks = JoinSet::new();

    tracing::info!(session_id = %session.id(), "Stdio transport ready");

    let outcome = loop {
        tokio::select! {
            incoming = channel.receive() => match incoming {
                None => break Ok(()),
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    session.touch();
                    let server = server.clone();
                    let context = context.clone();
                    let tx = tx.clone();
                    tasks.spawn(async move {
                        if let Some(reply) = server.handle_text(&line, &context).await {
                            match serde_json::to_string(&reply) {
                                Ok(text) => {
                                    let _ = tx.send(text);
                                }
                                Err(e) => tracing::error!(error = %e, "Failed to serialize reply"),
                            }
                        }
                    });
                }
                Some(Err(e)) if e.is_recoverable() => {
                    tracing::warn!(error = %e, "Rejected input frame");
                    let _ = tx.send(parse_error_line(&e.to_string()));
                }
                Some(Err(e)) => break Err(e),
            },
            Some(text) = rx.recv() => {
                if let Err(e) = channel.send(&text).await {
                    break Err(e);
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Request task failed");
                }
            }
        }
    };

    if let Err(e) = &outcome {
        tracing::warn!(error = %e, inflight = tasks.len(), "Stdio channel failed, cancelling in-flight calls");
        session.cancellation().cancel();
    }

    // Drain in-flight work, then flush whatever it produced
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Request task failed");
        }
    }
    drop(context);
    drop(tx);
    let mut outcome = outcome;
    while let Some(text) = rx.recv().await {
        if outcome.is_err() {
            break;
        }
        if let Err(e) = channel.send(&text).await {
            outcome = Err(e);
        }
    }

    let _ = server.sessions().close(session.id());
    tracing::info!("Stdio transport finished");
    outcome
}
