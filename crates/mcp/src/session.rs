// Session manager: per-client state, idle expiry and lifecycle

use crate::events::EventQueue;
use crate::protocol::ClientInfo;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const SHARD_COUNT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session expired: {0}")]
    Expired(String),

    #[error("Session limit reached ({0})")]
    TooManySessions(usize),

    #[error("Session {0} already has an event stream attached")]
    StreamAlreadyAttached(String),

    #[error("Session {0} does not support event streams")]
    NoEventStream(String),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions idle for longer than this are removed.
    pub idle_timeout: Duration,
    /// Idle limit for an HTTP session whose id the client never sent back.
    pub unclaimed_timeout: Duration,
    /// Retention window of each session's event queue.
    pub event_capacity: usize,
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
            unclaimed_timeout: Duration::from_secs(60),
            event_capacity: 256,
            max_sessions: 1024,
        }
    }
}

/// State bound to one logical client connection.
pub struct Session {
    id: String,
    kind: TransportKind,
    created_at: DateTime<Utc>,
    last_seen: Mutex<Instant>,
    events: Option<EventQueue>,
    cancel: CancellationToken,
    inflight: Mutex<HashMap<String, CancellationToken>>,
    client_info: Mutex<Option<ClientInfo>>,
    stream_attached: AtomicBool,
    claimed: AtomicBool,
}

impl Session {
    fn new(kind: TransportKind, event_capacity: usize) -> Self {
        let events = match kind {
            TransportKind::Http => Some(EventQueue::new(event_capacity)),
            TransportKind::Stdio => None,
        };

        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            kind,
            created_at: Utc::now(),
            last_seen: Mutex::new(Instant::now()),
            events,
            cancel: CancellationToken::new(),
            inflight: Mutex::new(HashMap::new()),
            client_info: Mutex::new(None),
            stream_attached: AtomicBool::new(false),
            claimed: AtomicBool::new(kind == TransportKind::Stdio),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the client has presented this session's id since it was created.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Outbound event queue; only streaming-capable transports have one.
    pub fn events(&self) -> Option<&EventQueue> {
        self.events.as_ref()
    }

    /// Cancelled when the session is closed.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn set_client_info(&self, info: Option<ClientInfo>) {
        *self.client_info.lock() = info;
    }

    pub fn client_info(&self) -> Option<ClientInfo> {
        self.client_info.lock().clone()
    }

    /// Track an in-flight request so `notifications/cancelled` can reach it.
    /// The returned guard unregisters the request when dropped. `None` when a
    /// request with the same key is still running.
    pub fn register_request(self: &Arc<Self>, key: String, parent: &CancellationToken) -> Option<InflightRequest> {
        let token = parent.child_token();
        match self.inflight.lock().entry(key.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(session_id = %self.id, request_id = %key, "Request id already in flight");
                return None;
            }
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
            }
        }

        Some(InflightRequest {
            session: self.clone(),
            key,
            token,
        })
    }

    /// Cancel the in-flight request registered under `key`.
    pub fn cancel_request(&self, key: &str) -> bool {
        match self.inflight.lock().get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Claim the single event stream slot of this session.
    pub fn attach_stream(self: &Arc<Self>) -> Result<StreamGuard, SessionError> {
        if self.events.is_none() {
            return Err(SessionError::NoEventStream(self.id.clone()));
        }
        if self
            .stream_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::StreamAlreadyAttached(self.id.clone()));
        }
        Ok(StreamGuard {
            session: self.clone(),
        })
    }

    pub fn has_stream(&self) -> bool {
        self.stream_attached.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(events) = &self.events {
            events.close();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("created_at", &self.created_at)
            .field("has_stream", &self.has_stream())
            .finish()
    }
}

/// Registration of one in-flight request.
pub struct InflightRequest {
    session: Arc<Session>,
    key: String,
    token: CancellationToken,
}

impl InflightRequest {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for InflightRequest {
    fn drop(&mut self) {
        self.session.inflight.lock().remove(&self.key);
    }
}

/// Held by the live SSE stream of a session.
pub struct StreamGuard {
    session: Arc<Session>,
}

impl StreamGuard {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.session.stream_attached.store(false, Ordering::Release);
        self.session.touch();
    }
}

/// Session table striped over independently locked shards.
pub struct SessionManager {
    config: SessionConfig,
    shards: Vec<RwLock<HashMap<String, Arc<Session>>>>,
    count: AtomicUsize,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            count: AtomicUsize::new(0),
        }
    }

    fn shard(&self, id: &str) -> &RwLock<HashMap<String, Arc<Session>>> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Create a session with a fresh random id.
    pub fn create(&self, kind: TransportKind) -> Result<Arc<Session>, SessionError> {
        let max = self.config.max_sessions;
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .map_err(|_| SessionError::TooManySessions(max))?;

        let session = Arc::new(Session::new(kind, self.config.event_capacity));
        self.shard(session.id())
            .write()
            .insert(session.id.clone(), session.clone());

        tracing::info!(session_id = %session.id(), kind = ?kind, "Session created");
        Ok(session)
    }

    /// Look up a live session and mark it claimed. An idle-expired session is
    /// removed on the spot.
    pub fn lookup(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        let session = self
            .shard(id)
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if self.is_expired(&session) {
            self.remove(id);
            return Err(SessionError::Expired(id.to_string()));
        }
        session.claimed.store(true, Ordering::Release);
        Ok(session)
    }

    pub fn touch(&self, id: &str) -> Result<(), SessionError> {
        self.lookup(id)?.touch();
        Ok(())
    }

    /// Remove a session, cancel its work and release its stream reader.
    pub fn close(&self, id: &str) -> Result<(), SessionError> {
        if self.remove(id) {
            tracing::info!(session_id = %id, "Session closed");
            Ok(())
        } else {
            Err(SessionError::NotFound(id.to_string()))
        }
    }

    fn remove(&self, id: &str) -> bool {
        let removed = self.shard(id).write().remove(id);
        match removed {
            Some(session) => {
                self.count.fetch_sub(1, Ordering::AcqRel);
                session.shutdown();
                true
            }
            None => false,
        }
    }

    /// Idle limit for `session`: the unclaimed limit until its id is presented.
    fn ttl(&self, session: &Session) -> Duration {
        if session.is_claimed() {
            self.config.idle_timeout
        } else {
            self.config.unclaimed_timeout.min(self.config.idle_timeout)
        }
    }

    fn is_expired(&self, session: &Session) -> bool {
        !session.has_stream() && session.idle_for() > self.ttl(session)
    }

    /// Remove every session idle past its limit. Sessions with an attached
    /// stream are kept.
    pub fn expire_idle(&self) -> usize {
        let mut expired = Vec::new();

        for shard in &self.shards {
            let mut sessions = shard.write();
            sessions.retain(|_, session| {
                if self.is_expired(session) {
                    expired.push(session.clone());
                    false
                } else {
                    true
                }
            });
        }

        for session in &expired {
            self.count.fetch_sub(1, Ordering::AcqRel);
            session.shutdown();
            tracing::info!(session_id = %session.id(), "Session expired");
        }
        expired.len()
    }

    /// Run [`expire_idle`](Self::expire_idle) every `interval` until `shutdown`.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = manager.expire_idle();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = manager.len(), "Idle session sweep");
                        }
                    }
                }
            }
            tracing::debug!("Session sweeper stopped");
        })
    }

    /// Close every session. Used on process shutdown.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for shard in &self.shards {
            let drained: Vec<_> = shard.write().drain().map(|(_, s)| s).collect();
            for session in drained {
                self.count.fetch_sub(1, Ordering::AcqRel);
                session.shutdown();
                closed += 1;
            }
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
