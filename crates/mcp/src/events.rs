// Bounded per-session event queue backing the SSE stream

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::watch;

/// One event addressed to a session stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub id: u64,
    pub payload: Value,
}

/// Ids that were evicted before the reader got to them (inclusive range).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub from: u64,
    pub to: u64,
}

/// What a reader gets back from [`EventQueue::recv_after`].
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub gap: Option<Gap>,
    pub events: Vec<StreamEvent>,
}

impl Delivery {
    /// Highest id covered by this delivery, gap included.
    pub fn last_id(&self) -> Option<u64> {
        self.events
            .last()
            .map(|e| e.id)
            .or_else(|| self.gap.map(|g| g.to))
    }
}

struct QueueState {
    next_id: u64,
    events: VecDeque<StreamEvent>,
    closed: bool,
}

impl QueueState {
    fn newest(&self) -> u64 {
        self.next_id - 1
    }

    fn collect_after(&self, cursor: u64) -> Option<Delivery> {
        let first_available = self.events.front().map(|e| e.id).unwrap_or(self.next_id);

        let gap = (cursor + 1 < first_available).then(|| Gap {
            from: cursor + 1,
            to: first_available - 1,
        });

        let events: Vec<StreamEvent> = self
            .events
            .iter()
            .filter(|e| e.id > cursor)
            .cloned()
            .collect();

        if gap.is_none() && events.is_empty() {
            None
        } else {
            Some(Delivery { gap, events })
        }
    }
}

/// Ring of the most recent events of one session. Ids start at 1 and never
/// repeat. When full, the oldest event is dropped and readers that had not
/// seen it get an explicit [`Gap`].
pub struct EventQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    notify: watch::Sender<u64>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState {
                next_id: 1,
                events: VecDeque::new(),
                closed: false,
            }),
            notify: watch::Sender::new(0),
        }
    }

    /// Append an event; returns its id, or `None` once the queue is closed.
    pub fn push(&self, payload: Value) -> Option<u64> {
        let id = {
            let mut state = self.state.lock();
            if state.closed {
                return None;
            }

            while state.events.len() >= self.capacity {
                if let Some(evicted) = state.events.pop_front() {
                    tracing::warn!(
                        event_id = evicted.id,
                        capacity = self.capacity,
                        "Event queue full, dropping oldest event"
                    );
                }
            }

            let id = state.next_id;
            state.next_id += 1;
            state.events.push_back(StreamEvent { id, payload });
            id
        };

        self.notify.send_replace(id);
        Some(id)
    }

    /// Wait for events with id greater than `cursor`. A cursor ahead of the
    /// newest id is clamped to it once, on entry, so the next push is
    /// delivered. Returns `None` when the queue is closed and nothing is left
    /// to deliver.
    pub async fn recv_after(&self, cursor: u64) -> Option<Delivery> {
        let mut changes = self.notify.subscribe();
        let cursor = self.clamp(cursor);
        loop {
            {
                let state = self.state.lock();
                if let Some(delivery) = state.collect_after(cursor) {
                    return Some(delivery);
                }
                if state.closed {
                    return None;
                }
            }

            if changes.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Non-blocking variant of [`recv_after`](Self::recv_after).
    pub fn try_recv_after(&self, cursor: u64) -> Option<Delivery> {
        let state = self.state.lock();
        state.collect_after(cursor.min(state.newest()))
    }

    /// `cursor`, or the newest id when the cursor points past it.
    pub fn clamp(&self, cursor: u64) -> u64 {
        let newest = self.last_id();
        if cursor > newest {
            tracing::debug!(cursor, newest, "Reader cursor ahead of queue, clamping");
        }
        cursor.min(newest)
    }

    /// Id of the newest event, 0 if nothing was pushed yet.
    pub fn last_id(&self) -> u64 {
        self.state.lock().newest()
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the queue and wake every blocked reader.
    pub fn close(&self) {
        let last = {
            let mut state = self.state.lock();
            state.closed = true;
            state.newest()
        };
        self.notify.send_replace(last);
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.events.len())
            .field("next_id", &state.next_id)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn ids(delivery: &Delivery) -> Vec<u64> {
        delivery.events.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_ids_strictly_increase() {
        let queue = EventQueue::new(8);
        let a = queue.push(json!("a")).unwrap();
        let b = queue.push(json!("b")).unwrap();
        let c = queue.push(json!("c")).unwrap();

        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(queue.last_id(), 3);
    }

    #[test]
    fn test_resume_replays_only_newer_events() {
        let queue = EventQueue::new(8);
        for i in 0..5 {
            queue.push(json!(i));
        }

        let delivery = queue.try_recv_after(2).unwrap();
        assert_eq!(delivery.gap, None);
        assert_eq!(ids(&delivery), vec![3, 4, 5]);
        assert!(queue.try_recv_after(5).is_none());
    }

    #[test]
    fn test_overflow_reports_gap() {
        let queue = EventQueue::new(3);
        for i in 0..6 {
            queue.push(json!(i));
        }

        // 1..=3 evicted, 4..=6 retained
        assert_eq!(queue.len(), 3);
        let delivery = queue.try_recv_after(1).unwrap();
        assert_eq!(delivery.gap, Some(Gap { from: 2, to: 3 }));
        assert_eq!(ids(&delivery), vec![4, 5, 6]);
        assert_eq!(delivery.last_id(), Some(6));

        let fresh = queue.try_recv_after(0).unwrap();
        assert_eq!(fresh.gap, Some(Gap { from: 1, to: 3 }));
    }

    #[test]
    fn test_cursor_ahead_is_clamped() {
        let queue = EventQueue::new(4);
        queue.push(json!(1));
        queue.push(json!(2));

        assert_eq!(queue.clamp(100), 2);
        assert_eq!(queue.clamp(1), 1);
        assert!(queue.try_recv_after(100).is_none());
    }

    #[tokio::test]
    async fn test_reader_ahead_of_queue_gets_next_push() {
        let queue = Arc::new(EventQueue::new(4));
        queue.push(json!(1));
        queue.push(json!(2));

        let reader = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.recv_after(100).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(json!(3));
        queue.push(json!(4));

        let delivery = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader woke up")
            .unwrap()
            .unwrap();
        assert_eq!(delivery.gap, None);
        assert_eq!(ids(&delivery)[0], 3);
    }

    #[tokio::test]
    async fn test_reader_wakes_on_push() {
        let queue = Arc::new(EventQueue::new(4));
        let reader = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.recv_after(0).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(json!({"hello": "world"}));

        let delivery = reader.await.unwrap().unwrap();
        assert_eq!(delivery.events[0].payload["hello"], "world");
    }

    #[tokio::test]
    async fn test_close_releases_reader() {
        let queue = Arc::new(EventQueue::new(4));
        let reader = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.recv_after(0).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        assert!(reader.await.unwrap().is_none());
        assert!(queue.push(json!("late")).is_none());
    }
}
