//! Buffered work queue with redelivery, visibility windows, and
//! dead-lettering.
//!
//! Messages move through a small state machine: enqueued, then in-flight
//! once received, then either acknowledged (gone), back to enqueued when
//! the visibility window lapses, or transferred to the dead-letter queue
//! once the receive count exceeds the redrive threshold. Delivery is
//! at-least-once; consumers must be idempotent.

use crate::error::{PipelineError, Result};
use crate::topic::Destination;
use crate::types::{Event, MessageId, Timestamp};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Smallest sleep while long-polling, to avoid a zero-duration spin.
const MIN_POLL_SLEEP: Duration = Duration::from_millis(1);

/// Redrive policy: where repeatedly-failing messages go.
#[derive(Clone)]
pub struct RedrivePolicy {
    /// Destination for dead-lettered messages. Must not point back at the
    /// queue it serves.
    pub queue: Arc<Queue>,

    /// Receives allowed before transfer; a message moves once its receive
    /// count would exceed this.
    pub max_receive_count: u32,
}

/// Configuration for a queue.
#[derive(Clone)]
pub struct QueueConfig {
    /// Queue name used in logs and errors.
    pub name: String,

    /// How long a received message stays hidden before it becomes
    /// eligible for redelivery.
    pub visibility_timeout: Duration,

    /// Dead-letter redrive, if any.
    pub redrive: Option<RedrivePolicy>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "queue".to_string(),
            visibility_timeout: Duration::from_secs(30),
            redrive: None,
        }
    }
}

/// A message buffered in a queue.
#[derive(Clone, Debug)]
pub struct QueueMessage {
    /// Queue-assigned identifier, used to acknowledge.
    pub id: MessageId,

    /// The buffered event.
    pub payload: Event,

    /// Delivery attempts so far, including the one that returned this
    /// message. Mutated only by the queue.
    pub receive_count: u32,

    /// When the message was enqueued.
    pub enqueued_at: Timestamp,
}

/// Mutable queue state, guarded by one mutex.
struct Inner {
    /// Message ids awaiting delivery, FIFO.
    ready: VecDeque<MessageId>,

    /// All live messages by id.
    messages: HashMap<MessageId, QueueMessage>,

    /// Received-but-unacknowledged ids and when they become visible again.
    in_flight: HashMap<MessageId, Instant>,

    closed: bool,
}

/// Buffered queue for a single consumer group.
pub struct Queue {
    config: QueueConfig,
    inner: Mutex<Inner>,
    /// Signalled on enqueue and close.
    available: Condvar,
    /// Counter for assigning message IDs.
    next_id: AtomicU64,
}

impl Queue {
    /// Create a new queue.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                messages: HashMap::new(),
                in_flight: HashMap::new(),
                closed: false,
            }),
            available: Condvar::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a queue with the given name and default timing.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(QueueConfig {
            name: name.into(),
            ..Default::default()
        })
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Append a message. Fails only when the queue is closed.
    pub fn enqueue(&self, event: Event) -> Result<MessageId> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PipelineError::QueueClosed(self.config.name.clone()));
        }

        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        inner.messages.insert(
            id,
            QueueMessage {
                id,
                payload: event,
                receive_count: 0,
                enqueued_at: Timestamp::now(),
            },
        );
        inner.ready.push_back(id);
        drop(inner);

        self.available.notify_one();
        Ok(id)
    }

    /// Receive up to `max_items` messages, blocking up to `wait` while the
    /// queue is empty (long-poll).
    ///
    /// Each returned message's receive count has been incremented and the
    /// message is hidden for the visibility timeout. A message whose
    /// incremented count exceeds the redrive threshold is transferred to
    /// the dead-letter queue instead of being returned. Returns an empty
    /// batch on timeout or once the queue is closed.
    pub fn receive_batch(&self, max_items: usize, wait: Duration) -> Vec<QueueMessage> {
        let deadline = Instant::now() + wait;
        let mut inner = self.inner.lock();

        loop {
            if inner.closed {
                return Vec::new();
            }

            self.reclaim_expired(&mut inner);

            let batch = self.take_ready(&mut inner, max_items);
            if !batch.is_empty() {
                return batch;
            }

            // Sleep until something can change: an enqueue, the next
            // visibility expiry, or the poll deadline.
            let now = Instant::now();
            if now >= deadline {
                return Vec::new();
            }
            let mut wake = deadline;
            if let Some(expiry) = inner.in_flight.values().min() {
                wake = wake.min(*expiry);
            }
            let timeout = wake
                .saturating_duration_since(now)
                .max(MIN_POLL_SLEEP);
            let _ = self.available.wait_for(&mut inner, timeout);
        }
    }

    /// Permanently remove a message.
    pub fn acknowledge(&self, id: MessageId) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.messages.remove(&id).is_none() {
            return Err(PipelineError::MessageNotFound(id));
        }
        inner.in_flight.remove(&id);
        Ok(())
    }

    /// Close the queue: enqueues fail, pollers wake and drain empty.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of live messages (ready plus in-flight).
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    /// Whether the queue holds no live messages.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of received-but-unacknowledged messages.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Move messages whose visibility window lapsed back to the ready list.
    fn reclaim_expired(&self, inner: &mut Inner) {
        let now = Instant::now();
        let expired: Vec<MessageId> = inner
            .in_flight
            .iter()
            .filter(|(_, visible_at)| **visible_at <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            inner.in_flight.remove(&id);
            // Acknowledged-late messages are already gone from `messages`.
            if inner.messages.contains_key(&id) {
                inner.ready.push_back(id);
                debug!(queue = %self.config.name, id = %id, "visibility lapsed, message redelivered");
            }
        }
    }

    /// Pop ready messages, incrementing receive counts and dead-lettering
    /// along the way.
    fn take_ready(&self, inner: &mut Inner, max_items: usize) -> Vec<QueueMessage> {
        let mut batch = Vec::new();

        while batch.len() < max_items {
            let id = match inner.ready.pop_front() {
                Some(id) => id,
                None => break,
            };
            // Ids acknowledged while waiting in the ready list are stale.
            let mut message = match inner.messages.remove(&id) {
                Some(message) => message,
                None => continue,
            };

            message.receive_count += 1;

            match &self.config.redrive {
                Some(policy) if message.receive_count > policy.max_receive_count => {
                    warn!(
                        queue = %self.config.name,
                        id = %id,
                        receives = message.receive_count,
                        dead_letter = %policy.queue.name(),
                        "receive count exceeded, dead-lettering message"
                    );
                    if let Err(e) = policy.queue.enqueue(message.payload) {
                        warn!(
                            queue = %self.config.name,
                            id = %id,
                            error = %e,
                            "dead-letter transfer failed, message dropped"
                        );
                    }
                }
                _ => {
                    inner
                        .in_flight
                        .insert(id, Instant::now() + self.config.visibility_timeout);
                    inner.messages.insert(id, message.clone());
                    batch.push(message);
                }
            }
        }

        batch
    }
}

impl Destination for Queue {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn deliver(&self, event: Event) -> Result<()> {
        self.enqueue(event).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const NO_WAIT: Duration = Duration::ZERO;

    fn event(key: &str) -> Event {
        Event::new("ObjectCreated:Put").with_attr("objectKey", key)
    }

    fn short_visibility(name: &str, visibility_ms: u64) -> Queue {
        Queue::new(QueueConfig {
            name: name.to_string(),
            visibility_timeout: Duration::from_millis(visibility_ms),
            redrive: None,
        })
    }

    #[test]
    fn test_enqueue_receive_acknowledge() {
        let queue = Queue::named("q");

        let id = queue.enqueue(event("a.png")).unwrap();
        assert_eq!(queue.len(), 1);

        let batch = queue.receive_batch(10, NO_WAIT);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);
        assert_eq!(batch[0].receive_count, 1);
        assert_eq!(batch[0].payload.attr("objectKey"), Some("a.png"));
        assert_eq!(queue.in_flight(), 1);

        queue.acknowledge(id).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn test_batch_is_bounded() {
        let queue = Queue::named("q");
        for i in 0..7 {
            queue.enqueue(event(&format!("{i}.png"))).unwrap();
        }

        let batch = queue.receive_batch(5, NO_WAIT);
        assert_eq!(batch.len(), 5);

        let rest = queue.receive_batch(5, NO_WAIT);
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_in_flight_messages_are_hidden() {
        let queue = Queue::named("q");
        queue.enqueue(event("a.png")).unwrap();

        let first = queue.receive_batch(10, NO_WAIT);
        assert_eq!(first.len(), 1);

        // Hidden until the visibility window lapses.
        let second = queue.receive_batch(10, NO_WAIT);
        assert!(second.is_empty());
    }

    #[test]
    fn test_visibility_lapse_redelivers() {
        let queue = short_visibility("q", 20);
        let id = queue.enqueue(event("a.png")).unwrap();

        let first = queue.receive_batch(10, NO_WAIT);
        assert_eq!(first[0].receive_count, 1);

        let again = queue.receive_batch(10, Duration::from_millis(500));
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, id);
        assert_eq!(again[0].receive_count, 2);
    }

    #[test]
    fn test_acknowledge_unknown_id() {
        let queue = Queue::named("q");
        assert!(matches!(
            queue.acknowledge(MessageId(42)),
            Err(PipelineError::MessageNotFound(MessageId(42)))
        ));
    }

    #[test]
    fn test_double_acknowledge_is_an_error() {
        let queue = Queue::named("q");
        let id = queue.enqueue(event("a.png")).unwrap();
        queue.receive_batch(1, NO_WAIT);

        queue.acknowledge(id).unwrap();
        assert!(queue.acknowledge(id).is_err());
    }

    #[test]
    fn test_dead_letter_transfer() {
        let dlq = Arc::new(Queue::named("dlq"));
        let queue = Queue::new(QueueConfig {
            name: "q".to_string(),
            visibility_timeout: Duration::from_millis(10),
            redrive: Some(RedrivePolicy {
                queue: Arc::clone(&dlq),
                max_receive_count: 2,
            }),
        });

        queue.enqueue(event("bad.exe")).unwrap();

        // Two failed deliveries, then the third attempt dead-letters.
        for expected in 1..=2 {
            let batch = queue.receive_batch(10, Duration::from_millis(500));
            assert_eq!(batch.len(), 1);
            assert_eq!(batch[0].receive_count, expected);
        }
        let transferred = queue.receive_batch(10, Duration::from_millis(500));
        assert!(transferred.is_empty());

        assert!(queue.is_empty());
        assert_eq!(dlq.len(), 1);

        let dead = dlq.receive_batch(10, NO_WAIT);
        assert_eq!(dead[0].payload.attr("objectKey"), Some("bad.exe"));
        // Receive counts start over in the dead-letter queue.
        assert_eq!(dead[0].receive_count, 1);
    }

    #[test]
    fn test_long_poll_wakes_on_enqueue() {
        let queue = Arc::new(Queue::named("q"));
        let poller = Arc::clone(&queue);

        let handle = thread::spawn(move || poller.receive_batch(1, Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(50));
        queue.enqueue(event("a.png")).unwrap();

        let batch = handle.join().unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_close_wakes_pollers_and_rejects_enqueue() {
        let queue = Arc::new(Queue::named("q"));
        let poller = Arc::clone(&queue);

        let handle = thread::spawn(move || poller.receive_batch(1, Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(50));
        queue.close();

        let batch = handle.join().unwrap();
        assert!(batch.is_empty());
        assert!(matches!(
            queue.enqueue(event("a.png")),
            Err(PipelineError::QueueClosed(_))
        ));
    }

    #[test]
    fn test_enqueued_at_is_set() {
        let queue = Queue::named("q");
        let before = Timestamp::now();
        queue.enqueue(event("a.png")).unwrap();

        let batch = queue.receive_batch(1, NO_WAIT);
        assert!(batch[0].enqueued_at >= before);
    }
}
