//! Idempotent keyed record store with a change feed.
//!
//! The store owns its records exclusively; key uniqueness is its sole
//! consistency invariant. Every mutation emits a [`ChangeEvent`] to the
//! change feed from inside the mutation's critical section, so per-key
//! event order always matches per-key state order. Cross-key ordering is
//! not guaranteed to observers.

use crate::error::{PipelineError, Result};
use crate::types::{Event, SubscriptionId};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Default change-feed buffer before a slow subscriber is dropped.
const DEFAULT_FEED_BUFFER: usize = 1024;

/// Kind of store mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Insert,
    Modify,
    Remove,
}

/// A record owned by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub attributes: HashMap<String, String>,
}

/// Change event emitted on every store mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub key: String,
    /// Attributes before the mutation (absent on insert).
    pub old_attributes: Option<HashMap<String, String>>,
    /// Attributes after the mutation (absent on remove).
    pub new_attributes: Option<HashMap<String, String>>,
}

impl ChangeEvent {
    /// Routing tag for this change.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            ChangeKind::Insert => "RecordInsert",
            ChangeKind::Modify => "RecordModify",
            ChangeKind::Remove => "RecordRemove",
        }
    }

    /// Convert into a routable event: the change JSON as the body, the
    /// record key as a routing attribute.
    pub fn into_event(self) -> Result<Event> {
        let event_type = self.event_type();
        let body = serde_json::to_vec(&self)?;
        Ok(Event::new(event_type)
            .with_attr("key", self.key)
            .with_body(body))
    }

    /// Parse a change back out of a routed event's body.
    pub fn from_event(event: &Event) -> Result<Self> {
        serde_json::from_slice(&event.body)
            .map_err(|e| PipelineError::Deserialization(e.to_string()))
    }
}

/// Handle for receiving change events.
pub struct ChangeFeedHandle {
    pub id: SubscriptionId,
    /// Channel to receive changes.
    pub receiver: Receiver<ChangeEvent>,
}

impl ChangeFeedHandle {
    /// Receive the next change (blocking).
    pub fn recv(&self) -> std::result::Result<ChangeEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a change (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<ChangeEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<ChangeEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Broadcasts change events to feed subscribers.
struct ChangeFeed {
    /// Active subscribers by ID.
    subscribers: RwLock<HashMap<SubscriptionId, Sender<ChangeEvent>>>,
    /// Counter for generating subscriber IDs.
    next_id: AtomicU64,
}

impl ChangeFeed {
    fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn subscribe(&self, buffer: usize) -> ChangeFeedHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(buffer);
        self.subscribers.write().insert(id, sender);
        ChangeFeedHandle { id, receiver }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().remove(&id);
    }

    /// Broadcast a change. Subscribers that cannot keep up are dropped.
    fn broadcast(&self, change: &ChangeEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscribers.read();
            for (id, sender) in subs.iter() {
                if sender.try_send(change.clone()).is_err() {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscribers.write();
            for id in to_remove {
                subs.remove(&id);
                warn!(subscriber = ?id, "dropping slow change-feed subscriber");
            }
        }
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Idempotent keyed record store, last-writer-wins per key.
pub struct RecordStore {
    records: RwLock<HashMap<String, HashMap<String, String>>>,
    feed: ChangeFeed,
}

impl RecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            feed: ChangeFeed::new(),
        }
    }

    /// Insert or overwrite a record, emitting an insert or modify change.
    ///
    /// Idempotent at the state level: repeating a put with identical
    /// attributes leaves the store unchanged, though each call still
    /// emits a change event.
    pub fn put(&self, key: impl Into<String>, attributes: HashMap<String, String>) -> ChangeKind {
        let key = key.into();
        let mut records = self.records.write();
        let old = records.insert(key.clone(), attributes.clone());
        let kind = if old.is_some() {
            ChangeKind::Modify
        } else {
            ChangeKind::Insert
        };

        self.feed.broadcast(&ChangeEvent {
            kind,
            key,
            old_attributes: old,
            new_attributes: Some(attributes),
        });

        kind
    }

    /// Delete a record, emitting a remove change carrying the last known
    /// attributes. Removing an absent key is a no-op and emits nothing.
    pub fn remove(&self, key: &str) -> Option<ChangeEvent> {
        let mut records = self.records.write();
        let old = records.remove(key)?;

        let change = ChangeEvent {
            kind: ChangeKind::Remove,
            key: key.to_string(),
            old_attributes: Some(old),
            new_attributes: None,
        };
        self.feed.broadcast(&change);
        Some(change)
    }

    /// Latest record for a key, if any.
    pub fn get(&self, key: &str) -> Option<Record> {
        self.records.read().get(key).map(|attributes| Record {
            key: key.to_string(),
            attributes: attributes.clone(),
        })
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.records.read().contains_key(key)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Subscribe to the change feed with the default buffer.
    pub fn subscribe_changes(&self) -> ChangeFeedHandle {
        self.feed.subscribe(DEFAULT_FEED_BUFFER)
    }

    /// Subscribe to the change feed with a custom buffer.
    pub fn subscribe_changes_with_buffer(&self, buffer: usize) -> ChangeFeedHandle {
        self.feed.subscribe(buffer)
    }

    /// Remove a change-feed subscriber.
    pub fn unsubscribe_changes(&self, id: SubscriptionId) {
        self.feed.unsubscribe(id);
    }

    /// Number of change-feed subscribers.
    pub fn change_subscriber_count(&self) -> usize {
        self.feed.subscriber_count()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
