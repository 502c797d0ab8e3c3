//! Composition root wiring topics, queues, workers, and the change pump.
//!
//! The routing graph is built with explicit constructor calls:
//!
//! ```text
//! storage-events topic ──[eventName ^ObjectCreated]──► image-created queue ──► ImageIngestor ──► store
//!                      └─[eventName ^ObjectRemoved]──► image-removed queue ──► ObjectRemover ──► store
//! store change feed ──► change pump ──► record-changes topic
//!                                        └─[type ^RecordRemove]──► record-removed-mail queue ──► DeleteMailer
//! image-created DLQ (rejected-uploads) ──► RejectionMailer
//! ```

use crate::envelope::{StorageNotification, ATTR_EVENT_NAME};
use crate::error::Result;
use crate::notifier::{MailTransport, Notifier};
use crate::queue::{Queue, QueueConfig, RedrivePolicy};
use crate::store::RecordStore;
use crate::topic::{Predicate, Topic};
use crate::types::{Event, SubscriptionId};
use crate::worker::{
    DeleteMailer, ImageIngestor, ObjectRemover, RejectionMailer, Worker, WorkerConfig,
    WorkerHandle,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Event-name prefix for the ingestion path.
const CREATED_PREFIX: &str = "ObjectCreated";

/// Event-name prefix for the removal path.
const REMOVED_PREFIX: &str = "ObjectRemoved";

/// Event-type prefix for record-removal change events.
const RECORD_REMOVE_PREFIX: &str = "RecordRemove";

/// Pipeline configuration.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Max messages per worker batch.
    pub batch_size: usize,

    /// Worker long-poll wait on an empty queue.
    pub poll_wait: Duration,

    /// Queue visibility timeout.
    pub visibility_timeout: Duration,

    /// Receives allowed before an ingest message is dead-lettered.
    pub max_receive_count: u32,

    /// Change-feed buffer feeding the change pump.
    pub change_buffer: usize,

    /// Notification recipient.
    pub mail_recipient: String,

    /// Notification sender.
    pub mail_sender: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            poll_wait: Duration::from_secs(10),
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: 2,
            change_buffer: 1024,
            mail_recipient: "ops@example.com".to_string(),
            mail_sender: "no-reply@example.com".to_string(),
        }
    }
}

/// The assembled event pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<RecordStore>,
    notifier: Notifier,

    storage_topic: Topic,
    change_topic: Arc<Topic>,

    ingest_queue: Arc<Queue>,
    removal_queue: Arc<Queue>,
    rejected_queue: Arc<Queue>,
    delete_mail_queue: Arc<Queue>,

    workers: Vec<WorkerHandle>,
    change_feed_id: Option<SubscriptionId>,
    change_pump: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Build the routing graph. Workers and the change pump are not
    /// running until [`start`](Self::start).
    pub fn new(transport: Arc<dyn MailTransport>, config: PipelineConfig) -> Self {
        let store = Arc::new(RecordStore::new());
        let notifier = Notifier::new(
            transport,
            config.mail_recipient.clone(),
            config.mail_sender.clone(),
        );

        let rejected_queue = Arc::new(Queue::new(QueueConfig {
            name: "rejected-uploads".to_string(),
            visibility_timeout: config.visibility_timeout,
            redrive: None,
        }));
        let ingest_queue = Arc::new(Queue::new(QueueConfig {
            name: "image-created".to_string(),
            visibility_timeout: config.visibility_timeout,
            redrive: Some(RedrivePolicy {
                queue: Arc::clone(&rejected_queue),
                max_receive_count: config.max_receive_count,
            }),
        }));
        let removal_queue = Arc::new(Queue::new(QueueConfig {
            name: "image-removed".to_string(),
            visibility_timeout: config.visibility_timeout,
            redrive: None,
        }));
        let delete_mail_queue = Arc::new(Queue::new(QueueConfig {
            name: "record-removed-mail".to_string(),
            visibility_timeout: config.visibility_timeout,
            redrive: None,
        }));

        let storage_topic = Topic::new("storage-events");
        storage_topic.subscribe(
            Predicate::match_all().attr_prefix(ATTR_EVENT_NAME, CREATED_PREFIX),
            ingest_queue.clone(),
        );
        storage_topic.subscribe(
            Predicate::match_all().attr_prefix(ATTR_EVENT_NAME, REMOVED_PREFIX),
            removal_queue.clone(),
        );

        let change_topic = Arc::new(Topic::new("record-changes"));
        change_topic.subscribe(
            Predicate::event_type_prefix(RECORD_REMOVE_PREFIX),
            delete_mail_queue.clone(),
        );

        Self {
            config,
            store,
            notifier,
            storage_topic,
            change_topic,
            ingest_queue,
            removal_queue,
            rejected_queue,
            delete_mail_queue,
            workers: Vec::new(),
            change_feed_id: None,
            change_pump: None,
        }
    }

    /// Spawn the workers and the change pump.
    pub fn start(&mut self) -> Result<()> {
        let worker_config = WorkerConfig {
            batch_size: self.config.batch_size,
            poll_wait: self.config.poll_wait,
        };

        self.workers.push(
            Worker::new(
                Arc::clone(&self.ingest_queue),
                Arc::new(ImageIngestor::new(Arc::clone(&self.store))),
                worker_config.clone(),
            )
            .spawn()?,
        );
        self.workers.push(
            Worker::new(
                Arc::clone(&self.removal_queue),
                Arc::new(ObjectRemover::new(Arc::clone(&self.store))),
                worker_config.clone(),
            )
            .spawn()?,
        );
        self.workers.push(
            Worker::new(
                Arc::clone(&self.delete_mail_queue),
                Arc::new(DeleteMailer::new(self.notifier.clone())),
                worker_config.clone(),
            )
            .spawn()?,
        );
        self.workers.push(
            Worker::new(
                Arc::clone(&self.rejected_queue),
                Arc::new(RejectionMailer::new(self.notifier.clone())),
                worker_config,
            )
            .spawn()?,
        );

        let feed = self.store.subscribe_changes_with_buffer(self.config.change_buffer);
        self.change_feed_id = Some(feed.id);
        let topic = Arc::clone(&self.change_topic);
        self.change_pump = Some(
            thread::Builder::new()
                .name("change-pump".to_string())
                .spawn(move || {
                    debug!("change pump started");
                    while let Ok(change) = feed.recv() {
                        match change.into_event() {
                            Ok(event) => {
                                topic.publish(&event);
                            }
                            Err(e) => warn!(error = %e, "dropped undecodable change"),
                        }
                    }
                    debug!("change pump stopped");
                })?,
        );

        Ok(())
    }

    /// Unwrap an incoming bus message and publish the routed event.
    /// Returns the number of queues the event reached.
    pub fn publish_storage_notification(&self, raw: &[u8]) -> Result<usize> {
        let notification = StorageNotification::from_envelope(raw)?;
        let event = notification.into_event()?;
        Ok(self.storage_topic.publish(&event))
    }

    /// Publish an already-built event to the storage topic.
    pub fn publish_event(&self, event: &Event) -> usize {
        self.storage_topic.publish(event)
    }

    /// Stop the change pump and the workers, then close every queue.
    /// Buffered messages are dropped with the process's in-memory state.
    pub fn shutdown(&mut self) {
        if let Some(id) = self.change_feed_id.take() {
            self.store.unsubscribe_changes(id);
        }
        if let Some(pump) = self.change_pump.take() {
            let _ = pump.join();
        }

        self.ingest_queue.close();
        self.removal_queue.close();
        self.rejected_queue.close();
        self.delete_mail_queue.close();

        for worker in self.workers.drain(..) {
            worker.stop();
        }
    }

    /// The record store.
    pub fn store(&self) -> Arc<RecordStore> {
        Arc::clone(&self.store)
    }

    /// The topic receiving unwrapped storage events.
    pub fn storage_topic(&self) -> &Topic {
        &self.storage_topic
    }

    /// The ingestion queue.
    pub fn ingest_queue(&self) -> Arc<Queue> {
        Arc::clone(&self.ingest_queue)
    }

    /// The removal queue.
    pub fn removal_queue(&self) -> Arc<Queue> {
        Arc::clone(&self.removal_queue)
    }

    /// The dead-letter queue for rejected uploads.
    pub fn rejected_queue(&self) -> Arc<Queue> {
        Arc::clone(&self.rejected_queue)
    }

    /// The queue feeding the delete mailer.
    pub fn delete_mail_queue(&self) -> Arc<Queue> {
        Arc::clone(&self.delete_mail_queue)
    }
}
