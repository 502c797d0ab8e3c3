//! # Conveyor
//!
//! An event-routing pipeline: content-filtered publish/subscribe topics
//! feed buffered work queues, validating workers process batches, an
//! idempotent keyed record store emits change events, and store removals
//! drive outbound notifications.
//!
//! ## Core Concepts
//!
//! - **Topics**: predicate-filtered fan-out to independent destinations
//! - **Queues**: long-poll batches, visibility windows, redelivery, and
//!   dead-lettering
//! - **Workers**: batch consumer loops with per-item failure isolation
//! - **Record Store**: last-writer-wins keyed state with a change feed
//! - **Notifier**: templated outbound mail whose failures are absorbed
//!
//! Delivery is at-least-once: handlers are idempotent and any message
//! left unacknowledged is redelivered after its visibility window, until
//! it is dead-lettered.
//!
//! ## Example
//!
//! ```ignore
//! use conveyor::{MemoryTransport, Pipeline, PipelineConfig};
//! use std::sync::Arc;
//!
//! let transport = Arc::new(MemoryTransport::new());
//! let mut pipeline = Pipeline::new(transport, PipelineConfig::default());
//! pipeline.start()?;
//!
//! // {"Message":"{\"eventName\":\"ObjectCreated:Put\",\"objectKey\":\"cat.png\"}"}
//! pipeline.publish_storage_notification(raw_bus_message)?;
//! ```

pub mod envelope;
pub mod error;
pub mod notifier;
pub mod pipeline;
pub mod queue;
pub mod store;
pub mod topic;
pub mod types;
pub mod validator;
pub mod worker;

// Re-exports
pub use envelope::{StorageNotification, ATTR_EVENT_NAME, ATTR_OBJECT_KEY};
pub use error::{PipelineError, Result};
pub use notifier::{MailTransport, MemoryTransport, Notifier, OutboundMail};
pub use pipeline::{Pipeline, PipelineConfig};
pub use queue::{Queue, QueueConfig, QueueMessage, RedrivePolicy};
pub use store::{ChangeEvent, ChangeFeedHandle, ChangeKind, Record, RecordStore};
pub use topic::{AttrMatcher, Destination, Predicate, Topic};
pub use types::{Event, MessageId, SubscriptionId, Timestamp};
pub use validator::{decode_object_key, validate_image_key};
pub use worker::{
    BatchOutcome, DeleteMailer, ImageIngestor, MessageHandler, ObjectRemover, RejectionMailer,
    Worker, WorkerConfig, WorkerHandle, IMAGE_NAME_ATTR,
};
