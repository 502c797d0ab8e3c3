//! Queue consumers: the batch loop and its message handlers.
//!
//! A [`Worker`] runs `receive_batch` → handle each message →
//! `acknowledge` cycles against one queue. Handlers implement
//! [`MessageHandler`]; a handler error leaves the message unacknowledged
//! so the queue's redelivery and dead-letter machinery take over.
//!
//! Handlers:
//! - [`ImageIngestor`]: validate an uploaded file reference, record it
//! - [`ObjectRemover`]: drop the record for a deleted object
//! - [`DeleteMailer`]: mail a notice for record-removal change events
//! - [`RejectionMailer`]: mail a notice for dead-lettered uploads

mod consumer;
mod ingest;
mod mailer;

pub use consumer::{BatchOutcome, MessageHandler, Worker, WorkerConfig, WorkerHandle};
pub use ingest::{ImageIngestor, ObjectRemover, IMAGE_NAME_ATTR};
pub use mailer::{DeleteMailer, RejectionMailer};
