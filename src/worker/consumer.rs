//! Batch consumer loop.

use crate::error::Result;
use crate::queue::Queue;
use crate::types::Event;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Business logic applied to each received message.
pub trait MessageHandler: Send + Sync {
    /// Handler name used in logs and thread names.
    fn name(&self) -> &str;

    /// Process one message. An error leaves the message unacknowledged so
    /// the queue redelivers it; handlers must therefore be idempotent.
    fn handle(&self, event: &Event) -> Result<()>;
}

/// Worker configuration.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Max messages pulled per batch.
    pub batch_size: usize,

    /// Long-poll wait when the queue is empty.
    pub poll_wait: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            poll_wait: Duration::from_secs(10),
        }
    }
}

/// Outcome of a single batch cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub received: usize,
    pub acknowledged: usize,
    pub failed: usize,
}

/// Pulls batches from a queue and applies a handler to each message.
pub struct Worker {
    queue: Arc<Queue>,
    handler: Arc<dyn MessageHandler>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(queue: Arc<Queue>, handler: Arc<dyn MessageHandler>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// One receive/process/acknowledge cycle.
    ///
    /// Messages are processed item by item: a failing item is logged and
    /// left for redelivery, and its batch siblings are still acknowledged.
    pub fn run_once(&self) -> BatchOutcome {
        let batch = self
            .queue
            .receive_batch(self.config.batch_size, self.config.poll_wait);
        let mut outcome = BatchOutcome {
            received: batch.len(),
            ..Default::default()
        };

        for message in batch {
            match self.handler.handle(&message.payload) {
                Ok(()) => match self.queue.acknowledge(message.id) {
                    Ok(()) => outcome.acknowledged += 1,
                    Err(e) => {
                        // Visibility lapsed mid-batch and another worker
                        // finished the message first.
                        warn!(
                            worker = self.handler.name(),
                            id = %message.id,
                            error = %e,
                            "acknowledge failed"
                        );
                    }
                },
                Err(e) => {
                    outcome.failed += 1;
                    warn!(
                        worker = self.handler.name(),
                        id = %message.id,
                        receives = message.receive_count,
                        error = %e,
                        "message processing failed, left for redelivery"
                    );
                }
            }
        }

        outcome
    }

    /// Run batches on a named thread until stopped or the queue closes.
    pub fn spawn(self) -> Result<WorkerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name(format!("worker-{}", self.handler.name()))
            .spawn(move || {
                debug!(worker = self.handler.name(), "worker started");
                while !flag.load(Ordering::Relaxed) && !self.queue.is_closed() {
                    self.run_once();
                }
                debug!(worker = self.handler.name(), "worker stopped");
            })?;

        Ok(WorkerHandle {
            stop,
            thread: Some(thread),
        })
    }
}

/// Handle to a running worker thread.
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signal the worker to stop after its current batch and join it.
    /// In-flight messages it leaves behind are redelivered after their
    /// visibility window.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
