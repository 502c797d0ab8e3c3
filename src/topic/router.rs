//! Topic fan-out router.

use super::predicate::Predicate;
use crate::error::Result;
use crate::types::{Event, SubscriptionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// A delivery target for matched events.
///
/// Implemented by [`Queue`](crate::queue::Queue); tests substitute doubles.
pub trait Destination: Send + Sync {
    /// Name used in routing logs.
    fn name(&self) -> &str;

    /// Accept a forwarded event. Once this returns, responsibility for the
    /// event has transferred entirely to the destination.
    fn deliver(&self, event: Event) -> Result<()>;
}

/// Internal subscription state.
struct Subscription {
    predicate: Predicate,
    destination: Arc<dyn Destination>,
}

/// Content-filtered publish/subscribe topic.
///
/// Each subscription's predicate is evaluated independently against every
/// published event; one event may fan out to many destinations. Publishing
/// is fire-and-forget: no acknowledgment flows back, and a failing
/// destination never blocks delivery to its siblings.
pub struct Topic {
    name: String,
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl Topic {
    /// Create a new topic.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Topic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a subscription.
    pub fn subscribe(
        &self,
        predicate: Predicate,
        destination: Arc<dyn Destination>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscriptions.write().insert(
            id,
            Subscription {
                predicate,
                destination,
            },
        );
        id
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.write().remove(&id);
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver the event to every subscription whose predicate matches.
    ///
    /// Delivery is attempted independently per destination; a failure is
    /// logged and does not affect the other destinations or the publish
    /// call itself. Returns the number of successful deliveries.
    pub fn publish(&self, event: &Event) -> usize {
        let subs = self.subscriptions.read();
        let mut delivered = 0;

        for sub in subs.values() {
            if !sub.predicate.matches(event) {
                continue;
            }
            match sub.destination.deliver(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        topic = %self.name,
                        destination = %sub.destination.name(),
                        event_type = %event.event_type,
                        error = %e,
                        "delivery to destination failed"
                    );
                }
            }
        }

        delivered
    }
}
