//! Content-filtered publish/subscribe.
//!
//! A [`Topic`] routes published events to every subscription whose
//! [`Predicate`] matches. Matching is a conjunction of per-attribute
//! matchers (exact, prefix, allow-list) plus an optional matcher on the
//! top-level event type. Routing is non-exclusive: one event can fan out
//! to many destinations, and each destination is attempted independently.
//!
//! # Example
//!
//! ```ignore
//! let topic = Topic::new("storage-events");
//! topic.subscribe(
//!     Predicate::match_all().attr_prefix("eventName", "ObjectCreated"),
//!     ingest_queue,
//! );
//! topic.publish(&event);
//! ```

mod predicate;
mod router;

pub use predicate::{AttrMatcher, Predicate};
pub use router::{Destination, Topic};
