//! Outer-envelope unwrapping for storage notifications.
//!
//! Producers deliver a bus message whose body is JSON with a single
//! `Message` field; that field's value is itself a JSON-encoded
//! notification. The envelope is unwrapped exactly once, at the pipeline
//! edge: the routed [`Event`] carries the notification fields as
//! attributes so downstream consumers never re-unwrap.

use crate::error::{PipelineError, Result};
use crate::types::Event;
use serde::{Deserialize, Serialize};

/// Attribute carrying the storage event name.
pub const ATTR_EVENT_NAME: &str = "eventName";

/// Attribute carrying the storage object key.
pub const ATTR_OBJECT_KEY: &str = "objectKey";

/// Outer event-bus envelope.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "Message")]
    message: String,
}

/// A structural-change notification from the object store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNotification {
    #[serde(rename = "eventName")]
    pub event_name: String,

    #[serde(rename = "objectKey")]
    pub object_key: String,
}

impl StorageNotification {
    pub fn new(event_name: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            object_key: object_key.into(),
        }
    }

    /// Unwrap the outer envelope and parse the notification inside it.
    pub fn from_envelope(raw: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(raw)
            .map_err(|e| PipelineError::MalformedEnvelope(e.to_string()))?;
        serde_json::from_str(&envelope.message)
            .map_err(|e| PipelineError::MalformedEnvelope(e.to_string()))
    }

    /// Wrap into the outer envelope (the producer-side encoding).
    pub fn to_envelope(&self) -> Result<Vec<u8>> {
        let message = serde_json::to_string(self)?;
        Ok(serde_json::to_vec(&Envelope { message })?)
    }

    /// Build the routed event: event name and object key become routing
    /// attributes, the notification JSON becomes the body.
    pub fn into_event(self) -> Result<Event> {
        let body = serde_json::to_vec(&self)?;
        Ok(Event::new(self.event_name.clone())
            .with_attr(ATTR_EVENT_NAME, self.event_name)
            .with_attr(ATTR_OBJECT_KEY, self.object_key)
            .with_body(body))
    }

    /// Read the notification back from a routed event's attributes.
    pub fn from_event(event: &Event) -> Result<Self> {
        let event_name = event
            .attr(ATTR_EVENT_NAME)
            .ok_or_else(|| PipelineError::MissingAttribute(ATTR_EVENT_NAME.to_string()))?;
        let object_key = event
            .attr(ATTR_OBJECT_KEY)
            .ok_or_else(|| PipelineError::MissingAttribute(ATTR_OBJECT_KEY.to_string()))?;
        Ok(Self::new(event_name, object_key))
    }
}
