//! Handlers for the object-storage event paths.

use crate::envelope::StorageNotification;
use crate::error::Result;
use crate::store::RecordStore;
use crate::types::Event;
use crate::validator::{decode_object_key, validate_image_key};
use super::MessageHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// Attribute under which ingested image names are stored. The record
/// schema is exactly this one attribute.
pub const IMAGE_NAME_ATTR: &str = "ImageName";

/// Validates uploaded image references and records them in the store.
pub struct ImageIngestor {
    store: Arc<RecordStore>,
}

impl ImageIngestor {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

impl MessageHandler for ImageIngestor {
    fn name(&self) -> &str {
        "image-ingestor"
    }

    fn handle(&self, event: &Event) -> Result<()> {
        let notification = StorageNotification::from_event(event)?;
        let key = decode_object_key(&notification.object_key);
        validate_image_key(&key)?;

        let mut attributes = HashMap::new();
        attributes.insert(IMAGE_NAME_ATTR.to_string(), key.clone());
        self.store.put(key, attributes);
        Ok(())
    }
}

/// Drops records for deleted objects.
pub struct ObjectRemover {
    store: Arc<RecordStore>,
}

impl ObjectRemover {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

impl MessageHandler for ObjectRemover {
    fn name(&self) -> &str {
        "object-remover"
    }

    fn handle(&self, event: &Event) -> Result<()> {
        let notification = StorageNotification::from_event(event)?;
        let key = decode_object_key(&notification.object_key);
        self.store.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn routed(event_name: &str, object_key: &str) -> Event {
        StorageNotification::new(event_name, object_key)
            .into_event()
            .unwrap()
    }

    #[test]
    fn test_ingests_valid_image() {
        let store = Arc::new(RecordStore::new());
        let ingestor = ImageIngestor::new(Arc::clone(&store));

        ingestor
            .handle(&routed("ObjectCreated:Put", "cat.png"))
            .unwrap();

        let record = store.get("cat.png").unwrap();
        assert_eq!(record.attributes.get(IMAGE_NAME_ATTR), Some(&"cat.png".to_string()));
        assert_eq!(record.attributes.len(), 1);
    }

    #[test]
    fn test_decodes_key_before_storing() {
        let store = Arc::new(RecordStore::new());
        let ingestor = ImageIngestor::new(Arc::clone(&store));

        ingestor
            .handle(&routed("ObjectCreated:Put", "my+cat.png"))
            .unwrap();

        assert!(store.contains("my cat.png"));
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let store = Arc::new(RecordStore::new());
        let ingestor = ImageIngestor::new(Arc::clone(&store));

        let result = ingestor.handle(&routed("ObjectCreated:Put", "cat.exe"));

        assert!(matches!(result, Err(PipelineError::UnsupportedFileType(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remover_deletes_record() {
        let store = Arc::new(RecordStore::new());
        store.put("cat.png", {
            let mut attributes = HashMap::new();
            attributes.insert(IMAGE_NAME_ATTR.to_string(), "cat.png".to_string());
            attributes
        });

        let remover = ObjectRemover::new(Arc::clone(&store));
        remover
            .handle(&routed("ObjectRemoved:Delete", "cat.png"))
            .unwrap();

        assert!(store.is_empty());
    }

    #[test]
    fn test_remover_tolerates_absent_record() {
        let store = Arc::new(RecordStore::new());
        let remover = ObjectRemover::new(Arc::clone(&store));

        remover
            .handle(&routed("ObjectRemoved:Delete", "ghost.png"))
            .unwrap();
    }
}
