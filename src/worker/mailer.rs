//! Notification handlers fed by the change stream and the dead-letter
//! queue.

use crate::envelope::ATTR_OBJECT_KEY;
use crate::error::Result;
use crate::notifier::Notifier;
use crate::store::{ChangeEvent, ChangeKind};
use crate::types::Event;
use super::ingest::IMAGE_NAME_ATTR;
use super::MessageHandler;

/// Placeholder when a removed record carries no image name.
const UNKNOWN_IMAGE: &str = "Unknown";

/// Mails a deletion notice for removed records.
pub struct DeleteMailer {
    notifier: Notifier,
}

impl DeleteMailer {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }
}

impl MessageHandler for DeleteMailer {
    fn name(&self) -> &str {
        "delete-mailer"
    }

    fn handle(&self, event: &Event) -> Result<()> {
        let change = ChangeEvent::from_event(event)?;
        if change.kind != ChangeKind::Remove {
            return Ok(());
        }

        let image = change
            .old_attributes
            .as_ref()
            .and_then(|attributes| attributes.get(IMAGE_NAME_ATTR))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_IMAGE);

        let message = format!("The image \"{image}\" has been deleted from the records table.");
        self.notifier.notify("Record Deleted", &message);
        Ok(())
    }
}

/// Mails a rejection notice for dead-lettered upload events.
pub struct RejectionMailer {
    notifier: Notifier,
}

impl RejectionMailer {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }
}

impl MessageHandler for RejectionMailer {
    fn name(&self) -> &str {
        "rejection-mailer"
    }

    fn handle(&self, event: &Event) -> Result<()> {
        let key = event.attr(ATTR_OBJECT_KEY).unwrap_or(UNKNOWN_IMAGE);
        let message = format!("The upload \"{key}\" was rejected: unsupported or missing file type.");
        self.notifier.notify("Upload Rejected", &message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::StorageNotification;
    use crate::notifier::{MailTransport, MemoryTransport};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn notifier_with_transport() -> (Notifier, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let notifier = Notifier::new(
            Arc::clone(&transport) as Arc<dyn MailTransport>,
            "ops@example.com",
            "no-reply@example.com",
        );
        (notifier, transport)
    }

    fn remove_event(key: &str, with_image_name: bool) -> Event {
        let mut old_attributes = HashMap::new();
        if with_image_name {
            old_attributes.insert(IMAGE_NAME_ATTR.to_string(), key.to_string());
        }
        ChangeEvent {
            kind: ChangeKind::Remove,
            key: key.to_string(),
            old_attributes: Some(old_attributes),
            new_attributes: None,
        }
        .into_event()
        .unwrap()
    }

    #[test]
    fn test_delete_notice_names_the_image() {
        let (notifier, transport) = notifier_with_transport();
        let mailer = DeleteMailer::new(notifier);

        mailer.handle(&remove_event("x.jpeg", true)).unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Record Deleted");
        assert!(sent[0].html_body.contains("x.jpeg"));
    }

    #[test]
    fn test_delete_notice_placeholder_without_image_name() {
        let (notifier, transport) = notifier_with_transport();
        let mailer = DeleteMailer::new(notifier);

        mailer.handle(&remove_event("x.jpeg", false)).unwrap();

        assert!(transport.sent()[0].html_body.contains(UNKNOWN_IMAGE));
    }

    #[test]
    fn test_non_remove_changes_are_ignored() {
        let (notifier, transport) = notifier_with_transport();
        let mailer = DeleteMailer::new(notifier);

        let insert = ChangeEvent {
            kind: ChangeKind::Insert,
            key: "a.png".to_string(),
            old_attributes: None,
            new_attributes: Some(HashMap::new()),
        }
        .into_event()
        .unwrap();

        mailer.handle(&insert).unwrap();
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn test_rejection_notice_names_the_upload() {
        let (notifier, transport) = notifier_with_transport();
        let mailer = RejectionMailer::new(notifier);

        let event = StorageNotification::new("ObjectCreated:Put", "cat.exe")
            .into_event()
            .unwrap();
        mailer.handle(&event).unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].subject, "Upload Rejected");
        assert!(sent[0].html_body.contains("cat.exe"));
    }
}
