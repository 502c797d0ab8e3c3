//! Outbound notification dispatch.

use crate::error::{PipelineError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// An outbound mail handed to the external send interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMail {
    pub recipient: String,
    pub sender: String,
    pub subject: String,
    /// HTML fragment embedding the message text.
    pub html_body: String,
}

/// External mail send interface.
pub trait MailTransport: Send + Sync {
    fn send(&self, mail: &OutboundMail) -> Result<()>;
}

/// Formats and dispatches notification mail.
///
/// Send failures are logged and absorbed: a notification is never retried
/// and never fails its caller.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    recipient: String,
    sender: String,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        recipient: impl Into<String>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            recipient: recipient.into(),
            sender: sender.into(),
        }
    }

    /// Format and dispatch a notification.
    pub fn notify(&self, subject: &str, message: &str) {
        let mail = OutboundMail {
            recipient: self.recipient.clone(),
            sender: self.sender.clone(),
            subject: subject.to_string(),
            html_body: html_content(message),
        };

        if let Err(e) = self.transport.send(&mail) {
            warn!(subject, error = %e, "notification send failed");
        }
    }
}

fn html_content(message: &str) -> String {
    format!(
        "<html>\n  <body>\n    <p style=\"font-size:18px\">{message}</p>\n  </body>\n</html>"
    )
}

/// In-memory transport recording sent mail. Substituted for the real
/// transport in tests and local composition.
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<OutboundMail>>,
    failing: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of all mail sent so far.
    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().clone()
    }

    /// Number of mails sent so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl MailTransport for MemoryTransport {
    fn send(&self, mail: &OutboundMail) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PipelineError::MailSend("transport offline".to_string()));
        }
        self.sent.lock().push(mail.clone());
        Ok(())
    }
}
