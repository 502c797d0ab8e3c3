//! Error types for the pipeline.

use crate::types::MessageId;
use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No file extension: {0}")]
    MissingExtension(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Missing event attribute: {0}")]
    MissingAttribute(String),

    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("Queue is closed: {0}")]
    QueueClosed(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Mail send failed: {0}")]
    MailSend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Serialization(e.to_string())
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
