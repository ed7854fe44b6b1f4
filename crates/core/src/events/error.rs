use thiserror::Error;

/// Errors that can occur while publishing domain events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Event channel closed: {0}")]
    ChannelClosed(String),
    #[error("Publish failed: {0}")]
    Failed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for publish operations.
pub type Result<T> = std::result::Result<T, PublishError>;
