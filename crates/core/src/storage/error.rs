use thiserror::Error;

use crate::cursor::CursorError;
use crate::events::PublishError;
use crate::value::Item;

/// Cancellation reasons that mean "another writer got there first".
const CONFLICT_REASONS: [&str; 2] = ["ConditionalCheckFailed", "TransactionConflict"];

/// Errors reported by a [`Store`](super::Store) implementation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),
    #[error("Conditional check failed")]
    ConditionalCheckFailed,
    #[error("Transaction canceled: [{}]", .reasons.join(", "))]
    TransactionCanceled { reasons: Vec<String> },
    #[error("Request throttled: {0}")]
    Throttled(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Store failure: {0}")]
    Service(String),
}

impl StoreError {
    /// True when a write was rejected by its condition expression.
    pub fn is_condition_failure(&self) -> bool {
        match self {
            StoreError::ConditionalCheckFailed => true,
            StoreError::TransactionCanceled { reasons } => reasons
                .iter()
                .any(|reason| CONFLICT_REASONS.contains(&reason.as_str())),
            _ => false,
        }
    }

    /// Cancellation reasons, or the single condition failure.
    pub fn reasons(&self) -> Vec<String> {
        match self {
            StoreError::TransactionCanceled { reasons } => reasons.clone(),
            StoreError::ConditionalCheckFailed => vec!["ConditionalCheckFailed".to_string()],
            _ => Vec::new(),
        }
    }
}

/// Result type for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the repository.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Invalid cursor{}: {source}", partition_context(.partition))]
    InvalidCursor {
        /// Partition the token was decoded for; `None` for table scans.
        partition: Option<String>,
        #[source]
        source: CursorError,
    },
    #[error("Unknown index {index} for {model_type}")]
    UnknownIndex {
        model_type: &'static str,
        index: String,
    },
    #[error("Invalid model: {0}")]
    InvalidModel(String),
    #[error("Concurrency conflict on {model_type} {id}: [{}]", .reasons.join(", "))]
    ConcurrencyConflict {
        model_type: &'static str,
        id: String,
        reasons: Vec<String>,
        item: Box<Item>,
    },
    #[error("Store {operation} failed ({params}): {source}")]
    Store {
        operation: &'static str,
        params: String,
        #[source]
        source: StoreError,
    },
    #[error("Publishing events for {model_type} {id} failed: {source}")]
    Publish {
        model_type: &'static str,
        id: String,
        #[source]
        source: PublishError,
    },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

impl RepositoryError {
    /// Wraps a store failure with the operation and its request parameters.
    pub fn store(operation: &'static str, params: impl Into<String>, source: StoreError) -> Self {
        RepositoryError::Store {
            operation,
            params: params.into(),
            source,
        }
    }

    pub fn invalid_cursor(partition: Option<&str>, source: CursorError) -> Self {
        RepositoryError::InvalidCursor {
            partition: partition.map(str::to_string),
            source,
        }
    }

    /// Client-input errors: the caller sent something unusable.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RepositoryError::InvalidCursor { .. }
                | RepositoryError::UnknownIndex { .. }
                | RepositoryError::InvalidModel(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::ConcurrencyConflict { .. })
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        RepositoryError::Serialization(error.to_string())
    }
}

fn partition_context(partition: &Option<String>) -> String {
    partition
        .as_deref()
        .map(|partition| format!(" for partition {partition}"))
        .unwrap_or_default()
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
