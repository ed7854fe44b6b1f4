//! Pure functions for mapping repository errors to HTTP status codes.

use super::{RepositoryError, StoreError};

/// Maps a [`RepositoryError`] to an HTTP status code.
///
/// - `InvalidCursor`, `UnknownIndex`, `InvalidModel` -> 400 (Bad Request)
/// - `ConcurrencyConflict` -> 409 (Conflict)
/// - `Store` -> 503 when throttled or unavailable, otherwise 500
/// - `Publish` -> 502 (Bad Gateway)
/// - `Serialization`, `CorruptRecord` -> 500 (Internal Server Error)
///
/// # Examples
///
/// ```
/// use tablestore_core::storage::{RepositoryError, repository_error_to_status_code};
///
/// let error = RepositoryError::InvalidModel("empty id".to_string());
/// assert_eq!(repository_error_to_status_code(&error), 400);
/// ```
pub fn repository_error_to_status_code(error: &RepositoryError) -> u16 {
    match error {
        RepositoryError::InvalidCursor { .. } => 400,
        RepositoryError::UnknownIndex { .. } => 400,
        RepositoryError::InvalidModel(_) => 400,
        RepositoryError::ConcurrencyConflict { .. } => 409,
        RepositoryError::Store { source, .. } => match source {
            StoreError::Throttled(_) | StoreError::Unavailable(_) => 503,
            _ => 500,
        },
        RepositoryError::Publish { .. } => 502,
        RepositoryError::Serialization(_) => 500,
        RepositoryError::CorruptRecord(_) => 500,
    }
}
