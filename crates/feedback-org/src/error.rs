//! Store error types.

use thiserror::Error;

/// Errors surfaced by tenant and user stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated (e.g. a provider link already owned by another user).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backing storage failed.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Check if this error is a uniqueness violation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
