//! Error taxonomy for the store and engine
//!
//! Every failed mutation leaves the tree unchanged; callers map these onto
//! their own response surface.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced message or conversation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Parent is missing or belongs to a different conversation.
    #[error("invalid parent: {0}")]
    InvalidParent(String),

    /// A root message already exists for this conversation.
    #[error("root already exists for conversation {0}")]
    RootConflict(String),

    /// Writer identity rejected by the configured write policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Operation the tree model does not allow (e.g. deleting an interior
    /// message, which would orphan its descendants).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Filesystem failure preparing the database location.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying persistence failed or a transaction aborted. Transient
    /// contention is retried a bounded number of times before this surfaces.
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl StoreError {
    /// Structural corruption in the stored tree, e.g. a parent-link cycle.
    pub(crate) fn corrupt(detail: String) -> Self {
        StoreError::Storage(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            Some(detail),
        ))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
