//! Store error types

use thiserror::Error;

/// Errors from session store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Stored payload for '{key}' is malformed: {reason}")]
    Corrupted { key: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
