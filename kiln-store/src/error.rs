//! Error types for store operations

use std::time::Duration;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur when talking to a store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Key or directory is absent
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// Transport or store-internal failure
    #[error("{op} {key} failed: {message}")]
    Unavailable {
        op: &'static str,
        key: String,
        message: String,
    },

    /// Stored value could not be decoded
    #[error("invalid value at {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    /// Call did not complete within its deadline
    #[error("{op} {key} timed out after {after:?}")]
    Timeout {
        op: &'static str,
        key: String,
        after: Duration,
    },

    /// Advisory lock stayed held by someone else
    #[error("could not acquire lock {key} within {after:?}")]
    LockTimeout { key: String, after: Duration },
}

impl StoreError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn unavailable(op: &'static str, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            op,
            key: key.into(),
            message: message.into(),
        }
    }

    /// Check if this error means the key is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
