//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;
use thiserror::Error;

/// Delay before a non-retryable error is looked at again.
const FATAL_RECHECK_INTERVAL: Duration = Duration::from_secs(300);

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error without a more specific classification
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Object vanished between observation and mutation
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create raced with another writer
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency check failed on update
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store rejected the object, typically an immutable field change
    #[error("Invalid object: {0}")]
    Invalid(String),

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Transient error that should be retried
    #[error("Transient error: {0}")]
    Transient(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
            || matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::NotFound(_)
            | Error::AlreadyExists(_)
            | Error::Conflict(_)
            | Error::Transient(_) => true,
            Error::Invalid(_) | Error::MissingField(_) => false,
            Error::Serialization(_) => false,
        }
    }

    /// Get the recommended requeue duration for this error.
    ///
    /// Retryable errors rerun the whole pass after the fixed retry interval.
    pub fn requeue_after(&self, retry_interval: Duration) -> Duration {
        if self.is_retryable() {
            retry_interval
        } else {
            FATAL_RECHECK_INTERVAL
        }
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
