//! Error types for the NATS-backed collaborators.
//!
//! Typed variants so callers can distinguish transport failures, timeouts
//! (the indeterminate case for lock acquisition) and codec issues without
//! leaking NATS internals.

use thiserror::Error;

/// Top-level error type for the nats-backend crate.
#[derive(Debug, Error)]
pub enum BackendError {
    /// NATS connection or transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation timed out waiting for the store; the outcome is unknown.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Serialization or deserialization failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// Configuration error (e.g. missing credentials for the chosen mode).
    #[error("configuration error: {0}")]
    Config(String),

    /// The client is not connected or connection was lost.
    #[error("not connected: {0}")]
    NotConnected(String),
}

impl BackendError {
    /// Returns true if this error indicates a transient failure that may
    /// succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Transport(_) | BackendError::Timeout(_))
    }

    /// Returns true if this error is a timeout (indeterminate outcome).
    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout(_))
    }
}

/// Shorthand result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(BackendError::Transport("conn reset".into()).is_retryable());
        assert!(BackendError::Timeout("deadline".into()).is_retryable());
        assert!(BackendError::Timeout("deadline".into()).is_timeout());
        assert!(!BackendError::Codec("bad json".into()).is_retryable());
        assert!(!BackendError::Config("missing token".into()).is_retryable());
        assert!(!BackendError::NotConnected("no conn".into()).is_retryable());
    }
}
