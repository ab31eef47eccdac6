//! Error taxonomy for the allocation path.
//!
//! Every variant here is fatal to startup. Transient conditions (an
//! indeterminate lock acquisition, a registry hiccup during confirmation
//! polling) are handled inside the coordinator and never escape as errors.

use thiserror::Error;

/// Fatal allocation failures, surfaced to the caller before registration.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The registry could not be queried during the initial scan.
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Every pair in the identity space is either published or locked. The
    /// cluster is at configured capacity; recovery requires wider bounds or
    /// fewer participating services.
    #[error("identity space exhausted: all {space} (room, node) pairs are in use or locked")]
    SpaceExhausted { space: usize },

    /// Staging the chosen pair into pending metadata kept failing. The lock
    /// is abandoned to TTL expiry since the instance aborts anyway.
    #[error("failed to stage identity metadata after {attempts} attempts: {last_error}")]
    MetadataWriteFailed { attempts: u32, last_error: String },
}

/// Shorthand result alias for allocation operations.
pub type AllocationResult<T> = Result<T, AllocationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AllocationError::SpaceExhausted { space: 1024 };
        assert!(err.to_string().contains("1024"));

        let err = AllocationError::MetadataWriteFailed {
            attempts: 3,
            last_error: "kv write failed".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("kv write failed"));
    }
}
