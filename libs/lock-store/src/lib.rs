//! # lock-store
//!
//! `lock-store` defines the [`LockStore`] trait: a TTL-bounded "set if
//! absent" key/value primitive used as a short-lived mutual-exclusion layer
//! during identity allocation. Only two operations exist; anything richer
//! (fencing tokens, renewals, watches) is out of scope because the allocator
//! relies on TTL expiry as its correctness backstop.
//!
//! An `Err` from [`set_if_absent`] means the outcome is *indeterminate*: the
//! caller cannot tell whether the key was written. The allocation engine
//! handles that with a bounded retry and otherwise assumes "not acquired".
//!
//! [`LockStore`]: crate::LockStore
//! [`set_if_absent`]: crate::LockStore::set_if_absent

use std::time::Duration;

use async_trait::async_trait;

pub mod memory;

pub use memory::{MemoryLockError, MemoryLockStore};

/// TTL-based distributed lock primitive.
#[async_trait]
pub trait LockStore: Send + Sync + 'static {
    // send/sync/static required for async trait bounds
    type Error: std::error::Error + Send + Sync + 'static;

    /// Atomically set `key` to `value` if it does not already exist.
    ///
    /// Returns `Ok(true)` if the key was created (lock acquired),
    /// `Ok(false)` if it already existed (lock held elsewhere). The key must
    /// expire on its own after `ttl` if never deleted.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, Self::Error>;

    /// Delete `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Self::Error>;
}
