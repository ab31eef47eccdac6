//! In-memory [`LockStore`] with real TTL expiry, for tests and
//! single-process development.
//!
//! Expiry uses `tokio::time::Instant` so paused-clock tests can advance time
//! deterministically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::trace;

use crate::LockStore;

/// The memory store itself never fails; the type exists to satisfy the trait.
#[derive(Debug, Error)]
pub enum MemoryLockError {}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Shared in-memory lock table. Clones observe the same keys.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current live (unexpired) key count.
    pub fn live_keys(&self) -> usize {
        let now = Instant::now();
        let guard = self.inner.lock().expect("lock table poisoned");
        guard.values().filter(|e| e.expires_at > now).count()
    }

    /// Returns the live value for `key`, if present and unexpired.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let guard = self.inner.lock().expect("lock table poisoned");
        guard
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone())
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    type Error = MemoryLockError;

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, Self::Error> {
        let now = Instant::now();
        let mut guard = self.inner.lock().expect("lock table poisoned");
        // lazily drop expired entries so they don't block reacquisition
        guard.retain(|_, entry| entry.expires_at > now);

        if guard.contains_key(key) {
            trace!(key, "set_if_absent: key held");
            return Ok(false);
        }
        guard.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: now + ttl,
            },
        );
        trace!(key, ?ttl, "set_if_absent: key acquired");
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        let mut guard = self.inner.lock().expect("lock table poisoned");
        guard.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_then_held() {
        let store = MemoryLockStore::new();
        let ttl = Duration::from_secs(600);
        assert!(store.set_if_absent("k", "1", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", "1", ttl).await.unwrap());
        assert_eq!(store.get("k").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_delete_allows_reacquire() {
        let store = MemoryLockStore::new();
        let ttl = Duration::from_secs(600);
        assert!(store.set_if_absent("k", "1", ttl).await.unwrap());
        store.delete("k").await.unwrap();
        assert!(store.set_if_absent("k", "1", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_ok() {
        let store = MemoryLockStore::new();
        store.delete("missing").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_frees_key() {
        let store = MemoryLockStore::new();
        let ttl = Duration::from_secs(600);
        assert!(store.set_if_absent("k", "1", ttl).await.unwrap());
        assert_eq!(store.live_keys(), 1);

        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(!store.set_if_absent("k", "1", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.live_keys(), 0);
        assert!(store.set_if_absent("k", "1", ttl).await.unwrap());
    }
}
