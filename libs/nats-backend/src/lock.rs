//! Lock store backed by a JetStream KV bucket.
//!
//! KV `create` is the "set if absent" primitive: it fails with
//! `AlreadyExists` when a live value is present and succeeds again once the
//! key has been deleted or has aged out. TTL is a bucket-wide max-age, so
//! every lock key shares the TTL the store was built with; a per-call TTL
//! that disagrees is logged and the bucket's value wins.
//!
//! Calls are bounded by the client request timeout. A timed-out `create` is
//! surfaced as [`BackendError::Timeout`]: the caller cannot know whether the
//! key was written, which is exactly the indeterminate case the allocation
//! engine retries once and then abandons. An orphaned key ages out.

use std::time::Duration;

use async_nats::jetstream::kv::CreateErrorKind;
use async_trait::async_trait;
use tracing::{debug, warn};

use lock_store::LockStore;

use crate::client::NatsClient;
use crate::error::{BackendError, BackendResult};

/// JetStream-KV-backed [`LockStore`].
#[derive(Debug, Clone)]
pub struct NatsLockStore {
    client: NatsClient,
    bucket: String,
    ttl: Duration,
}

impl NatsLockStore {
    pub fn new(client: NatsClient, bucket: String, ttl: Duration) -> Self {
        Self {
            client,
            bucket,
            ttl,
        }
    }

    async fn store(&self) -> BackendResult<async_nats::jetstream::kv::Store> {
        self.client.get_or_create_kv_bucket(&self.bucket, self.ttl).await
    }
}

#[async_trait]
impl LockStore for NatsLockStore {
    type Error = BackendError;

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, Self::Error> {
        if ttl != self.ttl {
            warn!(
                key,
                requested = ?ttl,
                bucket_ttl = ?self.ttl,
                "per-call lock TTL differs from bucket max-age, bucket value applies"
            );
        }

        let store = self.store().await?;
        let create = store.create(key, value.as_bytes().to_vec().into());
        let result = self
            .client
            .bounded(&format!("KV create for key '{key}'"), create)
            .await?;

        match result {
            Ok(_) => {
                debug!(key, "lock key created");
                Ok(true)
            }
            Err(err) if err.kind() == CreateErrorKind::AlreadyExists => {
                debug!(key, "lock key already exists");
                Ok(false)
            }
            Err(err) => Err(BackendError::Transport(format!(
                "KV create failed for key '{key}': {err}"
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        let store = self.store().await?;
        self.client
            .bounded(&format!("KV delete for key '{key}'"), store.delete(key))
            .await?
            .map_err(|e| {
                BackendError::Transport(format!("KV delete failed for key '{key}': {e}"))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::NatsConfig;

    fn test_store() -> NatsLockStore {
        NatsLockStore::new(
            NatsClient::new(NatsConfig::default()),
            "test_locks".into(),
            Duration::from_secs(600),
        )
    }

    #[tokio::test]
    async fn test_set_if_absent_without_connection_fails() {
        let store = test_store();
        let result = store
            .set_if_absent("idlock.0-0", "1", Duration::from_secs(600))
            .await;
        assert!(matches!(result, Err(BackendError::NotConnected(_))));
    }

    #[tokio::test]
    async fn test_delete_without_connection_fails() {
        let store = test_store();
        let result = store.delete("idlock.0-0").await;
        assert!(matches!(result, Err(BackendError::NotConnected(_))));
    }
}
