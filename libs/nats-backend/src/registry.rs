//! Service registry backed by a JetStream KV bucket.
//!
//! Every instance owns one key, `svc.{service}.{instance_id}`, holding a
//! JSON [`InstanceRecord`]. The bucket is created with a max-age equal to the
//! configured instance TTL, so an instance that stops heartbeating ages out
//! of scans on its own. Pending metadata is staged in-process and only
//! written into the bucket at [`register`] time, which is what guarantees no
//! peer ever observes this instance without its identity metadata.
//!
//! [`register`]: registry::ServiceRegistry::register

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use registry::{InstanceInfo, ServiceRegistry};

use crate::client::NatsClient;
use crate::error::{BackendError, BackendResult};

/// Who this process is, for its own registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceIdentity {
    pub service: String,
    pub instance_id: String,
    pub address: String,
}

/// On-bucket record for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub service: String,
    pub address: String,
    pub metadata: HashMap<String, String>,
    pub registered_at: DateTime<Utc>,
}

fn encode(record: &InstanceRecord) -> BackendResult<Vec<u8>> {
    serde_json::to_vec(record)
        .map_err(|e| BackendError::Codec(format!("failed to encode instance record: {e}")))
}

fn decode(bytes: &[u8]) -> BackendResult<InstanceRecord> {
    serde_json::from_slice(bytes)
        .map_err(|e| BackendError::Codec(format!("failed to decode instance record: {e}")))
}

fn sanitize_key_component(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn service_prefix(service: &str) -> String {
    format!("svc.{}.", sanitize_key_component(service))
}

/// JetStream-KV-backed [`ServiceRegistry`].
#[derive(Debug)]
pub struct NatsRegistry {
    client: NatsClient,
    identity: InstanceIdentity,
    bucket: String,
    instance_ttl: Duration,
    pending: Arc<RwLock<HashMap<String, String>>>,
    registered: AtomicBool,
}

impl NatsRegistry {
    pub fn new(
        client: NatsClient,
        identity: InstanceIdentity,
        bucket: String,
        instance_ttl: Duration,
    ) -> Self {
        Self {
            client,
            identity,
            bucket,
            instance_ttl,
            pending: Arc::new(RwLock::new(HashMap::new())),
            registered: AtomicBool::new(false),
        }
    }

    /// This instance's own KV key.
    pub fn own_key(&self) -> String {
        format!(
            "svc.{}.{}",
            sanitize_key_component(&self.identity.service),
            sanitize_key_component(&self.identity.instance_id)
        )
    }

    async fn store(&self) -> BackendResult<async_nats::jetstream::kv::Store> {
        self.client
            .get_or_create_kv_bucket(&self.bucket, self.instance_ttl)
            .await
    }

    async fn put_own_record(&self) -> BackendResult<()> {
        let record = InstanceRecord {
            service: self.identity.service.clone(),
            address: self.identity.address.clone(),
            metadata: self.pending.read().await.clone(),
            registered_at: Utc::now(),
        };
        let payload = encode(&record)?;
        let store = self.store().await?;
        let key = self.own_key();
        self.client
            .bounded(
                &format!("KV write for key '{key}'"),
                store.put(&key, payload.into()),
            )
            .await?
            .map_err(|e| BackendError::Transport(format!("KV write failed for key '{key}': {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ServiceRegistry for NatsRegistry {
    type Error = BackendError;

    async fn list_instances(&self, service: &str) -> Result<Vec<InstanceInfo>, Self::Error> {
        let store = self.store().await?;
        let prefix = service_prefix(service);

        let mut keys = self
            .client
            .bounded("KV key listing", store.keys())
            .await?
            .map_err(|e| BackendError::Transport(format!("failed to list instance keys: {e}")))?;

        let mut matching = Vec::new();
        while let Some(key) = self
            .client
            .bounded("KV key listing", keys.try_next())
            .await?
            .map_err(|e| BackendError::Transport(format!("failed reading instance keys: {e}")))?
        {
            if key.starts_with(&prefix) {
                matching.push(key);
            }
        }

        let mut instances = Vec::with_capacity(matching.len());
        for key in matching {
            let value = self
                .client
                .bounded(&format!("KV read for key '{key}'"), store.get(key.clone()))
                .await?
                .map_err(|e| {
                    BackendError::Transport(format!("KV read failed for key '{key}': {e}"))
                })?;
            let Some(bytes) = value else {
                // key aged out between listing and read
                continue;
            };
            match decode(&bytes) {
                Ok(record) => instances.push(InstanceInfo {
                    address: record.address,
                    metadata: record.metadata,
                }),
                Err(err) => warn!(key, %err, "skipping undecodable instance record"),
            }
        }

        debug!(service, instances = instances.len(), "listed instances");
        Ok(instances)
    }

    async fn pending_metadata(&self) -> Result<HashMap<String, String>, Self::Error> {
        Ok(self.pending.read().await.clone())
    }

    async fn set_pending_metadata(
        &self,
        metadata: HashMap<String, String>,
    ) -> Result<(), Self::Error> {
        *self.pending.write().await = metadata;
        Ok(())
    }

    async fn register(&self) -> Result<(), Self::Error> {
        self.put_own_record().await?;
        self.registered.store(true, Ordering::SeqCst);
        info!(
            service = %self.identity.service,
            instance = %self.identity.instance_id,
            "registered instance"
        );
        Ok(())
    }

    async fn heartbeat(&self) -> Result<(), Self::Error> {
        // never make the instance visible before register()
        if !self.registered.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.put_own_record().await
    }

    async fn deregister(&self) -> Result<(), Self::Error> {
        let store = self.store().await?;
        let key = self.own_key();
        self.client
            .bounded(&format!("KV delete for key '{key}'"), store.delete(&key))
            .await?
            .map_err(|e| {
                BackendError::Transport(format!("KV delete failed for key '{key}': {e}"))
            })?;
        self.registered.store(false, Ordering::SeqCst);
        info!(key, "deregistered instance");
        Ok(())
    }
}
