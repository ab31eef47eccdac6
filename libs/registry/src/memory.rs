//! In-memory [`ServiceRegistry`] implementation for tests and single-process
//! development. Propagation is immediate: anything registered is visible to
//! the next `list_instances` call.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::{InstanceInfo, ServiceRegistry};

#[derive(Debug, Error)]
pub enum MemoryRegistryError {
    #[error("instance already registered: {0}")]
    AlreadyRegistered(String),
}

#[derive(Debug, Default)]
struct Inner {
    /// service name -> instance id -> info
    services: BTreeMap<String, BTreeMap<String, InstanceInfo>>,
    pending: HashMap<String, String>,
    registered: bool,
}

/// Shared in-memory registry. Clones observe the same state, so one
/// `MemoryRegistry` can stand in for a whole fleet in tests.
#[derive(Debug, Clone)]
pub struct MemoryRegistry {
    service: String,
    instance_id: String,
    address: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRegistry {
    pub fn new(
        service: impl Into<String>,
        instance_id: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            instance_id: instance_id.into(),
            address: address.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Seed a peer instance, as if another process had registered it.
    pub fn add_instance(&self, service: &str, instance_id: &str, info: InstanceInfo) {
        let mut guard = self.inner.lock().expect("memory registry lock poisoned");
        guard
            .services
            .entry(service.to_owned())
            .or_default()
            .insert(instance_id.to_owned(), info);
    }

    /// Remove a seeded peer instance.
    pub fn remove_instance(&self, service: &str, instance_id: &str) {
        let mut guard = self.inner.lock().expect("memory registry lock poisoned");
        if let Some(instances) = guard.services.get_mut(service) {
            instances.remove(instance_id);
        }
    }

    /// Returns true once this instance has registered itself.
    pub fn is_registered(&self) -> bool {
        self.inner
            .lock()
            .expect("memory registry lock poisoned")
            .registered
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    type Error = MemoryRegistryError;

    async fn list_instances(&self, service: &str) -> Result<Vec<InstanceInfo>, Self::Error> {
        let guard = self.inner.lock().expect("memory registry lock poisoned");
        Ok(guard
            .services
            .get(service)
            .map(|instances| instances.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn pending_metadata(&self) -> Result<HashMap<String, String>, Self::Error> {
        let guard = self.inner.lock().expect("memory registry lock poisoned");
        Ok(guard.pending.clone())
    }

    async fn set_pending_metadata(
        &self,
        metadata: HashMap<String, String>,
    ) -> Result<(), Self::Error> {
        let mut guard = self.inner.lock().expect("memory registry lock poisoned");
        guard.pending = metadata;
        Ok(())
    }

    async fn register(&self) -> Result<(), Self::Error> {
        let mut guard = self.inner.lock().expect("memory registry lock poisoned");
        if guard.registered {
            return Err(MemoryRegistryError::AlreadyRegistered(
                self.instance_id.clone(),
            ));
        }
        let info = InstanceInfo {
            address: self.address.clone(),
            metadata: guard.pending.clone(),
        };
        guard
            .services
            .entry(self.service.clone())
            .or_default()
            .insert(self.instance_id.clone(), info);
        guard.registered = true;
        debug!(service = %self.service, instance = %self.instance_id, "registered");
        Ok(())
    }

    async fn heartbeat(&self) -> Result<(), Self::Error> {
        // no liveness TTL in memory, nothing to refresh
        Ok(())
    }

    async fn deregister(&self) -> Result<(), Self::Error> {
        let mut guard = self.inner.lock().expect("memory registry lock poisoned");
        if let Some(instances) = guard.services.get_mut(&self.service) {
            instances.remove(&self.instance_id);
        }
        guard.registered = false;
        Ok(())
    }
}
