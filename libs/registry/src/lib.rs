//! # registry
//!
//! `registry` defines the [`ServiceRegistry`] trait: the view of an external
//! service registry that the identity allocator needs. An implementation can
//! list the live instances of a named service (with their metadata) and stage
//! metadata on this process's own, not-yet-registered entry.
//!
//! The trait deliberately stays small. Registry membership, health checking
//! and replication all belong to the backing system; the allocator only reads
//! instance metadata and writes its own pending entry.
//!
//! [`ServiceRegistry`]: crate::ServiceRegistry

use std::collections::HashMap;

use async_trait::async_trait;

pub mod memory;

pub use memory::{MemoryRegistry, MemoryRegistryError};

/// Metadata key under which an instance publishes its room identifier.
pub const META_ROOM_ID: &str = "room_id";

/// Metadata key under which an instance publishes its node identifier.
pub const META_NODE_ID: &str = "node_id";

/// A single live instance of a service, as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceInfo {
    /// Reachability address, e.g. `10.0.0.5:8080`. Opaque to the allocator.
    pub address: String,
    /// Arbitrary string metadata attached to the instance.
    pub metadata: HashMap<String, String>,
}

impl InstanceInfo {
    /// Create an instance with the given address and no metadata.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            metadata: HashMap::new(),
        }
    }

    /// Builder-style metadata insertion.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a metadata field.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Abstract service registry.
///
/// Implementations must treat unknown service names as an empty instance
/// list, not an error. Pending metadata is staged on this process's own entry
/// and must be applied before the instance becomes discoverable to peers
/// (i.e. before [`register`] completes).
///
/// [`register`]: ServiceRegistry::register
#[async_trait]
pub trait ServiceRegistry: Send + Sync + 'static {
    // send/sync/static required for async trait bounds
    type Error: std::error::Error + Send + Sync + 'static;

    /// List the currently live instances of `service`.
    ///
    /// Unknown service names yield `Ok(vec![])`.
    async fn list_instances(&self, service: &str) -> Result<Vec<InstanceInfo>, Self::Error>;

    /// Read the staged metadata for this process's own entry.
    async fn pending_metadata(&self) -> Result<HashMap<String, String>, Self::Error>;

    /// Replace the staged metadata for this process's own entry.
    async fn set_pending_metadata(
        &self,
        metadata: HashMap<String, String>,
    ) -> Result<(), Self::Error>;

    /// Register this instance, making it (and its staged metadata) visible to
    /// peers. Must only be called after allocation has staged its metadata.
    async fn register(&self) -> Result<(), Self::Error>;

    /// Refresh this instance's registration so it is not aged out by the
    /// backend's liveness TTL. No-op for backends without liveness tracking.
    async fn heartbeat(&self) -> Result<(), Self::Error>;

    /// Remove this instance from the registry.
    async fn deregister(&self) -> Result<(), Self::Error>;
}
