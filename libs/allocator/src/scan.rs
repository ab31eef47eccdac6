//! Registry scanner: reads already-published identity pairs off every live
//! instance of the participating services.
//!
//! Pure read. Each call produces a fresh [`UsedPairs`] snapshot; nothing is
//! cached between calls because the whole point of the snapshot is to be as
//! current as the registry allows.

use std::sync::Arc;

use tracing::{debug, warn};

use registry::{InstanceInfo, META_NODE_ID, META_ROOM_ID, ServiceRegistry};

use crate::error::{AllocationError, AllocationResult};
use crate::identity::{IdentityBounds, IdentityPair, UsedPairs};

/// Scans the registry for identity pairs currently in use.
#[derive(Debug)]
pub struct RegistryScanner<R> {
    registry: Arc<R>,
    bounds: IdentityBounds,
}

impl<R> Clone for RegistryScanner<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            bounds: self.bounds,
        }
    }
}

impl<R: ServiceRegistry> RegistryScanner<R> {
    pub fn new(registry: Arc<R>, bounds: IdentityBounds) -> Self {
        Self { registry, bounds }
    }

    /// Aggregate the published pairs of every live instance of `services`
    /// into one snapshot.
    ///
    /// Instances without identity metadata are skipped: they are mid-startup
    /// and will race through the lock store like everyone else. A registry
    /// failure for any service aborts the whole scan; the caller decides
    /// whether that is fatal (initial allocation) or retryable (confirmation
    /// polling).
    pub async fn scan(&self, services: &[String]) -> AllocationResult<UsedPairs> {
        let mut used = UsedPairs::default();
        for service in services {
            let instances = self
                .registry
                .list_instances(service)
                .await
                .map_err(|err| AllocationError::RegistryUnavailable(err.to_string()))?;
            debug!(service, instances = instances.len(), "scanned service");

            for instance in &instances {
                if let Some(pair) = self.published_pair(service, instance) {
                    used.insert(pair);
                }
            }
        }
        Ok(used)
    }

    fn published_pair(&self, service: &str, instance: &InstanceInfo) -> Option<IdentityPair> {
        let (Some(room_raw), Some(node_raw)) =
            (instance.meta(META_ROOM_ID), instance.meta(META_NODE_ID))
        else {
            debug!(
                service,
                address = %instance.address,
                "instance has no identity metadata yet, skipping"
            );
            return None;
        };

        let (Ok(room), Ok(node)) = (room_raw.parse::<u16>(), node_raw.parse::<u16>()) else {
            warn!(
                service,
                address = %instance.address,
                room = room_raw,
                node = node_raw,
                "instance reports unparsable identity metadata, skipping"
            );
            return None;
        };

        let pair = IdentityPair::new(room, node);
        if !self.bounds.contains(&pair) {
            warn!(
                service,
                address = %instance.address,
                %pair,
                "instance reports identity outside configured bounds, skipping"
            );
            return None;
        }
        Some(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry::MemoryRegistry;

    fn scanner(reg: &MemoryRegistry) -> RegistryScanner<MemoryRegistry> {
        RegistryScanner::new(Arc::new(reg.clone()), IdentityBounds::new(7, 127))
    }

    fn peer(room: &str, node: &str) -> InstanceInfo {
        InstanceInfo::new("10.0.0.9:80")
            .with_meta(META_ROOM_ID, room)
            .with_meta(META_NODE_ID, node)
    }

    #[tokio::test]
    async fn test_scan_aggregates_across_services() {
        let reg = MemoryRegistry::new("svc-a", "me", "127.0.0.1:1");
        reg.add_instance("svc-a", "p1", peer("0", "0"));
        reg.add_instance("svc-b", "p2", peer("0", "1"));
        reg.add_instance("svc-b", "p3", peer("1", "5"));

        let used = scanner(&reg)
            .scan(&["svc-a".into(), "svc-b".into()])
            .await
            .unwrap();
        assert_eq!(used.len(), 3);
        assert!(used.contains(&IdentityPair::new(0, 0)));
        assert!(used.contains(&IdentityPair::new(0, 1)));
        assert!(used.contains(&IdentityPair::new(1, 5)));
    }

    #[tokio::test]
    async fn test_unallocated_instances_skipped() {
        let reg = MemoryRegistry::new("svc-a", "me", "127.0.0.1:1");
        reg.add_instance("svc-a", "p1", InstanceInfo::new("10.0.0.9:80"));
        // only one of the two fields present
        reg.add_instance(
            "svc-a",
            "p2",
            InstanceInfo::new("10.0.0.10:80").with_meta(META_ROOM_ID, "0"),
        );

        let used = scanner(&reg).scan(&["svc-a".into()]).await.unwrap();
        assert!(used.is_empty());
    }

    #[tokio::test]
    async fn test_bad_metadata_skipped() {
        let reg = MemoryRegistry::new("svc-a", "me", "127.0.0.1:1");
        reg.add_instance("svc-a", "p1", peer("zero", "0"));
        reg.add_instance("svc-a", "p2", peer("9", "0")); // room out of bounds
        reg.add_instance("svc-a", "p3", peer("0", "300")); // node out of bounds
        reg.add_instance("svc-a", "p4", peer("2", "7"));

        let used = scanner(&reg).scan(&["svc-a".into()]).await.unwrap();
        assert_eq!(used.len(), 1);
        assert!(used.contains(&IdentityPair::new(2, 7)));
    }

    #[tokio::test]
    async fn test_unknown_service_contributes_nothing() {
        let reg = MemoryRegistry::new("svc-a", "me", "127.0.0.1:1");
        let used = scanner(&reg).scan(&["ghost-svc".into()]).await.unwrap();
        assert!(used.is_empty());
    }
}
