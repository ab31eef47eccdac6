//! Allocation engine: walks the identity space in deterministic order and
//! arbitrates concurrent claims through the lock store.
//!
//! The registry scan is an approximate, possibly-stale view (propagation
//! lag); the lock store is a strongly-consistent, short-lived tie-breaker on
//! top. Together they approximate a consistent allocation without requiring
//! the registry itself to be linearizable.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use config::AllocatorConfig;
use lock_store::LockStore;
use registry::ServiceRegistry;

use crate::error::{AllocationError, AllocationResult};
use crate::identity::{IdentityBounds, IdentityPair, lock_key};
use crate::scan::RegistryScanner;

/// Allocates this instance's identity pair and coordinates its publication.
///
/// One allocator per process; [`allocate`] is intended to be called exactly
/// once, synchronously, before the instance registers itself.
///
/// [`allocate`]: IdentityAllocator::allocate
#[derive(Debug)]
pub struct IdentityAllocator<R, L> {
    pub(crate) registry: Arc<R>,
    pub(crate) locks: Arc<L>,
    pub(crate) cfg: AllocatorConfig,
    pub(crate) bounds: IdentityBounds,
}

impl<R, L> Clone for IdentityAllocator<R, L> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            locks: Arc::clone(&self.locks),
            cfg: self.cfg.clone(),
            bounds: self.bounds,
        }
    }
}

impl<R, L> IdentityAllocator<R, L>
where
    R: ServiceRegistry,
    L: LockStore,
{
    pub fn new(registry: Arc<R>, locks: Arc<L>, cfg: AllocatorConfig) -> Self {
        let bounds = IdentityBounds::from(&cfg);
        Self {
            registry,
            locks,
            cfg,
            bounds,
        }
    }

    /// The lock-store key guarding `pair`.
    pub fn lock_key(&self, pair: &IdentityPair) -> String {
        lock_key(&self.cfg.lock_key_prefix, pair)
    }

    /// Find and lock a free identity pair.
    ///
    /// Scans the fleet once, then walks candidates room-major ascending,
    /// skipping published pairs and locking the first free one. A pair whose
    /// lock is already held is treated as taken for this pass. Fails with
    /// [`AllocationError::SpaceExhausted`] once the whole space has been
    /// walked.
    pub async fn allocate(&self) -> AllocationResult<IdentityPair> {
        let scanner = RegistryScanner::new(Arc::clone(&self.registry), self.bounds);
        let used = scanner.scan(&self.cfg.services).await?;
        info!(
            used = used.len(),
            space = self.bounds.space(),
            services = self.cfg.services.len(),
            "scanned published identity pairs"
        );

        for candidate in self.bounds.iter() {
            if used.contains(&candidate) {
                continue;
            }
            if self.try_lock(&candidate).await {
                info!(pair = %candidate, "acquired identity pair");
                return Ok(candidate);
            }
        }

        Err(AllocationError::SpaceExhausted {
            space: self.bounds.space(),
        })
    }

    /// Attempt to lock one candidate.
    ///
    /// `Ok(false)` means a racing instance holds the pair: move on, never
    /// retry the same candidate in this pass. An `Err` is indeterminate (the
    /// store may or may not have written the key): retry the identical
    /// acquisition once after a short delay, then give the candidate up. If
    /// the indeterminate write did land, the orphaned key expires via TTL.
    async fn try_lock(&self, candidate: &IdentityPair) -> bool {
        let key = self.lock_key(candidate);
        let mut retried = false;
        loop {
            match self
                .locks
                .set_if_absent(&key, "1", self.cfg.lock_ttl)
                .await
            {
                Ok(true) => return true,
                Ok(false) => {
                    debug!(key, "identity lock already held, trying next candidate");
                    return false;
                }
                Err(err) if !retried => {
                    warn!(key, %err, "lock acquisition indeterminate, retrying once");
                    retried = true;
                    sleep(self.cfg.lock_retry_delay).await;
                }
                Err(err) => {
                    warn!(key, %err, "lock acquisition indeterminate again, treating as held");
                    return false;
                }
            }
        }
    }
}
