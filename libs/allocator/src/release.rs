//! Publish-and-release coordination.
//!
//! `publish` stages the chosen pair into this instance's pending metadata so
//! registration carries it. `spawn_release` then watches the registry from
//! the background until the metadata is visible fleet-wide and only then
//! drops the allocation lock, after an extra safety delay that absorbs
//! replica skew. Releasing the instant *this* reader sees the metadata would
//! let a racing allocator reuse the key before laggard readers catch up.
//!
//! Nothing on this path can fail startup: every non-fatal branch falls back
//! on the lock's TTL expiry.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use config::AllocatorConfig;
use lock_store::LockStore;
use registry::{META_NODE_ID, META_ROOM_ID, ServiceRegistry};

use crate::engine::IdentityAllocator;
use crate::error::{AllocationError, AllocationResult};
use crate::identity::{IdentityBounds, IdentityPair, lock_key};
use crate::scan::RegistryScanner;

impl<R, L> IdentityAllocator<R, L>
where
    R: ServiceRegistry,
    L: LockStore,
{
    /// Stage the allocated pair into this instance's pending metadata.
    ///
    /// Bounded immediate retries, no backoff: the registry client is local
    /// and either works or does not. On final failure the instance aborts
    /// and the lock is left to expire, which is safe because the instance
    /// never registers.
    pub async fn publish(&self, pair: &IdentityPair) -> AllocationResult<()> {
        let mut last_error = String::new();
        for attempt in 1..=self.cfg.publish_retries {
            match self.write_metadata(pair).await {
                Ok(()) => {
                    info!(%pair, attempt, "staged identity metadata");
                    return Ok(());
                }
                Err(err) => {
                    warn!(%pair, attempt, %err, "failed to stage identity metadata");
                    last_error = err.to_string();
                }
            }
        }
        Err(AllocationError::MetadataWriteFailed {
            attempts: self.cfg.publish_retries,
            last_error,
        })
    }

    async fn write_metadata(&self, pair: &IdentityPair) -> Result<(), R::Error> {
        let mut metadata = self.registry.pending_metadata().await?;
        metadata.insert(META_ROOM_ID.to_owned(), pair.room.to_string());
        metadata.insert(META_NODE_ID.to_owned(), pair.node.to_string());
        self.registry.set_pending_metadata(metadata).await
    }

    /// Dispatch the confirm-then-release loop as an independent task.
    ///
    /// Fire-and-forget: the startup path needs nothing back from it, so it
    /// communicates only through logs and the lock-store side effect. If the
    /// process dies first, the lock expires on its own.
    pub fn spawn_release(&self, pair: IdentityPair) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let locks = Arc::clone(&self.locks);
        let cfg = self.cfg.clone();
        let bounds = self.bounds;
        tokio::spawn(async move { confirm_and_release(registry, locks, cfg, bounds, pair).await })
    }
}

/// Poll the registry for this instance's own service until the published
/// pair is visible, then wait out the safety margin and delete the lock key.
///
/// Bounded to `confirm_poll_limit` iterations; with the default 1s interval
/// and 600-iteration ceiling the loop gives up right around the lock TTL, at
/// which point the store reclaims the key anyway. Registry errors are logged
/// and polled through.
pub async fn confirm_and_release<R, L>(
    registry: Arc<R>,
    locks: Arc<L>,
    cfg: AllocatorConfig,
    bounds: IdentityBounds,
    pair: IdentityPair,
) where
    R: ServiceRegistry,
    L: LockStore,
{
    let scanner = RegistryScanner::new(registry, bounds);
    let key = lock_key(&cfg.lock_key_prefix, &pair);
    let own_service = std::slice::from_ref(&cfg.service);

    for poll in 0..cfg.confirm_poll_limit {
        match scanner.scan(own_service).await {
            Ok(used) if used.contains(&pair) => {
                info!(
                    %pair,
                    poll,
                    delay = ?cfg.release_delay,
                    "identity metadata visible, delaying lock release for replica skew"
                );
                sleep(cfg.release_delay).await;
                match locks.delete(&key).await {
                    Ok(()) => info!(key, %pair, "released identity lock"),
                    Err(err) => {
                        warn!(key, %err, "failed to release identity lock, leaving it to expire")
                    }
                }
                return;
            }
            Ok(_) => debug!(%pair, poll, "own identity metadata not visible yet"),
            Err(err) => {
                warn!(%pair, poll, %err, "registry scan failed during confirmation, continuing")
            }
        }
        sleep(cfg.confirm_poll_interval).await;
    }

    warn!(
        key,
        %pair,
        polls = cfg.confirm_poll_limit,
        "timed out waiting for identity metadata visibility, leaving lock to TTL expiry"
    );
}
