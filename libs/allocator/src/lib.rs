//! # allocator
//!
//! Assigns each instance of a clustered service a unique (room, node)
//! identity pair for time-based unique-ID generation, coordinating through
//! two external collaborators: a [`ServiceRegistry`] for discovering which
//! pairs peers already publish, and a TTL-based [`LockStore`] for breaking
//! ties between instances starting concurrently.
//!
//! Startup sequence for one instance:
//!
//! 1. [`IdentityAllocator::allocate`]: scan the fleet, lock the first free
//!    pair (room-major, node-minor ascending).
//! 2. [`IdentityAllocator::publish`]: stage the pair into this instance's
//!    pending registry metadata, before registration makes it discoverable.
//! 3. [`IdentityAllocator::spawn_release`]: background task that waits for
//!    the published metadata to be visible fleet-wide, then releases the
//!    lock after a safety delay. Every failure on this path degrades to the
//!    lock's TTL expiry, never to a duplicate identity.
//!
//! [`ServiceRegistry`]: registry::ServiceRegistry
//! [`LockStore`]: lock_store::LockStore

pub mod engine;
pub mod error;
pub mod identity;
pub mod release;
pub mod scan;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::IdentityAllocator;
pub use error::{AllocationError, AllocationResult};
pub use identity::{IdentityBounds, IdentityPair, UsedPairs, lock_key};
pub use release::confirm_and_release;
pub use scan::RegistryScanner;
