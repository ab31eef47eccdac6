//! # nats-backend
//!
//! NATS JetStream KV implementations of the two external collaborators the
//! identity allocator coordinates through:
//!
//! - [`NatsRegistry`]: instance discovery and metadata publication, one KV
//!   key per instance with a liveness max-age.
//! - [`NatsLockStore`]: TTL-bounded "set if absent" via KV `create`.
//!
//! Both share one resilient [`NatsClient`] connection. Errors are typed
//! ([`BackendError`]) so the allocator can treat a timeout as an
//! indeterminate lock outcome without parsing transport details.

pub mod client;
pub mod error;
pub mod lock;
pub mod registry;

pub use client::{ConnectionState, NatsClient};
pub use error::{BackendError, BackendResult};
pub use lock::NatsLockStore;
pub use registry::{InstanceIdentity, InstanceRecord, NatsRegistry};
