//! Raw (serde) configuration types.
//!
//! These mirror the on-disk config document one-to-one. Durations are plain
//! integers with unit-suffixed field names; conversion into runtime types
//! with `Duration` fields happens in the crate root.

use serde::{Deserialize, Serialize};

/// top-level config type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    pub allocator: Allocator,
    #[serde(default)]
    pub nats: Nats,
}

/// Allocation policy knobs. Counts and delays are deployment policy, not
/// constants: registry propagation latency is environment-dependent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Allocator {
    /// This instance's own service name.
    pub service: String,
    /// All services participating in identity allocation. `service` is added
    /// automatically if missing.
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default = "default_max_room")]
    pub max_room: u16,
    #[serde(default = "default_max_node")]
    pub max_node: u16,
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_lock_key_prefix")]
    pub lock_key_prefix: String,
    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,
    #[serde(default = "default_publish_retries")]
    pub publish_retries: u32,
    #[serde(default = "default_confirm_poll_interval_ms")]
    pub confirm_poll_interval_ms: u64,
    #[serde(default = "default_confirm_poll_limit")]
    pub confirm_poll_limit: u32,
    #[serde(default = "default_release_delay_secs")]
    pub release_delay_secs: u64,
}

/// NATS backend settings for the registry and lock-store implementations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Nats {
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,
    #[serde(default)]
    pub security_mode: NatsSecurityMode,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_connect_retry_max")]
    pub connect_retry_max: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_instances_bucket")]
    pub instances_bucket: String,
    #[serde(default = "default_locks_bucket")]
    pub locks_bucket: String,
    #[serde(default = "default_instance_ttl_secs")]
    pub instance_ttl_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for Nats {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty nats section must deserialize")
    }
}

/// Authentication mode for the NATS connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NatsSecurityMode {
    #[default]
    None,
    UserPassword,
    Token,
}

pub const fn default_max_room() -> u16 {
    7
}

pub const fn default_max_node() -> u16 {
    127
}

pub const fn default_lock_ttl_secs() -> u64 {
    600
}

pub fn default_lock_key_prefix() -> String {
    "idlock".to_owned()
}

pub const fn default_lock_retry_delay_ms() -> u64 {
    500
}

pub const fn default_publish_retries() -> u32 {
    3
}

pub const fn default_confirm_poll_interval_ms() -> u64 {
    1_000
}

pub const fn default_confirm_poll_limit() -> u32 {
    600
}

pub const fn default_release_delay_secs() -> u64 {
    60
}

pub fn default_servers() -> Vec<String> {
    vec!["nats://127.0.0.1:4222".to_owned()]
}

pub const fn default_connect_timeout_secs() -> u64 {
    5
}

pub const fn default_connect_retry_max() -> u32 {
    5
}

pub const fn default_request_timeout_ms() -> u64 {
    2_000
}

pub fn default_instances_bucket() -> String {
    "snowslot_instances".to_owned()
}

pub fn default_locks_bucket() -> String {
    "snowslot_locks".to_owned()
}

pub const fn default_instance_ttl_secs() -> u64 {
    30
}

pub const fn default_heartbeat_interval_secs() -> u64 {
    10
}
