//! Typed configuration for the snowslot identity allocator.
//!
//! The [`wire`] module holds the raw serde document; this module converts it
//! into validated runtime types with `Duration` fields.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result, bail};
use tracing::debug;

pub mod wire;

pub use wire::NatsSecurityMode;

/// Validated top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub allocator: AllocatorConfig,
    pub nats: NatsConfig,
}

impl Config {
    /// attempts to decode the config first as JSON, then YAML, finally erroring if neither work
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to find config at {}", &path.display()))?;
        Self::parse_str(raw)
    }

    /// attempts to decode the config first as JSON, then YAML, finally erroring if neither work
    pub fn parse_str<S: AsRef<str>>(s: S) -> Result<Self> {
        let s = s.as_ref();
        let wire: wire::Config = serde_json::from_str(s).or_else(|json_err| {
            serde_yaml::from_str(s)
                .map_err(|yaml_err| anyhow::anyhow!("config is neither valid JSON ({json_err}) nor valid YAML ({yaml_err})"))
        })?;
        let config = Self::from_wire(wire)?;
        debug!(?config);
        Ok(config)
    }

    fn from_wire(wire: wire::Config) -> Result<Self> {
        Ok(Self {
            allocator: AllocatorConfig::from_wire(wire.allocator)?,
            nats: NatsConfig::from_wire(wire.nats)?,
        })
    }
}

/// Allocation policy: identity-space bounds, lock parameters and the
/// confirm-then-release timing knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// This instance's own service name.
    pub service: String,
    /// Every service whose instances participate in allocation, own service
    /// included.
    pub services: Vec<String>,
    pub max_room: u16,
    pub max_node: u16,
    pub lock_ttl: Duration,
    pub lock_key_prefix: String,
    /// Delay before retrying a lock acquisition whose outcome was
    /// indeterminate.
    pub lock_retry_delay: Duration,
    pub publish_retries: u32,
    pub confirm_poll_interval: Duration,
    pub confirm_poll_limit: u32,
    /// Extra wait between observing own metadata and deleting the lock key,
    /// absorbing registry replica skew.
    pub release_delay: Duration,
}

impl AllocatorConfig {
    fn from_wire(wire: wire::Allocator) -> Result<Self> {
        if wire.service.trim().is_empty() {
            bail!("allocator.service must not be empty");
        }
        if wire.publish_retries == 0 {
            bail!("allocator.publish_retries must be at least 1");
        }
        if wire.confirm_poll_limit == 0 {
            bail!("allocator.confirm_poll_limit must be at least 1");
        }
        if wire.lock_key_prefix.trim().is_empty() {
            bail!("allocator.lock_key_prefix must not be empty");
        }

        let mut services = wire.services;
        if !services.contains(&wire.service) {
            services.insert(0, wire.service.clone());
        }

        Ok(Self {
            service: wire.service,
            services,
            max_room: wire.max_room,
            max_node: wire.max_node,
            lock_ttl: Duration::from_secs(wire.lock_ttl_secs),
            lock_key_prefix: wire.lock_key_prefix,
            lock_retry_delay: Duration::from_millis(wire.lock_retry_delay_ms),
            publish_retries: wire.publish_retries,
            confirm_poll_interval: Duration::from_millis(wire.confirm_poll_interval_ms),
            confirm_poll_limit: wire.confirm_poll_limit,
            release_delay: Duration::from_secs(wire.release_delay_secs),
        })
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            service: "service".to_owned(),
            services: vec!["service".to_owned()],
            max_room: wire::default_max_room(),
            max_node: wire::default_max_node(),
            lock_ttl: Duration::from_secs(wire::default_lock_ttl_secs()),
            lock_key_prefix: wire::default_lock_key_prefix(),
            lock_retry_delay: Duration::from_millis(wire::default_lock_retry_delay_ms()),
            publish_retries: wire::default_publish_retries(),
            confirm_poll_interval: Duration::from_millis(wire::default_confirm_poll_interval_ms()),
            confirm_poll_limit: wire::default_confirm_poll_limit(),
            release_delay: Duration::from_secs(wire::default_release_delay_secs()),
        }
    }
}

/// NATS backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatsConfig {
    pub servers: Vec<String>,
    pub security_mode: NatsSecurityMode,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub connect_retry_max: u32,
    pub request_timeout: Duration,
    pub instances_bucket: String,
    pub locks_bucket: String,
    /// Bucket max-age for instance records; a dead instance disappears from
    /// scans after this long without a heartbeat.
    pub instance_ttl: Duration,
    pub heartbeat_interval: Duration,
}

impl NatsConfig {
    fn from_wire(wire: wire::Nats) -> Result<Self> {
        if wire.servers.is_empty() {
            bail!("nats.servers must not be empty");
        }
        if wire.heartbeat_interval_secs >= wire.instance_ttl_secs {
            bail!(
                "nats.heartbeat_interval_secs ({}) must be shorter than nats.instance_ttl_secs ({})",
                wire.heartbeat_interval_secs,
                wire.instance_ttl_secs
            );
        }
        Ok(Self {
            servers: wire.servers,
            security_mode: wire.security_mode,
            username: wire.username,
            password: wire.password,
            token: wire.token,
            connect_timeout: Duration::from_secs(wire.connect_timeout_secs),
            connect_retry_max: wire.connect_retry_max,
            request_timeout: Duration::from_millis(wire.request_timeout_ms),
            instances_bucket: wire.instances_bucket,
            locks_bucket: wire.locks_bucket,
            instance_ttl: Duration::from_secs(wire.instance_ttl_secs),
            heartbeat_interval: Duration::from_secs(wire.heartbeat_interval_secs),
        })
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self::from_wire(wire::Nats::default()).expect("default nats config must validate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_with_defaults() {
        let cfg = Config::parse_str(
            r#"
allocator:
    service: "order-service"
    services:
        - "order-service"
        - "user-service"
        - "report-service"
"#,
        )
        .unwrap();
        assert_eq!(cfg.allocator.service, "order-service");
        assert_eq!(cfg.allocator.services.len(), 3);
        assert_eq!(cfg.allocator.max_room, 7);
        assert_eq!(cfg.allocator.max_node, 127);
        assert_eq!(cfg.allocator.lock_ttl, Duration::from_secs(600));
        assert_eq!(cfg.allocator.publish_retries, 3);
        assert_eq!(cfg.allocator.confirm_poll_limit, 600);
        assert_eq!(cfg.allocator.release_delay, Duration::from_secs(60));
        assert_eq!(cfg.nats.servers, vec!["nats://127.0.0.1:4222".to_owned()]);
    }

    #[test]
    fn test_parse_json() {
        let cfg = Config::parse_str(
            r#"{"allocator": {"service": "svc-a", "max_room": 3, "max_node": 15}}"#,
        )
        .unwrap();
        assert_eq!(cfg.allocator.max_room, 3);
        assert_eq!(cfg.allocator.max_node, 15);
    }

    #[test]
    fn test_own_service_added_to_participants() {
        let cfg = Config::parse_str(
            r#"
allocator:
    service: "svc-a"
    services: ["svc-b"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.allocator.services, vec!["svc-a", "svc-b"]);
    }

    #[test]
    fn test_empty_service_rejected() {
        let err = Config::parse_str("allocator:\n    service: \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("allocator.service"));
    }

    #[test]
    fn test_zero_publish_retries_rejected() {
        let err = Config::parse_str(
            "allocator:\n    service: \"svc\"\n    publish_retries: 0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("publish_retries"));
    }

    #[test]
    fn test_heartbeat_must_beat_ttl() {
        let err = Config::parse_str(
            r#"
allocator:
    service: "svc"
nats:
    heartbeat_interval_secs: 30
    instance_ttl_secs: 30
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("heartbeat_interval_secs"));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(Config::parse_str(": not a config :").is_err());
    }

    #[test]
    fn test_nats_overrides() {
        let cfg = Config::parse_str(
            r#"
allocator:
    service: "svc"
nats:
    servers: ["nats://10.0.0.1:4222", "nats://10.0.0.2:4222"]
    security_mode: "token"
    token: "secret"
    request_timeout_ms: 250
"#,
        )
        .unwrap();
        assert_eq!(cfg.nats.servers.len(), 2);
        assert_eq!(cfg.nats.security_mode, NatsSecurityMode::Token);
        assert_eq!(cfg.nats.token.as_deref(), Some("secret"));
        assert_eq!(cfg.nats.request_timeout, Duration::from_millis(250));
    }
}
