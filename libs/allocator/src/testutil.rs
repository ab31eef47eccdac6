//! Scripted collaborator fakes for exercising the engine and the release
//! coordinator under failure sequences the memory backends can't produce.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use lock_store::LockStore;
use registry::{InstanceInfo, META_NODE_ID, META_ROOM_ID, ServiceRegistry};

use crate::identity::IdentityPair;

#[derive(Debug, Error)]
#[error("scripted failure")]
pub(crate) struct ScriptError;

/// Build a peer instance publishing `pair`.
pub(crate) fn pair_instance(pair: &IdentityPair) -> InstanceInfo {
    InstanceInfo::new(format!("10.0.{}.{}:80", pair.room, pair.node))
        .with_meta(META_ROOM_ID, pair.room.to_string())
        .with_meta(META_NODE_ID, pair.node.to_string())
}

#[derive(Debug)]
struct AppearAfter {
    calls: u32,
    service: String,
    pair: IdentityPair,
}

#[derive(Debug, Default)]
struct RegInner {
    instances: HashMap<String, Vec<InstanceInfo>>,
    fail_list_calls: u32,
    appear_after: Option<AppearAfter>,
    list_calls: u32,
    pending: HashMap<String, String>,
    fail_pending_writes: u32,
    pending_write_attempts: u32,
}

/// Registry fake with injectable list failures and delayed visibility of this
/// instance's own pair (simulating propagation lag).
#[derive(Debug, Default)]
pub(crate) struct ScriptedRegistry {
    inner: Mutex<RegInner>,
}

impl ScriptedRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Seed peers publishing the given pairs under `service`.
    pub(crate) fn seed(&self, service: &str, pairs: &[IdentityPair]) {
        let mut guard = self.inner.lock().unwrap();
        let instances = guard.instances.entry(service.to_owned()).or_default();
        instances.extend(pairs.iter().map(pair_instance));
    }

    /// Fail the next `n` list_instances calls.
    pub(crate) fn fail_next_lists(&self, n: u32) {
        self.inner.lock().unwrap().fail_list_calls = n;
    }

    /// After `calls` successful or failed list calls, `service` also reports
    /// an instance publishing `pair`.
    pub(crate) fn own_pair_visible_after(&self, calls: u32, service: &str, pair: IdentityPair) {
        self.inner.lock().unwrap().appear_after = Some(AppearAfter {
            calls,
            service: service.to_owned(),
            pair,
        });
    }

    /// Fail the next `n` set_pending_metadata calls.
    pub(crate) fn fail_pending_writes(&self, n: u32) {
        self.inner.lock().unwrap().fail_pending_writes = n;
    }

    pub(crate) fn pending_write_attempts(&self) -> u32 {
        self.inner.lock().unwrap().pending_write_attempts
    }

    pub(crate) fn list_calls(&self) -> u32 {
        self.inner.lock().unwrap().list_calls
    }
}

#[async_trait]
impl ServiceRegistry for ScriptedRegistry {
    type Error = ScriptError;

    async fn list_instances(&self, service: &str) -> Result<Vec<InstanceInfo>, Self::Error> {
        let mut guard = self.inner.lock().unwrap();
        guard.list_calls += 1;
        if guard.fail_list_calls > 0 {
            guard.fail_list_calls -= 1;
            return Err(ScriptError);
        }
        let mut out = guard.instances.get(service).cloned().unwrap_or_default();
        if let Some(appear) = &guard.appear_after {
            if appear.service == service && guard.list_calls > appear.calls {
                out.push(pair_instance(&appear.pair));
            }
        }
        Ok(out)
    }

    async fn pending_metadata(&self) -> Result<HashMap<String, String>, Self::Error> {
        Ok(self.inner.lock().unwrap().pending.clone())
    }

    async fn set_pending_metadata(
        &self,
        metadata: HashMap<String, String>,
    ) -> Result<(), Self::Error> {
        let mut guard = self.inner.lock().unwrap();
        guard.pending_write_attempts += 1;
        if guard.fail_pending_writes > 0 {
            guard.fail_pending_writes -= 1;
            return Err(ScriptError);
        }
        guard.pending = metadata;
        Ok(())
    }

    async fn register(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn heartbeat(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn deregister(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Outcome script for one set_if_absent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockStep {
    Acquired,
    Held,
    Indeterminate,
}

#[derive(Debug)]
struct LockInner {
    script: HashMap<String, VecDeque<LockStep>>,
    default_step: LockStep,
    attempts: Vec<String>,
    deletes: Vec<(String, Instant)>,
}

/// Lock-store fake with per-key scripted outcomes and call recording.
#[derive(Debug)]
pub(crate) struct ScriptedLocks {
    inner: Mutex<LockInner>,
}

impl ScriptedLocks {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(LockInner {
                script: HashMap::new(),
                default_step: LockStep::Acquired,
                attempts: Vec::new(),
                deletes: Vec::new(),
            }),
        }
    }

    /// Queue outcomes for a specific key; once drained, the default applies.
    pub(crate) fn script(&self, key: &str, steps: &[LockStep]) {
        let mut guard = self.inner.lock().unwrap();
        guard
            .script
            .entry(key.to_owned())
            .or_default()
            .extend(steps.iter().copied());
    }

    /// Outcome for keys without a script (initially `Acquired`).
    pub(crate) fn set_default(&self, step: LockStep) {
        self.inner.lock().unwrap().default_step = step;
    }

    /// Keys passed to set_if_absent, in call order.
    pub(crate) fn attempts(&self) -> Vec<String> {
        self.inner.lock().unwrap().attempts.clone()
    }

    /// Recorded delete calls with their (tokio) timestamps.
    pub(crate) fn deletes(&self) -> Vec<(String, Instant)> {
        self.inner.lock().unwrap().deletes.clone()
    }
}

#[async_trait]
impl LockStore for ScriptedLocks {
    type Error = ScriptError;

    async fn set_if_absent(
        &self,
        key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, Self::Error> {
        let mut guard = self.inner.lock().unwrap();
        guard.attempts.push(key.to_owned());
        let step = guard
            .script
            .get_mut(key)
            .and_then(VecDeque::pop_front)
            .unwrap_or(guard.default_step);
        match step {
            LockStep::Acquired => Ok(true),
            LockStep::Held => Ok(false),
            LockStep::Indeterminate => Err(ScriptError),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        let mut guard = self.inner.lock().unwrap();
        guard.deletes.push((key.to_owned(), Instant::now()));
        Ok(())
    }
}
