//! Identity-pair model: the (room, node) tuple, the configured bounds of the
//! identity space, and the snapshot set of pairs observed in use.

use std::collections::HashSet;
use std::fmt;

use config::AllocatorConfig;

/// The (room, node) identity assigned to one live instance. Immutable for
/// the instance's process lifetime once allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityPair {
    pub room: u16,
    pub node: u16,
}

impl IdentityPair {
    pub const fn new(room: u16, node: u16) -> Self {
        Self { room, node }
    }
}

impl fmt::Display for IdentityPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.room, self.node)
    }
}

/// Inclusive upper bounds of the identity space (rooms 0..=max_room, nodes
/// 0..=max_node).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityBounds {
    pub max_room: u16,
    pub max_node: u16,
}

impl IdentityBounds {
    pub const fn new(max_room: u16, max_node: u16) -> Self {
        Self { max_room, max_node }
    }

    /// Total number of distinct pairs.
    pub fn space(&self) -> usize {
        (self.max_room as usize + 1) * (self.max_node as usize + 1)
    }

    pub fn contains(&self, pair: &IdentityPair) -> bool {
        pair.room <= self.max_room && pair.node <= self.max_node
    }

    /// Candidate enumeration order: room-major, node-minor, both ascending,
    /// so low rooms fill first. This order is the allocation contract and
    /// must stay deterministic.
    pub fn iter(&self) -> impl Iterator<Item = IdentityPair> + use<> {
        let max_node = self.max_node;
        (0..=self.max_room)
            .flat_map(move |room| (0..=max_node).map(move |node| IdentityPair::new(room, node)))
    }
}

impl From<&AllocatorConfig> for IdentityBounds {
    fn from(cfg: &AllocatorConfig) -> Self {
        Self::new(cfg.max_room, cfg.max_node)
    }
}

/// Snapshot of every identity pair observed as published by a live instance,
/// from one registry scan. Recomputed fresh per scan; treated as an immutable
/// value once returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedPairs(HashSet<IdentityPair>);

impl UsedPairs {
    pub fn contains(&self, pair: &IdentityPair) -> bool {
        self.0.contains(pair)
    }

    pub fn insert(&mut self, pair: IdentityPair) -> bool {
        self.0.insert(pair)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<IdentityPair> for UsedPairs {
    fn from_iter<T: IntoIterator<Item = IdentityPair>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Lock-store key guarding one identity pair during the race window.
pub fn lock_key(prefix: &str, pair: &IdentityPair) -> String {
    format!("{prefix}.{pair}")
}
