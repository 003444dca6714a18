use crate::storage::partitioner::{assign_members, shard_for_key};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Shard identifiers are dense integers rendered as decimal strings on the wire.
pub type ShardId = usize;

/// Minimum replicas a shard should keep before shards start being dissolved.
pub const MIN_REPLICAS: usize = 2;

/// An immutable snapshot of cluster membership and shard count.
///
/// Every topology change produces a new snapshot with a higher `epoch`. Snapshots
/// are totally ordered by `(epoch, origin)`, which lets any two nodes agree on
/// which of two concurrent changes wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub epoch: u64,
    /// Address of the node that produced this snapshot (empty for the boot configuration).
    pub origin: String,
    pub view: BTreeSet<String>,
    pub shard_count: usize,
}

impl ClusterConfig {
    /// The boot configuration. All nodes started with the same view and shard
    /// count build identical snapshots.
    pub fn initial<I, S>(view: I, shard_count: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let view: BTreeSet<String> = view.into_iter().map(Into::into).collect();
        let shard_count = sustainable_shard_count(shard_count, view.len());
        Self {
            epoch: 0,
            origin: String::new(),
            view,
            shard_count,
        }
    }

    pub fn supersedes(&self, other: &ClusterConfig) -> bool {
        (self.epoch, &self.origin) > (other.epoch, &other.origin)
    }

    fn successor(&self, origin: &str) -> Self {
        Self {
            epoch: self.epoch + 1,
            origin: origin.to_string(),
            view: self.view.clone(),
            shard_count: self.shard_count,
        }
    }

    pub fn with_node(&self, addr: &str, origin: &str) -> Self {
        let mut next = self.successor(origin);
        next.view.insert(addr.to_string());
        next
    }

    /// Removes `addr`, dissolving shards the remaining view can no longer staff.
    pub fn without_node(&self, addr: &str, origin: &str) -> Self {
        let mut next = self.successor(origin);
        next.view.remove(addr);
        next.shard_count = sustainable_shard_count(next.shard_count, next.view.len());
        next
    }

    pub fn with_shard_count(&self, shard_count: usize, origin: &str) -> Self {
        let mut next = self.successor(origin);
        next.shard_count = shard_count;
        next
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.view.contains(addr)
    }

    pub fn view_string(&self) -> String {
        self.view.iter().cloned().collect::<Vec<_>>().join(",")
    }

    pub fn owner_of(&self, key: &str) -> ShardId {
        shard_for_key(key, self.shard_count)
    }

    pub fn layout(&self) -> ShardLayout {
        let view: Vec<String> = self.view.iter().cloned().collect();
        ShardLayout {
            shards: assign_members(&view, self.shard_count),
        }
    }
}

/// Largest shard count not above `requested` that still gives every shard
/// `MIN_REPLICAS` members (never below one).
pub fn sustainable_shard_count(requested: usize, nodes: usize) -> usize {
    let requested = requested.max(1);
    if requested == 1 || nodes / requested >= MIN_REPLICAS {
        return requested;
    }
    (nodes / MIN_REPLICAS).clamp(1, requested)
}

/// Shard membership derived from a `ClusterConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLayout {
    shards: Vec<Vec<String>>,
}

impl ShardLayout {
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        (0..self.shards.len()).collect()
    }

    pub fn members(&self, shard: ShardId) -> Option<&[String]> {
        self.shards.get(shard).map(Vec::as_slice)
    }

    pub fn shard_of_node(&self, addr: &str) -> Option<ShardId> {
        self.shards
            .iter()
            .position(|members| members.iter().any(|member| member == addr))
    }

    /// Parses a shard id as given in a URL.
    pub fn resolve(&self, raw: &str) -> Option<ShardId> {
        raw.trim()
            .parse::<ShardId>()
            .ok()
            .filter(|&id| id < self.shards.len())
    }
}

pub fn join_ids(ids: &[ShardId]) -> String {
    ids.iter()
        .map(ShardId::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
