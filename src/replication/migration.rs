//! Key migration after topology changes.

use super::client::PeerClient;
use super::protocol::KeyEntry;
use super::replicator::Replicator;
use crate::membership::service::MembershipService;
use crate::membership::types::{ClusterConfig, ShardId};
use crate::storage::memory::LocalStore;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reacts to configuration changes: announces locally made changes, seeds new
/// shard members and hands keys this node no longer owns to their new owners.
pub struct Rebalancer {
    store: Arc<LocalStore>,
    membership: Arc<MembershipService>,
    client: Arc<PeerClient>,
    replicator: Arc<Replicator>,
}

/// Outcome of one migration pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub moved: usize,
    pub kept: usize,
}

impl Rebalancer {
    pub fn new(
        store: Arc<LocalStore>,
        membership: Arc<MembershipService>,
        client: Arc<PeerClient>,
        replicator: Arc<Replicator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            membership,
            client,
            replicator,
        })
    }

    /// Watches the configuration channel until the membership service goes away.
    pub async fn run(self: Arc<Self>) {
        let mut rx = self.membership.subscribe();
        let mut previous = rx.borrow_and_update().clone();

        while rx.changed().await.is_ok() {
            let current = rx.borrow_and_update().clone();
            self.on_config_change(&previous, &current).await;
            previous = current;
        }
    }

    pub async fn on_config_change(&self, previous: &ClusterConfig, current: &ClusterConfig) {
        let local = &self.membership.local_addr;
        info!(
            "Rebalancing for epoch {} ({} nodes, {} shards)",
            current.epoch,
            current.view.len(),
            current.shard_count
        );

        self.replicator.retain_destinations(&current.view);

        if current.origin == *local {
            let targets: BTreeSet<&String> = previous
                .view
                .iter()
                .chain(current.view.iter())
                .filter(|addr| *addr != local)
                .collect();
            self.announce(current, targets).await;
        }

        self.seed_new_shard_members(previous, current).await;

        let report = self.migrate_foreign_keys(current).await;
        if report.moved > 0 || report.kept > 0 {
            info!(
                "Migration for epoch {}: {} keys moved, {} kept for retry",
                current.epoch, report.moved, report.kept
            );
        }
    }

    async fn announce(&self, config: &ClusterConfig, targets: BTreeSet<&String>) {
        let mut pending = tokio::task::JoinSet::new();
        for target in targets {
            let client = self.client.clone();
            let target = target.clone();
            let config = config.clone();
            pending.spawn(async move {
                let result = client.announce(&target, &config).await;
                (target, result)
            });
        }
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok((target, Ok(adopted))) => {
                    debug!("Announced epoch {} to {} (adopted: {})", config.epoch, target, adopted)
                }
                Ok((target, Err(e))) => warn!("Failed to announce config to {}: {}", target, e),
                Err(e) => warn!("Announcement task failed: {}", e),
            }
        }
    }

    /// Pushes this shard's keys to nodes that just became members of it.
    async fn seed_new_shard_members(&self, previous: &ClusterConfig, current: &ClusterConfig) {
        let local = &self.membership.local_addr;
        let layout = current.layout();
        let Some(my_shard) = layout.shard_of_node(local) else {
            return;
        };
        let previous_layout = previous.layout();
        let previous_peers: BTreeSet<&String> = previous_layout
            .shard_of_node(local)
            .and_then(|shard| previous_layout.members(shard))
            .map(|members| members.iter().collect())
            .unwrap_or_default();

        let newcomers: Vec<String> = layout
            .members(my_shard)
            .unwrap_or_default()
            .iter()
            .filter(|addr| *addr != local && !previous_peers.contains(addr))
            .cloned()
            .collect();
        if newcomers.is_empty() {
            return;
        }

        let entries: Vec<KeyEntry> = self
            .store
            .snapshot_where(|key| current.owner_of(key) == my_shard)
            .into_iter()
            .map(KeyEntry::from)
            .collect();
        if entries.is_empty() {
            return;
        }

        for newcomer in newcomers {
            match self.client.replicate(&newcomer, entries.clone()).await {
                Ok(applied) => info!("Seeded {} with {} keys", newcomer, applied),
                Err(e) => warn!("Failed to seed {}: {}", newcomer, e),
            }
        }
    }

    /// Sends every key this node holds but does not own under `config` to the owning
    /// shard, then drops the local copy of those at least one owner acknowledged.
    pub async fn migrate_foreign_keys(&self, config: &ClusterConfig) -> MigrationReport {
        let layout = config.layout();
        let my_shard = layout.shard_of_node(&self.membership.local_addr);

        let mut by_shard: BTreeMap<ShardId, Vec<KeyEntry>> = BTreeMap::new();
        for (key, entry) in self
            .store
            .snapshot_where(|key| Some(config.owner_of(key)) != my_shard)
        {
            by_shard
                .entry(config.owner_of(&key))
                .or_default()
                .push(KeyEntry { key, entry });
        }

        let mut report = MigrationReport::default();
        for (shard, entries) in by_shard {
            let members = layout.members(shard).unwrap_or_default();
            let mut delivered = false;
            for member in members {
                match self.client.replicate(member, entries.clone()).await {
                    Ok(_) => delivered = true,
                    Err(e) => warn!("Failed to migrate shard {} keys to {}: {}", shard, member, e),
                }
            }

            if !delivered {
                report.kept += entries.len();
                continue;
            }
            for item in entries {
                if self.store.evict_if_unchanged(&item.key, &item.entry.clock) {
                    report.moved += 1;
                } else {
                    report.kept += 1;
                }
            }
        }
        report
    }
}
