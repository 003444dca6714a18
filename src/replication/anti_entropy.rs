//! Periodic digest exchange.
//!
//! Each round a node sends its configuration and a key -> clock digest to a few
//! members of its shard plus one random node of the view. The responder adopts the
//! configuration if it is newer and answers with its own configuration and every
//! entry of the requester's shard the requester has not fully seen.

use super::client::PeerClient;
use super::migration::Rebalancer;
use super::protocol::{KeyEntry, SyncRequest, SyncResponse};
use crate::membership::service::MembershipService;
use crate::storage::memory::LocalStore;

use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

pub struct AntiEntropy {
    store: Arc<LocalStore>,
    membership: Arc<MembershipService>,
    client: Arc<PeerClient>,
    rebalancer: Arc<Rebalancer>,
    interval: Duration,
    fanout: usize,
}

impl AntiEntropy {
    pub fn new(
        store: Arc<LocalStore>,
        membership: Arc<MembershipService>,
        client: Arc<PeerClient>,
        rebalancer: Arc<Rebalancer>,
        interval: Duration,
        fanout: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            membership,
            client,
            rebalancer,
            interval,
            fanout,
        })
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.round().await;
        }
    }

    fn pick_targets(&self) -> Vec<String> {
        let mut rng = rand::thread_rng();

        let mut targets = self.membership.shard_peers();
        targets.shuffle(&mut rng);
        targets.truncate(self.fanout);

        let others: Vec<String> = self
            .membership
            .peers()
            .into_iter()
            .filter(|addr| !targets.contains(addr))
            .collect();
        if let Some(extra) = others.choose(&mut rng) {
            targets.push(extra.clone());
        }
        targets
    }

    /// One exchange with every picked target, then a migration pass for keys
    /// that ended up here without being owned here.
    pub async fn round(&self) {
        let targets = self.pick_targets();
        if !targets.is_empty() {
            let request = Arc::new(SyncRequest {
                from: self.membership.local_addr.clone(),
                config: (*self.membership.snapshot()).clone(),
                digest: self.store.digest(),
            });

            let mut pending = tokio::task::JoinSet::new();
            for target in targets {
                let client = self.client.clone();
                let request = request.clone();
                pending.spawn(async move {
                    let result = client.sync(&target, &request).await;
                    (target, result)
                });
            }

            while let Some(joined) = pending.join_next().await {
                match joined {
                    Ok((_, Ok(response))) => {
                        self.membership.adopt(&response.config);
                        let applied = response
                            .entries
                            .into_iter()
                            .filter(|item| self.store.apply(&item.key, item.entry.clone()))
                            .count();
                        if applied > 0 {
                            debug!("Anti-entropy applied {} entries", applied);
                        }
                    }
                    Ok((target, Err(e))) => debug!("Sync with {} failed: {}", target, e),
                    Err(e) => debug!("Sync task failed: {}", e),
                }
            }
        }

        let config = self.membership.snapshot();
        self.rebalancer.migrate_foreign_keys(&config).await;
    }
}

/// Server side of a sync exchange.
pub fn answer_sync(
    store: &LocalStore,
    membership: &MembershipService,
    request: SyncRequest,
) -> SyncResponse {
    membership.adopt(&request.config);
    let config = membership.snapshot();
    let layout = config.layout();

    let entries: Vec<KeyEntry> = match layout.shard_of_node(&request.from) {
        Some(shard) => store
            .missing_from(&request.digest, |key| config.owner_of(key) == shard)
            .into_iter()
            .map(KeyEntry::from)
            .collect(),
        None => Vec::new(),
    };

    SyncResponse {
        config: (*config).clone(),
        entries,
    }
}
