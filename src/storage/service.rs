use super::memory::LocalStore;
use super::types::Entry;
use crate::causal::clock::VectorClock;
use crate::causal::context::CausalContext;
use crate::error::{KvsError, validate_key, validate_value};
use crate::membership::service::MembershipService;
use crate::membership::types::ShardId;
use crate::replication::client::PeerClient;
use crate::replication::replicator::Replicator;

use std::sync::Arc;
use tracing::debug;

/// Where a request for a key should be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Local,
    Remote { shard: ShardId, members: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub value: String,
    pub owner: ShardId,
}

/// Causally consistent key-value operations on this node.
///
/// Every operation takes the client's context by `&mut` and folds into it
/// whatever this node learned about the key, on success and failure alike,
/// so a client's causal knowledge never regresses.
pub struct KeyValueService {
    store: Arc<LocalStore>,
    membership: Arc<MembershipService>,
    client: Arc<PeerClient>,
    replicator: Arc<Replicator>,
}

impl KeyValueService {
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

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn membership(&self) -> &Arc<MembershipService> {
        &self.membership
    }

    pub fn owner_of(&self, key: &str) -> ShardId {
        self.membership.snapshot().owner_of(key)
    }

    pub fn route(&self, key: &str) -> Route {
        let config = self.membership.snapshot();
        let layout = config.layout();
        let shard = config.owner_of(key);
        if layout.shard_of_node(&self.membership.local_addr) == Some(shard) {
            return Route::Local;
        }
        Route::Remote {
            shard,
            members: layout.members(shard).unwrap_or_default().to_vec(),
        }
    }

    /// Members of the key's owning shard other than this node.
    fn replicas_of(&self, key: &str) -> Vec<String> {
        let config = self.membership.snapshot();
        config
            .layout()
            .members(config.owner_of(key))
            .unwrap_or_default()
            .iter()
            .filter(|addr| **addr != self.membership.local_addr)
            .cloned()
            .collect()
    }

    /// Read repair: if `dependency` is not covered locally, pull the key once from
    /// the owning shard. Returns whether the dependency is now met.
    async fn ensure_visible(&self, key: &str, dependency: &VectorClock) -> bool {
        if self.store.covers(key, dependency) {
            return true;
        }

        let mut pending = tokio::task::JoinSet::new();
        for replica in self.replicas_of(key) {
            let client = self.client.clone();
            let key = key.to_string();
            pending.spawn(async move { client.fetch_entry(&replica, &key).await });
        }
        while let Some(joined) = pending.join_next().await {
            if let Ok(Ok(Some(entry))) = joined {
                self.store.apply(key, entry);
            }
        }

        let covered = self.store.covers(key, dependency);
        debug!("Read repair for {}: dependency met = {}", key, covered);
        covered
    }

    fn propagate(&self, key: &str, entry: &Entry) {
        let replicas = self.replicas_of(key);
        if !replicas.is_empty() {
            self.replicator.propagate(&replicas, key, entry);
        }
    }

    /// Writes `value`. Returns whether a live value was replaced.
    pub async fn put(
        &self,
        key: &str,
        value: String,
        context: &mut CausalContext,
    ) -> Result<bool, KvsError> {
        validate_key(key)?;
        validate_value(&value)?;

        let dependency = context.dependency(key);
        // A write is accepted even if the dependency is still unseen: the new
        // clock absorbs it and so happens-after it.
        self.ensure_visible(key, &dependency).await;

        let outcome = self
            .store
            .put(key, value, &dependency, &self.membership.local_addr);
        context.observe(key, &outcome.entry.clock);
        self.propagate(key, &outcome.entry);

        Ok(outcome.existed)
    }

    pub async fn get(&self, key: &str, context: &mut CausalContext) -> Result<ReadResult, KvsError> {
        validate_key(key)?;

        let dependency = context.dependency(key);
        if !self.ensure_visible(key, &dependency).await {
            return Err(KvsError::CausalNotSatisfied {
                key: key.to_string(),
            });
        }

        match self.store.read(key, &dependency) {
            Ok(entry) => {
                context.observe(key, &entry.clock);
                Ok(ReadResult {
                    value: entry.value.unwrap_or_default(),
                    owner: self.owner_of(key),
                })
            }
            Err(e) => {
                if let Some(clock) = self.store.clock_of(key) {
                    context.observe(key, &clock);
                }
                Err(e)
            }
        }
    }

    pub async fn exists(&self, key: &str, context: &mut CausalContext) -> Result<bool, KvsError> {
        match self.get(key, context).await {
            Ok(_) => Ok(true),
            Err(KvsError::KeyNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes a live key. Deleting a missing key fails with `KeyNotFound`.
    pub async fn delete(&self, key: &str, context: &mut CausalContext) -> Result<(), KvsError> {
        validate_key(key)?;

        let dependency = context.dependency(key);
        self.ensure_visible(key, &dependency).await;

        let outcome = self
            .store
            .delete(key, &dependency, &self.membership.local_addr);
        context.observe(key, &outcome.entry.clock);

        if !outcome.existed {
            return Err(KvsError::KeyNotFound {
                key: key.to_string(),
            });
        }
        if outcome.changed {
            self.propagate(key, &outcome.entry);
        }
        Ok(())
    }

    /// Live keys this node holds for `shard`.
    pub fn count(&self, shard: ShardId) -> usize {
        let config = self.membership.snapshot();
        self.store
            .live_count(|key| config.owner_of(key) == shard)
    }
}
