use super::types::{ClusterConfig, MIN_REPLICAS, ShardId, ShardLayout};
use crate::error::KvsError;

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Owner of this node's view of the cluster configuration.
///
/// The current snapshot lives in a `watch` channel: every mutation is a short
/// critical section that swaps in a new immutable `ClusterConfig`, and
/// subscribers (the rebalancer) are woken up to react outside of it.
pub struct MembershipService {
    pub local_addr: String,
    config: watch::Sender<Arc<ClusterConfig>>,
}

impl MembershipService {
    pub fn new(local_addr: impl Into<String>, initial: ClusterConfig) -> Arc<Self> {
        let (config, _) = watch::channel(Arc::new(initial));
        Arc::new(Self {
            local_addr: local_addr.into(),
            config,
        })
    }

    pub fn snapshot(&self) -> Arc<ClusterConfig> {
        self.config.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ClusterConfig>> {
        self.config.subscribe()
    }

    pub fn layout(&self) -> ShardLayout {
        self.snapshot().layout()
    }

    pub fn my_shard(&self) -> Option<ShardId> {
        self.layout().shard_of_node(&self.local_addr)
    }

    /// Every address in the view except this node.
    pub fn peers(&self) -> Vec<String> {
        self.snapshot()
            .view
            .iter()
            .filter(|addr| **addr != self.local_addr)
            .cloned()
            .collect()
    }

    /// Members of this node's own shard, excluding itself.
    pub fn shard_peers(&self) -> Vec<String> {
        let layout = self.layout();
        match layout.shard_of_node(&self.local_addr) {
            Some(shard) => layout
                .members(shard)
                .unwrap_or_default()
                .iter()
                .filter(|addr| **addr != self.local_addr)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Applies `change` to the current snapshot atomically and publishes the result.
    fn transition<F>(&self, change: F) -> Result<Arc<ClusterConfig>, KvsError>
    where
        F: FnOnce(&ClusterConfig) -> Result<ClusterConfig, KvsError>,
    {
        let mut outcome = Err(KvsError::InvalidShardCount);
        self.config.send_if_modified(|current| match change(current) {
            Ok(next) => {
                let next = Arc::new(next);
                *current = next.clone();
                outcome = Ok(next);
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }

    pub fn add_node(&self, addr: &str) -> Result<Arc<ClusterConfig>, KvsError> {
        let next = self.transition(|current| {
            if current.contains(addr) {
                return Err(KvsError::AlreadyInView(addr.to_string()));
            }
            Ok(current.with_node(addr, &self.local_addr))
        })?;
        info!(
            "Added {} to view (epoch {}, {} nodes)",
            addr,
            next.epoch,
            next.view.len()
        );
        Ok(next)
    }

    pub fn remove_node(&self, addr: &str) -> Result<Arc<ClusterConfig>, KvsError> {
        let next = self.transition(|current| {
            if !current.contains(addr) {
                return Err(KvsError::NotInView(addr.to_string()));
            }
            Ok(current.without_node(addr, &self.local_addr))
        })?;
        info!(
            "Removed {} from view (epoch {}, {} nodes, {} shards)",
            addr,
            next.epoch,
            next.view.len(),
            next.shard_count
        );
        Ok(next)
    }

    /// Validates and applies a new shard count. On error the configuration is untouched.
    pub fn change_shard_count(&self, requested: i64) -> Result<Arc<ClusterConfig>, KvsError> {
        if requested <= 0 {
            return Err(KvsError::InvalidShardCount);
        }
        let requested = requested as usize;

        let next = self.transition(|current| {
            let nodes = current.view.len();
            if requested > nodes {
                return Err(KvsError::NotEnoughNodes { requested });
            }
            if requested > 1 && nodes / requested < MIN_REPLICAS {
                return Err(KvsError::NotFaultTolerant { requested });
            }
            Ok(current.with_shard_count(requested, &self.local_addr))
        })?;
        info!(
            "Shard count changed to {} (epoch {})",
            next.shard_count, next.epoch
        );
        Ok(next)
    }

    /// Adopts a configuration learned from another node if it is newer than ours.
    pub fn adopt(&self, incoming: &ClusterConfig) -> bool {
        let adopted = self.config.send_if_modified(|current| {
            if incoming.supersedes(current) {
                *current = Arc::new(incoming.clone());
                true
            } else {
                false
            }
        });
        if adopted {
            info!(
                "Adopted configuration epoch {} from {} ({} nodes, {} shards)",
                incoming.epoch,
                incoming.origin,
                incoming.view.len(),
                incoming.shard_count
            );
        }
        adopted
    }
}
