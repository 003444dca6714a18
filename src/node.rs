//! One cluster node: its services, HTTP router and background tasks.

use crate::config::Config;
use crate::gateway::handlers::*;
use crate::gateway::internal::{handle_config, handle_entry, handle_replicate, handle_sync};
use crate::membership::service::MembershipService;
use crate::membership::types::ClusterConfig;
use crate::replication::anti_entropy::AntiEntropy;
use crate::replication::client::PeerClient;
use crate::replication::migration::Rebalancer;
use crate::replication::protocol::{
    ENDPOINT_CONFIG, ENDPOINT_ENTRY, ENDPOINT_REPLICATE, ENDPOINT_SYNC,
};
use crate::replication::replicator::Replicator;
use crate::storage::memory::LocalStore;
use crate::storage::service::KeyValueService;

use axum::{
    Router,
    extract::Extension,
    routing::{get, post, put},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

pub struct Node {
    pub config: Config,
    pub store: Arc<LocalStore>,
    pub membership: Arc<MembershipService>,
    pub client: Arc<PeerClient>,
    pub replicator: Arc<Replicator>,
    pub kv: Arc<KeyValueService>,
    pub rebalancer: Arc<Rebalancer>,
    pub anti_entropy: Arc<AntiEntropy>,
}

impl Node {
    pub fn new(config: Config) -> Arc<Self> {
        let view = config.initial_view();
        let initial = ClusterConfig::initial(view.iter().cloned(), config.shards);
        if initial.shard_count != config.shards {
            tracing::info!(
                "{} shards cannot be staffed by {} nodes, starting with {}",
                config.shards,
                initial.view.len(),
                initial.shard_count
            );
        }
        if !initial.contains(&config.ip_port) {
            tracing::warn!("{} is not part of its own initial view", config.ip_port);
        }

        let store = Arc::new(LocalStore::new());
        let membership = MembershipService::new(config.ip_port.clone(), initial);
        let client = Arc::new(PeerClient::new(
            config.peer_timeout(),
            config.replication_attempts,
        ));
        let replicator = Replicator::new(client.clone(), config.replication_queue);
        let kv = KeyValueService::new(
            store.clone(),
            membership.clone(),
            client.clone(),
            replicator.clone(),
        );
        let rebalancer = Rebalancer::new(
            store.clone(),
            membership.clone(),
            client.clone(),
            replicator.clone(),
        );
        let anti_entropy = AntiEntropy::new(
            store.clone(),
            membership.clone(),
            client.clone(),
            rebalancer.clone(),
            config.gossip_interval(),
            config.gossip_fanout,
        );

        Arc::new(Self {
            config,
            store,
            membership,
            client,
            replicator,
            kv,
            rebalancer,
            anti_entropy,
        })
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(
                "/keyValue-store/:key",
                put(handle_put_key)
                    .get(handle_get_key)
                    .delete(handle_delete_key),
            )
            .route("/keyValue-store/search/:key", get(handle_search_key))
            .route(
                "/view",
                get(handle_get_view)
                    .put(handle_add_node)
                    .delete(handle_remove_node),
            )
            .route("/shard/my_id", get(handle_my_shard))
            .route("/shard/all_ids", get(handle_all_shards))
            .route("/shard/members/:id", get(handle_shard_members))
            .route("/shard/count/:id", get(handle_shard_count))
            .route("/shard/changeShardNumber", put(handle_change_shard_number))
            .route(ENDPOINT_REPLICATE, post(handle_replicate))
            .route(ENDPOINT_CONFIG, post(handle_config))
            .route(ENDPOINT_SYNC, post(handle_sync))
            .route(&format!("{}/:key", ENDPOINT_ENTRY), get(handle_entry))
            .layer(Extension(self.clone()))
            .layer(TraceLayer::new_for_http())
    }

    /// Spawns the rebalancer and the anti-entropy loop.
    pub fn start_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.rebalancer.clone().run()),
            tokio::spawn(self.anti_entropy.clone().run()),
        ]
    }
}

/// Serves `node` on `listener` until the process ends.
pub async fn serve(node: Arc<Node>, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let _background = node.start_background();
    let app = node.router();
    axum::serve(listener, app).await?;
    Ok(())
}
