//! Cluster Integration Tests
//!
//! Runs several nodes in one process on ephemeral localhost ports and drives them
//! through the public HTTP API, the way a client of the cluster would.

use causal_kvs::causal::clock::VectorClock;
use causal_kvs::config::Config;
use causal_kvs::node::{Node, serve};

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const POLL_ATTEMPTS: usize = 60;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Cluster {
    nodes: Vec<Arc<Node>>,
    addrs: Vec<String>,
    http: reqwest::Client,
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

fn spawn_node(listener: TcpListener, addr: &str, view: &[String], shards: usize) -> Arc<Node> {
    let mut config = Config::new(addr, view, shards);
    config.gossip_interval_ms = 200;
    config.peer_timeout_ms = 500;

    let node = Node::new(config);
    tokio::spawn(serve(node.clone(), listener));
    node
}

impl Cluster {
    async fn start(size: usize, shards: usize) -> Self {
        let mut listeners = Vec::new();
        let mut addrs = Vec::new();
        for _ in 0..size {
            let (listener, addr) = bind().await;
            listeners.push(listener);
            addrs.push(addr);
        }
        // Nodes are indexed in the same order as the layout sorts them.
        let mut paired: Vec<(String, TcpListener)> = addrs.into_iter().zip(listeners).collect();
        paired.sort_by(|a, b| a.0.cmp(&b.0));
        let addrs: Vec<String> = paired.iter().map(|(addr, _)| addr.clone()).collect();

        let nodes = paired
            .into_iter()
            .map(|(addr, listener)| spawn_node(listener, &addr, &addrs, shards))
            .collect();

        Self {
            nodes,
            addrs,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, i: usize, path: &str) -> String {
        format!("http://{}{}", self.addrs[i], path)
    }

    async fn send(
        &self,
        method: reqwest::Method,
        i: usize,
        path: &str,
        fields: &[(&str, &str)],
    ) -> (u16, Value) {
        let response = self
            .http
            .request(method, self.url(i, path))
            .form(fields)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn put_key(&self, i: usize, key: &str, val: &str, payload: &str) -> (u16, Value) {
        let path = format!("/keyValue-store/{}", key);
        self.send(
            reqwest::Method::PUT,
            i,
            &path,
            &[("val", val), ("payload", payload)],
        )
        .await
    }

    async fn get_key(&self, i: usize, key: &str, payload: &str) -> (u16, Value) {
        let path = format!("/keyValue-store/{}", key);
        self.send(reqwest::Method::GET, i, &path, &[("payload", payload)])
            .await
    }

    async fn search_key(&self, i: usize, key: &str, payload: &str) -> (u16, Value) {
        let path = format!("/keyValue-store/search/{}", key);
        self.send(reqwest::Method::GET, i, &path, &[("payload", payload)])
            .await
    }

    async fn get_json(&self, i: usize, path: &str) -> Value {
        self.send(reqwest::Method::GET, i, path, &[]).await.1
    }

    /// Polls a key until it reads successfully or the attempts run out.
    async fn wait_for_key(&self, i: usize, key: &str, payload: &str) -> (u16, Value) {
        let mut last = (0, Value::Null);
        for _ in 0..POLL_ATTEMPTS {
            last = self.get_key(i, key, payload).await;
            if last.0 == 200 {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        last
    }

    async fn wait_for_shard_ids(&self, i: usize, expected: &str) -> Value {
        let mut last = Value::Null;
        for _ in 0..POLL_ATTEMPTS {
            last = self.get_json(i, "/shard/all_ids").await;
            if last["shard_ids"] == expected {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        last
    }

    async fn wait_for_view_size(&self, i: usize, expected: usize) -> Vec<String> {
        let mut view = Vec::new();
        for _ in 0..POLL_ATTEMPTS {
            let body = self.get_json(i, "/view").await;
            view = body["view"]
                .as_str()
                .unwrap_or_default()
                .split(',')
                .filter(|addr| !addr.is_empty())
                .map(str::to_string)
                .collect();
            if view.len() == expected {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        view
    }
}

fn payload_of(body: &Value) -> String {
    body["payload"].as_str().unwrap_or_default().to_string()
}

// ============================================================
// CAUSAL CONSISTENCY
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_causal_order_within_connected_cluster() {
    // ARRANGE
    let cluster = Cluster::start(2, 1).await;
    let (status, _) = cluster.put_key(0, "x", "0", "").await;
    assert_eq!(status, 201);
    let (status, read) = cluster.get_key(0, "x", "").await;
    assert_eq!(status, 200);

    // ACT: write on the other node with the context of the read.
    let (status, write) = cluster.put_key(1, "x", "1", &payload_of(&read)).await;

    // ASSERT
    assert_eq!(status, 200);
    assert_eq!(write["replaced"], true);
    assert_eq!(write["msg"], "Updated successfully");

    let (status, body) = cluster.wait_for_key(0, "x", &payload_of(&write)).await;
    assert_eq!(status, 200);
    assert_eq!(body["value"], "1", "A must never go back to the old value");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_write_replicates_to_shard_members() {
    let cluster = Cluster::start(3, 1).await;

    cluster.put_key(0, "k", "v", "").await;

    // Read without a payload: only replication can make the key visible.
    let mut seen = 0;
    for _ in 0..POLL_ATTEMPTS {
        seen = cluster
            .nodes
            .iter()
            .filter(|node| node.store.get_entry("k").is_some())
            .count();
        if seen == 3 {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    assert_eq!(seen, 3);
}

// ============================================================
// MEMBERSHIP
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_membership_removal_preserves_data() {
    // ARRANGE
    let cluster = Cluster::start(3, 1).await;
    let stationary = 0;
    let removed = 2;
    let (status, put) = cluster.put_key(removed, "K", "original", "").await;
    assert_eq!(status, 201);
    let payload = payload_of(&put);

    // ACT
    let (status, body) = cluster
        .send(
            reqwest::Method::DELETE,
            stationary,
            "/view",
            &[("ip_port", cluster.addrs[removed].as_str())],
        )
        .await;

    // ASSERT
    assert_eq!(status, 200);
    assert_eq!(
        body["msg"],
        format!("Successfully removed {} from view", cluster.addrs[removed])
    );

    let view = cluster.wait_for_view_size(1, 2).await;
    assert!(!view.contains(&cluster.addrs[removed]));

    let (status, body) = cluster.wait_for_key(stationary, "K", &payload).await;
    assert_eq!(status, 200);
    assert_eq!(body["value"], "original");

    let (status, body) = cluster.search_key(stationary, "K", &payload).await;
    assert_eq!(status, 200);
    assert_eq!(body["isExists"], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_added_node_receives_existing_keys() {
    // ARRANGE: a two-node cluster holding a key, and a fresh node outside of it.
    let cluster = Cluster::start(2, 1).await;
    let (_, put) = cluster.put_key(0, "seeded", "yes", "").await;

    let (listener, addr) = bind().await;
    let mut view = cluster.addrs.clone();
    view.push(addr.clone());
    let newcomer = spawn_node(listener, &addr, &view, 1);

    // ACT
    let (status, _) = cluster
        .send(reqwest::Method::PUT, 0, "/view", &[("ip_port", addr.as_str())])
        .await;
    assert_eq!(status, 200);

    // ASSERT
    let mut found = false;
    for _ in 0..POLL_ATTEMPTS {
        if newcomer
            .store
            .get_entry("seeded")
            .is_some_and(|entry| entry.value.as_deref() == Some("yes"))
        {
            found = true;
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    assert!(found, "The new member must be seeded with the shard's keys");
    assert_eq!(newcomer.membership.snapshot().view.len(), 3);
    assert!(!payload_of(&put).is_empty());
}

// ============================================================
// SHARDING
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shard_count_reduction_redistributes_members() {
    // ARRANGE
    let cluster = Cluster::start(6, 3).await;
    assert_eq!(cluster.get_json(0, "/shard/all_ids").await["shard_ids"], "0,1,2");

    // ACT
    let (status, body) = cluster
        .send(
            reqwest::Method::PUT,
            0,
            "/shard/changeShardNumber",
            &[("num", "2")],
        )
        .await;

    // ASSERT
    assert_eq!(status, 200);
    assert_eq!(body["result"], "Success");
    assert_eq!(body["shard_ids"], "0,1");

    for i in 0..cluster.addrs.len() {
        let ids = cluster.wait_for_shard_ids(i, "0,1").await;
        assert_eq!(ids["shard_ids"], "0,1", "node {} did not converge", i);
    }
    for id in ["0", "1"] {
        let members = cluster.get_json(5, &format!("/shard/members/{}", id)).await;
        let members: Vec<&str> = members["members"].as_str().unwrap().split(',').collect();
        assert_eq!(members.len(), 3);
        for member in members {
            let i = cluster.addrs.iter().position(|addr| addr == member).unwrap();
            assert_eq!(cluster.get_json(i, "/shard/my_id").await["id"], id);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_key_redistribution_on_node_removal() {
    // ARRANGE: 6 nodes in 3 shards; removing one leaves 5, which only staff 2 shards.
    let cluster = Cluster::start(6, 3).await;
    let removed = 5;
    let target = 4;
    let (status, put) = cluster.put_key(target, "key1", "value1", "").await;
    assert_eq!(status, 201);
    let payload = payload_of(&put);

    // ACT
    let (status, _) = cluster
        .send(
            reqwest::Method::DELETE,
            0,
            "/view",
            &[("ip_port", cluster.addrs[removed].as_str())],
        )
        .await;
    assert_eq!(status, 200);

    // ASSERT: sha1("key1") is odd, so its owner is shard 1 of 2 everywhere.
    for i in 0..removed {
        let (status, body) = cluster.wait_for_key(i, "key1", &payload).await;
        assert_eq!(status, 200, "node {} could not read key1: {}", i, body);
        assert_eq!(body["value"], "value1");
        assert_eq!(body["owner"], "1");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shard_count_validation() {
    let cluster = Cluster::start(4, 2).await;

    let (status, body) = cluster
        .send(
            reqwest::Method::PUT,
            0,
            "/shard/changeShardNumber",
            &[("num", "0")],
        )
        .await;

    assert_eq!(status, 400);
    assert_eq!(body["result"], "Error");
    assert_eq!(body["msg"], "Must have at least one shard");
    assert_eq!(cluster.get_json(0, "/shard/all_ids").await["shard_ids"], "0,1");
    assert_eq!(cluster.nodes[0].membership.snapshot().epoch, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_is_forwarded_to_owner_shard() {
    // ARRANGE: with 4 nodes in 2 shards, node 0 sits in shard 0 while key1 lives in shard 1.
    let cluster = Cluster::start(4, 2).await;
    assert_eq!(cluster.get_json(0, "/shard/my_id").await["id"], "0");

    // ACT
    let (status, put) = cluster.put_key(0, "key1", "v", "").await;

    // ASSERT
    assert_eq!(status, 201);
    assert!(cluster.nodes[0].store.get_entry("key1").is_none());

    let (status, body) = cluster.get_key(0, "key1", &payload_of(&put)).await;
    assert_eq!(status, 200);
    assert_eq!(body["owner"], "1");

    let count = cluster.get_json(0, "/shard/count/1").await;
    assert_eq!(count["result"], "Success");
    assert_eq!(count["Count"], 1);
}

// ============================================================
// ANTI-ENTROPY
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_anti_entropy_heals_missed_writes_and_configs() {
    // ARRANGE: a write that skips replication and a config adopted without an announcement.
    let cluster = Cluster::start(3, 1).await;
    cluster.nodes[0]
        .store
        .put("healed", "v".to_string(), &VectorClock::new(), &cluster.addrs[0]);

    let newer = cluster.nodes[1]
        .membership
        .snapshot()
        .with_shard_count(1, &cluster.addrs[2]);
    assert!(cluster.nodes[1].membership.adopt(&newer));

    // ACT
    let mut synced = false;
    for _ in 0..POLL_ATTEMPTS {
        synced = cluster.nodes.iter().all(|node| {
            node.store.get_entry("healed").is_some()
                && node.membership.snapshot().epoch == newer.epoch
        });
        if synced {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    // ASSERT
    assert!(synced, "gossip rounds did not converge");
    for node in &cluster.nodes {
        let config = node.membership.snapshot();
        assert_eq!(config.origin, cluster.addrs[2]);
        assert_eq!(config.view.len(), 3);
        assert_eq!(
            node.store.get_entry("healed").unwrap().value.as_deref(),
            Some("v")
        );
    }
}
