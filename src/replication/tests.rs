//! Replication Module Tests
//!
//! Validates the pieces of the replication engine that can be exercised without peers.
//!
//! ## Test Scopes
//! - **Replicator**: Per-destination queues are created lazily and dropped with the view.
//! - **Rebalancer**: Keys are only dropped once a new owner acknowledged them.
//! - **Anti-Entropy**: The sync responder adopts newer configurations and returns only
//!   entries of the requester's shard that the requester is missing.
//!
//! *Note: Delivery between live nodes is covered by the cluster integration tests.*

#[cfg(test)]
mod tests {
    use crate::causal::clock::VectorClock;
    use crate::membership::service::MembershipService;
    use crate::membership::types::ClusterConfig;
    use crate::replication::anti_entropy::answer_sync;
    use crate::replication::client::PeerClient;
    use crate::replication::migration::{MigrationReport, Rebalancer};
    use crate::replication::protocol::{KeyEntry, SyncRequest};
    use crate::replication::replicator::Replicator;
    use crate::storage::memory::LocalStore;
    use crate::storage::partitioner::shard_for_key;

    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;
    use std::time::Duration;

    const LOCAL: &str = "127.0.0.1:1";
    // Nothing listens on these; connections are refused immediately.
    const DEAD_A: &str = "127.0.0.1:2";
    const DEAD_B: &str = "127.0.0.1:3";

    fn client() -> Arc<PeerClient> {
        Arc::new(PeerClient::new(Duration::from_millis(200), 1))
    }

    // ============================================================
    // REPLICATOR TESTS
    // ============================================================

    #[tokio::test]
    async fn test_replicator_queue_per_destination() {
        let replicator = Replicator::new(client(), 8);
        let store = LocalStore::new();
        let outcome = store.put("k", "v".to_string(), &VectorClock::new(), LOCAL);

        replicator.propagate(
            &[DEAD_A.to_string(), DEAD_B.to_string()],
            "k",
            &outcome.entry,
        );
        replicator.propagate(&[DEAD_A.to_string()], "k", &outcome.entry);
        assert_eq!(replicator.destinations(), 2);

        let view: BTreeSet<String> = [DEAD_A.to_string()].into_iter().collect();
        replicator.retain_destinations(&view);
        assert_eq!(replicator.destinations(), 1);
    }

    // ============================================================
    // REBALANCER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_no_migration_when_everything_is_owned() {
        let store = Arc::new(LocalStore::new());
        for i in 0..5 {
            store.put(&format!("k{}", i), "v".to_string(), &VectorClock::new(), LOCAL);
        }
        let membership = MembershipService::new(LOCAL, ClusterConfig::initial([LOCAL], 1));
        let client = client();
        let rebalancer = Rebalancer::new(
            store.clone(),
            membership.clone(),
            client.clone(),
            Replicator::new(client, 8),
        );

        let report = rebalancer
            .migrate_foreign_keys(&membership.snapshot())
            .await;

        assert_eq!(report, MigrationReport::default());
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn test_removed_node_keeps_keys_until_acknowledged() {
        // ARRANGE: this node was removed; the remaining owners are unreachable.
        let store = Arc::new(LocalStore::new());
        for i in 0..4 {
            store.put(&format!("k{}", i), "v".to_string(), &VectorClock::new(), LOCAL);
        }
        let initial = ClusterConfig::initial([LOCAL, DEAD_A, DEAD_B], 1);
        let membership = MembershipService::new(LOCAL, initial.clone());
        let client = client();
        let rebalancer = Rebalancer::new(
            store.clone(),
            membership,
            client.clone(),
            Replicator::new(client, 8),
        );
        let removed = initial.without_node(LOCAL, DEAD_A);

        // ACT
        let report = rebalancer.migrate_foreign_keys(&removed).await;

        // ASSERT
        assert_eq!(report.moved, 0);
        assert_eq!(report.kept, 4);
        assert_eq!(store.len(), 4, "Nothing may be dropped without an acknowledgment");
    }

    // ============================================================
    // ANTI-ENTROPY TESTS
    // ============================================================

    #[test]
    fn test_sync_returns_missing_entries_of_requester_shard() {
        // ARRANGE: 4 nodes, 2 shards; LOCAL and DEAD_B share shard 0.
        let view = [LOCAL, DEAD_A, DEAD_B, "127.0.0.1:4"];
        let config = ClusterConfig::initial(view, 2);
        let membership = MembershipService::new(LOCAL, config.clone());
        let store = LocalStore::new();

        let keys: Vec<String> = (0..20).map(|i| format!("key{}", i)).collect();
        for key in &keys {
            store.put(key, "v".to_string(), &VectorClock::new(), LOCAL);
        }
        let shard_zero: Vec<&String> = keys
            .iter()
            .filter(|key| shard_for_key(key, 2) == 0)
            .collect();
        assert!(shard_zero.len() > 1);

        // The requester already holds the first shard-0 key.
        let mut digest = BTreeMap::new();
        digest.insert(
            shard_zero[0].clone(),
            store.clock_of(shard_zero[0]).unwrap(),
        );

        // ACT
        let response = answer_sync(
            &store,
            &membership,
            SyncRequest {
                from: DEAD_B.to_string(),
                config: config.clone(),
                digest,
            },
        );

        // ASSERT
        let mut returned: Vec<String> = response.entries.into_iter().map(|item| item.key).collect();
        returned.sort();
        let mut expected: Vec<String> = shard_zero[1..].iter().map(|key| (*key).clone()).collect();
        expected.sort();
        assert_eq!(returned, expected);
        assert_eq!(response.config, config);
    }

    #[test]
    fn test_sync_adopts_newer_config() {
        let config = ClusterConfig::initial([LOCAL, DEAD_A], 1);
        let membership = MembershipService::new(LOCAL, config.clone());
        let newer = config.with_node(DEAD_B, DEAD_A);

        let response = answer_sync(
            &LocalStore::new(),
            &membership,
            SyncRequest {
                from: DEAD_A.to_string(),
                config: newer.clone(),
                digest: BTreeMap::new(),
            },
        );

        assert_eq!(response.config, newer);
        assert!(membership.snapshot().contains(DEAD_B));
    }

    #[test]
    fn test_sync_with_unknown_requester_returns_nothing() {
        let membership = MembershipService::new(LOCAL, ClusterConfig::initial([LOCAL], 1));
        let store = LocalStore::new();
        store.put("k", "v".to_string(), &VectorClock::new(), LOCAL);

        let response = answer_sync(
            &store,
            &membership,
            SyncRequest {
                from: "10.9.9.9:8080".to_string(),
                config: ClusterConfig::initial(["10.9.9.9:8080"], 1),
                digest: BTreeMap::new(),
            },
        );

        assert!(response.entries.is_empty());
        assert!(membership.snapshot().contains(LOCAL));
    }

    #[test]
    fn test_key_entry_from_pair() {
        let store = LocalStore::new();
        let outcome = store.put("k", "v".to_string(), &VectorClock::new(), LOCAL);

        let item = KeyEntry::from(("k".to_string(), outcome.entry.clone()));

        assert_eq!(item.key, "k");
        assert_eq!(item.entry, outcome.entry);
    }
}
