use sha1::{Digest, Sha1};

/// Shard that owns `key` when the cluster has `shard_count` shards.
///
/// The SHA-1 digest is read as one big-endian integer and reduced modulo the
/// shard count, so the answer depends on nothing but the key and the count.
pub fn shard_for_key(key: &str, shard_count: usize) -> usize {
    let shard_count = shard_count.max(1) as u64;
    let digest = Sha1::digest(key.as_bytes());
    digest
        .iter()
        .fold(0u64, |acc, &byte| (acc * 256 + byte as u64) % shard_count) as usize
}

/// Deals the sorted view round-robin into `shard_count` shards.
pub fn assign_members(view: &[String], shard_count: usize) -> Vec<Vec<String>> {
    let shard_count = shard_count.max(1);
    let mut sorted: Vec<&String> = view.iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut shards = vec![Vec::new(); shard_count];
    for (i, addr) in sorted.into_iter().enumerate() {
        shards[i % shard_count].push(addr.clone());
    }
    shards
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_deterministic() {
        let p1 = shard_for_key("book_100", 7);
        let p2 = shard_for_key("book_100", 7);
        assert_eq!(p1, p2);
        assert!(p1 < 7);
    }

    #[test]
    fn test_sha1_big_endian_modulo() {
        // sha1("key1") = 1073ab6c...f34004ae9327, an odd number.
        assert_eq!(shard_for_key("key1", 2), 1);
        assert_eq!(shard_for_key("key1", 1), 0);
    }
}
