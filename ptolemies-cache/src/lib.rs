//! In-process result cache for retrieval and embedding lookups (C9).
//!
//! Generalizes the ingestion pipeline's on-disk `DocumentCache` into a
//! sharded, in-memory LRU with per-entry TTL: 8 shards, each guarded by its
//! own `parking_lot::Mutex` so concurrent readers across shards never
//! contend. A miss — including an expired or corrupted entry — is never an
//! error; the caller always falls through to a recompute.

mod error;

pub use error::CacheError;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

const SHARD_COUNT: usize = 8;

pub mod keys {
    pub const SEMANTIC_PREFIX: &str = "q:semantic:";
    pub const GRAPH_PREFIX: &str = "q:graph:";
    pub const HYBRID_PREFIX: &str = "q:hybrid:";
    pub const EMBEDDING_PREFIX: &str = "emb:";

    pub fn semantic(query: &str, filters: &str, k: usize) -> String {
        format!("{SEMANTIC_PREFIX}{}", super::hash_parts(&[query, filters, &k.to_string()]))
    }

    pub fn graph(query: &str, filters: &str, depth: u32) -> String {
        format!("{GRAPH_PREFIX}{}", super::hash_parts(&[query, filters, &depth.to_string()]))
    }

    pub fn hybrid(query: &str, filters: &str, strategy: &str) -> String {
        format!("{HYBRID_PREFIX}{}", super::hash_parts(&[query, filters, strategy]))
    }

    pub fn embedding(text: &str) -> String {
        format!("{EMBEDDING_PREFIX}{}", super::hash_parts(&[text]))
    }
}

fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    hasher.finalize().to_hex().to_string()
}

struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Shard {
    entries: HashMap<String, Entry>,
    order: VecDeque<String>,
}

impl Shard {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn evict_to_capacity(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

/// TTL presets matching spec defaults: semantic 1h, graph 30m, hybrid 30m,
/// embedding 24h.
pub struct Ttl;

impl Ttl {
    pub fn semantic() -> Duration {
        Duration::hours(1)
    }
    pub fn graph() -> Duration {
        Duration::minutes(30)
    }
    pub fn hybrid() -> Duration {
        Duration::minutes(30)
    }
    pub fn embedding() -> Duration {
        Duration::hours(24)
    }
}

pub struct Cache {
    shards: Vec<Mutex<Shard>>,
    capacity_per_shard: usize,
}

impl Cache {
    pub fn new(capacity_per_shard: usize) -> Result<Self, CacheError> {
        if capacity_per_shard == 0 {
            return Err(CacheError::InvalidCapacity);
        }
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(Mutex::new(Shard::default()));
        }
        Ok(Self {
            shards,
            capacity_per_shard,
        })
    }

    fn shard_for(&self, key: &str) -> &Mutex<Shard> {
        let digest = blake3::hash(key.as_bytes());
        let idx = digest.as_bytes()[0] as usize % SHARD_COUNT;
        &self.shards[idx]
    }

    /// Returns `None` on miss, expiry, or a value that fails to deserialize
    /// into `T` — never an error.
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let shard = self.shard_for(key);
        let mut guard = shard.lock();
        let now = Utc::now();
        let hit = match guard.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => None,
            None => return None,
        };
        match hit {
            Some(bytes) => {
                guard.touch(key);
                serde_json::from_slice(&bytes).ok()
            }
            None => {
                guard.entries.remove(key);
                None
            }
        }
    }

    pub fn put<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(bytes) = serde_json::to_vec(value) else {
            return;
        };
        let shard = self.shard_for(key);
        let mut guard = shard.lock();
        guard.entries.insert(
            key.to_string(),
            Entry {
                value: bytes,
                expires_at: Utc::now() + ttl,
            },
        );
        guard.touch(key);
        let capacity = self.capacity_per_shard;
        guard.evict_to_capacity(capacity);
    }

    /// Removes every key starting with `prefix`. Used on `upsert_chunks`/
    /// `tombstone_document` to invalidate all `q:` query-result entries
    /// while leaving `emb:` embedding cache entries untouched.
    pub fn invalidate(&self, prefix: &str) {
        for shard in &self.shards {
            let mut guard = shard.lock();
            let stale: Vec<String> = guard
                .entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            for key in stale {
                guard.entries.remove(&key);
                if let Some(pos) = guard.order.iter().position(|k| k == &key) {
                    guard.order.remove(pos);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let cache = Cache::new(100).unwrap();
        cache.put("q:semantic:abc", &vec![1, 2, 3], Ttl::semantic());
        let value: Option<Vec<i32>> = cache.get("q:semantic:abc");
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = Cache::new(100).unwrap();
        cache.put("emb:x", &"vector".to_string(), Duration::seconds(-1));
        let value: Option<String> = cache.get("emb:x");
        assert_eq!(value, None);
    }

    #[test]
    fn invalidate_prefix_clears_only_matching_keys() {
        let cache = Cache::new(100).unwrap();
        cache.put("q:semantic:a", &1, Ttl::semantic());
        cache.put("q:graph:b", &2, Ttl::graph());
        cache.put("emb:c", &3, Ttl::embedding());
        cache.invalidate("q:");
        assert_eq!(cache.get::<i32>("q:semantic:a"), None);
        assert_eq!(cache.get::<i32>("q:graph:b"), None);
        assert_eq!(cache.get::<i32>("emb:c"), Some(3));
    }

    #[test]
    fn eviction_respects_capacity() {
        let cache = Cache::new(2).unwrap();
        for shard_safe_key in ["k0", "k1", "k2", "k3"] {
            cache.put(shard_safe_key, &1, Ttl::semantic());
        }
        assert!(cache.len() <= 8 * 2);
    }

    #[test]
    fn corrupted_type_mismatch_is_a_miss_not_a_panic() {
        let cache = Cache::new(100).unwrap();
        cache.put("emb:x", &"not-a-number".to_string(), Ttl::embedding());
        let value: Option<i64> = cache.get("emb:x");
        assert_eq!(value, None);
    }
}
