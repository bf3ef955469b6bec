//! Two-tier cache of whole-room snapshots.
//!
//! The memory tier is a [`BoundedCache`] that lives for the session; the
//! persistent tier survives restarts and is guarded by a schema version and
//! an expiry.  Caching is best-effort: persistent failures are logged and
//! never reach the caller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cloudchat_shared::constants::SNAPSHOT_CACHE_PREFIX;
use cloudchat_shared::{RoomId, Snapshot};

use crate::bounded::BoundedCache;
use crate::kv::KvStore;

/// Sizing and invalidation settings for [`SnapshotCacheManager`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Rooms kept in the memory tier.
    pub memory_capacity: usize,
    /// Maximum age of a persistent entry.
    pub persistent_expiry: Duration,
    /// Schema version; persistent entries written under another version are
    /// discarded.
    pub version: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 100,
            persistent_expiry: Duration::from_secs(5 * 60),
            version: 1,
        }
    }
}

/// Persistent envelope around a cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Write time, Unix milliseconds.
    pub timestamp: i64,
    pub version: u32,
}

pub struct SnapshotCacheManager {
    memory: Mutex<BoundedCache<RoomId, Snapshot>>,
    persistent: Arc<dyn KvStore>,
    config: CacheConfig,
}

impl SnapshotCacheManager {
    /// Create the manager and purge stale persistent entries once.
    pub fn new(persistent: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        let manager = Self {
            memory: Mutex::new(BoundedCache::new(config.memory_capacity)),
            persistent,
            config,
        };
        manager.sweep();
        manager
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cached snapshot for `room`, memory tier first.
    pub fn get(&self, room: RoomId) -> Option<Snapshot> {
        if let Some(snapshot) = self.memory().get(&room) {
            return Some(snapshot.clone());
        }

        let snapshot = self.read_persistent(room)?;
        self.memory().set(room, snapshot.clone());
        debug!(room = %room, entries = snapshot.len(), "Promoted persisted snapshot");
        Some(snapshot)
    }

    pub fn set(&self, room: RoomId, snapshot: &Snapshot) {
        self.memory().set(room, snapshot.clone());

        let entry = CacheEntry {
            data: snapshot,
            timestamp: now_millis(),
            version: self.config.version,
        };
        let encoded = match serde_json::to_string(&entry) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(room = %room, error = %e, "Failed to encode snapshot cache entry");
                return;
            }
        };
        if let Err(e) = self.persistent.set(&storage_key(room), &encoded) {
            warn!(room = %room, error = %e, "Failed to persist snapshot cache entry");
        }
    }

    /// Forget `room` in both tiers.
    pub fn clear(&self, room: RoomId) {
        self.memory().delete(&room);
        if let Err(e) = self.persistent.delete(&storage_key(room)) {
            warn!(room = %room, error = %e, "Failed to clear persisted snapshot");
        }
    }

    pub fn clear_all(&self) {
        self.memory().clear();
        match self.persistent.keys_with_prefix(SNAPSHOT_CACHE_PREFIX) {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = self.persistent.delete(&key) {
                        warn!(key = %key, error = %e, "Failed to clear persisted snapshot");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to enumerate persisted snapshots"),
        }
    }

    fn memory(&self) -> MutexGuard<'_, BoundedCache<RoomId, Snapshot>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_persistent(&self, room: RoomId) -> Option<Snapshot> {
        let key = storage_key(room);
        let stored = match self.persistent.get(&key) {
            Ok(Some(stored)) if !stored.is_empty() => stored,
            Ok(_) => return None,
            Err(e) => {
                warn!(room = %room, error = %e, "Failed to read persisted snapshot");
                return None;
            }
        };

        let entry: CacheEntry<Snapshot> = match serde_json::from_str(&stored) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(room = %room, error = %e, "Discarding unreadable snapshot cache entry");
                self.evict(&key);
                return None;
            }
        };

        if !self.is_current(entry.version, entry.timestamp) {
            debug!(room = %room, version = entry.version, "Discarding stale snapshot cache entry");
            self.evict(&key);
            return None;
        }

        Some(entry.data)
    }

    fn is_current(&self, version: u32, timestamp: i64) -> bool {
        let age = now_millis().saturating_sub(timestamp);
        version == self.config.version
            && age <= self.config.persistent_expiry.as_millis() as i64
    }

    fn evict(&self, key: &str) {
        if let Err(e) = self.persistent.delete(key) {
            warn!(key = %key, error = %e, "Failed to evict snapshot cache entry");
        }
    }

    /// Purge persisted entries that are expired, versioned differently or
    /// unreadable.
    fn sweep(&self) {
        let keys = match self.persistent.keys_with_prefix(SNAPSHOT_CACHE_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Snapshot cache sweep skipped");
                return;
            }
        };

        let mut purged = 0usize;
        for key in keys {
            let keep = match self.persistent.get(&key) {
                Ok(Some(stored)) => serde_json::from_str::<CacheEntry<serde_json::Value>>(&stored)
                    .map(|entry| self.is_current(entry.version, entry.timestamp))
                    .unwrap_or(false),
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read snapshot during sweep");
                    continue;
                }
            };
            if !keep {
                self.evict(&key);
                purged += 1;
            }
        }

        if purged > 0 {
            debug!(purged, "Purged stale snapshot cache entries");
        }
    }
}

fn storage_key(room: RoomId) -> String {
    format!("{SNAPSHOT_CACHE_PREFIX}{room}")
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn snapshot(pairs: &[(&str, &str)]) -> Snapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn persisted(data: &Snapshot, timestamp: i64, version: u32) -> String {
        serde_json::to_string(&CacheEntry {
            data,
            timestamp,
            version,
        })
        .unwrap()
    }

    #[test]
    fn test_memory_hit_after_set() {
        let store = Arc::new(MemoryStore::new());
        let cache = SnapshotCacheManager::new(store, CacheConfig::default());
        let snap = snapshot(&[("a", "1")]);

        cache.set(RoomId(1), &snap);
        assert_eq!(cache.get(RoomId(1)), Some(snap));
        assert_eq!(cache.get(RoomId(2)), None);
    }

    #[test]
    fn test_persistent_tier_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        let snap = snapshot(&[("a", "1"), ("b", "2")]);
        {
            let cache = SnapshotCacheManager::new(store.clone(), CacheConfig::default());
            cache.set(RoomId(7), &snap);
        }

        let cache = SnapshotCacheManager::new(store.clone(), CacheConfig::default());
        let restored = cache.get(RoomId(7)).unwrap();
        assert_eq!(restored, snap);
        assert_eq!(restored.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_version_mismatch_is_discarded_and_evicted() {
        let store = Arc::new(MemoryStore::new());
        let cache = SnapshotCacheManager::new(store.clone(), CacheConfig::default());

        let stale = persisted(&snapshot(&[("a", "1")]), now_millis(), 99);
        store.set("msg_cache_3", &stale).unwrap();

        assert_eq!(cache.get(RoomId(3)), None);
        assert_eq!(store.get("msg_cache_3").unwrap(), None);
    }

    #[test]
    fn test_expired_entry_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let config = CacheConfig {
            persistent_expiry: Duration::from_secs(60),
            ..CacheConfig::default()
        };
        let cache = SnapshotCacheManager::new(store.clone(), config);

        let old = persisted(&snapshot(&[("a", "1")]), now_millis() - 61_000, 1);
        store.set("msg_cache_4", &old).unwrap();

        assert_eq!(cache.get(RoomId(4)), None);
        assert_eq!(store.get("msg_cache_4").unwrap(), None);
    }

    #[test]
    fn test_startup_sweep_purges_bad_entries_only() {
        let store = Arc::new(MemoryStore::new());
        let data = snapshot(&[("a", "1")]);
        store.set("msg_cache_1", &persisted(&data, now_millis(), 1)).unwrap();
        store.set("msg_cache_2", &persisted(&data, now_millis(), 2)).unwrap();
        store
            .set("msg_cache_3", &persisted(&data, now_millis() - 3_600_000, 1))
            .unwrap();
        store.set("msg_cache_4", "{garbage").unwrap();
        store.set("roomList", "[]").unwrap();

        let _cache = SnapshotCacheManager::new(store.clone(), CacheConfig::default());

        assert_eq!(
            store.keys_with_prefix("msg_cache_").unwrap(),
            vec!["msg_cache_1".to_string()]
        );
        assert!(store.get("roomList").unwrap().is_some());
    }

    #[test]
    fn test_quota_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::with_quota(16));
        let cache = SnapshotCacheManager::new(store.clone(), CacheConfig::default());
        let snap = snapshot(&[("a fairly long payload", "1700000000")]);

        cache.set(RoomId(5), &snap);
        assert_eq!(cache.get(RoomId(5)), Some(snap));
        assert_eq!(store.get("msg_cache_5").unwrap(), None);
    }

    #[test]
    fn test_clear_removes_both_tiers() {
        let store = Arc::new(MemoryStore::new());
        let cache = SnapshotCacheManager::new(store.clone(), CacheConfig::default());
        cache.set(RoomId(1), &snapshot(&[("a", "1")]));
        cache.set(RoomId(2), &snapshot(&[("b", "2")]));

        cache.clear(RoomId(1));
        assert_eq!(cache.get(RoomId(1)), None);
        assert!(cache.get(RoomId(2)).is_some());

        cache.clear_all();
        assert_eq!(cache.get(RoomId(2)), None);
        assert!(store.keys_with_prefix("msg_cache_").unwrap().is_empty());
    }

    #[test]
    fn test_memory_tier_is_bounded() {
        let store = Arc::new(MemoryStore::with_quota(0));
        let config = CacheConfig {
            memory_capacity: 2,
            ..CacheConfig::default()
        };
        let cache = SnapshotCacheManager::new(store, config);
        for room in 1..=3 {
            cache.set(RoomId(room), &snapshot(&[("a", "1")]));
        }

        assert_eq!(cache.get(RoomId(1)), None);
        assert!(cache.get(RoomId(3)).is_some());
    }
}
