//! In-process store for local development and tests.

use super::KeyValueStore;
use async_trait::async_trait;
use hmdp_core::HmdpResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Writes between two sweeps of expired entries.
const SWEEP_INTERVAL: u64 = 1024;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, StoredValue>,
    writes: u64,
}

impl Entries {
    fn insert(&mut self, key: &str, stored: StoredValue, now: Instant) {
        self.map.insert(key.to_string(), stored);
        self.writes += 1;
        if self.writes % SWEEP_INTERVAL == 0 {
            self.sweep(now);
        }
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, stored| stored.is_live(now));
        let removed = before - self.map.len();
        if removed > 0 {
            debug!(removed, remaining = self.map.len(), "Swept expired entries");
        }
        removed
    }
}

/// In-memory key-value store.
///
/// Every operation runs under a single mutex, which makes `set_if_absent` an
/// atomic test-and-set within the process. It offers no cross-process
/// exclusion; use [`RedisStore`](super::RedisStore) when several instances
/// share a cache.
///
/// Expired keys are dropped when read. Every 1024 writes the whole map is
/// swept as well, so keys that are written once and never read again, such
/// as null markers for random ids, do not accumulate.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<Entries>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining TTL of a live key, or `None` if the key is absent or has no
    /// expiration.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .map
            .get(key)
            .filter(|stored| stored.is_live(now))
            .and_then(|stored| stored.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Whether a live key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .map
            .get(key)
            .is_some_and(|stored| stored.is_live(now))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map
            .values()
            .filter(|stored| stored.is_live(now))
            .count()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.entries.lock().sweep(Instant::now())
    }

    fn deadline(now: Instant, ttl: Duration) -> Option<Instant> {
        now.checked_add(ttl)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> HmdpResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.map.get(key) {
            Some(stored) if stored.is_live(now) => Ok(Some(stored.value.clone())),
            Some(_) => {
                entries.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> HmdpResult<()> {
        let now = Instant::now();
        let stored = StoredValue {
            value: value.to_string(),
            expires_at: ttl.and_then(|ttl| Self::deadline(now, ttl)),
        };
        self.entries.lock().insert(key, stored, now);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> HmdpResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.map.get(key).is_some_and(|stored| stored.is_live(now)) {
            return Ok(false);
        }
        let stored = StoredValue {
            value: value.to_string(),
            expires_at: Self::deadline(now, ttl),
        };
        entries.insert(key, stored, now);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> HmdpResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .map
            .remove(key)
            .is_some_and(|stored| stored.is_live(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> HmdpResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.map.get_mut(key) {
            Some(stored) if stored.is_live(now) => {
                stored.expires_at = Self::deadline(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.ttl("k"), None);
        assert!(store.contains_key("k"));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = InMemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.ttl("k").is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_if_absent_respects_existing_key() {
        let store = InMemoryStore::new();
        assert!(store.set_if_absent("lock", "1", Duration::from_secs(10)).await.unwrap());
        assert!(!store.set_if_absent("lock", "1", Duration::from_secs(10)).await.unwrap());
        assert!(store.delete("lock").await.unwrap());
        assert!(store.set_if_absent("lock", "1", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_if_absent_after_expiry() {
        let store = InMemoryStore::new();
        assert!(store.set_if_absent("lock", "1", Duration::from_millis(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.set_if_absent("lock", "1", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_and_delete_missing() {
        let store = InMemoryStore::new();
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
        assert!(!store.delete("missing").await.unwrap());

        store.set("k", "v", None).await.unwrap();
        assert!(store.expire("k", Duration::from_secs(60)).await.unwrap());
        assert!(store.ttl("k").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_set_if_absent_single_winner() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set_if_absent("lock:cache:shop:1", "1", Duration::from_secs(10))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    fn raw_len(store: &InMemoryStore) -> usize {
        store.entries.lock().map.len()
    }

    #[tokio::test]
    async fn test_unread_expired_keys_are_swept() {
        let store = InMemoryStore::new();
        for id in 0..1000 {
            store
                .set(&format!("cache:shop:{}", id), "", Some(Duration::from_millis(1)))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(raw_len(&store), 1000);

        // The 1024th write triggers a sweep.
        for id in 0..24 {
            store.set(&format!("cache:live:{}", id), "v", None).await.unwrap();
        }

        assert_eq!(raw_len(&store), 24);
        assert_eq!(store.len(), 24);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryStore::new();
        store.set("short", "", Some(Duration::from_millis(1))).await.unwrap();
        store.set("long", "v", Some(Duration::from_secs(60))).await.unwrap();
        store.set("forever", "v", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(raw_len(&store), 2);
        assert_eq!(store.purge_expired(), 0);
    }
}
