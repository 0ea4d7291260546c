//! Cache-aside client.

use crate::entry::{CacheLookup, LogicalExpireEntry};
use crate::keys::CacheKeys;
use crate::metrics::CacheMetrics;
use crate::options::CacheClientOptions;
use crate::rebuild::{RebuildExecutor, RebuildExecutorConfig, RebuildTask};
use crate::store::KeyValueStore;
use hmdp_config::{CacheConfig, StoreFailurePolicy};
use hmdp_core::{HmdpError, HmdpResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const PASS_THROUGH: &str = "pass_through";
const MUTEX: &str = "mutex";
const LOGICAL_EXPIRE: &str = "logical_expire";

/// Value written under a data key to remember a confirmed miss.
const NULL_MARKER: &str = "";

/// Value written under a lock key.
const LOCK_VALUE: &str = "1";

/// Decoded state of a data key.
enum Cached<T> {
    Hit(T),
    Null,
    Miss,
    /// The key held undecodable text and has been removed.
    Corrupt,
}

/// Cache-aside client over a [`KeyValueStore`].
///
/// Cheap to clone; clones share the store and the rebuild pool.
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn KeyValueStore>,
    options: CacheClientOptions,
    keys: CacheKeys,
    executor: Arc<RebuildExecutor>,
}

impl CacheClient {
    /// Create a new cache client.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        options: CacheClientOptions,
        executor: Arc<RebuildExecutor>,
    ) -> Self {
        let keys = CacheKeys::new(options.lock_prefix.clone());
        Self {
            store,
            options,
            keys,
            executor,
        }
    }

    /// Create a client and its rebuild pool from configuration.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &CacheConfig) -> HmdpResult<Self> {
        let executor = RebuildExecutor::new(RebuildExecutorConfig::from(config))?;
        Ok(Self::new(
            store,
            CacheClientOptions::from(config),
            Arc::new(executor),
        ))
    }

    /// Key builder used by this client.
    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    /// Client options.
    pub fn options(&self) -> &CacheClientOptions {
        &self.options
    }

    /// Rebuild pool used by the logical-expire strategy.
    pub fn executor(&self) -> &Arc<RebuildExecutor> {
        &self.executor
    }

    // ============ Plain operations ============

    /// Serialize `value` and store it with a store-level TTL.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> HmdpResult<()> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, &json, Some(ttl)).await?;
        debug!(key, ttl_ms = ttl.as_millis() as u64, "Cached value");
        Ok(())
    }

    /// Store `value` wrapped with an expiration `ttl` from now and no
    /// store-level TTL.
    pub async fn set_with_logical_expire<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> HmdpResult<()> {
        let json = encode_logical(value, ttl)?;
        self.store.set(key, &json, None).await?;
        debug!(
            key,
            ttl_ms = ttl.as_millis() as u64,
            "Cached value with logical expiration"
        );
        Ok(())
    }

    /// Read and decode a value.
    ///
    /// An absent key and a null marker both read as `None`. Text that does not
    /// decode as `R` fails with [`HmdpError::CacheCorruption`].
    pub async fn get<R: DeserializeOwned>(&self, key: &str) -> HmdpResult<Option<R>> {
        match CacheLookup::from_raw(self.store.get(key).await?) {
            CacheLookup::Absent | CacheLookup::NullMarker => Ok(None),
            CacheLookup::Value(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| HmdpError::corruption(key, e)),
        }
    }

    /// Remove a data key. Returns `true` if it existed.
    pub async fn delete(&self, key: &str) -> HmdpResult<bool> {
        let deleted = self.store.delete(key).await?;
        debug!(key, deleted, "Evicted cache key");
        Ok(deleted)
    }

    /// Try to take a rebuild lock. Returns `true` if this call created it.
    ///
    /// The lock expires after the configured lock TTL even if never released.
    pub async fn lock(&self, lock_key: &str) -> HmdpResult<bool> {
        let acquired = self
            .store
            .set_if_absent(lock_key, LOCK_VALUE, self.options.lock_ttl)
            .await?;
        CacheMetrics::lock_attempt(acquired);
        Ok(acquired)
    }

    /// Release a rebuild lock unconditionally.
    pub async fn unlock(&self, lock_key: &str) -> HmdpResult<()> {
        self.store.delete(lock_key).await?;
        Ok(())
    }

    // ============ Strategies ============

    /// Cache-aside read that caches misses as null markers.
    ///
    /// Concurrent cold reads may each call `loader`.
    pub async fn query_with_pass_through<ID, R, F, Fut>(
        &self,
        key_prefix: &str,
        id: ID,
        loader: F,
        ttl: Duration,
    ) -> HmdpResult<Option<R>>
    where
        ID: Display,
        R: Serialize + DeserializeOwned,
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = HmdpResult<Option<R>>>,
    {
        let key = self.data_key(key_prefix, &id)?;

        let cached = match self.lookup::<R>(&key).await {
            Ok(cached) => cached,
            Err(e) if self.falls_back(&e) => {
                return self.load_uncached(PASS_THROUGH, &key, id, loader, &e).await
            }
            Err(e) => return Err(e),
        };

        match cached {
            Cached::Hit(value) => {
                CacheMetrics::hit(PASS_THROUGH);
                debug!(key = %key, "Cache hit");
                return Ok(Some(value));
            }
            Cached::Null => {
                CacheMetrics::null_hit(PASS_THROUGH);
                debug!(key = %key, "Null marker hit");
                return Ok(None);
            }
            Cached::Miss | Cached::Corrupt => {
                CacheMetrics::miss(PASS_THROUGH);
                debug!(key = %key, "Cache miss");
            }
        }

        let loaded = self.load(PASS_THROUGH, id, loader).await?;
        self.store_loaded(&key, loaded.as_ref(), ttl).await;
        Ok(loaded)
    }

    /// Cache-aside read where only the holder of the rebuild lock loads.
    ///
    /// Callers that lose the lock race sleep and re-read, up to the configured
    /// retry budget, then fail with [`HmdpError::CacheBusy`]. The lock holder
    /// re-reads the key before loading, so concurrent cold reads of one id
    /// call `loader` once.
    pub async fn query_with_mutex<ID, R, F, Fut>(
        &self,
        key_prefix: &str,
        id: ID,
        loader: F,
        ttl: Duration,
    ) -> HmdpResult<Option<R>>
    where
        ID: Display,
        R: Serialize + DeserializeOwned,
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = HmdpResult<Option<R>>>,
    {
        let key = self.data_key(key_prefix, &id)?;
        let lock_key = self.keys.lock_key(&key);
        let retry = &self.options.lock_retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempts = 0u32;

        loop {
            let cached = match self.lookup::<R>(&key).await {
                Ok(cached) => cached,
                Err(e) if self.falls_back(&e) => {
                    return self.load_uncached(MUTEX, &key, id, loader, &e).await
                }
                Err(e) => return Err(e),
            };

            match cached {
                Cached::Hit(value) => {
                    CacheMetrics::hit(MUTEX);
                    debug!(key = %key, attempts, "Cache hit");
                    return Ok(Some(value));
                }
                Cached::Null => {
                    CacheMetrics::null_hit(MUTEX);
                    debug!(key = %key, attempts, "Null marker hit");
                    return Ok(None);
                }
                Cached::Miss | Cached::Corrupt => {
                    if attempts == 0 {
                        CacheMetrics::miss(MUTEX);
                        debug!(key = %key, "Cache miss");
                    }
                }
            }

            attempts += 1;
            match self.lock(&lock_key).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) if self.falls_back(&e) => {
                    return self.load_uncached(MUTEX, &key, id, loader, &e).await
                }
                Err(e) => return Err(e),
            }

            if attempts >= max_attempts {
                CacheMetrics::busy();
                warn!(key = %key, attempts, "Gave up waiting for rebuild lock");
                return Err(HmdpError::CacheBusy { key, attempts });
            }

            debug!(lock_key = %lock_key, attempts, "Rebuild lock held elsewhere, retrying");
            tokio::time::sleep(retry.delay).await;
        }

        let result = self.load_under_lock(&key, id, loader, ttl).await;
        self.release(&lock_key).await;
        result
    }

    /// Read that never waits on the source of truth.
    ///
    /// Entries are expected to be pre-warmed with
    /// [`set_with_logical_expire`](Self::set_with_logical_expire); an absent
    /// key reads as `None`. A stale entry is returned as-is while one caller
    /// dispatches a rebuild to the rebuild pool.
    pub async fn query_with_logical_expire<ID, R, F, Fut>(
        &self,
        key_prefix: &str,
        id: ID,
        loader: F,
        ttl: Duration,
    ) -> HmdpResult<Option<R>>
    where
        ID: Display + Send + 'static,
        R: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(ID) -> Fut + Send + 'static,
        Fut: Future<Output = HmdpResult<Option<R>>> + Send + 'static,
    {
        let key = self.data_key(key_prefix, &id)?;

        let cached = match self.lookup::<LogicalExpireEntry<R>>(&key).await {
            Ok(cached) => cached,
            Err(e) if self.falls_back(&e) => {
                return self.load_uncached(LOGICAL_EXPIRE, &key, id, loader, &e).await
            }
            Err(e) => return Err(e),
        };

        let stale = match cached {
            Cached::Miss => {
                CacheMetrics::miss(LOGICAL_EXPIRE);
                debug!(key = %key, "Cache miss, entry not pre-warmed");
                return Ok(None);
            }
            Cached::Null => {
                CacheMetrics::null_hit(LOGICAL_EXPIRE);
                debug!(key = %key, "Null marker hit");
                return Ok(None);
            }
            Cached::Hit(entry) if !entry.is_expired() => {
                CacheMetrics::hit(LOGICAL_EXPIRE);
                debug!(key = %key, "Cache hit");
                return Ok(Some(entry.data));
            }
            Cached::Hit(entry) => {
                CacheMetrics::stale();
                debug!(key = %key, expire_time = %entry.expire_time, "Entry expired");
                Some(entry.data)
            }
            Cached::Corrupt => None,
        };

        self.spawn_rebuild(key, id, loader, ttl).await;
        Ok(stale)
    }

    // ============ Internals ============

    fn data_key<ID: Display + ?Sized>(&self, key_prefix: &str, id: &ID) -> HmdpResult<String> {
        if self.keys.collides_with_locks(key_prefix) {
            return Err(HmdpError::validation(format!(
                "Key prefix '{}' overlaps lock prefix '{}'",
                key_prefix,
                self.keys.lock_prefix()
            )));
        }
        Ok(self.keys.data_key(key_prefix, id))
    }

    fn falls_back(&self, error: &HmdpError) -> bool {
        self.options.store_failure_policy == StoreFailurePolicy::FallbackToSource
            && error.is_store_failure()
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> HmdpResult<Cached<T>> {
        let cached = match CacheLookup::from_raw(self.store.get(key).await?) {
            CacheLookup::Absent => Cached::Miss,
            CacheLookup::NullMarker => Cached::Null,
            CacheLookup::Value(json) => match serde_json::from_str(&json) {
                Ok(value) => Cached::Hit(value),
                Err(e) => {
                    self.discard_corrupt(key, &e).await;
                    Cached::Corrupt
                }
            },
        };
        Ok(cached)
    }

    async fn discard_corrupt(&self, key: &str, cause: &serde_json::Error) {
        CacheMetrics::corruption();
        warn!(key, error = %cause, "Discarding undecodable cache entry");
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "Failed to delete corrupt cache entry");
        }
    }

    async fn load<ID, R, F, Fut>(
        &self,
        strategy: &'static str,
        id: ID,
        loader: F,
    ) -> HmdpResult<Option<R>>
    where
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = HmdpResult<Option<R>>>,
    {
        let started = Instant::now();
        let loaded = loader(id).await?;
        CacheMetrics::load(strategy, loaded.is_some(), started.elapsed());
        Ok(loaded)
    }

    async fn load_uncached<ID, R, F, Fut>(
        &self,
        strategy: &'static str,
        key: &str,
        id: ID,
        loader: F,
        cause: &HmdpError,
    ) -> HmdpResult<Option<R>>
    where
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = HmdpResult<Option<R>>>,
    {
        CacheMetrics::store_fallback(strategy);
        warn!(key, error = %cause, "Cache store unavailable, serving from source");
        self.load(strategy, id, loader).await
    }

    /// Double check and load while holding the rebuild lock.
    async fn load_under_lock<ID, R, F, Fut>(
        &self,
        key: &str,
        id: ID,
        loader: F,
        ttl: Duration,
    ) -> HmdpResult<Option<R>>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = HmdpResult<Option<R>>>,
    {
        match self.lookup::<R>(key).await? {
            Cached::Hit(value) => {
                debug!(key, "Populated by previous lock holder");
                return Ok(Some(value));
            }
            Cached::Null => return Ok(None),
            Cached::Miss | Cached::Corrupt => {}
        }

        let loaded = self.load(MUTEX, id, loader).await?;
        self.store_loaded(key, loaded.as_ref(), ttl).await;
        Ok(loaded)
    }

    /// Cache a loaded value, or a null marker for a confirmed miss. Failures
    /// are logged; the caller still gets the loaded value.
    async fn store_loaded<R: Serialize>(&self, key: &str, loaded: Option<&R>, ttl: Duration) {
        let result = match loaded {
            Some(value) => self.set(key, value, ttl).await,
            None => self
                .store
                .set(key, NULL_MARKER, Some(self.options.null_ttl))
                .await
                .map(|()| debug!(key, "Cached null marker")),
        };

        if let Err(e) = result {
            warn!(key, error = %e, "Failed to write loaded value to cache");
        }
    }

    async fn release(&self, lock_key: &str) {
        if let Err(e) = self.unlock(lock_key).await {
            warn!(lock_key, error = %e, "Failed to release rebuild lock, waiting for TTL");
        }
    }

    /// Take the rebuild lock and hand the rebuild to the pool. Never waits on
    /// the rebuild itself.
    async fn spawn_rebuild<ID, R, F, Fut>(&self, key: String, id: ID, loader: F, ttl: Duration)
    where
        ID: Send + 'static,
        R: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(ID) -> Fut + Send + 'static,
        Fut: Future<Output = HmdpResult<Option<R>>> + Send + 'static,
    {
        let lock_key = self.keys.lock_key(&key);
        match self.lock(&lock_key).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(key = %key, "Rebuild already in progress");
                return;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Could not take rebuild lock");
                return;
            }
        }

        let store = self.store.clone();
        let task_key = key.clone();
        let task_lock_key = lock_key.clone();
        let work = async move {
            let result =
                rebuild_logical::<ID, R, F, Fut>(store.as_ref(), &task_key, id, loader, ttl).await;

            if let Err(e) = store.delete(&task_lock_key).await {
                warn!(
                    lock_key = %task_lock_key,
                    error = %e,
                    "Failed to release rebuild lock, waiting for TTL"
                );
            }

            match result {
                Ok(()) => CacheMetrics::rebuild("ok"),
                Err(e) => {
                    CacheMetrics::rebuild("failed");
                    error!(key = %task_key, error = %e, "Background cache rebuild failed");
                }
            }
        };
        let task = RebuildTask::new(work)
            .on_abandon(release_abandoned(self.store.clone(), lock_key.clone()));

        match self.executor.submit(task) {
            Ok(()) => debug!(key = %key, "Dispatched background rebuild"),
            Err(rejected) => {
                CacheMetrics::rebuild("rejected");
                warn!(key = %key, error = %rejected.reason(), "Background rebuild rejected");
                rejected.into_task().discard();
                self.release(&lock_key).await;
            }
        }
    }
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("options", &self.options)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// Hook for a rebuild that never finished. Releases its lock on a fresh task
/// so later readers need not wait out the lock TTL.
fn release_abandoned(
    store: Arc<dyn KeyValueStore>,
    lock_key: String,
) -> impl FnOnce() + Send + 'static {
    move || {
        CacheMetrics::rebuild("abandoned");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match store.delete(&lock_key).await {
                        Ok(_) => debug!(lock_key = %lock_key, "Released lock of abandoned rebuild"),
                        Err(e) => warn!(
                            lock_key = %lock_key,
                            error = %e,
                            "Failed to release rebuild lock, waiting for TTL"
                        ),
                    }
                });
            }
            Err(_) => {
                warn!(lock_key = %lock_key, "No runtime to release rebuild lock, waiting for TTL");
            }
        }
    }
}

/// Wrap `value` with an expiration `ttl` from now and serialize it.
///
/// Kept synchronous so no borrow of `value` is held across a store call.
fn encode_logical<T: Serialize>(value: &T, ttl: Duration) -> HmdpResult<String> {
    let entry = LogicalExpireEntry::expiring_in(value, ttl)?;
    Ok(serde_json::to_string(&entry)?)
}

/// Body of a background rebuild. Skips the load when another rebuild has
/// already refreshed the entry; a vanished source row removes the key.
async fn rebuild_logical<ID, R, F, Fut>(
    store: &dyn KeyValueStore,
    key: &str,
    id: ID,
    loader: F,
    ttl: Duration,
) -> HmdpResult<()>
where
    R: Serialize + DeserializeOwned,
    F: FnOnce(ID) -> Fut,
    Fut: Future<Output = HmdpResult<Option<R>>>,
{
    if let Some(raw) = store.get(key).await? {
        if let Ok(entry) = serde_json::from_str::<LogicalExpireEntry<R>>(&raw) {
            if !entry.is_expired() {
                debug!(key, "Entry already refreshed");
                return Ok(());
            }
        }
    }

    let started = Instant::now();
    let loaded = loader(id).await?;
    CacheMetrics::load(LOGICAL_EXPIRE, loaded.is_some(), started.elapsed());

    match loaded {
        Some(value) => {
            let json = encode_logical(&value, ttl)?;
            store.set(key, &json, None).await?;
            debug!(key, "Rebuilt cache entry");
        }
        None => {
            store.delete(key).await?;
            debug!(key, "Source row gone, removed cache entry");
        }
    }
    Ok(())
}
