//! Common test infrastructure for cache client integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use hmdp_cache::{
    CacheClient, CacheClientOptions, InMemoryStore, KeyValueStore, LockRetryPolicy,
    RebuildExecutor, RebuildExecutorConfig,
};
use hmdp_core::{HmdpError, HmdpResult, Shop, ShopId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Boxed loader, the shape the cache client receives from callers.
pub type ShopLoader = Box<dyn FnOnce(ShopId) -> BoxFuture<'static, HmdpResult<Option<Shop>>> + Send>;

/// In-memory source of truth that counts loads.
#[derive(Clone, Default)]
pub struct ShopSource {
    shops: Arc<Mutex<HashMap<ShopId, Shop>>>,
    loads: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay: Arc<Mutex<Duration>>,
}

impl ShopSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shop(self, id: ShopId, name: &str) -> Self {
        self.put(Shop::new(id, name));
        self
    }

    pub fn put(&self, shop: Shop) {
        let id = shop.id.expect("test shops carry an id");
        self.shops.lock().insert(id, shop);
    }

    pub fn remove(&self, id: ShopId) {
        self.shops.lock().remove(&id);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// A loader reading from this source.
    pub fn loader(&self) -> ShopLoader {
        let source = self.clone();
        Box::new(move |id| {
            async move {
                source.loads.fetch_add(1, Ordering::SeqCst);
                let delay = *source.delay.lock();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if source.failing.load(Ordering::SeqCst) {
                    return Err(HmdpError::Database("source unavailable".into()));
                }
                Ok(source.shops.lock().get(&id).cloned())
            }
            .boxed()
        })
    }
}

/// Client wired to an in-memory store.
pub struct TestCache {
    pub store: Arc<InMemoryStore>,
    pub executor: Arc<RebuildExecutor>,
    pub client: CacheClient,
}

impl TestCache {
    pub fn new() -> Self {
        Self::with_options(fast_options())
    }

    pub fn with_options(options: CacheClientOptions) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let executor = Arc::new(
            RebuildExecutor::new(RebuildExecutorConfig {
                workers: 2,
                queue_capacity: 16,
                shutdown_timeout: Duration::from_secs(2),
            })
            .expect("rebuild pool starts inside the test runtime"),
        );
        let client = CacheClient::new(store.clone(), options, executor.clone());
        Self {
            store,
            executor,
            client,
        }
    }
}

/// Default options with a short lock retry delay.
pub fn fast_options() -> CacheClientOptions {
    CacheClientOptions {
        lock_retry: LockRetryPolicy {
            max_attempts: 200,
            delay: Duration::from_millis(10),
        },
        ..CacheClientOptions::default()
    }
}

/// Store whose every operation fails like an unreachable Redis.
#[derive(Debug, Default)]
pub struct UnreachableStore;

#[async_trait]
impl KeyValueStore for UnreachableStore {
    async fn get(&self, _key: &str) -> HmdpResult<Option<String>> {
        Err(HmdpError::cache("connection refused"))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> HmdpResult<()> {
        Err(HmdpError::cache("connection refused"))
    }

    async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> HmdpResult<bool> {
        Err(HmdpError::cache("connection refused"))
    }

    async fn delete(&self, _key: &str) -> HmdpResult<bool> {
        Err(HmdpError::cache("connection refused"))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> HmdpResult<bool> {
        Err(HmdpError::cache("connection refused"))
    }
}

/// Poll `check` until it returns `true` or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
