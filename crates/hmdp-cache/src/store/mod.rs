//! Key-value store abstraction and implementations.

mod memory_store;
mod redis_store;

pub use memory_store::InMemoryStore;
pub use redis_store::{create_pool, RedisStore};

use async_trait::async_trait;
use hmdp_config::RedisConfig;
use hmdp_core::HmdpResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Key-value store with TTLs and an atomic conditional set.
///
/// Values are plain strings; serialization happens in the cache client. All
/// operations are independent round trips, and [`set_if_absent`] is the only
/// one that must be atomic.
///
/// [`set_if_absent`]: KeyValueStore::set_if_absent
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> HmdpResult<Option<String>>;

    /// Set a value, replacing any existing one. `None` means no expiration.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> HmdpResult<()>;

    /// Set a value only if the key does not exist (test-and-set).
    ///
    /// Returns `true` if this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> HmdpResult<bool>;

    /// Delete a key.
    ///
    /// Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> HmdpResult<bool>;

    /// Reset the expiration of an existing key.
    ///
    /// Returns `true` if the key existed.
    async fn expire(&self, key: &str, ttl: Duration) -> HmdpResult<bool>;
}

/// Store selected by configuration: Redis when enabled, in-memory otherwise.
pub async fn connect_store(config: &RedisConfig) -> HmdpResult<Arc<dyn KeyValueStore>> {
    if config.enabled {
        let pool = create_pool(config).await?;
        Ok(Arc::new(RedisStore::new(Arc::new(pool))))
    } else {
        info!("Redis disabled, using in-memory cache store");
        Ok(Arc::new(InMemoryStore::new()))
    }
}

/// Converts a TTL to whole milliseconds, never rounding a non-zero TTL down to
/// zero (which Redis would reject).
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
