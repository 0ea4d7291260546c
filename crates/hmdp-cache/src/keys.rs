//! Cache key naming.

use std::fmt::Display;
use std::time::Duration;

/// Prefix for cached shops.
pub const CACHE_SHOP_KEY: &str = "cache:shop:";

/// Prefix prepended to a data key to form its rebuild lock key.
pub const LOCK_PREFIX: &str = "lock:";

/// TTL for cached shops (30 minutes).
pub const CACHE_SHOP_TTL: Duration = Duration::from_secs(30 * 60);

/// TTL for null markers (2 minutes).
pub const CACHE_NULL_TTL: Duration = Duration::from_secs(2 * 60);

/// Safety-net TTL for rebuild locks (10 seconds).
pub const LOCK_TTL: Duration = Duration::from_secs(10);

/// Key builder for data and lock keys.
///
/// Data keys are `prefix + id`. Lock keys are `lock_prefix + data_key`, so a
/// lock is always scoped to exactly one data key and two data namespaces that
/// happen to share ids never contend on the same lock.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    lock_prefix: String,
}

impl CacheKeys {
    /// Create a new key builder with the given lock prefix.
    pub fn new(lock_prefix: impl Into<String>) -> Self {
        Self {
            lock_prefix: lock_prefix.into(),
        }
    }

    /// Data key for `id` under `prefix`.
    pub fn data_key<ID: Display + ?Sized>(&self, prefix: &str, id: &ID) -> String {
        format!("{}{}", prefix, id)
    }

    /// Lock key guarding rebuilds of `data_key`.
    pub fn lock_key(&self, data_key: &str) -> String {
        format!("{}{}", self.lock_prefix, data_key)
    }

    /// Whether a data prefix would put data keys inside the lock namespace.
    pub fn collides_with_locks(&self, prefix: &str) -> bool {
        prefix.starts_with(&self.lock_prefix)
    }

    /// The lock prefix in use.
    pub fn lock_prefix(&self) -> &str {
        &self.lock_prefix
    }
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::new(LOCK_PREFIX)
    }
}
