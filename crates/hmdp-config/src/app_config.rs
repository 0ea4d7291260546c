//! Application configuration structures.

use hmdp_core::telemetry::LoggingConfig;
use hmdp_core::{HmdpError, HmdpResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Cache client configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: LoggingConfig,
}

impl AppConfig {
    /// Parses a configuration document in TOML form. Missing sections take
    /// their defaults.
    pub fn from_toml_str(source: &str) -> HmdpResult<Self> {
        toml::from_str(source).map_err(|e| HmdpError::Configuration(e.to_string()))
    }

    /// Renders the effective configuration as TOML.
    pub fn to_toml_string(&self) -> HmdpResult<String> {
        toml::to_string_pretty(self).map_err(|e| HmdpError::Configuration(e.to_string()))
    }
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "hmdp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL.
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
    /// Enable Redis. When disabled the in-memory store is used.
    pub enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            enabled: true,
        }
    }
}

/// Which query strategy the shop service uses on reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Cache null markers for confirmed misses.
    PassThrough,
    /// Single rebuilder per key guarded by a store lock.
    Mutex,
    /// Serve stale data while a background task rebuilds.
    #[default]
    LogicalExpire,
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PassThrough => "pass_through",
            Self::Mutex => "mutex",
            Self::LogicalExpire => "logical_expire",
        };
        f.write_str(name)
    }
}

/// What a query does when the store itself fails on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Propagate the store error to the caller.
    #[default]
    Fail,
    /// Serve directly from the source of truth without caching.
    FallbackToSource,
}

/// Cache client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for cached shops, in seconds. Also the logical expiration window.
    pub shop_ttl_secs: u64,
    /// TTL for null markers, in seconds.
    pub null_ttl_secs: u64,
    /// Safety-net TTL for rebuild locks, in seconds.
    pub lock_ttl_secs: u64,
    /// Prefix prepended to data keys to form lock keys.
    pub lock_prefix: String,
    /// Sleep between lock attempts in the mutex strategy, in milliseconds.
    pub lock_retry_delay_ms: u64,
    /// Maximum lock attempts in the mutex strategy before giving up.
    pub lock_max_attempts: u32,
    /// Number of background rebuild workers.
    pub rebuild_workers: usize,
    /// Capacity of the rebuild task queue.
    pub rebuild_queue_capacity: usize,
    /// How long shutdown waits for in-flight rebuilds, in seconds.
    pub rebuild_shutdown_timeout_secs: u64,
    /// Strategy used by the shop service.
    pub strategy: CacheStrategy,
    /// Behaviour on store read failures.
    pub store_failure_policy: StoreFailurePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shop_ttl_secs: 30 * 60,
            null_ttl_secs: 2 * 60,
            lock_ttl_secs: 10,
            lock_prefix: "lock:".to_string(),
            lock_retry_delay_ms: 50,
            lock_max_attempts: 40,
            rebuild_workers: 10,
            rebuild_queue_capacity: 1024,
            rebuild_shutdown_timeout_secs: 5,
            strategy: CacheStrategy::default(),
            store_failure_policy: StoreFailurePolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Returns the shop TTL as a Duration.
    #[must_use]
    pub const fn shop_ttl(&self) -> Duration {
        Duration::from_secs(self.shop_ttl_secs)
    }

    /// Returns the null marker TTL as a Duration.
    #[must_use]
    pub const fn null_ttl(&self) -> Duration {
        Duration::from_secs(self.null_ttl_secs)
    }

    /// Returns the lock TTL as a Duration.
    #[must_use]
    pub const fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    /// Returns the lock retry delay as a Duration.
    #[must_use]
    pub const fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }

    /// Returns the rebuild shutdown timeout as a Duration.
    #[must_use]
    pub const fn rebuild_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.rebuild_shutdown_timeout_secs)
    }
}
