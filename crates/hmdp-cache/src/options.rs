//! Cache client options.

use crate::keys::{CACHE_NULL_TTL, LOCK_PREFIX, LOCK_TTL};
use hmdp_config::{CacheConfig, StoreFailurePolicy};
use std::time::Duration;

/// Bounded retry for lock contention in the mutex strategy.
#[derive(Debug, Clone)]
pub struct LockRetryPolicy {
    /// Maximum number of lock attempts, the first one included.
    pub max_attempts: u32,
    /// Sleep between attempts.
    pub delay: Duration,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 40,
            delay: Duration::from_millis(50),
        }
    }
}

impl LockRetryPolicy {
    /// Worst-case time spent waiting before giving up.
    pub fn budget(&self) -> Duration {
        self.delay
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

/// Options controlling the cache client.
#[derive(Debug, Clone)]
pub struct CacheClientOptions {
    /// TTL for null markers.
    pub null_ttl: Duration,
    /// Safety-net TTL for rebuild locks.
    pub lock_ttl: Duration,
    /// Prefix prepended to data keys to form lock keys.
    pub lock_prefix: String,
    /// Retry policy for the mutex strategy.
    pub lock_retry: LockRetryPolicy,
    /// Behaviour when the store fails on read.
    pub store_failure_policy: StoreFailurePolicy,
}

impl Default for CacheClientOptions {
    fn default() -> Self {
        Self {
            null_ttl: CACHE_NULL_TTL,
            lock_ttl: LOCK_TTL,
            lock_prefix: LOCK_PREFIX.to_string(),
            lock_retry: LockRetryPolicy::default(),
            store_failure_policy: StoreFailurePolicy::default(),
        }
    }
}

impl From<&CacheConfig> for CacheClientOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            null_ttl: config.null_ttl(),
            lock_ttl: config.lock_ttl(),
            lock_prefix: config.lock_prefix.clone(),
            lock_retry: LockRetryPolicy {
                max_attempts: config.lock_max_attempts.max(1),
                delay: config.lock_retry_delay(),
            },
            store_failure_policy: config.store_failure_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = CacheConfig {
            lock_max_attempts: 0,
            lock_retry_delay_ms: 5,
            store_failure_policy: StoreFailurePolicy::FallbackToSource,
            ..CacheConfig::default()
        };
        let options = CacheClientOptions::from(&config);
        assert_eq!(options.lock_retry.max_attempts, 1);
        assert_eq!(options.lock_retry.delay, Duration::from_millis(5));
        assert_eq!(options.null_ttl, Duration::from_secs(120));
        assert_eq!(options.store_failure_policy, StoreFailurePolicy::FallbackToSource);
    }

    #[test]
    fn test_retry_budget() {
        let policy = LockRetryPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(10),
        };
        assert_eq!(policy.budget(), Duration::from_millis(40));
        assert_eq!(
            LockRetryPolicy { max_attempts: 0, delay: Duration::from_secs(1) }.budget(),
            Duration::ZERO
        );
    }
}
