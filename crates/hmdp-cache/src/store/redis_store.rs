//! Redis-backed store.

use super::{ttl_millis, KeyValueStore};
use async_trait::async_trait;
use deadpool_redis::{redis, redis::AsyncCommands, Config, Pool, Runtime};
use hmdp_config::RedisConfig;
use hmdp_core::{HmdpError, HmdpResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Create a Redis connection pool and check it with a `PING`.
pub async fn create_pool(config: &RedisConfig) -> HmdpResult<Pool> {
    info!("Creating Redis connection pool...");

    let pool = Config::from_url(&config.url)
        .builder()
        .map_err(|e| HmdpError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| HmdpError::Configuration(format!("Failed to create pool: {}", e)))?;

    let mut conn = pool.get().await?;
    let _: String = redis::cmd("PING").query_async(&mut *conn).await?;

    info!(url = %config.url, "Redis connection pool created successfully");

    Ok(pool)
}

/// Redis-based key-value store.
#[derive(Clone)]
pub struct RedisStore {
    pool: Arc<Pool>,
}

impl RedisStore {
    /// Create a new Redis store over a connection pool.
    #[must_use]
    pub fn new(pool: Arc<Pool>) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> HmdpResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> HmdpResult<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await.map_err(|e| {
            HmdpError::Cache(format!("Failed to get key '{}': {}", key, e))
        })?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> HmdpResult<()> {
        let mut conn = self.conn().await?;

        match ttl {
            Some(ttl) => {
                let millis = ttl_millis(ttl);
                conn.pset_ex::<_, _, ()>(key, value, millis).await.map_err(|e| {
                    HmdpError::Cache(format!("Failed to set key '{}': {}", key, e))
                })?;
                debug!("Stored key '{}' with TTL {}ms", key, millis);
            }
            None => {
                conn.set::<_, _, ()>(key, value).await.map_err(|e| {
                    HmdpError::Cache(format!("Failed to set key '{}': {}", key, e))
                })?;
                debug!("Stored key '{}' without TTL", key);
            }
        }

        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> HmdpResult<bool> {
        let mut conn = self.conn().await?;

        // SET NX PX replies OK when the key was created and nil otherwise.
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await
            .map_err(|e| HmdpError::Cache(format!("Failed to SET NX '{}': {}", key, e)))?;

        Ok(result.is_some())
    }

    async fn delete(&self, key: &str) -> HmdpResult<bool> {
        let mut conn = self.conn().await?;
        let deleted: i64 = conn.del(key).await.map_err(|e| {
            HmdpError::Cache(format!("Failed to delete key '{}': {}", key, e))
        })?;

        debug!("Deleted key '{}': {}", key, deleted > 0);
        Ok(deleted > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> HmdpResult<bool> {
        let mut conn = self.conn().await?;
        let millis = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
        let updated: bool = conn.pexpire(key, millis).await.map_err(|e| {
            HmdpError::Cache(format!("Failed to expire key '{}': {}", key, e))
        })?;
        Ok(updated)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}
