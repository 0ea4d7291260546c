//! # hmdp Cache
//!
//! Cache-aside client over a key-value store with TTL and conditional-set
//! support. Three read strategies are offered, each targeting a different
//! failure mode of a read-through cache:
//!
//! | strategy | protects against | on miss / expiry |
//! |---|---|---|
//! | [`CacheClient::query_with_pass_through`] | penetration | load, cache value or a null marker |
//! | [`CacheClient::query_with_mutex`] | breakdown | one caller rebuilds under a store lock, others wait |
//! | [`CacheClient::query_with_logical_expire`] | breakdown, avalanche | serve stale, rebuild in background |
//!
//! ```text
//! caller ──► CacheClient ──► KeyValueStore (Redis / in-memory)
//!                │
//!                ├──► loader(id)  (source of truth)
//!                └──► RebuildExecutor ──► worker 1..N
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let store = Arc::new(RedisStore::new(Arc::new(pool)));
//! let client = CacheClient::new(store, CacheClientOptions::default(), Arc::new(executor));
//!
//! let shop: Option<Shop> = client
//!     .query_with_mutex(CACHE_SHOP_KEY, 42, |id| repo.find_by_id(id), CACHE_SHOP_TTL)
//!     .await?;
//! ```

pub mod client;
pub mod entry;
pub mod keys;
pub mod metrics;
pub mod options;
pub mod rebuild;
pub mod store;

pub use client::CacheClient;
pub use entry::{CacheLookup, LogicalExpireEntry};
pub use keys::{CacheKeys, CACHE_NULL_TTL, CACHE_SHOP_KEY, CACHE_SHOP_TTL, LOCK_PREFIX, LOCK_TTL};
pub use metrics::{register_metrics, CacheMetrics};
pub use options::{CacheClientOptions, LockRetryPolicy};
pub use rebuild::{RebuildExecutor, RebuildExecutorConfig, RebuildStats, RebuildTask, RejectedTask};
pub use store::{connect_store, create_pool, InMemoryStore, KeyValueStore, RedisStore};
