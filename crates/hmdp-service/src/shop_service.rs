//! Shop service trait definition.

use async_trait::async_trait;
use hmdp_core::{HmdpResult, Shop, ShopId};
use std::time::Duration;

/// Shop service trait.
#[async_trait]
pub trait ShopService: Send + Sync {
    /// Gets a shop by ID through the configured cache strategy.
    async fn query_by_id(&self, id: ShopId) -> HmdpResult<Shop>;

    /// Updates a shop and evicts its cache entry.
    async fn update(&self, shop: &Shop) -> HmdpResult<()>;

    /// Loads a shop and writes it to the cache with a logical expiration
    /// `ttl` from now.
    async fn save_shop_to_cache(&self, id: ShopId, ttl: Duration) -> HmdpResult<()>;
}
