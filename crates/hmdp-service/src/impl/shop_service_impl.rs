//! Shop service implementation.

use crate::shop_repository::ShopRepository;
use crate::shop_service::ShopService;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use hmdp_cache::{CacheClient, CACHE_SHOP_KEY};
use hmdp_config::{CacheConfig, CacheStrategy};
use hmdp_core::{HmdpError, HmdpResult, Shop, ShopId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Shop service backed by a repository and the cache client.
pub struct ShopServiceImpl<R: ShopRepository> {
    shop_repository: Arc<R>,
    cache: CacheClient,
    strategy: CacheStrategy,
    shop_ttl: Duration,
}

impl<R: ShopRepository + 'static> ShopServiceImpl<R> {
    /// Creates a new shop service.
    pub fn new(shop_repository: Arc<R>, cache: CacheClient, config: &CacheConfig) -> Self {
        Self {
            shop_repository,
            cache,
            strategy: config.strategy,
            shop_ttl: config.shop_ttl(),
        }
    }

    /// The read strategy in use.
    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    fn loader(
        &self,
    ) -> impl FnOnce(ShopId) -> BoxFuture<'static, HmdpResult<Option<Shop>>> + Send + 'static {
        let repository = self.shop_repository.clone();
        move |id| async move { repository.find_by_id(id).await }.boxed()
    }

    fn cache_key(id: ShopId) -> String {
        format!("{}{}", CACHE_SHOP_KEY, id)
    }
}

#[async_trait]
impl<R: ShopRepository + 'static> ShopService for ShopServiceImpl<R> {
    async fn query_by_id(&self, id: ShopId) -> HmdpResult<Shop> {
        debug!(shop_id = id, strategy = %self.strategy, "Querying shop");

        let shop = match self.strategy {
            CacheStrategy::PassThrough => {
                self.cache
                    .query_with_pass_through(CACHE_SHOP_KEY, id, self.loader(), self.shop_ttl)
                    .await?
            }
            CacheStrategy::Mutex => {
                self.cache
                    .query_with_mutex(CACHE_SHOP_KEY, id, self.loader(), self.shop_ttl)
                    .await?
            }
            CacheStrategy::LogicalExpire => {
                self.cache
                    .query_with_logical_expire(CACHE_SHOP_KEY, id, self.loader(), self.shop_ttl)
                    .await?
            }
        };

        shop.ok_or_else(|| HmdpError::not_found("Shop", id))
    }

    async fn update(&self, shop: &Shop) -> HmdpResult<()> {
        let id = shop
            .id
            .ok_or_else(|| HmdpError::validation("Shop id must not be empty"))?;
        debug!(shop_id = id, "Updating shop");

        let updated = self.shop_repository.update(shop).await?;

        // Evict even when no row matched, a stale entry may still be cached.
        self.cache.delete(&Self::cache_key(id)).await?;

        if !updated {
            return Err(HmdpError::not_found("Shop", id));
        }

        info!(shop_id = id, "Shop updated");
        Ok(())
    }

    async fn save_shop_to_cache(&self, id: ShopId, ttl: Duration) -> HmdpResult<()> {
        let shop = self
            .shop_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| HmdpError::not_found("Shop", id))?;

        self.cache
            .set_with_logical_expire(&Self::cache_key(id), &shop, ttl)
            .await?;

        info!(shop_id = id, ttl_secs = ttl.as_secs(), "Shop pre-warmed in cache");
        Ok(())
    }
}
