//! Source of truth for shops.

use async_trait::async_trait;
use hmdp_core::{HmdpResult, Shop, ShopId};

/// Shop repository trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShopRepository: Send + Sync {
    /// Finds a shop by ID.
    async fn find_by_id(&self, id: ShopId) -> HmdpResult<Option<Shop>>;

    /// Updates a shop. Returns `false` if no row matched its id.
    async fn update(&self, shop: &Shop) -> HmdpResult<bool>;
}
