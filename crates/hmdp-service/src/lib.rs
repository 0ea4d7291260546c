//! # hmdp Service
//!
//! Shop lookups served through the cache client, with the source of truth
//! behind the [`ShopRepository`] trait.

pub mod r#impl;
pub mod shop_repository;
pub mod shop_service;

pub use r#impl::ShopServiceImpl;
pub use shop_repository::*;
pub use shop_service::*;
