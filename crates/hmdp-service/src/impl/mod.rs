//! Shop service implementations.

pub mod shop_service_impl;

pub use shop_service_impl::ShopServiceImpl;
