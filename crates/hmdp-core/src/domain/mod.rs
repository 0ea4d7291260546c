//! Domain entities.

mod shop;

pub use shop::{Shop, ShopId};
