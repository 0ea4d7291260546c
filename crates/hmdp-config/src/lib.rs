//! # hmdp Config
//!
//! Configuration management for the hmdp shop cache.
//! Supports layered configuration from files and environment variables,
//! plus runtime reload.

mod app_config;
mod loader;

pub use app_config::*;
pub use loader::*;
