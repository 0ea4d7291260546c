//! # hmdp Core
//!
//! Core types and error definitions shared by the hmdp crates: the unified
//! [`HmdpError`], the [`Shop`] entity cached by the service layer, and
//! logging initialization.

pub mod domain;
pub mod error;
pub mod result;
pub mod telemetry;

pub use domain::*;
pub use error::*;
pub use result::*;
