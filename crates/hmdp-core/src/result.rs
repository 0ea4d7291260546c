//! Result type aliases for hmdp.

use crate::HmdpError;

/// A specialized `Result` type for hmdp operations.
pub type HmdpResult<T> = Result<T, HmdpError>;
