//! Unified error types for all layers of the application.

use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for the hmdp workspace.
///
/// Covers domain errors raised by the shop service, cache errors raised by the
/// cache client and its stores, and configuration errors raised at startup.
#[derive(Error, Debug)]
pub enum HmdpError {
    // ============ Domain Errors ============
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    // ============ Cache Errors ============
    /// Store unavailable or a store command failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// A stored value could not be decoded into the requested shape
    #[error("Corrupted cache entry at '{key}': {message}")]
    CacheCorruption { key: String, message: String },

    /// The rebuild lock stayed held past the retry budget
    #[error("Cache busy: lock for '{key}' not acquired after {attempts} attempts")]
    CacheBusy { key: String, attempts: u32 },

    // ============ Infrastructure Errors ============
    /// Source of truth failure
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HmdpError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::CacheCorruption { .. } => "CACHE_CORRUPTION",
            Self::CacheBusy { .. } => "CACHE_BUSY",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a cache error.
    #[must_use]
    pub fn cache<T: Into<String>>(message: T) -> Self {
        Self::Cache(message.into())
    }

    /// Creates a corruption error for the entry stored at `key`.
    #[must_use]
    pub fn corruption(key: impl Into<String>, message: impl ToString) -> Self {
        Self::CacheCorruption {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if this error is retriable.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Cache(_) | Self::CacheBusy { .. }
        )
    }

    /// Checks if this error is a store failure, as opposed to a domain or
    /// decoding failure.
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        matches!(self, Self::Cache(_))
    }
}

impl From<serde_json::Error> for HmdpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::redis::RedisError> for HmdpError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        Self::Cache(format!("Redis command failed: {}", err))
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::PoolError> for HmdpError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Cache(format!("Failed to get Redis connection: {}", err))
    }
}
