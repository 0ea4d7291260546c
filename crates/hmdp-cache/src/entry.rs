//! Stored value shapes.

use chrono::{DateTime, Utc};
use hmdp_core::{HmdpError, HmdpResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A value wrapped with an absolute expiration time.
///
/// Stored without a store-level TTL. The embedded `expire_time` is the only
/// authority on freshness: the entry is fresh while `expire_time > now`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalExpireEntry<T> {
    /// The wrapped value.
    pub data: T,
    /// Instant after which the entry is considered stale.
    pub expire_time: DateTime<Utc>,
}

impl<T> LogicalExpireEntry<T> {
    /// Wraps `data` with an explicit expiration time.
    pub fn new(data: T, expire_time: DateTime<Utc>) -> Self {
        Self { data, expire_time }
    }

    /// Wraps `data` so that it expires `ttl` from now.
    pub fn expiring_in(data: T, ttl: Duration) -> HmdpResult<Self> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| HmdpError::validation(format!("TTL out of range: {}", e)))?;
        Ok(Self::new(data, Utc::now() + ttl))
    }

    /// Whether the entry is stale at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_time <= now
    }

    /// Whether the entry is stale right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// The three states a data key can be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// No key at all.
    Absent,
    /// Blank value: a confirmed miss in the source of truth.
    NullMarker,
    /// A serialized value.
    Value(String),
}

impl CacheLookup {
    /// Classifies a raw store read.
    pub fn from_raw(raw: Option<String>) -> Self {
        match raw {
            None => Self::Absent,
            Some(value) if value.trim().is_empty() => Self::NullMarker,
            Some(value) => Self::Value(value),
        }
    }

    /// Whether the key exists in any form.
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }
}
