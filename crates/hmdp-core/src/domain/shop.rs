//! Shop entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric shop identifier as assigned by the source of truth.
pub type ShopId = i64;

/// A shop as stored in the source of truth and cached under `cache:shop:{id}`.
///
/// Field names serialize in camelCase so cached JSON stays readable by other
/// consumers of the same Redis instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    /// Primary key. `None` only for shops not yet persisted.
    pub id: Option<ShopId>,
    /// Display name.
    pub name: String,
    /// Shop category.
    #[serde(default)]
    pub type_id: Option<i64>,
    /// Comma separated image URLs.
    #[serde(default)]
    pub images: Option<String>,
    /// Business district.
    #[serde(default)]
    pub area: Option<String>,
    /// Street address.
    #[serde(default)]
    pub address: Option<String>,
    /// Longitude.
    #[serde(default)]
    pub x: Option<f64>,
    /// Latitude.
    #[serde(default)]
    pub y: Option<f64>,
    /// Average price per customer, in whole currency units.
    #[serde(default)]
    pub avg_price: Option<i64>,
    #[serde(default)]
    pub sold: Option<i32>,
    #[serde(default)]
    pub comments: Option<i32>,
    /// Rating times ten (e.g. 37 for 3.7).
    #[serde(default)]
    pub score: Option<i32>,
    /// Opening hours, free text such as `10:00-22:00`.
    #[serde(default)]
    pub open_hours: Option<String>,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
}

impl Shop {
    /// Creates a shop with only an id and a name set.
    #[must_use]
    pub fn new(id: ShopId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            type_id: None,
            images: None,
            area: None,
            address: None,
            x: None,
            y: None,
            avg_price: None,
            sold: None,
            comments: None,
            score: None,
            open_hours: None,
            create_time: None,
            update_time: None,
        }
    }

    /// Sets the street address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Marks the shop as modified now.
    pub fn touch(&mut self) {
        self.update_time = Some(Utc::now());
    }
}
