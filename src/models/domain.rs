use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::geo::Point;

/// Status value that makes a sale or store eligible for search
pub const STATUS_ACTIVE: &str = "active";

/// Lifecycle status of a sale or store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Active,
    Inactive,
    Expired,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Active => STATUS_ACTIVE,
            EntityStatus::Inactive => "inactive",
            EntityStatus::Expired => "expired",
        }
    }
}

/// Sale row as read from storage
///
/// `images` is kept in its comma-joined storage form and the `store_*`
/// columns come from a left join, so they are all optional.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SaleRecord {
    pub id: Uuid,
    pub store_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub discount_percent: Option<i32>,
    pub original_price: Option<f64>,
    pub sale_price: Option<f64>,
    pub images: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: String,
    pub views_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub distance: Option<f64>,
    pub store_name: Option<String>,
    pub store_category: Option<String>,
    pub store_logo_url: Option<String>,
    pub store_address: Option<String>,
    pub store_city: Option<String>,
}

impl SaleRecord {
    pub fn location(&self) -> Point {
        Point::new(self.latitude, self.longitude)
    }
}

/// Store row as read from storage
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoreRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub logo_url: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub distance: Option<f64>,
}

impl StoreRecord {
    pub fn location(&self) -> Point {
        Point::new(self.latitude, self.longitude)
    }
}

/// Denormalized summary of the store that owns a sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub logo_url: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
}

/// Sale as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResult {
    pub id: Uuid,
    pub store_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub discount_percent: Option<i32>,
    pub original_price: Option<f64>,
    pub sale_price: Option<f64>,
    pub images: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: String,
    pub views_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Meters from the search origin, `None` when it could not be computed
    pub distance: Option<f64>,
    pub store: Option<StoreSummary>,
}

/// Store as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResult {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub logo_url: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub distance: Option<f64>,
}

/// Fields needed to insert a sale
#[derive(Debug, Clone)]
pub struct NewSale {
    pub store_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub discount_percent: Option<i32>,
    pub original_price: Option<f64>,
    pub sale_price: Option<f64>,
    pub images: Vec<String>,
    pub location: Point,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: EntityStatus,
}

/// Partial sale update, `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct SalePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub discount_percent: Option<i32>,
    pub original_price: Option<f64>,
    pub sale_price: Option<f64>,
    pub images: Option<Vec<String>>,
    pub location: Option<Point>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: Option<EntityStatus>,
}

/// Fields needed to insert a store
#[derive(Debug, Clone)]
pub struct NewStore {
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub logo_url: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub location: Point,
}

/// Partial store update
#[derive(Debug, Clone, Default)]
pub struct StorePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub logo_url: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub location: Option<Point>,
    pub status: Option<EntityStatus>,
}

/// Identity verified by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}
