use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::domain::EntityStatus;

/// Query string of the nearby endpoints
///
/// Everything is optional here; [`crate::core::SearchQuery`] decides what
/// is missing, defaulted or clamped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NearbyParams {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<i64>,
    pub category: Option<String>,
    #[serde(alias = "min_discount", rename = "minDiscount")]
    pub min_discount: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request to create a store owned by the caller
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoreRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub category: Option<String>,
    #[validate(url)]
    pub logo_url: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    #[validate(length(max = 120))]
    pub city: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

/// Partial store update
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_store_location"))]
pub struct UpdateStoreRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub category: Option<String>,
    #[validate(url)]
    pub logo_url: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    #[validate(length(max = 120))]
    pub city: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub status: Option<EntityStatus>,
}

/// Request to publish a sale in one of the caller's stores
///
/// Location defaults to the store's location, start date to now.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_new_sale"))]
pub struct CreateSaleRequest {
    pub store_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub category: Option<String>,
    #[validate(range(min = 0, max = 100))]
    pub discount_percent: Option<i32>,
    #[validate(range(min = 0.0))]
    pub original_price: Option<f64>,
    #[validate(range(min = 0.0))]
    pub sale_price: Option<f64>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub images: Vec<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: DateTime<Utc>,
    pub status: Option<EntityStatus>,
}

/// Partial sale update
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_sale_patch"))]
pub struct UpdateSaleRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub category: Option<String>,
    #[validate(range(min = 0, max = 100))]
    pub discount_percent: Option<i32>,
    #[validate(range(min = 0.0))]
    pub original_price: Option<f64>,
    #[validate(range(min = 0.0))]
    pub sale_price: Option<f64>,
    #[validate(length(max = 20))]
    pub images: Option<Vec<String>>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: Option<EntityStatus>,
}

fn both_or_neither(lat: Option<f64>, lng: Option<f64>) -> Result<(), ValidationError> {
    if lat.is_some() != lng.is_some() {
        return Err(ValidationError::new("latitude_and_longitude_go_together"));
    }
    Ok(())
}

fn validate_store_location(req: &UpdateStoreRequest) -> Result<(), ValidationError> {
    both_or_neither(req.latitude, req.longitude)
}

fn validate_new_sale(req: &CreateSaleRequest) -> Result<(), ValidationError> {
    both_or_neither(req.latitude, req.longitude)?;
    if let Some(start) = req.start_date {
        if req.end_date < start {
            return Err(ValidationError::new("end_date_before_start_date"));
        }
    }
    Ok(())
}

fn validate_sale_patch(req: &UpdateSaleRequest) -> Result<(), ValidationError> {
    both_or_neither(req.latitude, req.longitude)?;
    if let (Some(start), Some(end)) = (req.start_date, req.end_date) {
        if end < start {
            return Err(ValidationError::new("end_date_before_start_date"));
        }
    }
    Ok(())
}
