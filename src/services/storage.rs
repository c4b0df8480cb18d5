use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::core::query::SearchPlan;
use crate::models::domain::{NewSale, NewStore, SalePatch, SaleRecord, StorePatch, StoreRecord};

/// Errors surfaced by a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unreachable: {0}")]
    Unreachable(String),

    #[error("Geospatial capability unavailable: {0}")]
    GeoUnavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Storage port injected into the composer and the route handlers
///
/// Implemented by [`crate::services::PostgresStore`] and
/// [`crate::services::MemoryStore`].
#[async_trait]
pub trait Storage: Send + Sync {
    /// Whether distance computation and radius containment are available
    async fn probe_geo(&self) -> bool;

    async fn health_check(&self) -> Result<bool, StoreError>;

    async fn search_sales(&self, plan: &SearchPlan) -> Result<Vec<SaleRecord>, StoreError>;

    async fn search_stores(&self, plan: &SearchPlan) -> Result<Vec<StoreRecord>, StoreError>;

    /// Atomic increment-if-exists of the sale's view counter
    async fn increment_sale_views(&self, id: Uuid) -> Result<(), StoreError>;

    async fn get_sale(&self, id: Uuid) -> Result<Option<SaleRecord>, StoreError>;

    async fn create_sale(&self, sale: NewSale) -> Result<SaleRecord, StoreError>;

    async fn update_sale(&self, id: Uuid, patch: SalePatch) -> Result<Option<SaleRecord>, StoreError>;

    async fn delete_sale(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn get_store(&self, id: Uuid) -> Result<Option<StoreRecord>, StoreError>;

    async fn create_store(&self, store: NewStore) -> Result<StoreRecord, StoreError>;

    async fn update_store(&self, id: Uuid, patch: StorePatch) -> Result<Option<StoreRecord>, StoreError>;

    async fn delete_store(&self, id: Uuid) -> Result<bool, StoreError>;
}
