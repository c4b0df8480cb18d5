// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    AuthUser, EntityStatus, NewSale, NewStore, SalePatch, SaleRecord, SaleResult, StorePatch, StoreRecord,
    StoreResult, StoreSummary,
};
pub use requests::{CreateSaleRequest, CreateStoreRequest, NearbyParams, UpdateSaleRequest, UpdateStoreRequest};
pub use responses::{DeletedResponse, ErrorResponse, HealthResponse};
