//! Dealspot - nearby sales and stores search service
//!
//! Serves distance-ranked sales and stores around a point, degrading to
//! attribute-only results when the database cannot do spatial work, plus
//! the authenticated write paths for store owners.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{NearbyComposer, Point, SearchMode, SearchOutcome, SearchQuery};
pub use error::ApiError;
pub use models::{NearbyParams, SaleResult, StoreResult};
