// Route exports
pub mod health;
pub mod sales;
pub mod stores;

use actix_web::{web, HttpRequest};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::NearbyComposer;
use crate::error::ApiError;
use crate::models::{AuthUser, StoreRecord};
use crate::services::{bearer_token, AuthProvider, Storage};

/// Response header telling callers which search path produced the body
pub const SEARCH_MODE_HEADER: &str = "X-Search-Mode";

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub auth: Arc<dyn AuthProvider>,
    pub composer: NearbyComposer,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(health::configure)
            .configure(sales::configure)
            .configure(stores::configure),
    );
}

/// Verify the caller's bearer token
pub(crate) async fn authenticate(state: &AppState, req: &HttpRequest) -> Result<AuthUser, ApiError> {
    let header = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = bearer_token(header)?;
    let user = state.auth.verify(token).await?;
    tracing::debug!("Authenticated user {}", user.id);
    Ok(user)
}

/// Load a store and check that `user` owns it
pub(crate) async fn owned_store(state: &AppState, store_id: Uuid, user: &AuthUser) -> Result<StoreRecord, ApiError> {
    let store = state
        .storage
        .get_store(store_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Store {} not found", store_id)))?;

    if store.owner_id != user.id {
        tracing::info!("User {} denied access to store {}", user.id, store_id);
        return Err(ApiError::Forbidden(format!("Store {} belongs to another user", store_id)));
    }

    Ok(store)
}
