use actix_web::{web, HttpRequest, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::core::Point;
use crate::error::ApiError;
use crate::models::{
    CreateStoreRequest, DeletedResponse, NearbyParams, NewStore, StorePatch, StoreResult, UpdateStoreRequest,
};
use crate::routes::{authenticate, owned_store, AppState, SEARCH_MODE_HEADER};

/// Configure all store routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/stores/nearby", web::get().to(nearby_stores))
        .route("/stores", web::post().to(create_store))
        .route("/stores/{id}", web::get().to(get_store))
        .route("/stores/{id}", web::patch().to(update_store))
        .route("/stores/{id}", web::delete().to(delete_store));
}

/// Nearby stores endpoint
///
/// GET /api/v1/stores/nearby?lat=..&lng=..&radius=5000&category=..&limit=50&offset=0
async fn nearby_stores(
    state: web::Data<AppState>,
    params: web::Query<NearbyParams>,
) -> Result<HttpResponse, ApiError> {
    let query = state.composer.parse(&params)?;

    tracing::info!(
        "Nearby stores: origin=({}, {}), radius={}m, category={:?}, page={:?}",
        query.origin().lat,
        query.origin().lng,
        query.radius_m(),
        query.category(),
        query.page()
    );

    let outcome = state.composer.nearby_stores(&query).await?;

    Ok(HttpResponse::Ok()
        .insert_header((SEARCH_MODE_HEADER, outcome.mode.as_str()))
        .json(outcome.rows))
}

/// GET /api/v1/stores/{id}
async fn get_store(state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    let store = state
        .storage
        .get_store(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Store {} not found", id)))?;

    Ok(HttpResponse::Ok().json(StoreResult::from(store)))
}

/// POST /api/v1/stores
async fn create_store(
    state: web::Data<AppState>,
    req: web::Json<CreateStoreRequest>,
    http_req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(&state, &http_req).await?;
    req.validate()?;

    let req = req.into_inner();
    let store = NewStore {
        owner_id: user.id.clone(),
        name: req.name,
        description: req.description,
        category: req.category,
        logo_url: req.logo_url,
        address: req.address,
        city: req.city,
        phone: req.phone,
        location: Point::new(req.latitude, req.longitude),
    };

    let created = state.storage.create_store(store).await?;

    tracing::info!("User {} created store {}", user.id, created.id);

    Ok(HttpResponse::Created().json(StoreResult::from(created)))
}

/// PATCH /api/v1/stores/{id}
async fn update_store(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<UpdateStoreRequest>,
    http_req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(&state, &http_req).await?;
    req.validate()?;

    let id = path.into_inner();
    owned_store(&state, id, &user).await?;

    let req = req.into_inner();
    let patch = StorePatch {
        name: req.name,
        description: req.description,
        category: req.category,
        logo_url: req.logo_url,
        address: req.address,
        city: req.city,
        phone: req.phone,
        location: req.latitude.zip(req.longitude).map(|(lat, lng)| Point::new(lat, lng)),
        status: req.status,
    };

    let updated = state
        .storage
        .update_store(id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Store {} not found", id)))?;

    tracing::info!("User {} updated store {}", user.id, id);

    Ok(HttpResponse::Ok().json(StoreResult::from(updated)))
}

/// DELETE /api/v1/stores/{id}
///
/// Deletes the store's sales with it.
async fn delete_store(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    http_req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(&state, &http_req).await?;
    let id = path.into_inner();
    owned_store(&state, id, &user).await?;

    if !state.storage.delete_store(id).await? {
        return Err(ApiError::NotFound(format!("Store {} not found", id)));
    }

    tracing::info!("User {} deleted store {}", user.id, id);

    Ok(HttpResponse::Ok().json(DeletedResponse { success: true, id }))
}
