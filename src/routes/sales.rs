use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::core::Point;
use crate::error::ApiError;
use crate::models::{
    AuthUser, CreateSaleRequest, DeletedResponse, EntityStatus, NearbyParams, NewSale, SalePatch, SaleRecord, SaleResult,
    UpdateSaleRequest,
};
use crate::routes::{authenticate, owned_store, AppState, SEARCH_MODE_HEADER};

/// Configure all sale routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // registered before /sales/{id} so "nearby" is not parsed as an id
        .route("/sales/nearby", web::get().to(nearby_sales))
        .route("/sales", web::post().to(create_sale))
        .route("/sales/{id}", web::get().to(get_sale))
        .route("/sales/{id}", web::patch().to(update_sale))
        .route("/sales/{id}", web::delete().to(delete_sale));
}

/// Nearby sales endpoint
///
/// GET /api/v1/sales/nearby?lat=..&lng=..&radius=5000&category=..&minDiscount=..&limit=50&offset=0
///
/// Responds with a JSON array; `X-Search-Mode` is `geo` or `fallback`.
async fn nearby_sales(
    state: web::Data<AppState>,
    params: web::Query<NearbyParams>,
) -> Result<HttpResponse, ApiError> {
    let query = state.composer.parse(&params)?;

    tracing::info!(
        "Nearby sales: origin=({}, {}), radius={}m, category={:?}, min_discount={:?}, page={:?}",
        query.origin().lat,
        query.origin().lng,
        query.radius_m(),
        query.category(),
        query.min_discount(),
        query.page()
    );

    let outcome = state.composer.nearby_sales(&query).await?;

    Ok(HttpResponse::Ok()
        .insert_header((SEARCH_MODE_HEADER, outcome.mode.as_str()))
        .json(outcome.rows))
}

/// GET /api/v1/sales/{id}
///
/// Also bumps the sale's view counter in the background.
async fn get_sale(state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    let sale = state
        .storage
        .get_sale(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Sale {} not found", id)))?;

    state.composer.record_view(id);

    Ok(HttpResponse::Ok().json(SaleResult::from(sale)))
}

/// POST /api/v1/sales
async fn create_sale(
    state: web::Data<AppState>,
    req: web::Json<CreateSaleRequest>,
    http_req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(&state, &http_req).await?;
    req.validate()?;

    let req = req.into_inner();
    let store = owned_store(&state, req.store_id, &user).await?;

    let location = match (req.latitude, req.longitude) {
        (Some(lat), Some(lng)) => Point::new(lat, lng),
        _ => store.location(),
    };

    let sale = NewSale {
        store_id: store.id,
        title: req.title,
        description: req.description,
        category: req.category,
        discount_percent: req.discount_percent,
        original_price: req.original_price,
        sale_price: req.sale_price,
        images: req.images,
        location,
        start_date: req.start_date.unwrap_or_else(Utc::now),
        end_date: req.end_date,
        status: req.status.unwrap_or(EntityStatus::Active),
    };

    let created = state.storage.create_sale(sale).await?;

    tracing::info!("User {} created sale {} in store {}", user.id, created.id, store.id);

    Ok(HttpResponse::Created().json(SaleResult::from(created)))
}

/// PATCH /api/v1/sales/{id}
async fn update_sale(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<UpdateSaleRequest>,
    http_req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(&state, &http_req).await?;
    req.validate()?;

    let id = path.into_inner();
    let existing = owned_sale(&state, id, &user).await?;
    let req = req.into_inner();

    // A one-sided date change must still leave a valid window
    let start = req.start_date.unwrap_or(existing.start_date);
    let end = req.end_date.unwrap_or(existing.end_date);
    if end < start {
        return Err(ApiError::Validation("endDate must not be before startDate".to_string()));
    }

    let patch = SalePatch {
        title: req.title,
        description: req.description,
        category: req.category,
        discount_percent: req.discount_percent,
        original_price: req.original_price,
        sale_price: req.sale_price,
        images: req.images,
        location: req.latitude.zip(req.longitude).map(|(lat, lng)| Point::new(lat, lng)),
        start_date: req.start_date,
        end_date: req.end_date,
        status: req.status,
    };

    let updated = state
        .storage
        .update_sale(id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Sale {} not found", id)))?;

    tracing::info!("User {} updated sale {}", user.id, id);

    Ok(HttpResponse::Ok().json(SaleResult::from(updated)))
}

/// DELETE /api/v1/sales/{id}
async fn delete_sale(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    http_req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(&state, &http_req).await?;
    let id = path.into_inner();
    owned_sale(&state, id, &user).await?;

    if !state.storage.delete_sale(id).await? {
        return Err(ApiError::NotFound(format!("Sale {} not found", id)));
    }

    tracing::info!("User {} deleted sale {}", user.id, id);

    Ok(HttpResponse::Ok().json(DeletedResponse { success: true, id }))
}

/// Load a sale and check that `user` owns its store
async fn owned_sale(state: &AppState, id: Uuid, user: &AuthUser) -> Result<SaleRecord, ApiError> {
    let sale = state
        .storage
        .get_sale(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Sale {} not found", id)))?;

    owned_store(state, sale.store_id, user).await?;
    Ok(sale)
}
