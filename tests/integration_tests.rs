// Integration tests for Dealspot

use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dealspot::core::{ComposeError, NearbyComposer, SearchDefaults, SearchMode, SearchPlan};
use dealspot::error::{handle_path_error, handle_query_payload_error};
use dealspot::models::{NearbyParams, NewSale, NewStore, SalePatch, SaleRecord, StorePatch, StoreRecord};
use dealspot::routes::{self, AppState, SEARCH_MODE_HEADER};
use dealspot::services::{JwtAuth, MemoryStore, Storage, StoreError};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const TEL_AVIV: (f64, f64) = (32.0853, 34.7818);
const JWT_SECRET: &str = "integration-secret";

fn create_store(name: &str, category: &str, lat: f64, lng: f64) -> StoreRecord {
    let now = Utc::now();
    StoreRecord {
        id: Uuid::new_v4(),
        owner_id: "owner-1".to_string(),
        name: name.to_string(),
        description: None,
        category: Some(category.to_string()),
        logo_url: Some(format!("https://cdn.example.com/{}.png", name)),
        address: Some("Dizengoff St".to_string()),
        city: Some("Tel Aviv".to_string()),
        phone: None,
        latitude: lat,
        longitude: lng,
        status: "active".to_string(),
        created_at: now,
        updated_at: now,
        distance: None,
    }
}

fn create_sale(
    store_id: Uuid,
    title: &str,
    category: &str,
    lat: f64,
    lng: f64,
    created_at: DateTime<Utc>,
) -> SaleRecord {
    let now = Utc::now();
    SaleRecord {
        id: Uuid::new_v4(),
        store_id,
        title: title.to_string(),
        description: None,
        category: Some(category.to_string()),
        discount_percent: Some(30),
        original_price: Some(100.0),
        sale_price: Some(70.0),
        images: Some("a.jpg,b.jpg,c.jpg".to_string()),
        latitude: lat,
        longitude: lng,
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(1),
        status: "active".to_string(),
        views_count: 0,
        created_at,
        updated_at: created_at,
        distance: None,
        store_name: None,
        store_category: None,
        store_logo_url: None,
        store_address: None,
        store_city: None,
    }
}

fn params(lat: f64, lng: f64) -> NearbyParams {
    NearbyParams {
        lat: Some(lat),
        lng: Some(lng),
        ..Default::default()
    }
}

/// Store with a clothing shop in central Tel Aviv and a spread of sales
///
/// Returns the store plus the ids of the two sales that should match a
/// 5 km clothing search, nearest first.
async fn seeded_store() -> (Arc<MemoryStore>, StoreRecord, Uuid, Uuid) {
    let memory = Arc::new(MemoryStore::new());
    let shop = create_store("corner-shop", "clothing", TEL_AVIV.0, TEL_AVIV.1);
    memory.insert_store_record(shop.clone()).await;

    let now = Utc::now();

    // ~1.1 km north, older
    let near = create_sale(shop.id, "Near", "clothing", 32.0953, 34.7818, now - Duration::hours(5));
    // ~3.3 km north, newest
    let mid = create_sale(shop.id, "Mid", "clothing", 32.1153, 34.7818, now - Duration::hours(1));
    // ~1.1 km but electronics
    let other_category = create_sale(shop.id, "Gadgets", "electronics", 32.0953, 34.7818, now);
    // Jerusalem, ~54 km away
    let far = create_sale(shop.id, "Far", "clothing", 31.7683, 35.2137, now - Duration::minutes(30));

    let mut inactive = create_sale(shop.id, "Inactive", "clothing", 32.0863, 34.7818, now);
    inactive.status = "inactive".to_string();

    let mut expired = create_sale(shop.id, "Expired", "clothing", 32.0863, 34.7818, now);
    expired.start_date = now - Duration::days(10);
    expired.end_date = now - Duration::days(3);

    let mut upcoming = create_sale(shop.id, "Upcoming", "clothing", 32.0863, 34.7818, now);
    upcoming.start_date = now + Duration::days(2);
    upcoming.end_date = now + Duration::days(5);

    let (near_id, mid_id) = (near.id, mid.id);
    for sale in [near, mid, other_category, far, inactive, expired, upcoming] {
        memory.insert_sale_record(sale).await;
    }

    (memory, shop, near_id, mid_id)
}

#[tokio::test]
async fn test_nearby_clothing_scenario() {
    let (memory, shop, near_id, mid_id) = seeded_store().await;
    let composer = NearbyComposer::probe(memory, SearchDefaults::default()).await;
    assert!(composer.geo_capable());

    let mut p = params(TEL_AVIV.0, TEL_AVIV.1);
    p.radius = Some(5000);
    p.category = Some("clothing".to_string());
    let query = composer.parse(&p).unwrap();

    let outcome = composer.nearby_sales(&query).await.unwrap();

    assert_eq!(outcome.mode, SearchMode::Geo);
    let ids: Vec<Uuid> = outcome.rows.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![near_id, mid_id]);

    let distances: Vec<f64> = outcome.rows.iter().map(|s| s.distance.unwrap()).collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    assert!(distances.iter().all(|d| *d >= 0.0 && *d <= 5000.0));

    let first = &outcome.rows[0];
    assert_eq!(first.images, vec!["a.jpg", "b.jpg", "c.jpg"]);
    let store = first.store.as_ref().expect("store summary attached");
    assert_eq!(store.id, shop.id);
    assert_eq!(store.name, "corner-shop");
    assert_eq!(store.city.as_deref(), Some("Tel Aviv"));
}

#[tokio::test]
async fn test_min_discount_filter() {
    let (memory, shop, _, _) = seeded_store().await;

    let mut big = create_sale(shop.id, "Big", "clothing", 32.0863, 34.7818, Utc::now());
    big.discount_percent = Some(70);
    let big_id = big.id;
    memory.insert_sale_record(big).await;

    let mut none = create_sale(shop.id, "NoDiscount", "clothing", 32.0863, 34.7818, Utc::now());
    none.discount_percent = None;
    memory.insert_sale_record(none).await;

    let composer = NearbyComposer::probe(memory, SearchDefaults::default()).await;
    let mut p = params(TEL_AVIV.0, TEL_AVIV.1);
    p.min_discount = Some(50);
    let query = composer.parse(&p).unwrap();

    let outcome = composer.nearby_sales(&query).await.unwrap();
    let ids: Vec<Uuid> = outcome.rows.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![big_id]);
}

#[tokio::test]
async fn test_geo_failure_falls_back_to_recency() {
    let (memory, _, near_id, mid_id) = seeded_store().await;
    // Probe says yes, but spatial queries then fail
    let composer = NearbyComposer::with_capability(memory.clone(), SearchDefaults::default(), true);
    memory.set_geo_enabled(false);

    let mut p = params(TEL_AVIV.0, TEL_AVIV.1);
    p.category = Some("clothing".to_string());
    let query = composer.parse(&p).unwrap();

    let outcome = composer.nearby_sales(&query).await.unwrap();

    assert_eq!(outcome.mode, SearchMode::Fallback);
    assert!(outcome.rows.iter().all(|s| s.distance.is_none()));
    assert!(outcome
        .rows
        .windows(2)
        .all(|w| w[0].created_at >= w[1].created_at));

    // Same attribute filters, but no radius: Jerusalem shows up too
    let titles: Vec<&str> = outcome.rows.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Far", "Mid", "Near"]);
    assert!(outcome.rows.iter().any(|s| s.id == near_id));
    assert!(outcome.rows.iter().any(|s| s.id == mid_id));
}

#[tokio::test]
async fn test_probe_without_geo_uses_fallback() {
    let (memory, _, _, _) = seeded_store().await;
    memory.set_geo_enabled(false);

    let composer = NearbyComposer::probe(memory, SearchDefaults::default()).await;
    assert!(!composer.geo_capable());

    let query = composer.parse(&params(TEL_AVIV.0, TEL_AVIV.1)).unwrap();
    let outcome = composer.nearby_sales(&query).await.unwrap();
    assert_eq!(outcome.mode, SearchMode::Fallback);
}

#[tokio::test]
async fn test_unreachable_storage_is_upstream_error() {
    let (memory, _, _, _) = seeded_store().await;
    let composer = NearbyComposer::with_capability(memory.clone(), SearchDefaults::default(), true);
    memory.set_reachable(false);

    let query = composer.parse(&params(TEL_AVIV.0, TEL_AVIV.1)).unwrap();
    let err = composer.nearby_sales(&query).await.unwrap_err();
    assert!(matches!(err, ComposeError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn test_zero_origin_rejected() {
    let composer = NearbyComposer::probe(Arc::new(MemoryStore::new()), SearchDefaults::default()).await;
    let err = composer.parse(&params(0.0, 0.0)).unwrap_err();
    assert!(matches!(err, ComposeError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_limit_clamped_to_hundred() {
    let memory = Arc::new(MemoryStore::new());
    let shop = create_store("big-store", "clothing", TEL_AVIV.0, TEL_AVIV.1);
    memory.insert_store_record(shop.clone()).await;

    let now = Utc::now();
    for i in 0..120 {
        let lat = TEL_AVIV.0 + (i as f64) * 0.0001;
        let sale = create_sale(shop.id, &format!("Sale {}", i), "clothing", lat, TEL_AVIV.1, now);
        memory.insert_sale_record(sale).await;
    }

    let composer = NearbyComposer::probe(memory, SearchDefaults::default()).await;
    let mut p = params(TEL_AVIV.0, TEL_AVIV.1);
    p.limit = Some(500);
    let query = composer.parse(&p).unwrap();
    assert_eq!(query.page().limit, 100);

    let outcome = composer.nearby_sales(&query).await.unwrap();
    assert_eq!(outcome.rows.len(), 100);
}

#[tokio::test]
async fn test_offset_pages_are_stable() {
    let (memory, _, _, _) = seeded_store().await;
    let composer = NearbyComposer::probe(memory, SearchDefaults::default()).await;

    let mut first = params(TEL_AVIV.0, TEL_AVIV.1);
    first.limit = Some(2);
    let first_page = composer
        .nearby_sales(&composer.parse(&first).unwrap())
        .await
        .unwrap();

    let mut second = first.clone();
    second.offset = Some(1);
    let second_page = composer
        .nearby_sales(&composer.parse(&second).unwrap())
        .await
        .unwrap();

    assert_eq!(first_page.rows.len(), 2);
    assert_eq!(first_page.rows[1].id, second_page.rows[0].id);
}

#[tokio::test]
async fn test_repeated_query_is_idempotent() {
    let (memory, _, _, _) = seeded_store().await;
    let composer = NearbyComposer::probe(memory, SearchDefaults::default()).await;
    let query = composer.parse(&params(TEL_AVIV.0, TEL_AVIV.1)).unwrap();

    let a = composer.nearby_sales(&query).await.unwrap();
    let b = composer.nearby_sales(&query).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_empty_images_become_empty_array() {
    let memory = Arc::new(MemoryStore::new());
    let shop = create_store("plain", "clothing", TEL_AVIV.0, TEL_AVIV.1);
    memory.insert_store_record(shop.clone()).await;

    let mut sale = create_sale(shop.id, "No images", "clothing", TEL_AVIV.0, TEL_AVIV.1, Utc::now());
    sale.images = None;
    memory.insert_sale_record(sale).await;

    let composer = NearbyComposer::probe(memory, SearchDefaults::default()).await;
    let query = composer.parse(&params(TEL_AVIV.0, TEL_AVIV.1)).unwrap();
    let outcome = composer.nearby_sales(&query).await.unwrap();

    assert_eq!(outcome.rows.len(), 1);
    assert!(outcome.rows[0].images.is_empty());
}

#[tokio::test]
async fn test_nearby_stores_ranked_by_distance() {
    let memory = Arc::new(MemoryStore::new());
    let close = create_store("close", "food", 32.0863, 34.7818);
    let further = create_store("further", "food", 32.1053, 34.7818);
    let wrong_category = create_store("books", "books", 32.0863, 34.7818);
    let mut closed = create_store("closed", "food", 32.0863, 34.7818);
    closed.status = "inactive".to_string();

    for store in [further.clone(), close.clone(), wrong_category, closed] {
        memory.insert_store_record(store).await;
    }

    let composer = NearbyComposer::probe(memory, SearchDefaults::default()).await;
    let mut p = params(TEL_AVIV.0, TEL_AVIV.1);
    p.category = Some("food".to_string());
    // Sale-only filter, ignored for stores
    p.min_discount = Some(90);
    let query = composer.parse(&p).unwrap();

    let outcome = composer.nearby_stores(&query).await.unwrap();
    let names: Vec<&str> = outcome.rows.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["close", "further"]);
    assert!(outcome.rows.iter().all(|s| s.distance.unwrap() <= 5000.0));
}

/// Two stores where the nearer one is older, so distance and recency disagree
async fn stores_by_age() -> Arc<MemoryStore> {
    let memory = Arc::new(MemoryStore::new());
    let now = Utc::now();

    let mut near_old = create_store("near-old", "food", 32.0863, 34.7818);
    near_old.created_at = now - Duration::hours(5);
    // Jerusalem, well outside any default radius
    let mut far_new = create_store("far-new", "food", 31.7683, 35.2137);
    far_new.created_at = now - Duration::hours(1);

    memory.insert_store_record(near_old).await;
    memory.insert_store_record(far_new).await;
    memory
}

#[tokio::test]
async fn test_store_geo_failure_falls_back_to_recency() {
    let memory = stores_by_age().await;
    let composer = NearbyComposer::with_capability(memory.clone(), SearchDefaults::default(), true);

    let query = composer.parse(&params(TEL_AVIV.0, TEL_AVIV.1)).unwrap();
    let geo = composer.nearby_stores(&query).await.unwrap();
    assert_eq!(geo.mode, SearchMode::Geo);
    let names: Vec<&str> = geo.rows.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["near-old"]);

    memory.set_geo_enabled(false);
    let outcome = composer.nearby_stores(&query).await.unwrap();

    assert_eq!(outcome.mode, SearchMode::Fallback);
    let rows: Vec<(&str, Option<f64>)> = outcome
        .rows
        .iter()
        .map(|s| (s.name.as_str(), s.distance))
        .collect();
    assert_eq!(rows, vec![("far-new", None), ("near-old", None)]);
}

/// Delegates to a memory store but rewrites the distances it reports
struct SkewedDistances {
    inner: Arc<MemoryStore>,
    overrides: HashMap<Uuid, f64>,
}

impl SkewedDistances {
    fn skew(&self, id: Uuid, distance: Option<f64>) -> Option<f64> {
        distance.map(|d| self.overrides.get(&id).copied().unwrap_or(d))
    }
}

#[async_trait]
impl Storage for SkewedDistances {
    async fn probe_geo(&self) -> bool {
        self.inner.probe_geo().await
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.inner.health_check().await
    }

    async fn search_sales(&self, plan: &SearchPlan) -> Result<Vec<SaleRecord>, StoreError> {
        let mut rows = self.inner.search_sales(plan).await?;
        for row in &mut rows {
            row.distance = self.skew(row.id, row.distance);
        }
        Ok(rows)
    }

    async fn search_stores(&self, plan: &SearchPlan) -> Result<Vec<StoreRecord>, StoreError> {
        let mut rows = self.inner.search_stores(plan).await?;
        for row in &mut rows {
            row.distance = self.skew(row.id, row.distance);
        }
        Ok(rows)
    }

    async fn increment_sale_views(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.increment_sale_views(id).await
    }

    async fn get_sale(&self, id: Uuid) -> Result<Option<SaleRecord>, StoreError> {
        self.inner.get_sale(id).await
    }

    async fn create_sale(&self, sale: NewSale) -> Result<SaleRecord, StoreError> {
        self.inner.create_sale(sale).await
    }

    async fn update_sale(&self, id: Uuid, patch: SalePatch) -> Result<Option<SaleRecord>, StoreError> {
        self.inner.update_sale(id, patch).await
    }

    async fn delete_sale(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_sale(id).await
    }

    async fn get_store(&self, id: Uuid) -> Result<Option<StoreRecord>, StoreError> {
        self.inner.get_store(id).await
    }

    async fn create_store(&self, store: NewStore) -> Result<StoreRecord, StoreError> {
        self.inner.create_store(store).await
    }

    async fn update_store(&self, id: Uuid, patch: StorePatch) -> Result<Option<StoreRecord>, StoreError> {
        self.inner.update_store(id, patch).await
    }

    async fn delete_store(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_store(id).await
    }
}

#[tokio::test]
async fn test_rows_outside_radius_are_dropped() {
    let (memory, _, near_id, mid_id) = seeded_store().await;

    let storage = Arc::new(SkewedDistances {
        inner: memory,
        overrides: HashMap::from([(near_id, 7_500.0)]),
    });
    let composer = NearbyComposer::probe(storage, SearchDefaults::default()).await;

    let mut p = params(TEL_AVIV.0, TEL_AVIV.1);
    p.category = Some("clothing".to_string());
    let outcome = composer.nearby_sales(&composer.parse(&p).unwrap()).await.unwrap();

    assert_eq!(outcome.mode, SearchMode::Geo);
    let ids: Vec<Uuid> = outcome.rows.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![mid_id]);
}

#[tokio::test]
async fn test_rows_with_invalid_distance_are_dropped() {
    let memory = Arc::new(MemoryStore::new());
    let negative = create_store("negative", "food", 32.0863, 34.7818);
    let nan = create_store("nan", "food", 32.0873, 34.7818);
    let fine = create_store("fine", "food", 32.0883, 34.7818);
    let overrides = HashMap::from([(negative.id, -3.0), (nan.id, f64::NAN)]);

    for store in [negative, nan, fine] {
        memory.insert_store_record(store).await;
    }

    let storage = Arc::new(SkewedDistances { inner: memory, overrides });
    let composer = NearbyComposer::probe(storage, SearchDefaults::default()).await;

    let query = composer.parse(&params(TEL_AVIV.0, TEL_AVIV.1)).unwrap();
    let outcome = composer.nearby_stores(&query).await.unwrap();

    let names: Vec<&str> = outcome.rows.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["fine"]);
}

#[tokio::test]
async fn test_record_view_increments_eventually() {
    let (memory, _, near_id, _) = seeded_store().await;
    let composer = NearbyComposer::probe(memory.clone(), SearchDefaults::default()).await;

    composer.record_view(near_id);

    let mut views = 0;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        views = memory.get_sale(near_id).await.unwrap().unwrap().views_count;
        if views > 0 {
            break;
        }
    }
    assert_eq!(views, 1);
}

#[tokio::test]
async fn test_record_view_failure_is_swallowed() {
    let (memory, _, near_id, _) = seeded_store().await;
    let composer = NearbyComposer::probe(memory.clone(), SearchDefaults::default()).await;
    memory.set_reachable(false);

    composer.record_view(near_id);
    composer.record_view(Uuid::new_v4());
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    memory.set_reachable(true);
    assert_eq!(memory.get_sale(near_id).await.unwrap().unwrap().views_count, 0);
}

// HTTP boundary

#[derive(serde::Serialize)]
struct Claims<'a> {
    sub: &'a str,
    exp: usize,
}

fn bearer(user_id: &str) -> String {
    let exp = (Utc::now().timestamp() + 3600) as usize;
    let token = encode(
        &Header::new(Algorithm::HS256),
        &Claims { sub: user_id, exp },
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

async fn app_state(memory: Arc<MemoryStore>) -> AppState {
    let storage: Arc<dyn Storage> = memory;
    let composer = NearbyComposer::probe(Arc::clone(&storage), SearchDefaults::default()).await;
    AppState {
        storage,
        auth: Arc::new(JwtAuth::new(JWT_SECRET, None)),
        composer,
    }
}

#[actix_web::test]
async fn test_http_nearby_sales() {
    let (memory, _, near_id, _) = seeded_store().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(memory).await))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/sales/nearby?lat=32.0853&lng=34.7818&radius=5000&category=clothing")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get(SEARCH_MODE_HEADER).unwrap(), "geo");

    let body: Value = test::read_body_json(resp).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], json!(near_id.to_string()));
    assert_eq!(rows[0]["images"], json!(["a.jpg", "b.jpg", "c.jpg"]));
    assert_eq!(rows[0]["store"]["name"], json!("corner-shop"));
    assert!(rows[0]["distance"].as_f64().unwrap() <= 5000.0);
}

#[actix_web::test]
async fn test_http_invalid_queries() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(Arc::new(MemoryStore::new())).await))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .configure(routes::configure_routes),
    )
    .await;

    for uri in [
        "/api/v1/sales/nearby?lat=0&lng=0",
        "/api/v1/sales/nearby?lng=34.7818",
        "/api/v1/sales/nearby?lat=abc&lng=34.7818",
        "/api/v1/stores/nearby?lat=32.0853&lng=34.7818&limit=ten",
    ] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "{}", uri);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], json!("invalid_query"), "{}", uri);
        assert_eq!(body["status_code"], json!(400));
    }
}

#[actix_web::test]
async fn test_http_fallback_header() {
    let (memory, _, _, _) = seeded_store().await;
    memory.set_geo_enabled(false);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(memory).await))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/sales/nearby?lat=32.0853&lng=34.7818")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get(SEARCH_MODE_HEADER).unwrap(), "fallback");

    let body: Value = test::read_body_json(resp).await;
    assert!(body.as_array().unwrap().iter().all(|row| row["distance"].is_null()));
}

#[actix_web::test]
async fn test_http_store_fallback_header() {
    let memory = stores_by_age().await;
    memory.set_geo_enabled(false);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(memory).await))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/stores/nearby?lat=32.0853&lng=34.7818&category=food")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get(SEARCH_MODE_HEADER).unwrap(), "fallback");

    let body: Value = test::read_body_json(resp).await;
    let rows = body.as_array().unwrap();
    let names: Vec<&str> = rows.iter().map(|row| row["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["far-new", "near-old"]);
    assert!(rows.iter().all(|row| row["distance"].is_null()));
}

#[actix_web::test]
async fn test_http_storage_down_is_503() {
    let (memory, _, _, _) = seeded_store().await;
    let state = app_state(memory.clone()).await;
    memory.set_reachable(false);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/sales/nearby?lat=32.0853&lng=34.7818")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);
}

#[actix_web::test]
async fn test_http_owner_write_flow() {
    let memory = Arc::new(MemoryStore::new());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(memory.clone()).await))
            .app_data(web::PathConfig::default().error_handler(handle_path_error))
            .configure(routes::configure_routes),
    )
    .await;

    let store_body = json!({
        "name": "Owner Shop",
        "category": "clothing",
        "city": "Tel Aviv",
        "latitude": 32.0853,
        "longitude": 34.7818
    });

    // No token
    let req = test::TestRequest::post()
        .uri("/api/v1/stores")
        .set_json(&store_body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // Garbage token
    let req = test::TestRequest::post()
        .uri("/api/v1/stores")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .set_json(&store_body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/v1/stores")
        .insert_header(("Authorization", bearer("owner-1")))
        .set_json(&store_body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let store: Value = test::read_body_json(resp).await;
    assert_eq!(store["ownerId"], json!("owner-1"));
    let store_id = store["id"].as_str().unwrap().to_string();

    let sale_body = json!({
        "storeId": store_id,
        "title": "Winter clearance",
        "category": "clothing",
        "discountPercent": 40,
        "images": ["x.jpg", "y.jpg"],
        "endDate": (Utc::now() + Duration::days(7)).to_rfc3339()
    });

    // Someone else's store
    let req = test::TestRequest::post()
        .uri("/api/v1/sales")
        .insert_header(("Authorization", bearer("intruder")))
        .set_json(&sale_body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::post()
        .uri("/api/v1/sales")
        .insert_header(("Authorization", bearer("owner-1")))
        .set_json(&sale_body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let sale: Value = test::read_body_json(resp).await;
    assert_eq!(sale["images"], json!(["x.jpg", "y.jpg"]));
    assert_eq!(sale["latitude"], json!(32.0853));
    assert_eq!(sale["store"]["name"], json!("Owner Shop"));
    let sale_id = sale["id"].as_str().unwrap().to_string();

    // Out of range discount
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/sales/{}", sale_id))
        .insert_header(("Authorization", bearer("owner-1")))
        .set_json(json!({ "discountPercent": 120 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/sales/{}", sale_id))
        .insert_header(("Authorization", bearer("intruder")))
        .set_json(json!({ "title": "Mine now" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/sales/{}", sale_id))
        .insert_header(("Authorization", bearer("owner-1")))
        .set_json(json!({ "title": "Winter clearance II", "images": [] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let updated: Value = test::read_body_json(resp).await;
    assert_eq!(updated["title"], json!("Winter clearance II"));
    assert_eq!(updated["images"], json!([]));

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/sales/{}", sale_id))
        .insert_header(("Authorization", bearer("owner-1")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/sales/{}", sale_id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get()
        .uri("/api/v1/sales/not-a-uuid")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn test_http_get_sale_counts_views() {
    let (memory, _, near_id, _) = seeded_store().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(memory.clone()).await))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/sales/{}", near_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["distance"].is_null());

    let mut views = 0;
    for _ in 0..50 {
        actix_web::rt::time::sleep(std::time::Duration::from_millis(10)).await;
        views = memory.get_sale(near_id).await.unwrap().unwrap().views_count;
        if views > 0 {
            break;
        }
    }
    assert_eq!(views, 1);
}

#[actix_web::test]
async fn test_http_health() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(Arc::new(MemoryStore::new())).await))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["geoCapable"], json!(true));
    assert!(body.get("geo_capable").is_none());
}
