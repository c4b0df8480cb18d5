use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::normalize::join_images;
use crate::core::query::{EntityKind, SearchPlan};
use crate::models::domain::{NewSale, NewStore, SalePatch, SaleRecord, StorePatch, StoreRecord, STATUS_ACTIVE};
use crate::services::storage::{Storage, StoreError};

/// In-process storage backend
///
/// Evaluates search plans directly, computing geodesic distances itself.
/// Used by tests, benches and `memory://` development mode. Geo support
/// and reachability can be switched off to exercise the degraded paths.
pub struct MemoryStore {
    sales: RwLock<HashMap<Uuid, SaleRecord>>,
    stores: RwLock<HashMap<Uuid, StoreRecord>>,
    geo_enabled: AtomicBool,
    reachable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sales: RwLock::new(HashMap::new()),
            stores: RwLock::new(HashMap::new()),
            geo_enabled: AtomicBool::new(true),
            reachable: AtomicBool::new(true),
        }
    }

    /// Make spatial plans fail as if the geo extension were missing
    pub fn set_geo_enabled(&self, enabled: bool) {
        self.geo_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Make every call fail as if the database were down
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Insert a fully formed sale row, replacing any row with the same id
    pub async fn insert_sale_record(&self, record: SaleRecord) {
        self.sales.write().await.insert(record.id, record);
    }

    /// Insert a fully formed store row, replacing any row with the same id
    pub async fn insert_store_record(&self, record: StoreRecord) {
        self.stores.write().await.insert(record.id, record);
    }

    fn ensure_reachable(&self) -> Result<(), StoreError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unreachable("memory store is offline".to_string()))
        }
    }

    fn ensure_plan_supported(&self, plan: &SearchPlan, kind: EntityKind) -> Result<(), StoreError> {
        if plan.kind != kind {
            return Err(StoreError::InvalidInput(format!("plan targets {:?}, not {:?}", plan.kind, kind)));
        }
        if plan.is_spatial() && !self.geo_enabled.load(Ordering::SeqCst) {
            return Err(StoreError::GeoUnavailable("distance functions disabled".to_string()));
        }
        Ok(())
    }

    /// Fill the `store_*` columns the way the SQL left join would
    fn with_store(mut sale: SaleRecord, stores: &HashMap<Uuid, StoreRecord>) -> SaleRecord {
        match stores.get(&sale.store_id) {
            Some(store) => {
                sale.store_name = Some(store.name.clone());
                sale.store_category = store.category.clone();
                sale.store_logo_url = store.logo_url.clone();
                sale.store_address = store.address.clone();
                sale.store_city = store.city.clone();
            }
            None => {
                sale.store_name = None;
                sale.store_category = None;
                sale.store_logo_url = None;
                sale.store_address = None;
                sale.store_city = None;
            }
        }
        sale
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn probe_geo(&self) -> bool {
        self.reachable.load(Ordering::SeqCst) && self.geo_enabled.load(Ordering::SeqCst)
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.ensure_reachable().map(|_| true)
    }

    async fn search_sales(&self, plan: &SearchPlan) -> Result<Vec<SaleRecord>, StoreError> {
        self.ensure_reachable()?;
        self.ensure_plan_supported(plan, EntityKind::Sale)?;

        let stores = self.stores.read().await;
        let sales = self.sales.read().await;
        let rows = sales
            .values()
            .cloned()
            .map(|sale| Self::with_store(sale, &stores));

        Ok(plan.evaluate(rows))
    }

    async fn search_stores(&self, plan: &SearchPlan) -> Result<Vec<StoreRecord>, StoreError> {
        self.ensure_reachable()?;
        self.ensure_plan_supported(plan, EntityKind::Store)?;

        let stores = self.stores.read().await;
        Ok(plan.evaluate(stores.values().cloned()))
    }

    async fn increment_sale_views(&self, id: Uuid) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        if let Some(sale) = self.sales.write().await.get_mut(&id) {
            sale.views_count += 1;
        }
        Ok(())
    }

    async fn get_sale(&self, id: Uuid) -> Result<Option<SaleRecord>, StoreError> {
        self.ensure_reachable()?;
        let stores = self.stores.read().await;
        let sales = self.sales.read().await;
        Ok(sales.get(&id).cloned().map(|sale| Self::with_store(sale, &stores)))
    }

    async fn create_sale(&self, sale: NewSale) -> Result<SaleRecord, StoreError> {
        self.ensure_reachable()?;
        let stores = self.stores.read().await;
        if !stores.contains_key(&sale.store_id) {
            return Err(StoreError::InvalidInput(format!("store {} does not exist", sale.store_id)));
        }

        let now = Utc::now();
        let record = SaleRecord {
            id: Uuid::new_v4(),
            store_id: sale.store_id,
            title: sale.title,
            description: sale.description,
            category: sale.category,
            discount_percent: sale.discount_percent,
            original_price: sale.original_price,
            sale_price: sale.sale_price,
            images: join_images(&sale.images),
            latitude: sale.location.lat,
            longitude: sale.location.lng,
            start_date: sale.start_date,
            end_date: sale.end_date,
            status: sale.status.as_str().to_string(),
            views_count: 0,
            created_at: now,
            updated_at: now,
            distance: None,
            store_name: None,
            store_category: None,
            store_logo_url: None,
            store_address: None,
            store_city: None,
        };

        self.sales.write().await.insert(record.id, record.clone());
        Ok(Self::with_store(record, &stores))
    }

    async fn update_sale(&self, id: Uuid, patch: SalePatch) -> Result<Option<SaleRecord>, StoreError> {
        self.ensure_reachable()?;
        let stores = self.stores.read().await;
        let mut sales = self.sales.write().await;

        let Some(sale) = sales.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(title) = patch.title {
            sale.title = title;
        }
        if let Some(description) = patch.description {
            sale.description = Some(description);
        }
        if let Some(category) = patch.category {
            sale.category = Some(category);
        }
        if let Some(discount) = patch.discount_percent {
            sale.discount_percent = Some(discount);
        }
        if let Some(price) = patch.original_price {
            sale.original_price = Some(price);
        }
        if let Some(price) = patch.sale_price {
            sale.sale_price = Some(price);
        }
        if let Some(images) = patch.images {
            sale.images = join_images(&images);
        }
        if let Some(location) = patch.location {
            sale.latitude = location.lat;
            sale.longitude = location.lng;
        }
        if let Some(start) = patch.start_date {
            sale.start_date = start;
        }
        if let Some(end) = patch.end_date {
            sale.end_date = end;
        }
        if let Some(status) = patch.status {
            sale.status = status.as_str().to_string();
        }
        sale.updated_at = Utc::now();

        Ok(Some(Self::with_store(sale.clone(), &stores)))
    }

    async fn delete_sale(&self, id: Uuid) -> Result<bool, StoreError> {
        self.ensure_reachable()?;
        Ok(self.sales.write().await.remove(&id).is_some())
    }

    async fn get_store(&self, id: Uuid) -> Result<Option<StoreRecord>, StoreError> {
        self.ensure_reachable()?;
        Ok(self.stores.read().await.get(&id).cloned())
    }

    async fn create_store(&self, store: NewStore) -> Result<StoreRecord, StoreError> {
        self.ensure_reachable()?;

        let now = Utc::now();
        let record = StoreRecord {
            id: Uuid::new_v4(),
            owner_id: store.owner_id,
            name: store.name,
            description: store.description,
            category: store.category,
            logo_url: store.logo_url,
            address: store.address,
            city: store.city,
            phone: store.phone,
            latitude: store.location.lat,
            longitude: store.location.lng,
            status: STATUS_ACTIVE.to_string(),
            created_at: now,
            updated_at: now,
            distance: None,
        };

        self.stores.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_store(&self, id: Uuid, patch: StorePatch) -> Result<Option<StoreRecord>, StoreError> {
        self.ensure_reachable()?;
        let mut stores = self.stores.write().await;

        let Some(store) = stores.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = patch.name {
            store.name = name;
        }
        if let Some(description) = patch.description {
            store.description = Some(description);
        }
        if let Some(category) = patch.category {
            store.category = Some(category);
        }
        if let Some(logo_url) = patch.logo_url {
            store.logo_url = Some(logo_url);
        }
        if let Some(address) = patch.address {
            store.address = Some(address);
        }
        if let Some(city) = patch.city {
            store.city = Some(city);
        }
        if let Some(phone) = patch.phone {
            store.phone = Some(phone);
        }
        if let Some(location) = patch.location {
            store.latitude = location.lat;
            store.longitude = location.lng;
        }
        if let Some(status) = patch.status {
            store.status = status.as_str().to_string();
        }
        store.updated_at = Utc::now();

        Ok(Some(store.clone()))
    }

    async fn delete_store(&self, id: Uuid) -> Result<bool, StoreError> {
        self.ensure_reachable()?;
        let removed = self.stores.write().await.remove(&id).is_some();
        if removed {
            // Same as ON DELETE CASCADE on sales.store_id
            self.sales.write().await.retain(|_, sale| sale.store_id != id);
        }
        Ok(removed)
    }
}
