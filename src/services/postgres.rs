use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseSettings;
use crate::core::geo::{Point, SRID_WGS84};
use crate::core::normalize::join_images;
use crate::core::query::{EntityKind, Predicate, SearchPlan, SortOrder};
use crate::models::domain::{NewSale, NewStore, SalePatch, SaleRecord, StorePatch, StoreRecord};
use crate::services::storage::{Storage, StoreError};

const SALE_COLUMNS: &str = "s.id, s.store_id, s.title, s.description, s.category, s.discount_percent, \
    s.original_price, s.sale_price, s.images, s.latitude, s.longitude, s.start_date, s.end_date, \
    s.status, s.views_count, s.created_at, s.updated_at, \
    st.name AS store_name, st.category AS store_category, st.logo_url AS store_logo_url, \
    st.address AS store_address, st.city AS store_city";

const SALE_FROM: &str = " FROM sales s LEFT JOIN stores st ON st.id = s.store_id";

const STORE_COLUMNS: &str = "st.id, st.owner_id, st.name, st.description, st.category, st.logo_url, \
    st.address, st.city, st.phone, st.latitude, st.longitude, st.status, st.created_at, st.updated_at";

const STORE_FROM: &str = " FROM stores st";

/// SQLSTATEs raised when PostGIS functions or types are missing
const UNDEFINED_FUNCTION: &str = "42883";
const UNDEFINED_OBJECT: &str = "42704";
/// Optional spatial setup, applied after the base migrations
///
/// Expression indexes match the geography `build_search` derives from the
/// plain lat/lng columns, so the base schema never depends on PostGIS.
pub(crate) const GEO_SETUP: [&str; 3] = [
    "CREATE EXTENSION IF NOT EXISTS postgis",
    "CREATE INDEX IF NOT EXISTS idx_stores_geography ON stores \
        USING GIST ((ST_SetSRID(ST_MakePoint(longitude, latitude), 4326)::geography))",
    "CREATE INDEX IF NOT EXISTS idx_sales_geography ON sales \
        USING GIST ((ST_SetSRID(ST_MakePoint(longitude, latitude), 4326)::geography))",
];

const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unreachable(err.to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(UNDEFINED_FUNCTION) | Some(UNDEFINED_OBJECT) => {
                    StoreError::GeoUnavailable(db.message().to_string())
                }
                Some(FOREIGN_KEY_VIOLATION) | Some(CHECK_VIOLATION) => {
                    StoreError::InvalidInput(db.message().to_string())
                }
                _ => StoreError::Query(err.to_string()),
            },
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// PostgreSQL + PostGIS storage backend
///
/// Distances and radius containment run on `geography` columns, so they
/// are geodesic on the WGS84 spheroid.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
        run_migrations: bool,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        if run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
            Self::enable_geo(&pool).await;
        }

        Ok(Self { pool })
    }

    /// Create a new store from settings
    pub async fn from_settings(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        let max_connections = settings.max_connections.unwrap_or(10);
        tracing::info!("Connecting to PostgreSQL (max {} connections)", max_connections);

        Self::new(
            &settings.url,
            max_connections,
            settings.min_connections.unwrap_or(1),
            Duration::from_secs(settings.acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(settings.idle_timeout_secs.unwrap_or(600)),
            settings.run_migrations,
        )
        .await
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Best-effort PostGIS setup; a database without it still serves fallback search
    async fn enable_geo(pool: &PgPool) {
        for statement in GEO_SETUP {
            if let Err(e) = sqlx::query(statement).execute(pool).await {
                tracing::warn!("Skipping spatial setup, PostGIS unavailable: {}", e);
                return;
            }
        }
        tracing::info!("Spatial indexes ready");
    }
}

/// Geography point for a row, derived from its lat/lng columns
fn row_geography(alias: &str) -> String {
    format!(
        "ST_SetSRID(ST_MakePoint({0}.longitude, {0}.latitude), {1})::geography",
        alias, SRID_WGS84
    )
}

/// Render a search plan into one parameterized statement
pub(crate) fn build_search(plan: &SearchPlan) -> QueryBuilder<'static, Postgres> {
    let (columns, from, alias) = match plan.kind {
        EntityKind::Sale => (SALE_COLUMNS, SALE_FROM, "s"),
        EntityKind::Store => (STORE_COLUMNS, STORE_FROM, "st"),
    };

    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(columns);

    match plan.origin {
        Some(origin) => {
            qb.push(format!(", ST_Distance({}, ", row_geography(alias)));
            push_origin(&mut qb, origin);
            qb.push(") AS distance");
        }
        None => {
            qb.push(", NULL::double precision AS distance");
        }
    }

    qb.push(from);

    for (i, predicate) in plan.predicates.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        push_predicate(&mut qb, alias, predicate);
    }

    match plan.order {
        SortOrder::DistanceAsc => qb.push(format!(" ORDER BY distance ASC, {}.id ASC", alias)),
        SortOrder::CreatedDesc => qb.push(format!(" ORDER BY {0}.created_at DESC, {0}.id ASC", alias)),
    };

    qb.push(" LIMIT ").push_bind(i64::from(plan.page.limit));
    qb.push(" OFFSET ")
        .push_bind(i64::try_from(plan.page.offset).unwrap_or(i64::MAX));

    qb
}

fn push_origin(qb: &mut QueryBuilder<'static, Postgres>, origin: Point) {
    qb.push("ST_SetSRID(ST_MakePoint(")
        .push_bind(origin.lng)
        .push(", ")
        .push_bind(origin.lat)
        .push(format!("), {})::geography", SRID_WGS84));
}

fn push_predicate(qb: &mut QueryBuilder<'static, Postgres>, alias: &str, predicate: &Predicate) {
    match predicate {
        Predicate::Status(status) => {
            qb.push(format!("{}.status = ", alias)).push_bind(status.clone());
        }
        Predicate::ActiveAt(at) => {
            qb.push(format!("{}.start_date <= ", alias))
                .push_bind(*at)
                .push(format!(" AND {}.end_date >= ", alias))
                .push_bind(*at);
        }
        Predicate::Category(category) => {
            qb.push(format!("{}.category = ", alias)).push_bind(category.clone());
        }
        Predicate::MinDiscount(min) => {
            qb.push(format!("{}.discount_percent >= ", alias)).push_bind(*min);
        }
        Predicate::WithinRadius { origin, radius_m } => {
            qb.push(format!("ST_DWithin({}, ", row_geography(alias)));
            push_origin(qb, *origin);
            qb.push(", ").push_bind(f64::from(*radius_m)).push(")");
        }
    }
}

#[async_trait]
impl Storage for PostgresStore {
    async fn probe_geo(&self) -> bool {
        match sqlx::query_scalar::<_, String>("SELECT postgis_version()")
            .fetch_one(&self.pool)
            .await
        {
            Ok(version) => {
                tracing::info!("PostGIS available: {}", version);
                true
            }
            Err(e) => {
                tracing::warn!("PostGIS probe failed: {}", e);
                false
            }
        }
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }

    async fn search_sales(&self, plan: &SearchPlan) -> Result<Vec<SaleRecord>, StoreError> {
        let mut qb = build_search(plan);
        let rows = qb.build_query_as::<SaleRecord>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn search_stores(&self, plan: &SearchPlan) -> Result<Vec<StoreRecord>, StoreError> {
        let mut qb = build_search(plan);
        let rows = qb.build_query_as::<StoreRecord>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn increment_sale_views(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE sales SET views_count = views_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_sale(&self, id: Uuid) -> Result<Option<SaleRecord>, StoreError> {
        let query = format!(
            "SELECT {}, NULL::double precision AS distance{} WHERE s.id = $1",
            SALE_COLUMNS, SALE_FROM
        );

        let row = sqlx::query_as::<_, SaleRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_sale(&self, sale: NewSale) -> Result<SaleRecord, StoreError> {
        let query = r#"
            INSERT INTO sales (
                store_id, title, description, category, discount_percent,
                original_price, sale_price, images, latitude, longitude,
                start_date, end_date, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
        "#;

        let id: Uuid = sqlx::query_scalar(query)
            .bind(sale.store_id)
            .bind(&sale.title)
            .bind(&sale.description)
            .bind(&sale.category)
            .bind(sale.discount_percent)
            .bind(sale.original_price)
            .bind(sale.sale_price)
            .bind(join_images(&sale.images))
            .bind(sale.location.lat)
            .bind(sale.location.lng)
            .bind(sale.start_date)
            .bind(sale.end_date)
            .bind(sale.status.as_str())
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!("Created sale {} in store {}", id, sale.store_id);

        self.get_sale(id)
            .await?
            .ok_or_else(|| StoreError::Query(format!("sale {} missing after insert", id)))
    }

    async fn update_sale(&self, id: Uuid, patch: SalePatch) -> Result<Option<SaleRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE sales SET ");

        {
            let mut separated = qb.separated(", ");

            if let Some(title) = patch.title {
                separated.push("title = ").push_bind_unseparated(title);
            }
            if let Some(description) = patch.description {
                separated.push("description = ").push_bind_unseparated(description);
            }
            if let Some(category) = patch.category {
                separated.push("category = ").push_bind_unseparated(category);
            }
            if let Some(discount) = patch.discount_percent {
                separated.push("discount_percent = ").push_bind_unseparated(discount);
            }
            if let Some(price) = patch.original_price {
                separated.push("original_price = ").push_bind_unseparated(price);
            }
            if let Some(price) = patch.sale_price {
                separated.push("sale_price = ").push_bind_unseparated(price);
            }
            if let Some(images) = patch.images {
                separated.push("images = ").push_bind_unseparated(join_images(&images));
            }
            if let Some(location) = patch.location {
                separated.push("latitude = ").push_bind_unseparated(location.lat);
                separated.push("longitude = ").push_bind_unseparated(location.lng);
            }
            if let Some(start) = patch.start_date {
                separated.push("start_date = ").push_bind_unseparated(start);
            }
            if let Some(end) = patch.end_date {
                separated.push("end_date = ").push_bind_unseparated(end);
            }
            if let Some(status) = patch.status {
                separated.push("status = ").push_bind_unseparated(status.as_str());
            }
            separated.push("updated_at = NOW()");
        }

        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING id");

        let updated = qb.build_query_scalar::<Uuid>().fetch_optional(&self.pool).await?;

        match updated {
            Some(id) => self.get_sale(id).await,
            None => Ok(None),
        }
    }

    async fn delete_sale(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sales WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_store(&self, id: Uuid) -> Result<Option<StoreRecord>, StoreError> {
        let query = format!(
            "SELECT {}, NULL::double precision AS distance{} WHERE st.id = $1",
            STORE_COLUMNS, STORE_FROM
        );

        let row = sqlx::query_as::<_, StoreRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_store(&self, store: NewStore) -> Result<StoreRecord, StoreError> {
        let query = r#"
            INSERT INTO stores (
                owner_id, name, description, category, logo_url,
                address, city, phone, latitude, longitude
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
        "#;

        let id: Uuid = sqlx::query_scalar(query)
            .bind(&store.owner_id)
            .bind(&store.name)
            .bind(&store.description)
            .bind(&store.category)
            .bind(&store.logo_url)
            .bind(&store.address)
            .bind(&store.city)
            .bind(&store.phone)
            .bind(store.location.lat)
            .bind(store.location.lng)
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!("Created store {} for owner {}", id, store.owner_id);

        self.get_store(id)
            .await?
            .ok_or_else(|| StoreError::Query(format!("store {} missing after insert", id)))
    }

    async fn update_store(&self, id: Uuid, patch: StorePatch) -> Result<Option<StoreRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE stores SET ");

        {
            let mut separated = qb.separated(", ");

            if let Some(name) = patch.name {
                separated.push("name = ").push_bind_unseparated(name);
            }
            if let Some(description) = patch.description {
                separated.push("description = ").push_bind_unseparated(description);
            }
            if let Some(category) = patch.category {
                separated.push("category = ").push_bind_unseparated(category);
            }
            if let Some(logo_url) = patch.logo_url {
                separated.push("logo_url = ").push_bind_unseparated(logo_url);
            }
            if let Some(address) = patch.address {
                separated.push("address = ").push_bind_unseparated(address);
            }
            if let Some(city) = patch.city {
                separated.push("city = ").push_bind_unseparated(city);
            }
            if let Some(phone) = patch.phone {
                separated.push("phone = ").push_bind_unseparated(phone);
            }
            if let Some(location) = patch.location {
                separated.push("latitude = ").push_bind_unseparated(location.lat);
                separated.push("longitude = ").push_bind_unseparated(location.lng);
            }
            if let Some(status) = patch.status {
                separated.push("status = ").push_bind_unseparated(status.as_str());
            }
            separated.push("updated_at = NOW()");
        }

        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING id");

        let updated = qb.build_query_scalar::<Uuid>().fetch_optional(&self.pool).await?;

        match updated {
            Some(id) => self.get_store(id).await,
            None => Ok(None),
        }
    }

    async fn delete_store(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM stores WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::info!("Deleted store {} ({} rows)", id, result.rows_affected());

        Ok(result.rows_affected() > 0)
    }
}
