use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::core::normalize::sanitize_distance;
use crate::core::query::{EntityKind, SearchDefaults, SearchPlan, SearchQuery, Searchable};
use crate::models::domain::{SaleResult, StoreResult};
use crate::models::NearbyParams;
use crate::services::storage::{Storage, StoreError};

/// Errors the composer reports to its caller
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Storage unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// Which execution path produced a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Distance-ranked and radius-filtered
    Geo,
    /// Attribute filters only, newest first, no distances
    Fallback,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Geo => "geo",
            SearchMode::Fallback => "fallback",
        }
    }
}

/// Ordered rows plus the path that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome<T> {
    pub rows: Vec<T>,
    pub mode: SearchMode,
}

impl<T> SearchOutcome<T> {
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> SearchOutcome<U> {
        SearchOutcome {
            rows: self.rows.into_iter().map(f).collect(),
            mode: self.mode,
        }
    }
}

/// Nearby search over sales and stores
///
/// Prefers a distance-ranked query and degrades to an attribute-only query
/// when the backend cannot do spatial work. Geo capability is probed once
/// at construction; a failing primary query still falls back per request.
#[derive(Clone)]
pub struct NearbyComposer {
    storage: Arc<dyn Storage>,
    defaults: SearchDefaults,
    geo_capable: bool,
}

impl NearbyComposer {
    /// Build a composer, asking the backend whether it supports spatial queries
    pub async fn probe(storage: Arc<dyn Storage>, defaults: SearchDefaults) -> Self {
        let geo_capable = storage.probe_geo().await;
        if !geo_capable {
            tracing::warn!("Storage reports no geospatial support; nearby search runs in fallback mode");
        }
        Self::with_capability(storage, defaults, geo_capable)
    }

    pub fn with_capability(storage: Arc<dyn Storage>, defaults: SearchDefaults, geo_capable: bool) -> Self {
        Self {
            storage,
            defaults,
            geo_capable,
        }
    }

    pub fn geo_capable(&self) -> bool {
        self.geo_capable
    }

    pub fn defaults(&self) -> &SearchDefaults {
        &self.defaults
    }

    /// Validate raw parameters against this composer's defaults
    pub fn parse(&self, params: &NearbyParams) -> Result<SearchQuery, ComposeError> {
        SearchQuery::from_params(params, &self.defaults)
    }

    /// Active, currently valid sales near the query origin
    pub async fn nearby_sales(&self, query: &SearchQuery) -> Result<SearchOutcome<SaleResult>, ComposeError> {
        let storage = Arc::clone(&self.storage);
        let outcome = self
            .run(query, EntityKind::Sale, move |plan| {
                let storage = Arc::clone(&storage);
                async move { storage.search_sales(&plan).await }
            })
            .await?;

        Ok(outcome.map(SaleResult::from))
    }

    /// Active stores near the query origin
    pub async fn nearby_stores(&self, query: &SearchQuery) -> Result<SearchOutcome<StoreResult>, ComposeError> {
        let storage = Arc::clone(&self.storage);
        let outcome = self
            .run(query, EntityKind::Store, move |plan| {
                let storage = Arc::clone(&storage);
                async move { storage.search_stores(&plan).await }
            })
            .await?;

        Ok(outcome.map(StoreResult::from))
    }

    /// Best-effort view counter bump on a detached task
    ///
    /// At most once; failures are logged and dropped, never reported.
    pub fn record_view(&self, sale_id: Uuid) {
        let storage = Arc::clone(&self.storage);
        tokio::spawn(async move {
            if let Err(e) = storage.increment_sale_views(sale_id).await {
                tracing::debug!("Dropped view count update for sale {}: {}", sale_id, e);
            }
        });
    }

    async fn run<R, F, Fut>(
        &self,
        query: &SearchQuery,
        kind: EntityKind,
        fetch: F,
    ) -> Result<SearchOutcome<R>, ComposeError>
    where
        R: Searchable,
        F: Fn(SearchPlan) -> Fut,
        Fut: Future<Output = Result<Vec<R>, StoreError>>,
    {
        let now = Utc::now();

        if self.geo_capable {
            match fetch(SearchPlan::primary(query, kind, now)).await {
                Ok(rows) => {
                    let fetched = rows.len();
                    let rows = Self::within_radius(rows, query.radius_m());
                    if rows.len() < fetched {
                        tracing::warn!(
                            "Nearby {:?} page short by {} rows after radius check (limit {})",
                            kind,
                            fetched - rows.len(),
                            query.page().limit
                        );
                    }
                    tracing::debug!("Nearby {:?} search returned {} rows (geo)", kind, rows.len());
                    return Ok(SearchOutcome {
                        rows,
                        mode: SearchMode::Geo,
                    });
                }
                Err(e) => {
                    tracing::warn!("Geo search for {:?} failed, falling back to attribute filters: {}", kind, e);
                }
            }
        }

        let rows = fetch(SearchPlan::fallback(query, kind, now))
            .await
            .map_err(|e| {
                tracing::error!("Fallback search for {:?} failed: {}", kind, e);
                ComposeError::UpstreamUnavailable(e.to_string())
            })?
            .into_iter()
            .map(|mut row| {
                row.set_distance(None);
                row
            })
            .collect::<Vec<_>>();

        tracing::debug!("Nearby {:?} search returned {} rows (fallback)", kind, rows.len());

        Ok(SearchOutcome {
            rows,
            mode: SearchMode::Fallback,
        })
    }

    /// Drop rows whose reported distance breaks the radius contract
    ///
    /// Runs after the backend applied limit and offset, so a dropped row
    /// shortens the page instead of being replaced by the next one.
    fn within_radius<R: Searchable>(rows: Vec<R>, radius_m: u32) -> Vec<R> {
        rows.into_iter()
            .filter(|row| match sanitize_distance(row.distance(), Some(radius_m)) {
                Ok(_) => true,
                Err(d) => {
                    tracing::warn!("Discarding row {} with distance {} outside radius {}", row.id(), d, radius_m);
                    false
                }
            })
            .collect()
    }
}
