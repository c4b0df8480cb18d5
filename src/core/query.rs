use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::core::composer::ComposeError;
use crate::core::geo::Point;
use crate::models::domain::{SaleRecord, StoreRecord, STATUS_ACTIVE};
use crate::models::NearbyParams;

/// Hard ceiling on page size, whatever the configuration says
pub const MAX_LIMIT: u32 = 100;

/// Defaults applied when a caller leaves a parameter out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchDefaults {
    pub radius_m: u32,
    pub limit: u32,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            radius_m: 5000,
            limit: 50,
        }
    }
}

/// Which table a search runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Sale,
    Store,
}

/// Validated nearby search, built once per request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    origin: Point,
    radius_m: u32,
    category: Option<String>,
    min_discount: Option<i32>,
    page: Page,
}

impl SearchQuery {
    /// Validate raw request parameters
    ///
    /// A zero coordinate counts as missing. Radius, limit and offset are
    /// normalized rather than rejected; a negative discount is rejected.
    /// The category is trimmed, then matched exactly.
    pub fn from_params(params: &NearbyParams, defaults: &SearchDefaults) -> Result<Self, ComposeError> {
        let lat = params.lat.filter(|v| *v != 0.0);
        let lng = params.lng.filter(|v| *v != 0.0);

        let origin = match (lat, lng) {
            (Some(lat), Some(lng)) => Point::new(lat, lng),
            _ => {
                return Err(ComposeError::InvalidQuery(
                    "lat and lng are required and must be non-zero".to_string(),
                ))
            }
        };

        if !origin.is_valid() {
            return Err(ComposeError::InvalidQuery(format!(
                "coordinates out of range: lat={}, lng={}",
                origin.lat, origin.lng
            )));
        }

        let radius_m = match params.radius {
            Some(r) if r > 0 => u32::try_from(r).unwrap_or(u32::MAX),
            _ => defaults.radius_m,
        };

        let min_discount = match params.min_discount {
            Some(d) if d < 0 => {
                return Err(ComposeError::InvalidQuery(
                    "minDiscount must be non-negative".to_string(),
                ))
            }
            Some(d) => Some(i32::try_from(d).unwrap_or(i32::MAX)),
            None => None,
        };

        let category = params
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let limit = params
            .limit
            .map(|l| l.clamp(1, i64::from(MAX_LIMIT)) as u32)
            .unwrap_or_else(|| defaults.limit.clamp(1, MAX_LIMIT));
        let offset = params.offset.map(|o| o.max(0) as u64).unwrap_or(0);

        Ok(Self {
            origin,
            radius_m,
            category,
            min_discount,
            page: Page { limit, offset },
        })
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn radius_m(&self) -> u32 {
        self.radius_m
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn min_discount(&self) -> Option<i32> {
        self.min_discount
    }

    pub fn page(&self) -> Page {
        self.page
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u64,
}

/// One filter condition of a search plan
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Status(String),
    /// Validity window contains the instant (sales only)
    ActiveAt(DateTime<Utc>),
    Category(String),
    MinDiscount(i32),
    WithinRadius { origin: Point, radius_m: u32 },
}

impl Predicate {
    pub fn is_spatial(&self) -> bool {
        matches!(self, Predicate::WithinRadius { .. })
    }

    /// Evaluate against an in-process row
    pub fn accepts<T: Searchable>(&self, item: &T) -> bool {
        match self {
            Predicate::Status(status) => item.status() == status,
            Predicate::ActiveAt(at) => item
                .validity()
                .map(|(start, end)| start <= *at && *at <= end)
                .unwrap_or(true),
            Predicate::Category(category) => item.category() == Some(category.as_str()),
            // NULL discount never satisfies a minimum, same as SQL
            Predicate::MinDiscount(min) => item.discount_percent().is_some_and(|d| d >= *min),
            Predicate::WithinRadius { origin, radius_m } => {
                origin.distance_to(&item.location()) <= f64::from(*radius_m)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Nearest first, id as tie-break
    DistanceAsc,
    /// Newest first, id as tie-break
    CreatedDesc,
}

/// Structured search handed to a storage backend
///
/// Backends either render it to SQL or evaluate it in process; they never
/// receive raw SQL fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    pub kind: EntityKind,
    pub predicates: Vec<Predicate>,
    pub order: SortOrder,
    pub page: Page,
    /// Set when the backend must compute `distance`
    pub origin: Option<Point>,
}

impl SearchPlan {
    /// Distance-annotated plan with radius containment
    pub fn primary(query: &SearchQuery, kind: EntityKind, now: DateTime<Utc>) -> Self {
        let mut predicates = Self::attribute_predicates(query, kind, now);
        predicates.push(Predicate::WithinRadius {
            origin: query.origin(),
            radius_m: query.radius_m(),
        });

        Self {
            kind,
            predicates,
            order: SortOrder::DistanceAsc,
            page: query.page(),
            origin: Some(query.origin()),
        }
    }

    /// Same filters without any spatial work, newest first
    pub fn fallback(query: &SearchQuery, kind: EntityKind, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            predicates: Self::attribute_predicates(query, kind, now),
            order: SortOrder::CreatedDesc,
            page: query.page(),
            origin: None,
        }
    }

    fn attribute_predicates(query: &SearchQuery, kind: EntityKind, now: DateTime<Utc>) -> Vec<Predicate> {
        let mut predicates = vec![Predicate::Status(STATUS_ACTIVE.to_string())];

        if kind == EntityKind::Sale {
            predicates.push(Predicate::ActiveAt(now));
        }
        if let Some(category) = query.category() {
            predicates.push(Predicate::Category(category.to_string()));
        }
        if kind == EntityKind::Sale {
            if let Some(min) = query.min_discount() {
                predicates.push(Predicate::MinDiscount(min));
            }
        }

        predicates
    }

    pub fn is_spatial(&self) -> bool {
        self.origin.is_some() || self.predicates.iter().any(Predicate::is_spatial)
    }

    /// Run the plan over in-memory rows: annotate, filter, sort, paginate
    pub fn evaluate<T, I>(&self, rows: I) -> Vec<T>
    where
        T: Searchable,
        I: IntoIterator<Item = T>,
    {
        let mut matched: Vec<T> = rows
            .into_iter()
            .map(|mut row| {
                let distance = self.origin.map(|o| o.distance_to(&row.location()));
                row.set_distance(distance);
                row
            })
            .filter(|row| self.predicates.iter().all(|p| p.accepts(row)))
            .collect();

        match self.order {
            SortOrder::DistanceAsc => matched.sort_by(|a, b| {
                a.distance()
                    .partial_cmp(&b.distance())
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id().cmp(&b.id()))
            }),
            SortOrder::CreatedDesc => matched.sort_by(|a, b| {
                b.created_at()
                    .cmp(&a.created_at())
                    .then_with(|| a.id().cmp(&b.id()))
            }),
        }

        matched
            .into_iter()
            .skip(usize::try_from(self.page.offset).unwrap_or(usize::MAX))
            .take(self.page.limit as usize)
            .collect()
    }
}

/// Row shape a plan can be evaluated against
pub trait Searchable {
    fn id(&self) -> Uuid;
    fn location(&self) -> Point;
    fn status(&self) -> &str;
    fn category(&self) -> Option<&str>;
    fn created_at(&self) -> DateTime<Utc>;
    fn distance(&self) -> Option<f64>;
    fn set_distance(&mut self, distance: Option<f64>);

    fn discount_percent(&self) -> Option<i32> {
        None
    }

    fn validity(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        None
    }
}

impl Searchable for SaleRecord {
    fn id(&self) -> Uuid {
        self.id
    }

    fn location(&self) -> Point {
        SaleRecord::location(self)
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn distance(&self) -> Option<f64> {
        self.distance
    }

    fn set_distance(&mut self, distance: Option<f64>) {
        self.distance = distance;
    }

    fn discount_percent(&self) -> Option<i32> {
        self.discount_percent
    }

    fn validity(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.start_date, self.end_date))
    }
}

impl Searchable for StoreRecord {
    fn id(&self) -> Uuid {
        self.id
    }

    fn location(&self) -> Point {
        StoreRecord::location(self)
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn distance(&self) -> Option<f64> {
        self.distance
    }

    fn set_distance(&mut self, distance: Option<f64>) {
        self.distance = distance;
    }
}
