use crate::models::domain::{SaleRecord, SaleResult, StoreRecord, StoreResult, StoreSummary};

/// Separator used when image lists are stored as one text column
pub const IMAGE_SEPARATOR: &str = ",";

/// Expand a comma-joined image list into its ordered entries
///
/// Blank segments are dropped, so `""`, `None` and `",,"` all give `[]`.
pub fn split_images(joined: Option<&str>) -> Vec<String> {
    joined
        .map(|s| {
            s.split(IMAGE_SEPARATOR)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Inverse of [`split_images`], used on the write path
pub fn join_images(images: &[String]) -> Option<String> {
    let parts: Vec<&str> = images
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(IMAGE_SEPARATOR))
    }
}

/// A distance is only kept when it is finite, non-negative and inside the radius
pub fn sanitize_distance(distance: Option<f64>, radius_m: Option<u32>) -> Result<Option<f64>, f64> {
    match (distance, radius_m) {
        (None, _) => Ok(None),
        (Some(d), _) if !d.is_finite() || d < 0.0 => Err(d),
        (Some(d), Some(r)) if d > f64::from(r) => Err(d),
        (Some(d), _) => Ok(Some(d)),
    }
}

impl From<SaleRecord> for SaleResult {
    fn from(record: SaleRecord) -> Self {
        let images = split_images(record.images.as_deref());

        let store = record.store_name.map(|name| StoreSummary {
            id: record.store_id,
            name,
            category: record.store_category,
            logo_url: record.store_logo_url,
            address: record.store_address,
            city: record.store_city,
        });

        SaleResult {
            id: record.id,
            store_id: record.store_id,
            title: record.title,
            description: record.description,
            category: record.category,
            discount_percent: record.discount_percent,
            original_price: record.original_price,
            sale_price: record.sale_price,
            images,
            latitude: record.latitude,
            longitude: record.longitude,
            start_date: record.start_date,
            end_date: record.end_date,
            status: record.status,
            views_count: record.views_count,
            created_at: record.created_at,
            updated_at: record.updated_at,
            distance: record.distance,
            store,
        }
    }
}

impl From<StoreRecord> for StoreResult {
    fn from(record: StoreRecord) -> Self {
        StoreResult {
            id: record.id,
            owner_id: record.owner_id,
            name: record.name,
            description: record.description,
            category: record.category,
            logo_url: record.logo_url,
            address: record.address,
            city: record.city,
            phone: record.phone,
            latitude: record.latitude,
            longitude: record.longitude,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            distance: record.distance,
        }
    }
}
