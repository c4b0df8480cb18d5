use geo::GeodesicDistance;
use serde::{Deserialize, Serialize};

/// SRID of the geographic reference system used for every stored location
pub const SRID_WGS84: i32 = 4326;

/// A geographic point in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both coordinates are finite and inside their ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Geodesic distance to `other` in meters, measured on the WGS84 ellipsoid
    ///
    /// Matches what `ST_Distance` returns for `geography` columns.
    #[inline]
    pub fn distance_to(&self, other: &Point) -> f64 {
        let a = geo::Point::new(self.lng, self.lat);
        let b = geo::Point::new(other.lng, other.lat);
        a.geodesic_distance(&b)
    }
}
