//! Great-circle distance on a spherical Earth.

/// Mean Earth radius used by every distance in the crate.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A coordinate pre-converted for repeated haversine evaluation.
///
/// Matching a sample against every stop on a route evaluates the same stop
/// coordinates many times, so radians and the latitude cosine are computed
/// once up front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    lat_rad: f64,
    lon_rad: f64,
    cos_lat: f64,
}

impl GeoPoint {
    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        let lat_rad = lat.to_radians();
        Self {
            lat_rad,
            lon_rad: lon.to_radians(),
            cos_lat: lat_rad.cos(),
        }
    }

    /// Builds a point only when both coordinates are present and finite.
    pub fn from_optional(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
        match (lat, lon) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                Some(Self::from_degrees(lat, lon))
            }
            _ => None,
        }
    }

    /// Haversine distance in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let half_dlat = (other.lat_rad - self.lat_rad) / 2.0;
        let half_dlon = (other.lon_rad - self.lon_rad) / 2.0;

        let a = half_dlat.sin().powi(2) + self.cos_lat * other.cos_lat * half_dlon.sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();

        EARTH_RADIUS_M * c
    }
}

/// Haversine distance in meters between two coordinates given in degrees.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    GeoPoint::from_degrees(lat1, lon1).distance_m(&GeoPoint::from_degrees(lat2, lon2))
}
