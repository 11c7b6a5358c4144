use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Numeric identifier for a charge station (the AFDC `ID` column).
pub type StationId = i64;

/// Mean Earth radius used by the great-circle formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Latitude within [-90, 90] and longitude within [-180, 180].
    pub fn is_in_range(&self) -> bool {
        self.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Bit pattern identifying the position for duplicate detection.
    ///
    /// `-0.0` maps to the same key as `0.0`.
    pub fn identity_key(&self) -> (u64, u64) {
        ((self.lat + 0.0).to_bits(), (self.lng + 0.0).to_bits())
    }

    /// Great-circle distance to another coordinate in kilometres.
    ///
    /// Uses the haversine form of the central angle, which stays well
    /// conditioned for the short distances that dominate clustering.
    pub fn distance_to(&self, other: &Self) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let lat_diff = (lat1 - lat2).abs();
        let lng_diff = (self.lng - other.lng).to_radians().abs();

        let h = hav(lat_diff) + (1.0 - hav(lat_diff) - hav(lat1 + lat2)) * hav(lng_diff);
        // Rounding can push h a hair outside [0, 1] for antipodal points.
        let central_angle = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();
        EARTH_RADIUS_KM * central_angle
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

fn hav(angle: f64) -> f64 {
    (angle / 2.0).sin().powi(2)
}

/// Great-circle distance in kilometres between two stations.
pub fn great_circle_km(a: &Station, b: &Station) -> f64 {
    a.coord.distance_to(&b.coord)
}

/// A DC fast-charging station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub coord: Coordinate,
    pub name: Option<String>,
    pub address: Option<String>,
    pub hours: Option<String>,
    pub phone: Option<String>,
    pub open_date: Option<NaiveDate>,
    pub fast_chargers: u32,
}

impl Station {
    /// Minimal station with only an id and a position, mostly useful in tests
    /// and fixtures.
    pub fn at(id: StationId, lat: f64, lng: f64) -> Self {
        Self {
            id,
            coord: Coordinate::new(lat, lng),
            name: None,
            address: None,
            hours: None,
            phone: None,
            open_date: None,
            fast_chargers: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name shown to users, falling back to the identifier.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("station {}", self.id))
    }
}

/// Canonical unordered station pair, stored as `(min_id, max_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(StationId, StationId);

impl PairKey {
    pub fn new(a: StationId, b: StationId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn low(&self) -> StationId {
        self.0
    }

    pub fn high(&self) -> StationId {
        self.1
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saskatoon_to_kyiv_matches_reference() {
        let saskatoon = Coordinate::new(52.133174, -106.630807);
        let kyiv = Coordinate::new(50.401793, 30.449782);
        assert_eq!(saskatoon.distance_to(&kyiv).round(), 7920.0);
    }

    #[test]
    fn five_degrees_on_equator() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 5.0);
        let d = a.distance_to(&b);
        assert!((d - 555.97).abs() < 0.1, "got {d}");
        assert!((b.distance_to(&a) - d).abs() < 1e-9);
    }

    #[test]
    fn coincident_points_are_zero_apart() {
        let a = Coordinate::new(43.65, -79.38);
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn signed_zero_has_one_identity() {
        let positive = Coordinate::new(0.0, 12.5);
        let negative = Coordinate::new(-0.0, 12.5);
        assert_eq!(positive.identity_key(), negative.identity_key());
        let shifted = Coordinate::new(0.0, 12.6);
        assert_ne!(positive.identity_key(), shifted.identity_key());
    }

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(PairKey::new(7, 3), PairKey::new(3, 7));
        assert_eq!(PairKey::new(7, 3).low(), 3);
        assert_eq!(PairKey::new(7, 3).high(), 7);
    }

    #[test]
    fn range_check_rejects_bad_latitude() {
        assert!(!Coordinate::new(91.0, 0.0).is_in_range());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_in_range());
        assert!(Coordinate::new(-45.0, 170.0).is_in_range());
    }
}
