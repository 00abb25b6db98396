//! Geographic coordinates in integer micro-degrees.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A WGS84 coordinate stored as integer micro-degrees (1E6).
///
/// Integer storage gives exact equality, which matters because location
/// identity can fall back to coordinate comparison when no stable id
/// exists.
///
/// # Examples
///
/// ```
/// use transit_client::domain::Point;
///
/// let p = Point::from_degrees(48.7836, 9.1824);
/// assert_eq!(p.lat_1e6(), 48_783_600);
/// assert_eq!(p.lon_1e6(), 9_182_400);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    lat: i32,
    lon: i32,
}

impl Point {
    /// Create from raw micro-degree values.
    pub fn from_1e6(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// Create from floating-point degrees, rounding to micro-degrees.
    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            lat: (lat * 1e6).round() as i32,
            lon: (lon * 1e6).round() as i32,
        }
    }

    /// Latitude in micro-degrees.
    pub fn lat_1e6(&self) -> i32 {
        self.lat
    }

    /// Longitude in micro-degrees.
    pub fn lon_1e6(&self) -> i32 {
        self.lon
    }

    /// Latitude in degrees.
    pub fn lat_degrees(&self) -> f64 {
        f64::from(self.lat) / 1e6
    }

    /// Longitude in degrees.
    pub fn lon_degrees(&self) -> f64 {
        f64::from(self.lon) / 1e6
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({}/{})", self.lat, self.lon)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat_degrees(), self.lon_degrees())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Micro-degree storage round-trips exactly.
        #[test]
        fn micro_roundtrip(lat in -90_000_000i32..=90_000_000, lon in -180_000_000i32..=180_000_000) {
            let p = Point::from_1e6(lat, lon);
            prop_assert_eq!(p.lat_1e6(), lat);
            prop_assert_eq!(p.lon_1e6(), lon);
        }

        /// Degrees conversion stays within half a micro-degree.
        #[test]
        fn degrees_close(lat in -90.0f64..=90.0, lon in -180.0f64..=180.0) {
            let p = Point::from_degrees(lat, lon);
            prop_assert!((p.lat_degrees() - lat).abs() <= 5e-7);
            prop_assert!((p.lon_degrees() - lon).abs() <= 5e-7);
        }
    }
}
