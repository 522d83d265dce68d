//! Geodetic <-> unit-cube projection.
//!
//! Not an equal-area projection: its only job is to make sector
//! bucketization a cheap integer multiplication. Distances computed in
//! unit-cube space are reported back to callers scaled by `EARTH_RADIUS_M
//! * 4`, preserved verbatim from the source system's wire contract (see
//! [`UnitCubeCoord::reported_distance`]).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in meters. <http://en.wikipedia.org/wiki/Earth_radius>
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(String),
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(String),
}

/// A geodetic coordinate: latitude/longitude in degrees, elevation in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoord {
    pub lat: f64,
    pub lon: f64,
    pub elev: f64,
}

impl GeoCoord {
    pub fn new(lat: f64, lon: f64, elev: f64) -> Self {
        Self { lat, lon, elev }
    }

    fn validate(&self) -> Result<(), ProjectionError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(ProjectionError::LatitudeOutOfRange(self.lat.to_string()));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(ProjectionError::LongitudeOutOfRange(self.lon.to_string()));
        }
        Ok(())
    }
}

/// A point in the unit cube `[0, 1]^3`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitCubeCoord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl UnitCubeCoord {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn squared_distance(&self, other: &UnitCubeCoord) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, other: &UnitCubeCoord) -> f64 {
        self.squared_distance(other).sqrt()
    }

    /// Empirical cube-distance-to-meters scale, preserved from the
    /// original system's wire contract. Not true geodesic distance.
    pub fn reported_distance(&self, other: &UnitCubeCoord) -> f64 {
        self.distance(other) * EARTH_RADIUS_M * 4.0
    }
}

fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

/// Project a geodetic coordinate into the unit cube.
pub fn to_unit_cube(coord: &GeoCoord) -> Result<UnitCubeCoord, ProjectionError> {
    coord.validate()?;

    let phi = coord.lat.to_radians();
    let gamma = coord.lon.to_radians();

    let elevation = clamp(coord.elev / EARTH_RADIUS_M, -1.0, 1.0);
    let r = 1.0 + elevation;

    let r_xy = r * phi.cos();
    let x = r_xy * gamma.cos();
    let y = r_xy * gamma.sin();
    let z = r * phi.sin();

    Ok(UnitCubeCoord::new(
        0.25 * x + 0.5,
        0.25 * y + 0.5,
        0.25 * z + 0.5,
    ))
}

/// Inverse of [`to_unit_cube`].
pub fn from_unit_cube(coord: &UnitCubeCoord) -> GeoCoord {
    let x = coord.x * 4.0 - 2.0;
    let y = coord.y * 4.0 - 2.0;
    let z = coord.z * 4.0 - 2.0;

    let r = (x * x + y * y + z * z).sqrt();
    if r == 0.0 {
        return GeoCoord::new(0.0, 0.0, -EARTH_RADIUS_M);
    }

    let phi = (z / r).asin();
    let r_xy = r * phi.cos();
    let mut gamma = if r_xy == 0.0 { 0.0 } else { (y / r_xy).asin() };

    if x < 0.0 {
        gamma = if y > 0.0 {
            std::f64::consts::PI - gamma
        } else {
            -std::f64::consts::PI - gamma
        };
    }

    let elev = (r - 1.0) * EARTH_RADIUS_M;

    GeoCoord::new(phi.to_degrees(), gamma.to_degrees(), elev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_coord() {
        let original = GeoCoord::new(37.7749, -122.4194, 0.0);
        let cube = to_unit_cube(&original).unwrap();
        let back = from_unit_cube(&cube);
        assert!((back.lat - original.lat).abs() < 1e-6);
        assert!((back.lon - original.lon).abs() < 1e-6);
        assert!((back.elev - original.elev).abs() < 1e-3);
    }

    #[test]
    fn round_trip_with_elevation() {
        let original = GeoCoord::new(-10.0, 45.0, 1200.0);
        let cube = to_unit_cube(&original).unwrap();
        let back = from_unit_cube(&cube);
        assert!((back.lat - original.lat).abs() < 1e-6);
        assert!((back.lon - original.lon).abs() < 1e-6);
        assert!((back.elev - original.elev).abs() < 1e-3);
    }

    #[test]
    fn unit_cube_output_is_bounded() {
        let cube = to_unit_cube(&GeoCoord::new(90.0, 180.0, 50_000.0)).unwrap();
        assert!((0.0..=1.0).contains(&cube.x));
        assert!((0.0..=1.0).contains(&cube.y));
        assert!((0.0..=1.0).contains(&cube.z));
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        assert!(to_unit_cube(&GeoCoord::new(91.0, 0.0, 0.0)).is_err());
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        assert!(to_unit_cube(&GeoCoord::new(0.0, 181.0, 0.0)).is_err());
    }

    #[test]
    fn elevation_clamps_beyond_one_earth_radius() {
        let far_above = to_unit_cube(&GeoCoord::new(0.0, 0.0, 100_000_000.0)).unwrap();
        let at_limit = to_unit_cube(&GeoCoord::new(0.0, 0.0, EARTH_RADIUS_M)).unwrap();
        assert!((far_above.x - at_limit.x).abs() < 1e-9);
    }

    #[test]
    fn zero_vector_maps_to_south_pole_center() {
        let origin = UnitCubeCoord::new(0.5, 0.5, 0.5);
        let geo = from_unit_cube(&origin);
        assert_eq!(geo.lat, 0.0);
        assert_eq!(geo.lon, 0.0);
        assert_eq!(geo.elev, -EARTH_RADIUS_M);
    }

    #[test]
    fn reported_distance_applies_r4_scale() {
        let a = UnitCubeCoord::new(0.0, 0.0, 0.0);
        let b = UnitCubeCoord::new(1.0, 0.0, 0.0);
        assert_eq!(a.reported_distance(&b), EARTH_RADIUS_M * 4.0);
    }
}
