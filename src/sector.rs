//! Multi-resolution sector index.
//!
//! At zoom `z` the unit cube is divided into `2^z` buckets per axis.
//! Sector ids are plain integer grid coordinates; the 27-neighborhood of
//! a sector (including itself) is the candidate set a query scans.

use serde::{Deserialize, Serialize};

use crate::projection::UnitCubeCoord;

/// A sector bucket coordinate at a given zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectorId {
    pub ix: i64,
    pub iy: i64,
    pub iz: i64,
    pub zoom: u8,
}

impl SectorId {
    pub fn new(ix: i64, iy: i64, iz: i64, zoom: u8) -> Self {
        Self { ix, iy, iz, zoom }
    }
}

/// Number of buckets per axis at a given zoom.
pub fn tiles_per_axis(zoom: u8) -> i64 {
    1i64 << zoom
}

/// Width of a single tile (in unit-cube units) at a given zoom.
pub fn tile_size(zoom: u8) -> f64 {
    1.0 / tiles_per_axis(zoom) as f64
}

/// Locate the sector containing `coord` at `zoom`.
///
/// Sector indices falling outside `[0, 2^zoom)` never arise from this
/// function (the coordinate is clamped into the cube by the caller's
/// projection step), but neighbor indices produced by
/// [`neighborhood_27`] may legitimately fall outside that range; such
/// sectors simply never hold entries.
pub fn sector_of(coord: &UnitCubeCoord, zoom: u8) -> SectorId {
    let n = tiles_per_axis(zoom);
    let bucket = |v: f64| -> i64 {
        let raw = (v * n as f64).floor() as i64;
        raw.clamp(0, n - 1)
    };

    SectorId::new(bucket(coord.x), bucket(coord.y), bucket(coord.z), zoom)
}

/// The 27 neighboring sectors of `sector` (including `sector` itself) at
/// the same zoom level. Out-of-range neighbors are included verbatim;
/// they are resolved to empty buckets by the cache.
pub fn neighborhood_27(sector: &SectorId) -> [SectorId; 27] {
    let mut out = [SectorId::new(0, 0, 0, sector.zoom); 27];
    let mut i = 0;
    for dz in -1..=1 {
        for dy in -1..=1 {
            for dx in -1..=1 {
                out[i] = SectorId::new(
                    sector.ix + dx,
                    sector.iy + dy,
                    sector.iz + dz,
                    sector.zoom,
                );
                i += 1;
            }
        }
    }
    out
}
