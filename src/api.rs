//! The two geo operations (`UpdatePoint`, `NearestPoints`) plus
//! `PointsCoords`, and the management surface that mints the tokens
//! they require.

use serde::{Deserialize, Serialize};

use crate::cache::{acceptance_radius, collect_neighborhood, CacheEntry};
use crate::error::{GeoError, Result};
use crate::projection::{from_unit_cube, to_unit_cube, GeoCoord, UnitCubeCoord, EARTH_RADIUS_M};
use crate::sector::sector_of;
use crate::storage::{AppStorage, SubjectTag};
use crate::token::{
    mint_app_token, mint_geo_token, validate_app_token, validate_geo_token, AppAuthToken,
    GeoAuthToken, GeoParams,
};
use crate::world::GeoWorld;

pub const DEFAULT_POINTS_LIMIT: usize = 100;

/// One entry in a `NearestPoints` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NearbyPoint {
    pub point_id: String,
    pub coord: GeoCoord,
    pub priority: f64,
    pub distance: f64,
}

/// One entry in a `PointsCoords` response. No `priority` field: the
/// spec's `POINTS_COORDS` output schema is `{ id, coord, distance }`
/// only (§4.E) -- it never carries a per-subject priority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointCoordEntry {
    pub point_id: String,
    pub coord: GeoCoord,
    pub distance: f64,
}

// ---------------------------------------------------------------------------
// Management surface
// ---------------------------------------------------------------------------

pub struct ManagementApi;

impl ManagementApi {
    pub fn create_app(world: &GeoWorld, app_id: &str, max_zoom_level: u8) -> Result<AppAuthToken> {
        world.storage.create_app(app_id, max_zoom_level)?;
        mint_app_token(world.storage.as_ref(), app_id)
    }

    pub fn create_point(world: &GeoWorld, app_token: &AppAuthToken, point_id: &str) -> Result<()> {
        let app_id = validate_app_token(world.storage.as_ref(), app_token)?;
        world.storage.add_point(&app_id, point_id)
    }

    pub fn delete_point(world: &GeoWorld, app_token: &AppAuthToken, point_id: &str) -> Result<()> {
        let app_id = validate_app_token(world.storage.as_ref(), app_token)?;
        world.storage.delete_point(&app_id, point_id)
    }

    pub fn set_point_subjects(
        world: &GeoWorld,
        app_token: &AppAuthToken,
        point_id: &str,
        subjects: Vec<SubjectTag>,
    ) -> Result<()> {
        let app_id = validate_app_token(world.storage.as_ref(), app_token)?;
        world.storage.set_point_subjects(&app_id, point_id, subjects)
    }

    pub fn get_update_point_auth_token(
        world: &GeoWorld,
        app_token: &AppAuthToken,
        point_id: &str,
    ) -> Result<GeoAuthToken> {
        let app_id = validate_app_token(world.storage.as_ref(), app_token)?;
        mint_geo_token(
            world.storage.as_ref(),
            &app_id,
            point_id,
            GeoParams::UpdatePoint,
            world.clock.as_ref(),
        )
    }

    pub fn get_nearest_points_auth_token(
        world: &GeoWorld,
        app_token: &AppAuthToken,
        point_id: &str,
        subject_id: &str,
    ) -> Result<GeoAuthToken> {
        let app_id = validate_app_token(world.storage.as_ref(), app_token)?;
        mint_geo_token(
            world.storage.as_ref(),
            &app_id,
            point_id,
            GeoParams::NearestPoints {
                subject_id: subject_id.to_string(),
            },
            world.clock.as_ref(),
        )
    }

    pub fn get_points_coords_auth_token(
        world: &GeoWorld,
        app_token: &AppAuthToken,
        point_id: &str,
        point_ids: Vec<String>,
    ) -> Result<GeoAuthToken> {
        let app_id = validate_app_token(world.storage.as_ref(), app_token)?;
        mint_geo_token(
            world.storage.as_ref(),
            &app_id,
            point_id,
            GeoParams::PointsCoords { point_ids },
            world.clock.as_ref(),
        )
    }
}

// ---------------------------------------------------------------------------
// Geo surface
// ---------------------------------------------------------------------------

pub struct GeoApi;

impl GeoApi {
    /// `UPDATE_POINT`: project the coord, persist it as the point's
    /// canonical position, then climb each subject's zoom from
    /// `max_zoom_level` down to 0, stopping the first time a sector
    /// rejects admission.
    pub fn update_point(world: &GeoWorld, token: &GeoAuthToken, coord: GeoCoord) -> Result<()> {
        let (app_id, point_id, _) =
            validate_geo_token(world.storage.as_ref(), token, 1, world.clock.as_ref())?;

        let xyz = to_unit_cube(&coord)?;

        let subjects = world.storage.get_point_subjects(&app_id, &point_id)?;
        world.storage.set_point_coord(&app_id, &point_id, xyz)?;
        let max_zoom = world.storage.get_max_zoom_level(&app_id)?;

        for subject in &subjects {
            let mut zoom = max_zoom;
            loop {
                let sector = sector_of(&xyz, zoom);
                let admitted = world.cache.update_point_in_sector(
                    &app_id,
                    &subject.subject_id,
                    sector,
                    &point_id,
                    xyz,
                    subject.priority,
                    world.clock.as_ref(),
                );
                if !admitted || zoom == 0 {
                    break;
                }
                zoom -= 1;
            }
        }

        Ok(())
    }

    /// `NEAREST_POINTS`: descend from a radius-derived (or max) zoom,
    /// collecting the 27-neighborhood at each level, until the
    /// tile-width filter yields more than `points_limit` candidates or
    /// zoom 0 is reached.
    pub fn nearest_points(
        world: &GeoWorld,
        token: &GeoAuthToken,
        coord: Option<GeoCoord>,
        radius: Option<f64>,
        points_limit: Option<usize>,
    ) -> Result<Vec<NearbyPoint>> {
        if points_limit == Some(0) {
            return Err(GeoError::InvalidArgument(
                "points_limit must be positive".to_string(),
            ));
        }

        let (app_id, point_id, params) =
            validate_geo_token(world.storage.as_ref(), token, 2, world.clock.as_ref())?;
        let subject_id = match params {
            GeoParams::NearestPoints { subject_id } => subject_id,
            _ => unreachable!("method_id already checked by validate_geo_token"),
        };

        let xyz = match coord {
            Some(c) => to_unit_cube(&c)?,
            None => {
                let stored = world.storage.get_points_coords(&app_id, &[point_id.clone()])?;
                stored
                    .into_iter()
                    .next()
                    .map(|(_, c)| c)
                    .ok_or_else(|| GeoError::NotFound(format!("coord for point {point_id}")))?
            }
        };

        let limit = points_limit.unwrap_or(DEFAULT_POINTS_LIMIT);
        let max_zoom = world.storage.get_max_zoom_level(&app_id)?;

        let mut zoom = starting_zoom(radius, max_zoom);
        let mut candidates: std::collections::HashMap<String, CacheEntry> =
            std::collections::HashMap::new();
        let mut filtered: Vec<&CacheEntry> = Vec::new();

        loop {
            let round = collect_neighborhood(
                &world.cache,
                &app_id,
                &subject_id,
                &xyz,
                zoom,
                world.clock.as_ref(),
            );
            for (id, entry) in round {
                candidates
                    .entry(id)
                    .and_modify(|existing| {
                        if entry.exp_time > existing.exp_time {
                            *existing = entry.clone();
                        }
                    })
                    .or_insert(entry);
            }

            let max_distance = acceptance_radius(zoom);
            filtered = candidates
                .values()
                .filter(|e| xyz.distance(&e.coord) < max_distance)
                .collect();

            if filtered.len() > limit || zoom == 0 {
                break;
            }
            zoom -= 1;
        }

        let mut results: Vec<NearbyPoint> = filtered
            .iter()
            .map(|e| NearbyPoint {
                point_id: e.point_id.clone(),
                coord: from_unit_cube(&e.coord),
                priority: e.priority,
                distance: xyz.reported_distance(&e.coord),
            })
            .collect();

        results.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
        results.truncate(limit);

        Ok(results)
    }

    /// `POINTS_COORDS`: bulk-resolve the stored coordinates of a fixed
    /// list of points bound into the token, sorted by distance from the
    /// query coordinate.
    pub fn points_coords(
        world: &GeoWorld,
        token: &GeoAuthToken,
        coord: Option<GeoCoord>,
        radius: Option<f64>,
        points_limit: Option<usize>,
    ) -> Result<Vec<PointCoordEntry>> {
        if points_limit == Some(0) {
            return Err(GeoError::InvalidArgument(
                "points_limit must be positive".to_string(),
            ));
        }

        let (app_id, point_id, params) =
            validate_geo_token(world.storage.as_ref(), token, 3, world.clock.as_ref())?;
        let point_ids = match params {
            GeoParams::PointsCoords { point_ids } => point_ids,
            _ => unreachable!("method_id already checked by validate_geo_token"),
        };

        let xyz = match coord {
            Some(c) => to_unit_cube(&c)?,
            None => {
                let stored = world.storage.get_points_coords(&app_id, &[point_id.clone()])?;
                stored
                    .into_iter()
                    .next()
                    .map(|(_, c)| c)
                    .ok_or_else(|| GeoError::NotFound(format!("coord for point {point_id}")))?
            }
        };

        let resolved = world.storage.get_points_coords(&app_id, &point_ids)?;
        let mut entries: Vec<PointCoordEntry> = resolved
            .into_iter()
            .map(|(id, pc)| PointCoordEntry {
                point_id: id,
                coord: from_unit_cube(&pc),
                distance: xyz.reported_distance(&pc),
            })
            .collect();

        if let Some(r) = radius {
            if r > 0.0 {
                entries.retain(|e| e.distance < r);
            }
        }

        entries.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
        entries.truncate(points_limit.unwrap_or(point_ids.len()));

        Ok(entries)
    }
}

/// Starting zoom for `NearestPoints`: `clamp(floor(log2(2R/radius)), 0,
/// max_zoom)` when a radius is given, else `max_zoom`.
fn starting_zoom(radius: Option<f64>, max_zoom: u8) -> u8 {
    match radius {
        Some(r) if r > 0.0 => {
            let mult = (2.0 * EARTH_RADIUS_M) / r;
            let zoom = mult.log2().floor();
            if zoom.is_nan() || zoom < 0.0 {
                0
            } else if zoom > max_zoom as f64 {
                max_zoom
            } else {
                zoom as u8
            }
        }
        _ => max_zoom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use std::sync::Arc;

    fn world() -> GeoWorld {
        GeoWorld::with_clock(Arc::new(TestClock::new(0.0)))
    }

    #[test]
    fn empty_index_query_returns_no_points() {
        let world = world();
        let app_token = ManagementApi::create_app(&world, "t1", 4).unwrap();
        ManagementApi::create_point(&world, &app_token, "p0").unwrap();
        ManagementApi::set_point_subjects(
            &world,
            &app_token,
            "p0",
            vec![SubjectTag {
                subject_id: "s0".into(),
                priority: 0.5,
            }],
        )
        .unwrap();
        let token =
            ManagementApi::get_nearest_points_auth_token(&world, &app_token, "p0", "s0").unwrap();

        let results = GeoApi::nearest_points(
            &world,
            &token,
            Some(GeoCoord::new(0.0, 0.0, 0.0)),
            None,
            Some(10),
        )
        .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn single_point_self_match() {
        let world = world();
        let app_token = ManagementApi::create_app(&world, "t1", 4).unwrap();
        ManagementApi::create_point(&world, &app_token, "p0").unwrap();
        ManagementApi::set_point_subjects(
            &world,
            &app_token,
            "p0",
            vec![SubjectTag {
                subject_id: "s0".into(),
                priority: 0.5,
            }],
        )
        .unwrap();

        let update_token = ManagementApi::get_update_point_auth_token(&world, &app_token, "p0")
            .unwrap();
        GeoApi::update_point(&world, &update_token, GeoCoord::new(0.0, 0.0, 0.0)).unwrap();

        let nearest_token =
            ManagementApi::get_nearest_points_auth_token(&world, &app_token, "p0", "s0").unwrap();
        let results = GeoApi::nearest_points(
            &world,
            &nearest_token,
            Some(GeoCoord::new(0.0, 0.0, 0.0)),
            None,
            Some(10),
        )
        .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].point_id, "p0");
        assert!(results[0].distance < 1e-6);
    }

    #[test]
    fn update_token_cannot_be_used_for_nearest_points() {
        let world = world();
        let app_token = ManagementApi::create_app(&world, "t1", 4).unwrap();
        ManagementApi::create_point(&world, &app_token, "p0").unwrap();
        let update_token =
            ManagementApi::get_update_point_auth_token(&world, &app_token, "p0").unwrap();

        let result =
            GeoApi::nearest_points(&world, &update_token, Some(GeoCoord::new(0.0, 0.0, 0.0)), None, None);
        assert!(matches!(result, Err(GeoError::AuthFailed(_))));
    }

    #[test]
    fn zoom_climb_stops_on_first_rejection() {
        let world = world();
        let app_token = ManagementApi::create_app(&world, "t1", 3).unwrap();

        // Fill the z=1 sector containing (0.5, 0.5, 0.5) for s0 with
        // 125 high-priority entries directly in the cache.
        let filler_sector = sector_of(&UnitCubeCoord::new(0.5, 0.5, 0.5), 1);
        for i in 0..125 {
            world.cache.update_point_in_sector(
                "t1",
                "s0",
                filler_sector,
                &format!("filler{i}"),
                UnitCubeCoord::new(0.5, 0.5, 0.5),
                0.9,
                world.clock.as_ref(),
            );
        }

        ManagementApi::create_point(&world, &app_token, "p0").unwrap();
        ManagementApi::set_point_subjects(
            &world,
            &app_token,
            "p0",
            vec![SubjectTag {
                subject_id: "s0".into(),
                priority: 0.1,
            }],
        )
        .unwrap();
        let update_token =
            ManagementApi::get_update_point_auth_token(&world, &app_token, "p0").unwrap();
        GeoApi::update_point(&world, &update_token, GeoCoord::new(0.0, 0.0, -6371000.0)).unwrap();

        // elev = -EARTH_RADIUS_M collapses r to 0, projecting to exactly
        // (0.5, 0.5, 0.5) -- the same cube point the filler sector used.
        let zero_sector = sector_of(&UnitCubeCoord::new(0.5, 0.5, 0.5), 0);
        let zero_entries =
            world
                .cache
                .get_points_in_sector("t1", "s0", zero_sector, world.clock.as_ref());
        assert!(zero_entries.iter().all(|e| !e.point_id.starts_with("p0")));
    }

    #[test]
    fn radius_driven_starting_zoom_matches_expected_level() {
        assert_eq!(starting_zoom(Some(100_000.0), 20), 6);
    }

    #[test]
    fn starting_zoom_without_radius_is_max_zoom() {
        assert_eq!(starting_zoom(None, 20), 20);
    }

    #[test]
    fn points_coords_drops_missing_ids_and_respects_radius() {
        let world = world();
        let app_token = ManagementApi::create_app(&world, "t1", 4).unwrap();
        ManagementApi::create_point(&world, &app_token, "p0").unwrap();
        ManagementApi::create_point(&world, &app_token, "p1").unwrap();

        let update_token =
            ManagementApi::get_update_point_auth_token(&world, &app_token, "p0").unwrap();
        GeoApi::update_point(&world, &update_token, GeoCoord::new(0.0, 0.0, 0.0)).unwrap();
        let update_token =
            ManagementApi::get_update_point_auth_token(&world, &app_token, "p1").unwrap();
        GeoApi::update_point(&world, &update_token, GeoCoord::new(45.0, 45.0, 0.0)).unwrap();

        let coords_token = ManagementApi::get_points_coords_auth_token(
            &world,
            &app_token,
            "p0",
            vec!["p0".to_string(), "p1".to_string(), "ghost".to_string()],
        )
        .unwrap();

        let results = GeoApi::points_coords(
            &world,
            &coords_token,
            Some(GeoCoord::new(0.0, 0.0, 0.0)),
            None,
            None,
        )
        .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].point_id, "p0");
    }
}
