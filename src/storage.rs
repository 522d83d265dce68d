//! AppStorage — the per-tenant roster the core consumes but does not own.
//!
//! The core assumes single-threaded, strongly consistent access per
//! tenant; the reference implementation here satisfies that with one
//! lock per app record behind a `DashMap`. A durable-backed
//! implementation can swap in behind the same [`AppStorage`] trait
//! without touching [`crate::cache::PointCache`] or the API layer.

use std::sync::RwLock;

use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{GeoError, Result};
use crate::projection::UnitCubeCoord;

pub type AppId = String;
pub type PointId = String;
pub type SubjectId = String;

/// A `(subject_id, priority)` tag on a point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubjectTag {
    pub subject_id: SubjectId,
    pub priority: f64,
}

#[derive(Debug, Clone, Default)]
struct PointRecord {
    subjects: Vec<SubjectTag>,
    coord: Option<UnitCubeCoord>,
}

struct AppRecord {
    auth_key: String,
    hmac_key: [u8; 32],
    max_zoom_level: u8,
    points: RwLock<std::collections::HashMap<PointId, PointRecord>>,
}

/// Contract §4.D consumed by the token/API layer. Implementations must
/// give strongly consistent, single-threaded-equivalent semantics per
/// tenant; failures surface as [`GeoError::NotFound`].
pub trait AppStorage: Send + Sync {
    fn get_auth_key(&self, app_id: &str) -> Result<String>;
    fn get_hmac_key(&self, app_id: &str) -> Result<[u8; 32]>;
    fn get_max_zoom_level(&self, app_id: &str) -> Result<u8>;
    fn has_point(&self, app_id: &str, point_id: &str) -> bool;
    fn get_point_subjects(&self, app_id: &str, point_id: &str) -> Result<Vec<SubjectTag>>;
    fn get_points_coords(
        &self,
        app_id: &str,
        point_ids: &[PointId],
    ) -> Result<Vec<(PointId, UnitCubeCoord)>>;
    fn set_point_coord(&self, app_id: &str, point_id: &str, coord: UnitCubeCoord) -> Result<()>;
    fn add_point(&self, app_id: &str, point_id: &str) -> Result<()>;
    fn delete_point(&self, app_id: &str, point_id: &str) -> Result<()>;
    fn set_point_subjects(
        &self,
        app_id: &str,
        point_id: &str,
        subjects: Vec<SubjectTag>,
    ) -> Result<()>;

    fn create_app(&self, app_id: &str, max_zoom_level: u8) -> Result<String>;
    fn app_count(&self) -> usize;
}

fn random_key(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// In-memory reference implementation of [`AppStorage`], sufficient to
/// run the whole service without an external database.
#[derive(Default)]
pub struct InMemoryAppStorage {
    apps: DashMap<AppId, AppRecord>,
}

impl InMemoryAppStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(app_id: &str) -> GeoError {
        GeoError::NotFound(format!("app {app_id}"))
    }
}

impl AppStorage for InMemoryAppStorage {
    fn get_auth_key(&self, app_id: &str) -> Result<String> {
        self.apps
            .get(app_id)
            .map(|a| a.auth_key.clone())
            .ok_or_else(|| Self::not_found(app_id))
    }

    fn get_hmac_key(&self, app_id: &str) -> Result<[u8; 32]> {
        self.apps
            .get(app_id)
            .map(|a| a.hmac_key)
            .ok_or_else(|| Self::not_found(app_id))
    }

    fn get_max_zoom_level(&self, app_id: &str) -> Result<u8> {
        self.apps
            .get(app_id)
            .map(|a| a.max_zoom_level)
            .ok_or_else(|| Self::not_found(app_id))
    }

    fn has_point(&self, app_id: &str, point_id: &str) -> bool {
        self.apps
            .get(app_id)
            .map(|a| a.points.read().unwrap().contains_key(point_id))
            .unwrap_or(false)
    }

    fn get_point_subjects(&self, app_id: &str, point_id: &str) -> Result<Vec<SubjectTag>> {
        let app = self.apps.get(app_id).ok_or_else(|| Self::not_found(app_id))?;
        let points = app.points.read().unwrap();
        points
            .get(point_id)
            .map(|p| p.subjects.clone())
            .ok_or_else(|| GeoError::NotFound(format!("point {point_id}")))
    }

    fn get_points_coords(
        &self,
        app_id: &str,
        point_ids: &[PointId],
    ) -> Result<Vec<(PointId, UnitCubeCoord)>> {
        let app = self.apps.get(app_id).ok_or_else(|| Self::not_found(app_id))?;
        let points = app.points.read().unwrap();
        Ok(point_ids
            .iter()
            .filter_map(|id| points.get(id).and_then(|p| p.coord).map(|c| (id.clone(), c)))
            .collect())
    }

    fn set_point_coord(&self, app_id: &str, point_id: &str, coord: UnitCubeCoord) -> Result<()> {
        let app = self.apps.get(app_id).ok_or_else(|| Self::not_found(app_id))?;
        let mut points = app.points.write().unwrap();
        let point = points
            .get_mut(point_id)
            .ok_or_else(|| GeoError::NotFound(format!("point {point_id}")))?;
        point.coord = Some(coord);
        Ok(())
    }

    fn add_point(&self, app_id: &str, point_id: &str) -> Result<()> {
        let app = self.apps.get(app_id).ok_or_else(|| Self::not_found(app_id))?;
        app.points
            .write()
            .unwrap()
            .insert(point_id.to_string(), PointRecord::default());
        Ok(())
    }

    fn delete_point(&self, app_id: &str, point_id: &str) -> Result<()> {
        let app = self.apps.get(app_id).ok_or_else(|| Self::not_found(app_id))?;
        app.points.write().unwrap().remove(point_id);
        Ok(())
    }

    fn set_point_subjects(
        &self,
        app_id: &str,
        point_id: &str,
        subjects: Vec<SubjectTag>,
    ) -> Result<()> {
        let app = self.apps.get(app_id).ok_or_else(|| Self::not_found(app_id))?;
        let mut points = app.points.write().unwrap();
        let point = points
            .get_mut(point_id)
            .ok_or_else(|| GeoError::NotFound(format!("point {point_id}")))?;
        point.subjects = subjects;
        Ok(())
    }

    fn create_app(&self, app_id: &str, max_zoom_level: u8) -> Result<String> {
        let auth_key = random_key(16);
        let mut hmac_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut hmac_key);

        self.apps.insert(
            app_id.to_string(),
            AppRecord {
                auth_key: auth_key.clone(),
                hmac_key,
                max_zoom_level,
                points: RwLock::new(std::collections::HashMap::new()),
            },
        );

        Ok(auth_key)
    }

    fn app_count(&self) -> usize {
        self.apps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_app_then_lookup_roundtrips() {
        let storage = InMemoryAppStorage::new();
        let auth_key = storage.create_app("t1", 10).unwrap();
        assert_eq!(storage.get_auth_key("t1").unwrap(), auth_key);
        assert_eq!(storage.get_max_zoom_level("t1").unwrap(), 10);
    }

    #[test]
    fn missing_app_is_not_found() {
        let storage = InMemoryAppStorage::new();
        assert!(matches!(
            storage.get_auth_key("nope"),
            Err(GeoError::NotFound(_))
        ));
    }

    #[test]
    fn points_coords_silently_drops_unknown_ids() {
        let storage = InMemoryAppStorage::new();
        storage.create_app("t1", 5).unwrap();
        storage.add_point("t1", "p0").unwrap();
        storage
            .set_point_coord("t1", "p0", UnitCubeCoord::new(0.1, 0.2, 0.3))
            .unwrap();

        let result = storage
            .get_points_coords("t1", &["p0".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0, "p0");
    }

    #[test]
    fn delete_point_removes_roster_entry() {
        let storage = InMemoryAppStorage::new();
        storage.create_app("t1", 5).unwrap();
        storage.add_point("t1", "p0").unwrap();
        assert!(storage.has_point("t1", "p0"));
        storage.delete_point("t1", "p0").unwrap();
        assert!(!storage.has_point("t1", "p0"));
    }

    #[test]
    fn set_point_subjects_replaces_roster() {
        let storage = InMemoryAppStorage::new();
        storage.create_app("t1", 5).unwrap();
        storage.add_point("t1", "p0").unwrap();
        storage
            .set_point_subjects(
                "t1",
                "p0",
                vec![SubjectTag {
                    subject_id: "s0".into(),
                    priority: 0.5,
                }],
            )
            .unwrap();
        let subjects = storage.get_point_subjects("t1", "p0").unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].priority, 0.5);
    }
}
