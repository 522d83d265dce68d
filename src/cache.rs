//! The PointCache engine — a bounded, TTL'd, priority-ranked multimap
//! keyed by `(app_id, subject_id, sector_id, zoom)`.
//!
//! This is the hard part of the system: sub-logarithmic nearest-neighbor
//! queries without ever scanning the full point set, built out of
//! bounded per-sector buckets admitted by a priority floor and aged out
//! by TTL.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, Instant};
use crate::projection::UnitCubeCoord;
use crate::sector::{neighborhood_27, sector_of, tile_size, SectorId};

/// Per-sector bucket capacity.
pub const MAX_POINTS_PER_SECTOR: usize = 125;

/// Freshness window for a cache entry, independent of token TTL.
pub const ENTRY_TTL_SECS: f64 = 60.0;

pub type PointId = String;

/// The full key a `PointCache` bucket is addressed by: `(app_id,
/// subject_id, sector_id, zoom)` (zoom lives inside `SectorId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SectorKey {
    app: String,
    subject: String,
    sector: SectorId,
}

/// A record stored inside a sector bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub point_id: PointId,
    pub coord: UnitCubeCoord,
    pub priority: f64,
    pub exp_time: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.exp_time > now
    }
}

/// An unordered collection of at most [`MAX_POINTS_PER_SECTOR`] live
/// entries, unique by `point_id`.
#[derive(Debug, Default, Clone)]
pub struct SectorBucket {
    entries: Vec<CacheEntry>,
}

impl SectorBucket {
    fn purge_expired(&mut self, now: Instant) {
        self.entries.retain(|e| e.is_live(now));
    }

    /// Insert or update `point_id`'s entry. Returns whether admission
    /// succeeded. See [`PointCache::update_point_in_sector`] for the
    /// full admission algorithm this implements.
    fn update(&mut self, point_id: &str, coord: UnitCubeCoord, priority: f64, exp_time: Instant) -> bool {
        let mut min_priority_index: Option<usize> = None;
        let mut existing_index: Option<usize> = None;

        for (i, entry) in self.entries.iter().enumerate() {
            if entry.point_id == point_id {
                existing_index = Some(i);
                break;
            }
            let is_lower = match min_priority_index {
                None => true,
                Some(m) => entry.priority < self.entries[m].priority,
            };
            if is_lower {
                min_priority_index = Some(i);
            }
        }

        if let Some(i) = existing_index {
            let entry = &mut self.entries[i];
            entry.coord = coord;
            entry.priority = priority;
            entry.exp_time = exp_time;
            return true;
        }

        if self.entries.len() < MAX_POINTS_PER_SECTOR {
            self.entries.push(CacheEntry {
                point_id: point_id.to_string(),
                coord,
                priority,
                exp_time,
            });
            return true;
        }

        let min_index = min_priority_index.expect("full bucket has at least one entry");
        if self.entries[min_index].priority < priority {
            self.entries[min_index] = CacheEntry {
                point_id: point_id.to_string(),
                coord,
                priority,
                exp_time,
            };
            return true;
        }

        false
    }

    pub fn live_entries(&self) -> &[CacheEntry] {
        &self.entries
    }
}

/// Snapshot metrics over the lifetime of a `PointCache`.
#[derive(Debug, Default, Serialize)]
pub struct CacheMetrics {
    pub admissions: u64,
    pub updates: u64,
    pub evictions: u64,
    pub rejections: u64,
    pub buckets: u64,
}

#[derive(Debug, Default)]
struct Counters {
    admissions: AtomicU64,
    updates: AtomicU64,
    evictions: AtomicU64,
    rejections: AtomicU64,
}

/// Process-local mapping from `(app, subject, sector, zoom)` to a
/// bounded, TTL'd bucket of resident points.
///
/// Concurrency: buckets live behind `DashMap`'s own shard locks, which
/// gives each `(app, subject, sector, zoom)` key the per-key mutual
/// exclusion the spec requires without a separate lock table.
#[derive(Debug, Default)]
pub struct PointCache {
    buckets: DashMap<SectorKey, SectorBucket>,
    counters: Counters,
}

impl PointCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(app_id: &str, subject_id: &str, sector: SectorId) -> SectorKey {
        SectorKey {
            app: app_id.to_string(),
            subject: subject_id.to_string(),
            sector,
        }
    }

    /// Attempt to admit or update `point_id` into the sector at `zoom`.
    /// Returns `true` on admission/update, `false` when the sector is
    /// full and every resident outranks the incoming priority.
    ///
    /// A `false` return is the caller's signal to stop the zoom-climb:
    /// it is a monotonicity heuristic, not a proof, and is what bounds
    /// write cost (spec §4.C).
    pub fn update_point_in_sector(
        &self,
        app_id: &str,
        subject_id: &str,
        sector: SectorId,
        point_id: &str,
        coord: UnitCubeCoord,
        priority: f64,
        clock: &dyn Clock,
    ) -> bool {
        let now = clock.now();
        let exp_time = now + ENTRY_TTL_SECS;
        let key = Self::key(app_id, subject_id, sector);

        let mut bucket = self.buckets.entry(key).or_default();
        bucket.purge_expired(now);

        let was_full = bucket.entries.len() >= MAX_POINTS_PER_SECTOR;
        let is_update = bucket.entries.iter().any(|e| e.point_id == point_id);
        let admitted = bucket.update(point_id, coord, priority, exp_time);

        if is_update {
            self.counters.updates.fetch_add(1, Ordering::Relaxed);
        } else if admitted {
            self.counters.admissions.fetch_add(1, Ordering::Relaxed);
            if was_full {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            self.counters.rejections.fetch_add(1, Ordering::Relaxed);
            debug!(
                app_id,
                subject_id,
                zoom = sector.zoom,
                priority,
                "sector rejected admission: full and no lower-priority resident"
            );
        }

        admitted
    }

    /// Fetch the live entries in a sector, purging expired ones first.
    pub fn get_points_in_sector(
        &self,
        app_id: &str,
        subject_id: &str,
        sector: SectorId,
        clock: &dyn Clock,
    ) -> Vec<CacheEntry> {
        let key = Self::key(app_id, subject_id, sector);
        match self.buckets.get_mut(&key) {
            Some(mut bucket) => {
                bucket.purge_expired(clock.now());
                bucket.live_entries().to_vec()
            }
            None => Vec::new(),
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            admissions: self.counters.admissions.load(Ordering::Relaxed),
            updates: self.counters.updates.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            rejections: self.counters.rejections.load(Ordering::Relaxed),
            buckets: self.buckets.len() as u64,
        }
    }
}

/// Collect candidates from the 27 sectors neighboring `coord`'s sector
/// at `zoom`, deduplicated by `point_id` preferring the later
/// `exp_time` on divergence between entries at different zooms.
pub fn collect_neighborhood(
    cache: &PointCache,
    app_id: &str,
    subject_id: &str,
    coord: &UnitCubeCoord,
    zoom: u8,
    clock: &dyn Clock,
) -> std::collections::HashMap<PointId, CacheEntry> {
    let center = sector_of(coord, zoom);
    let mut candidates: std::collections::HashMap<PointId, CacheEntry> =
        std::collections::HashMap::new();

    for neighbor in neighborhood_27(&center) {
        for entry in cache.get_points_in_sector(app_id, subject_id, neighbor, clock) {
            match candidates.get(&entry.point_id) {
                Some(existing) if existing.exp_time >= entry.exp_time => {}
                _ => {
                    candidates.insert(entry.point_id.clone(), entry);
                }
            }
        }
    }

    candidates
}

/// Width of the acceptance ring at `zoom`, for the monotonic-descent
/// filter in `NearestPoints`.
pub fn acceptance_radius(zoom: u8) -> f64 {
    tile_size(zoom)
}
