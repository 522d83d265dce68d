//! In-memory geo-proximity index.
//!
//! Answers "which points tagged for subject S are near coordinate C?"
//! under continuous, high-rate position updates from many moving
//! points, scoped per tenant (`app`). The engine is a hierarchical
//! sector cache ([`cache`]) keyed by `(app, subject, sector, zoom)`:
//! writes climb to progressively coarser zooms while they keep beating
//! the local priority floor ([`api::GeoApi::update_point`]), reads
//! descend from a radius-derived zoom collecting the 27-neighborhood
//! until enough candidates are found ([`api::GeoApi::nearest_points`]).
//!
//! Every geo-operation is reached through a short-lived, HMAC-signed
//! token binding the caller to a specific `(app, point, method,
//! params)` tuple ([`token`]). Tenant state (auth keys, point roster,
//! canonical coordinates) lives behind the [`storage::AppStorage`]
//! trait so a durable backing store can be swapped in without touching
//! the cache or API layer.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod projection;
pub mod sector;
pub mod storage;
pub mod token;
pub mod world;

pub use api::{GeoApi, ManagementApi, NearbyPoint, PointCoordEntry};
pub use cache::{CacheEntry, CacheMetrics, PointCache};
pub use clock::{Clock, SystemClock, TestClock};
pub use config::GeoServiceConfig;
pub use error::{GeoError, Result};
pub use projection::{from_unit_cube, to_unit_cube, GeoCoord, UnitCubeCoord, EARTH_RADIUS_M};
pub use sector::SectorId;
pub use storage::{AppStorage, InMemoryAppStorage, SubjectTag};
pub use token::{AppAuthToken, GeoAuthToken, GeoParams};
pub use world::GeoWorld;
