//! `GeoWorld` — the opaque bundle of storage + cache + clock the API
//! layer operates over.
//!
//! The source system keeps `_APPS` and `_CACHE` as process globals;
//! that is a deployment artifact of the benchmark script, not a design
//! choice (spec §9). Here the core is parameterized over a `GeoWorld`
//! so tests (and, in the service binary, `axum::extract::State`) can
//! run with independent instances.

use std::sync::Arc;

use crate::cache::PointCache;
use crate::clock::{Clock, SystemClock};
use crate::storage::{AppStorage, InMemoryAppStorage};

#[derive(Clone)]
pub struct GeoWorld {
    pub storage: Arc<dyn AppStorage>,
    pub cache: Arc<PointCache>,
    pub clock: Arc<dyn Clock>,
}

impl GeoWorld {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(InMemoryAppStorage::new()),
            cache: Arc::new(PointCache::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            storage: Arc::new(InMemoryAppStorage::new()),
            cache: Arc::new(PointCache::new()),
            clock,
        }
    }
}

impl Default for GeoWorld {
    fn default() -> Self {
        Self::new()
    }
}
