//! Wall-clock abstraction.
//!
//! The cache and tokens only ever need "now" and absolute instants
//! derived from it. Routing every read through a [`Clock`] lets TTL and
//! zoom-climb scenarios run deterministically under a seeded clock
//! instead of sleeping in real time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Absolute wall-clock instant, seconds since the Unix epoch.
pub type Instant = f64;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs_f64()
    }
}

/// A clock that can be advanced under test control.
#[derive(Debug)]
pub struct TestClock {
    now_millis: AtomicI64,
}

impl TestClock {
    pub fn new(start: Instant) -> Self {
        Self {
            now_millis: AtomicI64::new((start * 1000.0) as i64),
        }
    }

    pub fn advance(&self, secs: f64) {
        self.now_millis
            .fetch_add((secs * 1000.0) as i64, Ordering::SeqCst);
    }

    pub fn set(&self, at: Instant) {
        self.now_millis.store((at * 1000.0) as i64, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.now_millis.load(Ordering::SeqCst) as f64 / 1000.0
    }
}
