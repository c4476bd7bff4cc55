// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Explicit time source, per DESIGN NOTES §9: ambient container/manual
// prodding in the teacher becomes an injected capability here.

use std::time::{Duration, Instant};

/// A testable source of `Instant`s. Production code uses `SystemClock`;
/// tests use `FakeClock` to control heartbeat cadence and deadlines without
/// sleeping real time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock whose `now()` is advanced explicitly by the caller. Useful for
/// deterministic heartbeat/timeout tests.
pub struct FakeClock {
    base: Instant,
    offset: parking_lot::Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        FakeClock {
            base: Instant::now(),
            offset: parking_lot::Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}
