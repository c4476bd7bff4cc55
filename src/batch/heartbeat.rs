// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Heartbeat progress events, per §4.4/§5: "Every 30s while running, emit a
// progress event ... using a CAS to avoid duplicate emits from concurrent
// callers."

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

#[derive(Debug, Clone)]
pub struct HeartbeatEvent {
    pub elapsed: Duration,
    pub rows_so_far: u64,
    pub mem_pct: f64,
    pub shards_done: usize,
    pub total_shards: usize,
}

/// Tracks the last emission time as nanoseconds-since-start and uses
/// `compare_exchange` so only one of several concurrent callers actually
/// emits when the interval has elapsed.
pub struct HeartbeatGate {
    clock: Arc<dyn Clock>,
    start_nanos: u128,
    last_emitted_nanos: AtomicU64,
    interval: Duration,
}

impl HeartbeatGate {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let start = clock.now();
        HeartbeatGate {
            clock,
            start_nanos: instant_to_nanos(start),
            last_emitted_nanos: AtomicU64::new(0),
            interval,
        }
    }

    /// Returns `Some(elapsed)` exactly once per interval window, even under
    /// concurrent calls; all other callers receive `None`.
    pub fn try_tick(&self) -> Option<Duration> {
        let now_nanos = instant_to_nanos(self.clock.now()).saturating_sub(self.start_nanos) as u64;
        let last = self.last_emitted_nanos.load(Ordering::Acquire);
        if now_nanos.saturating_sub(last) < self.interval.as_nanos() as u64 {
            return None;
        }
        match self
            .last_emitted_nanos
            .compare_exchange(last, now_nanos, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Some(Duration::from_nanos(now_nanos)),
            Err(_) => None,
        }
    }
}

fn instant_to_nanos(instant: std::time::Instant) -> u128 {
    // `Instant` has no epoch; we only ever compare two readings from the
    // same clock, so an arbitrary stable reference point is fine.
    static REFERENCE: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    let reference = *REFERENCE.get_or_init(std::time::Instant::now);
    instant.saturating_duration_since(reference).as_nanos()
}
