// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Typed configuration for every tunable the spec calls out as
// "configuration, not constants" (§4.4). Grounded on the teacher's pattern
// of a plain `serde`-derived config struct with a `Default` impl carrying
// the documented defaults (see `GcConfig` referenced from
// `tests/integrations/config/dynamic/gc_worker.rs`); the teacher's
// `online_config` crate is workspace-internal so is not depended on here —
// hosts that want live-reload compose their own watcher around
// `EngineConfig`, which is a plain value type.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker pool width for PARALLEL/HYBRID execution. Default 6.
    pub worker_pool_width: usize,
    /// Worker pool pending-task queue capacity before run-on-caller kicks in.
    pub worker_queue_capacity: usize,
    /// Shards processed per HYBRID wave. Default 6.
    pub max_parallel_shards: usize,

    /// PARALLEL is chosen when avg-per-shard is below this and total is
    /// below `parallel_total_threshold`.
    pub parallel_avg_threshold: u64,
    pub parallel_total_threshold: u64,
    /// SEQUENTIAL is chosen when max-per-shard exceeds this.
    pub sequential_max_threshold: u64,

    /// Base row count per fetched page / streamed flush buffer.
    pub base_batch_size: usize,
    pub batch_size_floor: usize,
    pub batch_size_cap: usize,

    /// Heap/host memory usage fraction above which batch size is halved.
    pub memory_halve_threshold: f64,
    /// Free-memory fraction below which batch size is capped at base/4.
    pub memory_severe_free_threshold: f64,
    /// Free-memory fraction below which batch size is capped at base/2.
    pub memory_moderate_free_threshold: f64,
    /// Used-memory fraction above which a hybrid wave yields briefly.
    pub memory_yield_threshold: f64,
    pub memory_yield_duration: Duration,

    pub heartbeat_interval: Duration,
    pub per_query_timeout: Duration,
    pub per_task_timeout: Option<Duration>,

    /// Row estimate thresholds for AGGREGATION / AGGREGATION_STREAMING /
    /// AGGREGATION_HIGH_VOLUME, per §4.1 step 6.
    pub aggregation_streaming_threshold: u64,
    pub aggregation_high_volume_threshold: u64,

    /// Rows buffered before a streaming flush to the consumer.
    pub stream_flush_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            worker_pool_width: 6,
            worker_queue_capacity: 100,
            max_parallel_shards: 6,

            parallel_avg_threshold: 50_000,
            parallel_total_threshold: 300_000,
            sequential_max_threshold: 200_000,

            base_batch_size: 1_000,
            batch_size_floor: 500,
            batch_size_cap: 10_000,

            memory_halve_threshold: 0.85,
            memory_severe_free_threshold: 0.20,
            memory_moderate_free_threshold: 0.30,
            memory_yield_threshold: 0.70,
            memory_yield_duration: Duration::from_millis(50),

            heartbeat_interval: Duration::from_secs(30),
            per_query_timeout: Duration::from_secs(30),
            per_task_timeout: None,

            aggregation_streaming_threshold: 50_000,
            aggregation_high_volume_threshold: 100_000,

            stream_flush_buffer: 1_000,
        }
    }
}

impl EngineConfig {
    /// Clamps the adaptive batch size given current memory readings, per
    /// §4.4 "Memory-adaptive batch sizing".
    pub fn adapt_batch_size(&self, current: usize, used_fraction: f64, free_fraction: f64) -> usize {
        let mut size = current;
        if used_fraction > self.memory_halve_threshold {
            size = (size / 2).max(self.batch_size_floor);
        }
        if free_fraction < self.memory_severe_free_threshold {
            size = size.min(self.base_batch_size / 4).max(1);
        } else if free_fraction < self.memory_moderate_free_threshold {
            size = size.min(self.base_batch_size / 2).max(1);
        } else {
            size = size.min(self.base_batch_size.min(self.batch_size_cap));
        }
        size.max(1)
    }
}
