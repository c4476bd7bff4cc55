// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Prometheus metrics, grounded on
// `components/src/server/lock_manager/metrics.rs` in the teacher.

use lazy_static::lazy_static;
use prometheus::*;
use prometheus_static_metric::*;

make_static_metric! {
    pub struct ShardFailureCounter: IntCounter {
        "kind" => {
            sql,
            out_of_memory,
            cancelled,
            other,
        },
    }

    pub struct TaskTerminalCounter: IntCounter {
        "status" => {
            completed,
            failed,
            cancelled,
        },
    }
}

lazy_static! {
    pub static ref ROWS_EMITTED: IntCounter = register_int_counter!(
        "qfe_rows_emitted_total",
        "Total number of rows emitted to the consumer"
    )
    .unwrap();

    pub static ref BATCH_FLUSH_SIZE: Histogram = register_histogram!(
        "qfe_batch_flush_size",
        "Number of rows delivered per consumer flush",
        exponential_buckets(1.0, 2.0, 16).unwrap()
    )
    .unwrap();

    pub static ref MEMORY_PRESSURE_YIELDS: IntCounter = register_int_counter!(
        "qfe_memory_pressure_yields_total",
        "Total number of hybrid-wave yields triggered by memory pressure"
    )
    .unwrap();

    pub static ref SHARD_FAILURE_VEC: IntCounterVec = register_int_counter_vec!(
        "qfe_shard_failures_total",
        "Total number of shard failures by kind",
        &["kind"]
    )
    .unwrap();
    pub static ref SHARD_FAILURE_METRICS: ShardFailureCounter =
        ShardFailureCounter::from(&SHARD_FAILURE_VEC);

    pub static ref TASK_TERMINAL_VEC: IntCounterVec = register_int_counter_vec!(
        "qfe_tasks_terminal_total",
        "Total number of tasks that reached a terminal status",
        &["status"]
    )
    .unwrap();
    pub static ref TASK_TERMINAL_METRICS: TaskTerminalCounter =
        TaskTerminalCounter::from(&TASK_TERMINAL_VEC);

    pub static ref HEARTBEATS_EMITTED: IntCounter = register_int_counter!(
        "qfe_heartbeats_emitted_total",
        "Total number of heartbeat progress events emitted"
    )
    .unwrap();
}
