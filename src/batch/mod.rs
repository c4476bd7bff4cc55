// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Batch Processor (C8), per spec §4.4 — the cross-shard execution engine.
// Orchestrates Phase A (estimation), Phase B (strategy selection), and
// Phase C (execution), driving per-shard pagination, memory-adaptive batch
// sizing, cursor capture, the failure policy, heartbeat emission, and row
// normalization. The concurrency primitive for Phase C is grounded on the
// teacher's `tikv_util::worker` wrapping, adapted to a semaphore since the
// dispatch itself is async (see `worker.rs`).

pub mod estimate;
pub mod heartbeat;
pub mod strategy;
pub mod worker;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use dashmap::DashMap;
use log::{info, warn};

use crate::analyzer::AnalysisVerdict;
use crate::binder::{BoundValue, ParameterBag};
use crate::catalog::{ConsolidationType, QueryTemplate};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::consolidate::Consolidator;
use crate::error::ShardFailureKind;
use crate::filter::{Filter, KeysetCursor};
use crate::memory::MemoryProbe;
use crate::metrics::{BATCH_FLUSH_SIZE, MEMORY_PRESSURE_YIELDS, ROWS_EMITTED, SHARD_FAILURE_METRICS};
use crate::shard::{normalize_row, Consumer, Row, Shard, ShardExecutor, ShardOutcome};

use estimate::estimate;
use heartbeat::{HeartbeatEvent, HeartbeatGate};
use strategy::{choose_mode, ProcessingMode};
use worker::ShardDispatcher;

/// A `Consolidator` shared across every shard task in one run, guarded by a
/// plain `Mutex` since folds are quick and never held across an `.await`.
type SharedConsolidator = Arc<StdMutex<Consolidator>>;

/// Receives heartbeat progress events during a run. The Async Task Manager
/// implements this to write into its `TaskHandle`; tests use a
/// channel-backed sink.
pub trait ProgressSink: Send + Sync {
    fn on_heartbeat(&self, event: HeartbeatEvent);
}

pub struct NullProgressSink;
impl ProgressSink for NullProgressSink {
    fn on_heartbeat(&self, _event: HeartbeatEvent) {}
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub shard_outcomes: Vec<(String, ShardOutcome)>,
    pub total_rows: u64,
    pub cancelled: bool,
    /// The keyset cursor each shard reached by the end of this run, keyed
    /// by shard name. A caller driving its own page-by-page loop folds
    /// these into the next request's `Filter::cursor` (per shard, since
    /// each shard paginates independently). Empty for runs that never took
    /// the keyset-pagination path (single-shot or streaming shards).
    pub next_cursors: BTreeMap<String, KeysetCursor>,
}

pub struct BatchProcessor {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    memory: Arc<dyn MemoryProbe>,
    dispatcher: ShardDispatcher,
}

impl BatchProcessor {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>, memory: Arc<dyn MemoryProbe>) -> Self {
        let dispatcher = ShardDispatcher::new(config.worker_pool_width, config.worker_queue_capacity);
        BatchProcessor {
            config,
            clock,
            memory,
            dispatcher,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        shards: &[Shard],
        executor: Arc<dyn ShardExecutor>,
        sql: &str,
        params: ParameterBag,
        template: &QueryTemplate,
        verdict: &AnalysisVerdict,
        filter: &Filter,
        consumer: Arc<dyn Consumer>,
        cancel: Arc<AtomicBool>,
        progress: Arc<dyn ProgressSink>,
    ) -> BatchResult {
        let estimation = estimate(shards, &executor, sql, &params).await;
        let mode = choose_mode(&self.config, estimation);
        info!(
            "batch run: {} shard(s), mode={:?}, estimate={:?}",
            shards.len(),
            mode,
            estimation
        );

        let heartbeat = Arc::new(HeartbeatGate::new(self.clock.clone(), self.config.heartbeat_interval));
        let total_shards = shards.len();
        let shards_done = Arc::new(AtomicU64::new(0));

        // Scoped to this run: every shard task in this request shares one
        // cursor/counter map, keyed by shard name, so the maps reflect the
        // final state each shard reached regardless of which mode drove it.
        let cursors: Arc<DashMap<String, KeysetCursor>> = Arc::new(DashMap::new());
        let row_counters: Arc<DashMap<String, AtomicU64>> = Arc::new(DashMap::new());

        // For a consolidable `AGGREGATION*` template, every shard task folds
        // into this one shared accumulator instead of emitting its raw rows,
        // per §4.5 "never materializes the raw input set" -- the consumer
        // sees the merged result exactly once, after every shard finishes.
        let consolidator: Option<SharedConsolidator> = match template.consolidation_type {
            Some(kind @ ConsolidationType::Aggregation)
            | Some(kind @ ConsolidationType::AggregationStreaming)
            | Some(kind @ ConsolidationType::AggregationHighVolume)
                if template.consolidable =>
            {
                let grouping_fields = if filter.group_by_fields.is_empty() {
                    template.grouping_fields.clone()
                } else {
                    filter.group_by_fields.clone()
                };
                Some(Arc::new(StdMutex::new(Consolidator::new(kind, grouping_fields, template.numeric_fields.clone()))))
            }
            _ => None,
        };

        let outcomes = match mode {
            ProcessingMode::Parallel => {
                self.run_parallel(shards, &executor, sql, &params, template, verdict, filter, &consumer, &cancel, &heartbeat, &progress, total_shards, &shards_done, &cursors, &row_counters, &consolidator)
                    .await
            }
            ProcessingMode::Hybrid => {
                self.run_hybrid(shards, &executor, sql, &params, template, verdict, filter, &consumer, &cancel, &heartbeat, &progress, total_shards, &shards_done, &cursors, &row_counters, &consolidator)
                    .await
            }
            ProcessingMode::Sequential => {
                self.run_sequential(shards, &executor, sql, &params, template, verdict, filter, &consumer, &cancel, &heartbeat, &progress, total_shards, &shards_done, &cursors, &row_counters, &consolidator)
                    .await
            }
        };

        if let Some(consolidator) = consolidator {
            let merged = Arc::try_unwrap(consolidator)
                .expect("consolidator uniquely held once every shard task has completed")
                .into_inner()
                .expect("consolidator mutex never poisoned")
                .finish();
            if !merged.is_empty() {
                consumer.on_batch(merged);
            }
        }

        let total_rows: u64 = outcomes.iter().map(|(_, o)| o.rows()).sum();
        let cancelled = cancel.load(Ordering::Acquire);
        let next_cursors = cursors.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        BatchResult {
            shard_outcomes: outcomes,
            total_rows,
            cancelled,
            next_cursors,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_parallel(
        &self,
        shards: &[Shard],
        executor: &Arc<dyn ShardExecutor>,
        sql: &str,
        params: &ParameterBag,
        template: &QueryTemplate,
        verdict: &AnalysisVerdict,
        filter: &Filter,
        consumer: &Arc<dyn Consumer>,
        cancel: &Arc<AtomicBool>,
        heartbeat: &Arc<HeartbeatGate>,
        progress: &Arc<dyn ProgressSink>,
        total_shards: usize,
        shards_done: &Arc<AtomicU64>,
        cursors: &Arc<DashMap<String, KeysetCursor>>,
        row_counters: &Arc<DashMap<String, AtomicU64>>,
        consolidator: &Option<SharedConsolidator>,
    ) -> Vec<(String, ShardOutcome)> {
        let mut handles = Vec::with_capacity(shards.len());
        for shard in shards {
            let shard = shard.clone_name();
            let executor = executor.clone();
            let sql = sql.to_string();
            let params = params.clone();
            let template = template.clone();
            let verdict = verdict.clone();
            let filter = filter.clone();
            let consumer = consumer.clone();
            let cancel = cancel.clone();
            let heartbeat = heartbeat.clone();
            let progress = progress.clone();
            let cursors = cursors.clone();
            let row_counters = row_counters.clone();
            let consolidator = consolidator.clone();
            let config = self.config.clone();
            let memory = self.memory.clone();
            let semaphore = self.dispatcher.semaphore();

            let shards_done = shards_done.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let outcome = process_shard(
                    &config, &memory, &shard, &executor, &sql, &params, &template, &verdict, &filter, &consumer,
                    &cancel, &heartbeat, progress.as_ref(), total_shards, &shards_done, &cursors, &row_counters,
                    &consolidator,
                )
                .await;
                (shard.name, outcome)
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(pair) => outcomes.push(pair),
                Err(_) => outcomes.push(("<unknown>".to_string(), ShardOutcome::Failed {
                    kind: ShardFailureKind::Other,
                    detail: "worker task panicked".to_string(),
                })),
            }
        }
        outcomes
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_hybrid(
        &self,
        shards: &[Shard],
        executor: &Arc<dyn ShardExecutor>,
        sql: &str,
        params: &ParameterBag,
        template: &QueryTemplate,
        verdict: &AnalysisVerdict,
        filter: &Filter,
        consumer: &Arc<dyn Consumer>,
        cancel: &Arc<AtomicBool>,
        heartbeat: &Arc<HeartbeatGate>,
        progress: &Arc<dyn ProgressSink>,
        total_shards: usize,
        shards_done: &Arc<AtomicU64>,
        cursors: &Arc<DashMap<String, KeysetCursor>>,
        row_counters: &Arc<DashMap<String, AtomicU64>>,
        consolidator: &Option<SharedConsolidator>,
    ) -> Vec<(String, ShardOutcome)> {
        let mut outcomes = Vec::with_capacity(shards.len());
        for wave in shards.chunks(self.config.max_parallel_shards) {
            if cancel.load(Ordering::Acquire) {
                break;
            }
            let wave_outcomes = self
                .run_parallel(wave, executor, sql, params, template, verdict, filter, consumer, cancel, heartbeat, progress, total_shards, shards_done, cursors, row_counters, consolidator)
                .await;
            outcomes.extend(wave_outcomes);

            if self.memory.used_fraction() > self.config.memory_yield_threshold {
                MEMORY_PRESSURE_YIELDS.inc();
                tokio::time::sleep(self.config.memory_yield_duration).await;
            }
        }
        outcomes
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_sequential(
        &self,
        shards: &[Shard],
        executor: &Arc<dyn ShardExecutor>,
        sql: &str,
        params: &ParameterBag,
        template: &QueryTemplate,
        verdict: &AnalysisVerdict,
        filter: &Filter,
        consumer: &Arc<dyn Consumer>,
        cancel: &Arc<AtomicBool>,
        heartbeat: &Arc<HeartbeatGate>,
        progress: &Arc<dyn ProgressSink>,
        total_shards: usize,
        shards_done: &Arc<AtomicU64>,
        cursors: &Arc<DashMap<String, KeysetCursor>>,
        row_counters: &Arc<DashMap<String, AtomicU64>>,
        consolidator: &Option<SharedConsolidator>,
    ) -> Vec<(String, ShardOutcome)> {
        let mut outcomes = Vec::with_capacity(shards.len());
        for shard in shards {
            if cancel.load(Ordering::Acquire) {
                break;
            }
            let outcome = process_shard(
                &self.config, &self.memory, shard, executor, sql, params, template, verdict, filter, consumer,
                cancel, heartbeat, progress.as_ref(), total_shards, shards_done, cursors, row_counters, consolidator,
            )
            .await;
            outcomes.push((shard.name.clone(), outcome));
        }
        outcomes
    }
}

impl Shard {
    fn clone_name(&self) -> Shard {
        Shard { name: self.name.clone() }
    }
}

/// The per-shard inner loop, per §4.4 "Per-shard inner loop" and "Failure
/// policy". Never lets a shard error escape as a panic: every branch
/// resolves to a `ShardOutcome`.
#[allow(clippy::too_many_arguments)]
async fn process_shard(
    config: &EngineConfig,
    memory: &Arc<dyn MemoryProbe>,
    shard: &Shard,
    executor: &Arc<dyn ShardExecutor>,
    sql: &str,
    params: &ParameterBag,
    template: &QueryTemplate,
    verdict: &AnalysisVerdict,
    filter: &Filter,
    consumer: &Arc<dyn Consumer>,
    cancel: &Arc<AtomicBool>,
    heartbeat: &HeartbeatGate,
    progress: &dyn ProgressSink,
    total_shards: usize,
    shards_done: &Arc<AtomicU64>,
    cursors: &Arc<DashMap<String, KeysetCursor>>,
    row_counters: &Arc<DashMap<String, AtomicU64>>,
    consolidator: &Option<SharedConsolidator>,
) -> ShardOutcome {
    let counter = row_counters.entry(shard.name.clone()).or_insert_with(|| AtomicU64::new(0));
    let _ = counter;

    let result = if template.consolidation_type == Some(ConsolidationType::Aggregation)
        && template.consolidable
        && filter.consolidate
    {
        run_single_shot(shard, executor, sql, params, consumer, row_counters, consolidator).await
    } else if matches!(
        template.consolidation_type,
        Some(ConsolidationType::AggregationStreaming) | Some(ConsolidationType::AggregationHighVolume) | Some(ConsolidationType::Raw)
    ) || template.consolidation_type.is_none() && verdict.consolidable
    {
        run_streaming(config, memory, shard, executor, sql, params, consumer, cancel, heartbeat, progress, total_shards, shards_done, row_counters, consolidator).await
    } else {
        run_keyset_pagination(config, memory, shard, executor, sql, params, filter, consumer, cancel, heartbeat, progress, total_shards, shards_done, cursors, row_counters).await
    };

    match &result {
        ShardOutcome::Failed { kind, .. } => {
            record_shard_failure_metric(*kind);
        }
        ShardOutcome::Cancelled | ShardOutcome::Done { .. } => {}
    }
    shards_done.fetch_add(1, Ordering::Relaxed);
    result
}

fn record_shard_failure_metric(kind: ShardFailureKind) {
    match kind {
        ShardFailureKind::OutOfMemory => SHARD_FAILURE_METRICS.out_of_memory.inc(),
        ShardFailureKind::Cancelled => SHARD_FAILURE_METRICS.cancelled.inc(),
        ShardFailureKind::Sql(_) => SHARD_FAILURE_METRICS.sql.inc(),
        ShardFailureKind::Other => SHARD_FAILURE_METRICS.other.inc(),
    }
}

async fn run_single_shot(
    shard: &Shard,
    executor: &Arc<dyn ShardExecutor>,
    sql: &str,
    params: &ParameterBag,
    consumer: &Arc<dyn Consumer>,
    row_counters: &Arc<DashMap<String, AtomicU64>>,
    consolidator: &Option<SharedConsolidator>,
) -> ShardOutcome {
    match executor.execute_query(shard, sql, params).await {
        Ok(rows) => {
            let normalized: Vec<Row> = rows.into_iter().map(|r| normalize_row(r, &shard.name)).collect();
            let n = normalized.len() as u64;
            if !normalized.is_empty() {
                BATCH_FLUSH_SIZE.observe(normalized.len() as f64);
                ROWS_EMITTED.inc_by(n);
                if let Some(consolidator) = consolidator {
                    let mut guard = consolidator.lock().expect("consolidator mutex never poisoned");
                    for row in normalized {
                        guard.fold(row);
                    }
                } else {
                    consumer.on_batch(normalized);
                }
            }
            bump_counter(row_counters, &shard.name, n);
            ShardOutcome::Done { rows: n }
        }
        Err(err) => {
            warn!("shard {} single-shot query failed: {err}", shard.name);
            ShardOutcome::Failed {
                kind: classify_failure(&err),
                detail: err.to_string(),
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_streaming(
    config: &EngineConfig,
    memory: &Arc<dyn MemoryProbe>,
    shard: &Shard,
    executor: &Arc<dyn ShardExecutor>,
    sql: &str,
    params: &ParameterBag,
    consumer: &Arc<dyn Consumer>,
    cancel: &Arc<AtomicBool>,
    heartbeat: &HeartbeatGate,
    progress: &dyn ProgressSink,
    total_shards: usize,
    shards_done: &Arc<AtomicU64>,
    row_counters: &Arc<DashMap<String, AtomicU64>>,
    consolidator: &Option<SharedConsolidator>,
) -> ShardOutcome {
    let buffer = std::sync::Mutex::new(Vec::<Row>::with_capacity(config.stream_flush_buffer));
    let shard_name = shard.name.clone();
    let cancelled = std::sync::Mutex::new(false);
    let total_rows = AtomicU64::new(0);

    let flush = |batch: Vec<Row>| {
        if let Some(consolidator) = consolidator {
            let mut guard = consolidator.lock().expect("consolidator mutex never poisoned");
            for row in batch {
                guard.fold(row);
            }
        } else {
            consumer.on_batch(batch);
        }
    };

    let flush_threshold = config.stream_flush_buffer;
    let result = executor
        .execute_streaming(shard, sql, params, &mut |row| {
            if cancel.load(Ordering::Acquire) {
                *cancelled.lock().unwrap() = true;
                return;
            }
            let mut guard = buffer.lock().unwrap();
            guard.push(normalize_row(row, &shard_name));
            if guard.len() >= flush_threshold {
                let batch = std::mem::take(&mut *guard);
                drop(guard);
                total_rows.fetch_add(batch.len() as u64, Ordering::Relaxed);
                BATCH_FLUSH_SIZE.observe(batch.len() as f64);
                ROWS_EMITTED.inc_by(batch.len() as u64);
                flush(batch);
                if let Some(elapsed) = heartbeat.try_tick() {
                    progress.on_heartbeat(HeartbeatEvent {
                        elapsed,
                        rows_so_far: total_rows.load(Ordering::Relaxed),
                        mem_pct: memory.used_fraction(),
                        shards_done: shards_done.load(Ordering::Relaxed) as usize,
                        total_shards,
                    });
                }
            }
        })
        .await;

    let mut remaining = buffer.lock().unwrap();
    if !remaining.is_empty() {
        let batch = std::mem::take(&mut *remaining);
        total_rows.fetch_add(batch.len() as u64, Ordering::Relaxed);
        BATCH_FLUSH_SIZE.observe(batch.len() as f64);
        ROWS_EMITTED.inc_by(batch.len() as u64);
        drop(remaining);
        flush(batch);
    } else {
        drop(remaining);
    }

    if *cancelled.lock().unwrap() {
        return ShardOutcome::Cancelled;
    }

    match result {
        Ok(_) => {
            let n = total_rows.load(Ordering::Relaxed);
            bump_counter(row_counters, &shard.name, n);
            ShardOutcome::Done { rows: n }
        }
        Err(err) => {
            warn!("shard {} streaming failed: {err}", shard.name);
            ShardOutcome::Failed {
                kind: classify_failure(&err),
                detail: err.to_string(),
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_keyset_pagination(
    config: &EngineConfig,
    memory: &Arc<dyn MemoryProbe>,
    shard: &Shard,
    executor: &Arc<dyn ShardExecutor>,
    sql: &str,
    params: &ParameterBag,
    filter: &Filter,
    consumer: &Arc<dyn Consumer>,
    cancel: &Arc<AtomicBool>,
    heartbeat: &HeartbeatGate,
    progress: &dyn ProgressSink,
    total_shards: usize,
    shards_done: &Arc<AtomicU64>,
    cursors: &Arc<DashMap<String, KeysetCursor>>,
    row_counters: &Arc<DashMap<String, AtomicU64>>,
) -> ShardOutcome {
    let mut batch_size = config.base_batch_size;
    let mut cursor = filter.cursor.clone();
    let mut total = 0u64;

    loop {
        if cancel.load(Ordering::Acquire) {
            return ShardOutcome::Cancelled;
        }

        let used = memory.used_fraction();
        let free = memory.free_fraction();
        batch_size = config.adapt_batch_size(batch_size, used, free);

        let page_params = apply_cursor(params, &cursor, batch_size);
        match executor.execute_query(shard, sql, &page_params).await {
            Ok(rows) => {
                let page_len = rows.len();
                let normalized: Vec<Row> = rows.into_iter().map(|r| normalize_row(r, &shard.name)).collect();
                if let Some(last) = normalized.last() {
                    cursor = capture_cursor(last, &cursor);
                    cursors.insert(shard.name.clone(), cursor.clone());
                }
                if !normalized.is_empty() {
                    total += normalized.len() as u64;
                    BATCH_FLUSH_SIZE.observe(normalized.len() as f64);
                    ROWS_EMITTED.inc_by(normalized.len() as u64);
                    consumer.on_batch(normalized);
                }
                if let Some(elapsed) = heartbeat.try_tick() {
                    progress.on_heartbeat(HeartbeatEvent {
                        elapsed,
                        rows_so_far: total,
                        mem_pct: used,
                        shards_done: shards_done.load(Ordering::Relaxed) as usize,
                        total_shards,
                    });
                }
                if page_len < batch_size {
                    bump_counter(row_counters, &shard.name, total);
                    return ShardOutcome::Done { rows: total };
                }
            }
            Err(err) => {
                warn!("shard {} paginated query failed: {err}", shard.name);
                let kind = classify_failure(&err);
                if matches!(kind, ShardFailureKind::OutOfMemory) {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                return ShardOutcome::Failed { kind, detail: err.to_string() };
            }
        }
    }
}

fn apply_cursor(params: &ParameterBag, cursor: &KeysetCursor, limit: usize) -> ParameterBag {
    let mut bag = params.with_override("limit", BoundValue::Int(limit as i64));
    if let Some(id) = cursor.last_id {
        bag = bag.with_override("lastId", BoundValue::Int(id));
    }
    if let Some(serial) = &cursor.last_serial {
        bag = bag.with_override("lastSerial", BoundValue::Text(serial.clone()));
    }
    if let Some(location) = &cursor.last_location {
        bag = bag.with_override("lastLocation", BoundValue::Text(location.clone()));
    }
    for (i, (_, value)) in cursor.last_composite_key.iter().enumerate().take(3) {
        bag = bag.with_override(&format!("keyset_col_{i}"), BoundValue::Text(value.clone()));
    }
    bag
}

/// Captures the keyset tuple from the last row of a page, per §4.4 "Cursor
/// capture": `id`-bearing rows store `(id, serial, location)`; otherwise
/// the first three non-null values are treated as a generic keyset.
fn capture_cursor(last_row: &Row, previous: &KeysetCursor) -> KeysetCursor {
    use crate::shard::RowValue;

    if let Some(RowValue::Int(id)) = last_row.get("id") {
        return KeysetCursor {
            last_id: Some(*id),
            last_serial: text_value(last_row.get("serial")),
            last_location: text_value(last_row.get("location")),
            last_composite_key: previous.last_composite_key.clone(),
        };
    }

    let mut composite = BTreeMap::new();
    for (key, value) in last_row.iter().take(3) {
        if !matches!(value, RowValue::Null) {
            composite.insert(key.clone(), text_value(Some(value)).unwrap_or_default());
        }
    }
    KeysetCursor {
        last_id: previous.last_id,
        last_serial: previous.last_serial.clone(),
        last_location: previous.last_location.clone(),
        last_composite_key: composite,
    }
}

fn text_value(value: Option<&crate::shard::RowValue>) -> Option<String> {
    use crate::shard::RowValue;
    match value {
        Some(RowValue::Text(s)) => Some(s.clone()),
        Some(RowValue::Int(i)) => Some(i.to_string()),
        Some(RowValue::Float(f)) => Some(f.to_string()),
        Some(RowValue::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

fn bump_counter(row_counters: &Arc<DashMap<String, AtomicU64>>, shard_name: &str, n: u64) {
    row_counters
        .entry(shard_name.to_string())
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(n, Ordering::Relaxed);
}

fn classify_failure(err: &crate::error::EngineError) -> ShardFailureKind {
    use crate::error::EngineError;
    match err {
        EngineError::SqlExecution { kind, .. } => ShardFailureKind::Sql(*kind),
        _ => ShardFailureKind::Other,
    }
}

/// Folds an already-materialized row set through a `Consolidator` -- a
/// convenience for hosts that collected rows from elsewhere (a prior
/// request's batches, a re-merge across requests) and want them grouped the
/// same way `run` consolidates live shard output. `run` itself never calls
/// this: its own `AGGREGATION*` paths fold each shard's rows into a shared
/// `Consolidator` as they arrive, never materializing the full row set.
pub fn consolidate_rows(
    verdict: &AnalysisVerdict,
    numeric_fields: Vec<crate::catalog::NumericFieldSpec>,
    rows: Vec<Row>,
) -> Vec<Row> {
    let mut consolidator = Consolidator::new(verdict.consolidation_type, verdict.grouping_fields.clone(), numeric_fields);
    for row in rows {
        consolidator.fold(row);
    }
    consolidator.finish()
}
