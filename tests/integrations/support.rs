// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use query_fanout::binder::ParameterBag;
use query_fanout::error::{EngineError, Result, SqlErrorKind};
use query_fanout::shard::{Row, RowValue, Shard, ShardExecutor};

/// In-process fake used to exercise the full C1->C10 pipeline without a
/// real relational driver. Each shard gets its own canned row set; a shard
/// name listed in `failing_shards` returns a `SqlExecutionError` instead.
pub struct FakeShardExecutor {
    rows_per_shard: Mutex<BTreeMap<String, Vec<Row>>>,
    failing_shards: Vec<String>,
    call_count: AtomicUsize,
}

impl FakeShardExecutor {
    pub fn new(rows_per_shard: BTreeMap<String, Vec<Row>>) -> Self {
        FakeShardExecutor {
            rows_per_shard: Mutex::new(rows_per_shard),
            failing_shards: Vec::new(),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn with_failing_shards(mut self, shards: Vec<String>) -> Self {
        self.failing_shards = shards;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ShardExecutor for FakeShardExecutor {
    async fn execute_query(&self, shard: &Shard, _sql: &str, _params: &ParameterBag) -> Result<Vec<Row>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.failing_shards.contains(&shard.name) {
            return Err(EngineError::SqlExecution {
                kind: SqlErrorKind::Timeout,
                detail: format!("shard {} timed out", shard.name),
            });
        }
        Ok(self.rows_per_shard.lock().unwrap().get(&shard.name).cloned().unwrap_or_default())
    }

    async fn execute_streaming(
        &self,
        shard: &Shard,
        sql: &str,
        params: &ParameterBag,
        on_row: &mut dyn FnMut(Row),
    ) -> Result<u64> {
        let rows = self.execute_query(shard, sql, params).await?;
        let n = rows.len() as u64;
        for row in rows {
            on_row(row);
        }
        Ok(n)
    }

    async fn count(&self, shard: &Shard, _sql: &str, _params: &ParameterBag) -> Result<u64> {
        if self.failing_shards.contains(&shard.name) {
            return Ok(0);
        }
        Ok(self.rows_per_shard.lock().unwrap().get(&shard.name).map(|r| r.len()).unwrap_or(0) as u64)
    }
}

pub fn row(pairs: &[(&str, RowValue)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub struct CollectingConsumer {
    pub batches: Mutex<Vec<Vec<Row>>>,
}

impl CollectingConsumer {
    pub fn new() -> Self {
        CollectingConsumer { batches: Mutex::new(Vec::new()) }
    }

    pub fn total_rows(&self) -> usize {
        self.batches.lock().unwrap().iter().map(|b| b.len()).sum()
    }
}

impl query_fanout::shard::Consumer for CollectingConsumer {
    fn on_batch(&self, rows: Vec<Row>) {
        self.batches.lock().unwrap().push(rows);
    }
}
