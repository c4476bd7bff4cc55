// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Shard Executor (C7) contract and the `ShardOutcome` discriminated result
// type, per spec §6 and DESIGN NOTES §9 ("exceptions for shard failures ->
// typed results per shard"). The relational driver itself is out of scope;
// hosts implement `ShardExecutor` against whatever client they use.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::ShardFailureKind;

/// A single result row as a name→value map, the shape the Consolidator and
/// row-normalization step operate on.
pub type Row = BTreeMap<String, RowValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl RowValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RowValue::Int(v) => Some(*v as f64),
            RowValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// Per-shard identity, carried alongside every row so normalization can
/// stamp `province := shard.name`.
#[derive(Debug, Clone)]
pub struct Shard {
    pub name: String,
}

/// Per-shard result, folded at the coordinator instead of relying on
/// panics/exceptions.
#[derive(Debug, Clone)]
pub enum ShardOutcome {
    Done { rows: u64 },
    Failed { kind: ShardFailureKind, detail: String },
    Cancelled,
}

impl ShardOutcome {
    pub fn rows(&self) -> u64 {
        match self {
            ShardOutcome::Done { rows } => *rows,
            _ => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ShardOutcome::Failed { .. })
    }
}

/// Executes rewritten SQL against one shard. The relational driver, the
/// connection pool, and parameter marshalling are external collaborators;
/// this trait is the only seam the Batch Processor needs.
#[async_trait]
pub trait ShardExecutor: Send + Sync {
    /// Bounded, materializing fetch — used for the single-shot
    /// `AGGREGATION` path.
    async fn execute_query(
        &self,
        shard: &Shard,
        sql: &str,
        params: &crate::binder::ParameterBag,
    ) -> crate::error::Result<Vec<Row>>;

    /// Per-row delivery, used by the streaming / keyset-pagination loops.
    async fn execute_streaming(
        &self,
        shard: &Shard,
        sql: &str,
        params: &crate::binder::ParameterBag,
        on_row: &mut dyn FnMut(Row),
    ) -> crate::error::Result<u64>;

    /// `COUNT(*)` variant used by Phase A estimation.
    async fn count(
        &self,
        shard: &Shard,
        sql: &str,
        params: &crate::binder::ParameterBag,
    ) -> crate::error::Result<u64>;
}

/// Invoked with a non-empty batch of normalized rows; may be called
/// concurrently from multiple shard workers. Implementations must be safe
/// for concurrent calls or wrap with their own serialization, per §6.
pub trait Consumer: Send + Sync {
    fn on_batch(&self, rows: Vec<Row>);
}

/// Stamps `province := shard.name` on every row, dropping any prior
/// `province` key, per §4.4 "Row normalization".
pub fn normalize_row(mut row: Row, shard_name: &str) -> Row {
    row.remove("province");
    row.insert("province".to_string(), RowValue::Text(shard_name.to_string()));
    row
}
