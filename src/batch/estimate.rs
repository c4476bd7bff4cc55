// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Phase A — Estimation, per spec §4.4. Issues `SELECT COUNT(*) FROM
// (original-query-without-ORDER-BY) t` against every shard in parallel with
// the same filter bindings, aggregating into `{total, avgPerShard,
// maxPerShard}`. A shard failure yields a conservative estimate of 0
// (logged), never fails the whole request.

use std::sync::Arc;

use futures::future::join_all;
use log::warn;

use crate::binder::ParameterBag;
use crate::shard::{Shard, ShardExecutor};
use crate::sql_scan::find_top_level_keyword;

#[derive(Debug, Clone, Copy, Default)]
pub struct EstimationResult {
    pub total: u64,
    pub avg_per_shard: u64,
    pub max_per_shard: u64,
}

/// Strips a trailing top-level `ORDER BY ... ` clause and wraps the query
/// as a `COUNT(*)` subquery, per §4.4 Phase A.
pub fn count_wrapper_sql(sql: &str) -> String {
    let body = match find_top_level_keyword(sql, "ORDER", 0) {
        Some(pos) => sql[..pos].trim_end(),
        None => sql.trim_end(),
    };
    format!("SELECT COUNT(*) FROM ({body}) t")
}

pub async fn estimate(
    shards: &[Shard],
    executor: &Arc<dyn ShardExecutor>,
    sql: &str,
    params: &ParameterBag,
) -> EstimationResult {
    let wrapped = count_wrapper_sql(sql);
    let futures = shards.iter().map(|shard| {
        let wrapped = wrapped.clone();
        async move {
            match executor.count(shard, &wrapped, params).await {
                Ok(count) => count,
                Err(err) => {
                    warn!("shard {} estimation failed, using 0: {err}", shard.name);
                    0
                }
            }
        }
    });

    let counts: Vec<u64> = join_all(futures).await;
    let total: u64 = counts.iter().sum();
    let max_per_shard = counts.iter().copied().max().unwrap_or(0);
    let avg_per_shard = if counts.is_empty() { 0 } else { total / counts.len() as u64 };

    EstimationResult {
        total,
        avg_per_shard,
        max_per_shard,
    }
}
