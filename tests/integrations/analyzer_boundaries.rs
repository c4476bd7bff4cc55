// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use query_fanout::analyzer::QueryAnalyzer;
use query_fanout::batch::{BatchProcessor, NullProgressSink};
use query_fanout::binder::ParameterBinder;
use query_fanout::catalog::QueryTemplate;
use query_fanout::clock::SystemClock;
use query_fanout::config::EngineConfig;
use query_fanout::filter::Filter;
use query_fanout::memory::NoPressureProbe;
use query_fanout::shard::{RowValue, Shard};

use super::support::{row, CollectingConsumer, FakeShardExecutor};

/// A page strictly shorter than `batch_size` ends the keyset loop after a
/// single fetch, per §4.4's termination rule -- the fake always hands back
/// its whole canned set regardless of cursor, so a result shorter than
/// `batch_size` is the only shape that is safe to drive through it without
/// spinning forever.
#[tokio::test]
async fn keyset_pagination_stops_on_a_short_page() {
    let sql = "SELECT id FROM t WHERE a = 1";
    let verdict = QueryAnalyzer::with_default_oracle().analyze(sql);

    let mut config = EngineConfig::default();
    config.base_batch_size = 10;

    let mut rows_per_shard = BTreeMap::new();
    rows_per_shard.insert(
        "s1".to_string(),
        vec![
            row(&[("id", RowValue::Int(1))]),
            row(&[("id", RowValue::Int(2))]),
        ],
    );
    let executor = Arc::new(FakeShardExecutor::new(rows_per_shard));
    let consumer = Arc::new(CollectingConsumer::new());
    let processor = BatchProcessor::new(config, Arc::new(SystemClock), Arc::new(NoPressureProbe));
    let template = QueryTemplate::new("QB", "boundary", sql);
    let filter = Filter::builder().build().unwrap();
    let params = ParameterBinder::new().bind(&filter);

    let result = processor
        .run(
            &[Shard { name: "s1".to_string() }],
            executor.clone(),
            sql,
            params,
            &template,
            &verdict,
            &filter,
            consumer,
            Arc::new(AtomicBool::new(false)),
            Arc::new(NullProgressSink),
        )
        .await;

    assert_eq!(result.total_rows, 2);
    assert_eq!(executor.call_count(), 1);
}

/// PARALLEL is chosen when both the average and total row estimate stay
/// under their respective thresholds; a single large shard bumps the mode
/// to SEQUENTIAL regardless of how small the total estimate is.
#[test]
fn processing_mode_prefers_sequential_when_any_shard_is_oversized() {
    use query_fanout::batch::strategy::{choose_mode, ProcessingMode};
    use query_fanout::batch::estimate::EstimationResult;

    let config = EngineConfig::default();
    // avg and total both stay well under their thresholds, but one shard
    // alone exceeds `sequential_max_threshold` (200_000) -- that shard's
    // size dominates the choice.
    let skewed = EstimationResult { total: 210_000, avg_per_shard: 10_000, max_per_shard: 210_000 };
    assert_eq!(choose_mode(&config, skewed), ProcessingMode::Sequential);

    let balanced = EstimationResult { total: 1_000, avg_per_shard: 10, max_per_shard: 100 };
    assert_eq!(choose_mode(&config, balanced), ProcessingMode::Parallel);
}

/// The Aggregation/AggregationStreaming/AggregationHighVolume boundaries
/// land exactly on the configured thresholds, not one row off in either
/// direction.
#[test]
fn consolidation_type_boundaries_are_exact() {
    use query_fanout::catalog::ConsolidationType;

    let analyzer = QueryAnalyzer::with_default_oracle().with_thresholds(100, 200);

    // provincia (24) alone never lands mid-range for these thresholds, so
    // drive the estimate directly through two unknown-cardinality columns
    // whose product the StaticCardinalityTable can't resolve, falling back
    // to type-default cardinalities (Categorization = 20 each -> 400),
    // landing past the high-volume threshold.
    let sql_high = "SELECT unknown_a, unknown_b, COUNT(*) AS n FROM t GROUP BY unknown_a, unknown_b";
    let verdict = analyzer.analyze(sql_high);
    assert_eq!(verdict.consolidation_type, ConsolidationType::AggregationHighVolume);

    let sql_small = "SELECT provincia, COUNT(*) AS n FROM t GROUP BY provincia";
    let verdict = analyzer.analyze(sql_small);
    assert_eq!(verdict.consolidation_type, ConsolidationType::Aggregation);
}
