// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use query_fanout::analyzer::QueryAnalyzer;
use query_fanout::batch::{BatchProcessor, NullProgressSink};
use query_fanout::binder::ParameterBinder;
use query_fanout::catalog::{AggregationKind, ConsolidationType, NumericFieldSpec, QueryTemplate};
use query_fanout::clock::SystemClock;
use query_fanout::config::EngineConfig;
use query_fanout::filter::Filter;
use query_fanout::memory::NoPressureProbe;
use query_fanout::pagination::{KeyColumn, PaginationStrategyAnalyzer};
use query_fanout::rewriter::Rewriter;
use query_fanout::shard::{RowValue, Shard};

use super::support::{row, CollectingConsumer, FakeShardExecutor};

fn shards(names: &[&str]) -> Vec<Shard> {
    names.iter().map(|n| Shard { name: n.to_string() }).collect()
}

/// Scenario 1: a non-GROUP-BY template with a hardcoded state filter gets
/// rewritten to a parameterized KEYSET_WITH_ID query and fanned out in
/// PARALLEL across all shards, per spec §8 scenario 1.
#[tokio::test]
async fn scenario_one_keyset_with_id_parallel_fanout() {
    let sql = "SELECT i.id, pc.serial_equipment, pc.location, i.date FROM infractions i JOIN pc ON true WHERE i.state IN (1,2)";
    let analyzer = QueryAnalyzer::with_default_oracle();
    let verdict = analyzer.analyze(sql);
    assert!(!verdict.consolidable);

    let pagination = PaginationStrategyAnalyzer::new().choose(
        &verdict,
        &[KeyColumn::new("pc.serial_equipment", "keyset_col_0", "text")],
        false,
        false,
    );
    let rewritten = Rewriter::new().rewrite(sql, &pagination, true);
    assert!(!rewritten.contains("i.state IN (1,2)"));
    assert!(rewritten.contains("ORDER BY id ASC"));

    let filter = Filter::builder().infraction_state_ids([3, 4]).start_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).limit(1000).build().unwrap();
    let params = ParameterBinder::new().bind(&filter);

    let mut rows_per_shard = BTreeMap::new();
    for name in ["ba", "cba", "sf"] {
        rows_per_shard.insert(
            name.to_string(),
            vec![row(&[("id", RowValue::Int(1)), ("province", RowValue::Text("stale".into()))])],
        );
    }
    let executor: Arc<dyn query_fanout::shard::ShardExecutor> = Arc::new(FakeShardExecutor::new(rows_per_shard));
    let consumer = Arc::new(CollectingConsumer::new());
    let processor = BatchProcessor::new(EngineConfig::default(), Arc::new(SystemClock), Arc::new(NoPressureProbe));
    let template = QueryTemplate::new("Q1", "by state", &rewritten);

    let result = processor
        .run(
            &shards(&["ba", "cba", "sf"]),
            executor,
            &rewritten,
            params,
            &template,
            &verdict,
            &filter,
            consumer.clone(),
            Arc::new(AtomicBool::new(false)),
            Arc::new(NullProgressSink),
        )
        .await;

    assert_eq!(result.total_rows, 3);
    for batch in consumer.batches.lock().unwrap().iter() {
        for r in batch {
            assert_eq!(r["province"], RowValue::Text(shards_in_result(r)));
        }
    }
}

fn shards_in_result(row: &query_fanout::shard::Row) -> String {
    match &row["province"] {
        RowValue::Text(s) => s.clone(),
        _ => unreachable!(),
    }
}

/// Scenario 2: GROUP BY province, month estimates 288 rows -> AGGREGATION;
/// 24 shards x <=12 groups consolidate into a merged result.
#[tokio::test]
async fn scenario_two_small_group_by_is_aggregation_and_consolidates() {
    let sql = "SELECT provincia, DATE_TRUNC('month', fecha) AS month, SUM(monto) AS total FROM infractions GROUP BY provincia, month";
    let verdict = QueryAnalyzer::with_default_oracle().analyze(sql);
    assert_eq!(verdict.consolidation_type, ConsolidationType::Aggregation);
    assert_eq!(verdict.estimated_rows, Some(24 * 12));

    let mut rows_per_shard = BTreeMap::new();
    rows_per_shard.insert(
        "ba".to_string(),
        vec![
            row(&[("provincia", RowValue::Text("ba".into())), ("month", RowValue::Text("2024-01".into())), ("total", RowValue::Int(10))]),
            row(&[("provincia", RowValue::Text("ba".into())), ("month", RowValue::Text("2024-02".into())), ("total", RowValue::Int(5))]),
        ],
    );
    rows_per_shard.insert(
        "cba".to_string(),
        vec![row(&[("provincia", RowValue::Text("cba".into())), ("month", RowValue::Text("2024-01".into())), ("total", RowValue::Int(7))])],
    );

    let executor: Arc<dyn query_fanout::shard::ShardExecutor> = Arc::new(FakeShardExecutor::new(rows_per_shard));
    let consumer = Arc::new(CollectingConsumer::new());
    let processor = BatchProcessor::new(EngineConfig::default(), Arc::new(SystemClock), Arc::new(NoPressureProbe));
    let mut template = QueryTemplate::new("Q2", "by province and month", sql);
    template.consolidation_type = Some(ConsolidationType::Aggregation);
    template.consolidable = true;
    template.grouping_fields = vec!["provincia".to_string()];
    template.numeric_fields = vec![NumericFieldSpec { name: "total".to_string(), aggregation: AggregationKind::Sum }];

    let filter = Filter::builder().build().unwrap();
    let params = ParameterBinder::new().bind(&filter);

    let result = processor
        .run(
            &shards(&["ba", "cba"]),
            executor,
            sql,
            params,
            &template,
            &verdict,
            &filter,
            consumer.clone(),
            Arc::new(AtomicBool::new(false)),
            Arc::new(NullProgressSink),
        )
        .await;

    assert_eq!(result.total_rows, 3);

    // The shared `Consolidator` folds every shard's rows as they arrive, so
    // the consumer sees the merged, grouped result exactly once rather than
    // the 3 raw per-shard rows.
    let batches = consumer.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let merged = &batches[0];
    assert_eq!(merged.len(), 2);
    let ba = merged.iter().find(|r| r["provincia"] == RowValue::Text("ba".into())).unwrap();
    assert_eq!(ba["total"], RowValue::Float(15.0));
}

/// Scenario 3: GROUP BY locality, infraction_type estimates 100_000 rows ->
/// AGGREGATION_HIGH_VOLUME; the streaming path flushes internally in small
/// buffers, but the shared `Consolidator` still folds every flush into one
/// merged result per spec §8 scenario 3 ("per-batch memory stays bounded").
#[tokio::test]
async fn scenario_three_high_volume_streaming_consolidates_in_bounded_batches() {
    let sql = "SELECT localidad, tipo_infraccion, COUNT(*) AS total FROM infractions GROUP BY localidad, tipo_infraccion";
    let verdict = QueryAnalyzer::with_default_oracle().analyze(sql);
    assert_eq!(verdict.consolidation_type, ConsolidationType::AggregationHighVolume);

    let mut rows_per_shard = BTreeMap::new();
    rows_per_shard.insert(
        "ba".to_string(),
        vec![
            row(&[("localidad", RowValue::Text("la-plata".into())), ("tipo_infraccion", RowValue::Text("speed".into())), ("total", RowValue::Int(4))]),
            row(&[("localidad", RowValue::Text("la-plata".into())), ("tipo_infraccion", RowValue::Text("red-light".into())), ("total", RowValue::Int(2))]),
            row(&[("localidad", RowValue::Text("quilmes".into())), ("tipo_infraccion", RowValue::Text("speed".into())), ("total", RowValue::Int(1))]),
        ],
    );
    rows_per_shard.insert(
        "cba".to_string(),
        vec![
            row(&[("localidad", RowValue::Text("la-plata".into())), ("tipo_infraccion", RowValue::Text("speed".into())), ("total", RowValue::Int(3))]),
            row(&[("localidad", RowValue::Text("quilmes".into())), ("tipo_infraccion", RowValue::Text("speed".into())), ("total", RowValue::Int(6))]),
        ],
    );

    let executor: Arc<dyn query_fanout::shard::ShardExecutor> = Arc::new(FakeShardExecutor::new(rows_per_shard));
    let consumer = Arc::new(CollectingConsumer::new());
    // A tiny flush buffer forces several internal flushes per shard, proving
    // the Consolidator accumulates across flushes rather than only across
    // shards.
    let mut config = EngineConfig::default();
    config.stream_flush_buffer = 2;
    let processor = BatchProcessor::new(config, Arc::new(SystemClock), Arc::new(NoPressureProbe));

    let mut template = QueryTemplate::new("Q3", "by locality and infraction type", sql);
    template.consolidation_type = Some(ConsolidationType::AggregationHighVolume);
    template.consolidable = true;
    template.grouping_fields = vec!["localidad".to_string(), "tipo_infraccion".to_string()];
    template.numeric_fields = vec![NumericFieldSpec { name: "total".to_string(), aggregation: AggregationKind::Sum }];

    let filter = Filter::builder().build().unwrap();
    let params = ParameterBinder::new().bind(&filter);

    let result = processor
        .run(
            &shards(&["ba", "cba"]),
            executor,
            sql,
            params,
            &template,
            &verdict,
            &filter,
            consumer.clone(),
            Arc::new(AtomicBool::new(false)),
            Arc::new(NullProgressSink),
        )
        .await;

    assert_eq!(result.total_rows, 5);

    let batches = consumer.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let merged = &batches[0];
    assert_eq!(merged.len(), 3);
    let la_plata_speed = merged
        .iter()
        .find(|r| r["localidad"] == RowValue::Text("la-plata".into()) && r["tipo_infraccion"] == RowValue::Text("speed".into()))
        .unwrap();
    assert_eq!(la_plata_speed["total"], RowValue::Float(7.0));
    let quilmes_speed = merged
        .iter()
        .find(|r| r["localidad"] == RowValue::Text("quilmes".into()) && r["tipo_infraccion"] == RowValue::Text("speed".into()))
        .unwrap();
    assert_eq!(quilmes_speed["total"], RowValue::Float(7.0));
}

/// Scenario 4: a specific-date filter combined with a range is a
/// validation error, surfaced before Phase A.
#[test]
fn scenario_four_specific_date_and_range_is_validation_error() {
    let err = Filter::builder()
        .specific_date(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        .start_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("specificDate"));
}

/// Scenario 5: one shard fails mid-loop; the task still completes with the
/// sum of the other shards' rows, and the failed shard is recorded.
#[tokio::test]
async fn scenario_five_one_shard_failure_does_not_fail_the_whole_request() {
    let sql = "SELECT id, serial FROM t WHERE a = 1";
    let verdict = QueryAnalyzer::with_default_oracle().analyze(sql);

    let mut rows_per_shard = BTreeMap::new();
    for name in ["s1", "s2", "s3", "s4", "s5", "s6"] {
        rows_per_shard.insert(name.to_string(), vec![row(&[("id", RowValue::Int(1))])]);
    }
    let executor: Arc<dyn query_fanout::shard::ShardExecutor> =
        Arc::new(FakeShardExecutor::new(rows_per_shard).with_failing_shards(vec!["s3".to_string()]));
    let consumer = Arc::new(CollectingConsumer::new());
    let processor = BatchProcessor::new(EngineConfig::default(), Arc::new(SystemClock), Arc::new(NoPressureProbe));
    let template = QueryTemplate::new("Q5", "six shards", sql);
    let filter = Filter::builder().build().unwrap();
    let params = ParameterBinder::new().bind(&filter);

    let result = processor
        .run(
            &shards(&["s1", "s2", "s3", "s4", "s5", "s6"]),
            executor,
            sql,
            params,
            &template,
            &verdict,
            &filter,
            consumer.clone(),
            Arc::new(AtomicBool::new(false)),
            Arc::new(NullProgressSink),
        )
        .await;

    assert_eq!(result.total_rows, 5);
    let failed: Vec<_> = result.shard_outcomes.iter().filter(|(_, o)| o.is_failed()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "s3");
}

/// Scenario 6: cancelling mid-run stops further consumer invocations once
/// the flag is observed.
#[tokio::test]
async fn scenario_six_cancellation_is_observed_before_further_flushes() {
    let sql = "SELECT id FROM t WHERE a = 1";
    let verdict = QueryAnalyzer::with_default_oracle().analyze(sql);

    let mut rows_per_shard = BTreeMap::new();
    rows_per_shard.insert("s1".to_string(), vec![row(&[("id", RowValue::Int(1))])]);
    let executor: Arc<dyn query_fanout::shard::ShardExecutor> = Arc::new(FakeShardExecutor::new(rows_per_shard));
    let consumer = Arc::new(CollectingConsumer::new());
    let processor = BatchProcessor::new(EngineConfig::default(), Arc::new(SystemClock), Arc::new(NoPressureProbe));
    let template = QueryTemplate::new("Q6", "one shard", sql);
    let filter = Filter::builder().build().unwrap();
    let params = ParameterBinder::new().bind(&filter);
    let cancel = Arc::new(AtomicBool::new(true));

    let result = processor
        .run(
            &shards(&["s1"]),
            executor,
            sql,
            params,
            &template,
            &verdict,
            &filter,
            consumer.clone(),
            cancel,
            Arc::new(NullProgressSink),
        )
        .await;

    assert!(result.shard_outcomes.iter().any(|(_, o)| matches!(o, query_fanout::shard::ShardOutcome::Cancelled)));
}
