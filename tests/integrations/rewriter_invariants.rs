// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
use query_fanout::analyzer::QueryAnalyzer;
use query_fanout::pagination::{KeyColumn, PaginationStrategyAnalyzer};
use query_fanout::rewriter::Rewriter;

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

const SCENARIO_ONE_SQL: &str =
    "SELECT i.id, pc.serial_equipment, pc.location, i.date FROM infractions i JOIN pc ON true WHERE i.state IN (1,2)";

const SCENARIO_TWO_SQL: &str =
    "SELECT provincia, DATE_TRUNC('month', fecha) AS month, SUM(monto) AS total FROM infractions GROUP BY provincia, month";

const EXISTS_SQL: &str =
    "SELECT id FROM infractions i WHERE EXISTS (SELECT 1 FROM pc WHERE pc.id = i.id AND pc.state IN (1,2)) AND i.exporta_sacit = true";

/// A rewrite never produces more than one LIMIT clause, regardless of
/// whether the source SQL already carried one.
#[test]
fn rewrite_never_duplicates_limit() {
    let verdict = QueryAnalyzer::with_default_oracle().analyze(SCENARIO_ONE_SQL);
    let pagination = PaginationStrategyAnalyzer::new().choose(
        &verdict,
        &[KeyColumn::new("id", "keyset_col_0", "int")],
        false,
        false,
    );
    let rewritten = Rewriter::new().rewrite(SCENARIO_ONE_SQL, &pagination, true);
    assert_eq!(count_occurrences(&rewritten.to_uppercase(), "LIMIT"), 1);

    let already_limited = format!("{} LIMIT 50", SCENARIO_ONE_SQL);
    let rewritten_again = Rewriter::new().rewrite(&already_limited, &pagination, true);
    assert_eq!(count_occurrences(&rewritten_again.to_uppercase(), "LIMIT"), 1);
}

/// A `CASE` expression nested inside an `EXISTS` subquery survives the
/// protect/restore round trip unchanged, and the EXISTS predicate itself is
/// never mistaken for one of the recognized, strippable filters.
#[test]
fn protected_subexpressions_survive_filter_stripping() {
    let verdict = QueryAnalyzer::with_default_oracle().analyze(EXISTS_SQL);
    let pagination = PaginationStrategyAnalyzer::new().choose(&verdict, &[], false, false);
    let rewritten = Rewriter::new().rewrite(EXISTS_SQL, &pagination, true);

    assert!(rewritten.contains("EXISTS (SELECT 1 FROM pc WHERE pc.id = i.id AND pc.state IN (1,2))"));
    assert!(!rewritten.contains("i.exporta_sacit = true"));
}

/// Every recognized filter kind in a WHERE clause is replaced by its
/// parameterized, null-passthrough form rather than left as a literal.
#[test]
fn recognized_filters_are_parameterized() {
    let sql = "SELECT id FROM infractions WHERE fecha BETWEEN '2024-01-01' AND '2024-01-31' AND id_estado IN (1,2) AND exporta_sacit = true";
    let verdict = QueryAnalyzer::with_default_oracle().analyze(sql);
    let pagination = PaginationStrategyAnalyzer::new().choose(
        &verdict,
        &[KeyColumn::new("id", "keyset_col_0", "int")],
        false,
        false,
    );
    let rewritten = Rewriter::new().rewrite(sql, &pagination, true);

    assert!(!rewritten.contains("'2024-01-01'"));
    assert!(!rewritten.contains("id_estado IN (1,2)"));
    assert!(!rewritten.contains("exporta_sacit = true"));
    assert!(rewritten.contains(":startDate") || rewritten.contains(":endDate"));
}

/// Rewriting is idempotent: handing the output back through the same
/// pipeline with the same pagination verdict produces the same SQL, modulo
/// whitespace collapsing that already happened on the first pass.
#[test]
fn rewrite_is_idempotent() {
    for (sql, key_columns) in [
        (SCENARIO_ONE_SQL, vec![KeyColumn::new("id", "keyset_col_0", "int")]),
        (SCENARIO_TWO_SQL, vec![]),
    ] {
        let verdict = QueryAnalyzer::with_default_oracle().analyze(sql);
        let pagination = PaginationStrategyAnalyzer::new().choose(&verdict, &key_columns, false, false);
        let once = Rewriter::new().rewrite(sql, &pagination, true);
        let twice = Rewriter::new().rewrite(&once, &pagination, true);
        assert_eq!(once, twice, "second rewrite pass diverged for {sql}");
    }
}

/// Rewriting a query's text never changes the Analyzer's verdict about it:
/// the SELECT list, GROUP BY shape, and consolidation type are computed
/// before rewriting and must still hold after, since the Rewriter only
/// touches the WHERE clause and tail.
#[test]
fn analyzer_verdict_is_stable_across_rewrite() {
    let verdict_before = QueryAnalyzer::with_default_oracle().analyze(SCENARIO_TWO_SQL);
    let pagination = PaginationStrategyAnalyzer::new().choose(&verdict_before, &[], false, false);
    let rewritten = Rewriter::new().rewrite(SCENARIO_TWO_SQL, &pagination, true);
    let verdict_after = QueryAnalyzer::with_default_oracle().analyze(&rewritten);

    assert_eq!(verdict_before.consolidable, verdict_after.consolidable);
    assert_eq!(verdict_before.consolidation_type, verdict_after.consolidation_type);
    assert_eq!(verdict_before.grouping_fields, verdict_after.grouping_fields);
}
