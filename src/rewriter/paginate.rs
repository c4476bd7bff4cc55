// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Pagination-clause appending pass, per §4.3 steps 3 and 8-9.

use std::sync::OnceLock;

use regex::Regex;

use crate::pagination::{KeyColumn, PaginationStrategy, PaginationVerdict};
use crate::sql_scan::{find_outer_select_from, find_top_level_keyword, split_top_level};

fn aggregation_expr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(SUM|AVG|COUNT|MAX|MIN)\s*\(").unwrap())
}

/// Injects the primary `id` column as the first projected column when the
/// strategy is `KEYSET_WITH_ID` and `id` is absent from the SELECT list, per
/// §4.3 step 3. GROUP BY positional references are shifted by +1; positions
/// pointing at aggregation functions are dropped.
pub fn prepare_for_pagination(sql: &str, verdict: &PaginationVerdict, select_list_has_id: bool) -> String {
    if verdict.strategy != PaginationStrategy::KeysetWithId || select_list_has_id {
        return sql.to_string();
    }
    let Some(select_pos) = find_top_level_keyword(sql, "SELECT", 0) else {
        return sql.to_string();
    };
    let insert_at = select_pos + "SELECT".len();
    let mut out = String::with_capacity(sql.len() + 8);
    out.push_str(&sql[..insert_at]);
    out.push_str(" id,");
    out.push_str(&sql[insert_at..]);
    shift_group_by_positions(&out)
}

/// `sql` already has the `id` column inserted as the new first projection,
/// so a 1-based position `n` written against the *original* SELECT list
/// (before `id` was inserted) now lives at position `n + 1` in this one --
/// that's exactly what lets us both resolve and shift in the same lookup.
/// Per §4.3 step 3, a position whose original item is an aggregation
/// function (`SUM`, `COUNT`, ...) is dropped rather than shifted: grouping
/// by an aggregate's result column is never valid SQL.
fn shift_group_by_positions(sql: &str) -> String {
    let Some(gb_pos) = find_top_level_keyword(sql, "GROUP", 0) else {
        return sql.to_string();
    };
    let Some(by_pos) = find_top_level_keyword(&sql[gb_pos..], "BY", 0) else {
        return sql.to_string();
    };
    let clause_start = gb_pos + by_pos + 2;
    let clause_end = find_top_level_keyword(&sql[clause_start..], "ORDER", 0)
        .or_else(|| find_top_level_keyword(&sql[clause_start..], "HAVING", 0))
        .or_else(|| find_top_level_keyword(&sql[clause_start..], "LIMIT", 0))
        .map(|p| clause_start + p)
        .unwrap_or(sql.len());

    let select_items = select_list_items(sql);

    let clause = &sql[clause_start..clause_end];
    let shifted: Vec<String> = clause
        .split(',')
        .filter_map(|item| {
            let item = item.trim();
            let n = item.parse::<usize>().ok()?;
            let points_at_aggregation = select_items.get(n).is_some_and(|expr| aggregation_expr_regex().is_match(expr));
            if points_at_aggregation {
                None
            } else {
                Some((n + 1).to_string())
            }
        })
        .collect();
    if shifted.is_empty() {
        return sql.to_string();
    }
    format!("{} {} {}", &sql[..clause_start], shifted.join(", "), &sql[clause_end..])
}

/// The SELECT list of `sql`, split on top-level commas and trimmed. Indexed
/// 1-based by `shift_group_by_positions` to match SQL's own GROUP BY
/// position convention.
fn select_list_items(sql: &str) -> Vec<String> {
    match find_outer_select_from(sql) {
        Some((start, end, _)) => split_top_level(&sql[start..end], ',').into_iter().map(|s| s.trim().to_string()).collect(),
        None => Vec::new(),
    }
}

/// Appends the pagination clause chosen by the Pagination Strategy
/// Analyzer, per §4.3 step 8. Guarantees exactly one `LIMIT` clause (step
/// 9): if the input already has one, it is left untouched and no second one
/// is appended.
pub fn append_pagination(sql: &str, verdict: &PaginationVerdict) -> String {
    let has_limit = find_top_level_keyword(sql, "LIMIT", 0).is_some();
    let trimmed = sql.trim_end();

    match verdict.strategy {
        PaginationStrategy::KeysetWithId => append_keyset(trimmed, &verdict.key_columns, has_limit, "id", ":lastId"),
        PaginationStrategy::CompositeKeyset => {
            let distinct = find_top_level_keyword(trimmed, "DISTINCT", 0).is_some();
            append_composite(trimmed, &verdict.key_columns, has_limit, distinct)
        }
        PaginationStrategy::ConsolidationKeyset => {
            append_consolidation_keyset(trimmed, &verdict.key_columns, has_limit)
        }
        PaginationStrategy::Offset => {
            if has_limit {
                trimmed.to_string()
            } else {
                format!("{trimmed} LIMIT :limit OFFSET :offset")
            }
        }
        PaginationStrategy::LimitOnly | PaginationStrategy::None => {
            if has_limit {
                trimmed.to_string()
            } else {
                format!("{trimmed} LIMIT :limit")
            }
        }
    }
}

fn append_keyset(sql: &str, key_columns: &[KeyColumn], has_limit: bool, lead_col: &str, lead_param: &str) -> String {
    let mut chain_terms = Vec::new();
    let mut order_cols = vec![format!("{lead_col} ASC")];
    let mut prefix_eq = vec![format!("{lead_col} = {lead_param}")];
    chain_terms.push(format!("{lead_col} > {lead_param}"));

    for col in key_columns {
        let cond = format!(
            "({} AND {} > :{})",
            prefix_eq.join(" AND "),
            col.name,
            col.param_name
        );
        chain_terms.push(cond);
        prefix_eq.push(format!("{} = :{}", col.name, col.param_name));
        order_cols.push(format!("{} ASC", col.name));
    }

    let predicate = format!("({lead_param} IS NULL OR ({}))", chain_terms.join(" OR "));
    let mut out = inject_where_and(sql, &predicate);
    out.push_str(&format!(" ORDER BY {}", order_cols.join(", ")));
    if !has_limit {
        out.push_str(" LIMIT :limit");
    }
    out
}

fn append_composite(sql: &str, key_columns: &[KeyColumn], has_limit: bool, distinct: bool) -> String {
    let mut chain_terms = Vec::new();
    let mut prefix_eq = Vec::new();
    let mut order_cols = Vec::new();

    for (i, col) in key_columns.iter().take(4).enumerate() {
        let col_ref = if distinct {
            col.name.clone()
        } else {
            format!("COALESCE({}, '')", col.name)
        };
        let param = format!(":{}", col.param_name);
        let param_ref = if distinct { param.clone() } else { format!("COALESCE({param}, '')") };

        let mut and_terms = prefix_eq.clone();
        and_terms.push(format!("{col_ref} > {param_ref}"));
        chain_terms.push(format!("({})", and_terms.join(" AND ")));
        prefix_eq.push(format!("{col_ref} = {param_ref}"));
        order_cols.push(format!("{} ASC", col.name));
        let _ = i;
    }

    let first_param = key_columns
        .first()
        .map(|c| format!(":{}", c.param_name))
        .unwrap_or_else(|| ":keyset_col_0".to_string());
    let predicate = format!("({first_param} IS NULL OR ({}))", chain_terms.join(" OR "));
    let mut out = inject_where_and(sql, &predicate);
    out.push_str(&format!(" ORDER BY {}", order_cols.join(", ")));
    if !has_limit {
        out.push_str(" LIMIT :limit");
    }
    out
}

fn append_consolidation_keyset(sql: &str, key_columns: &[KeyColumn], has_limit: bool) -> String {
    let mut chain_terms = Vec::new();
    let mut prefix_eq = Vec::new();
    let mut order_cols = Vec::new();

    for col in key_columns.iter().take(4) {
        let col_ref = format!("COALESCE({}, '')", col.name);
        let param_ref = format!("COALESCE(:{}, '')", col.param_name);
        let mut and_terms = prefix_eq.clone();
        and_terms.push(format!("{col_ref} > {param_ref}"));
        chain_terms.push(format!("({})", and_terms.join(" AND ")));
        prefix_eq.push(format!("{col_ref} = {param_ref}"));
        order_cols.push(format!("{} ASC", col.name));
    }

    let first_param = key_columns
        .first()
        .map(|c| format!(":{}", c.param_name))
        .unwrap_or_else(|| ":keyset_col_0".to_string());
    let predicate = format!("({first_param} IS NULL OR ({}))", chain_terms.join(" OR "));

    let gb_pos = find_top_level_keyword(sql, "GROUP", 0).unwrap_or(sql.len());
    let (head, tail) = sql.split_at(gb_pos);
    let mut out = inject_where_and(head.trim_end(), &predicate);
    out.push(' ');
    out.push_str(tail);
    if !order_cols.is_empty() {
        out.push_str(&format!(" ORDER BY {}", order_cols.join(", ")));
    }
    if !has_limit {
        out.push_str(" LIMIT :limit");
    }
    out
}

fn inject_where_and(sql: &str, predicate: &str) -> String {
    let tail_start = find_top_level_keyword(sql, "GROUP", 0)
        .or_else(|| find_top_level_keyword(sql, "ORDER", 0))
        .or_else(|| find_top_level_keyword(sql, "LIMIT", 0))
        .unwrap_or(sql.len());
    let (head, tail) = sql.split_at(tail_start);
    let has_where = find_top_level_keyword(head, "WHERE", 0).is_some();
    let head_trimmed = head.trim_end();
    if has_where {
        format!("{head_trimmed} AND {predicate} {tail}").trim_end().to_string()
    } else {
        format!("{head_trimmed} WHERE {predicate} {tail}").trim_end().to_string()
    }
}
