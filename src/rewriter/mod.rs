// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Query Rewriter (C5), per spec §4.3. Pure function: `rewrite(sql,
// paginationVerdict, filterShape) -> sql'`. All runtime values are bound
// later via the Parameter Binder (C6). Grounded on the teacher's
// `coprocessor::dag` request-rewriting helpers for the "each pass is a
// small, independently testable step" shape, though the teacher rewrites
// protobuf DAGs rather than SQL text — the pass-pipeline discipline is what
// is borrowed.

pub mod filters;
pub mod paginate;
pub mod protect;

use std::collections::HashMap;

use crate::pagination::PaginationVerdict;
use crate::sql_scan::find_top_level_keyword;
use filters::{detect_filters, reinject_filters, strip_filters};
use paginate::{append_pagination, prepare_for_pagination};
use protect::{protect, restore};

pub struct Rewriter;

impl Rewriter {
    pub fn new() -> Self {
        Rewriter
    }

    /// Runs the full 9-step pipeline from §4.3, composed in order.
    pub fn rewrite(&self, sql: &str, pagination_verdict: &PaginationVerdict, select_list_has_id: bool) -> String {
        let normalized = normalize(sql);

        let mut protect_map = HashMap::new();
        let protected = protect(&normalized, &mut protect_map);

        let prepared = prepare_for_pagination(&protected, pagination_verdict, select_list_has_id);

        let where_clause = extract_where_clause(&prepared);
        let detected = detect_filters(&where_clause);

        let stripped = strip_filters(&prepared, &detected);
        let restored_for_reinject = restore(&stripped, &protect_map);

        let reinjected = reinject_filters(&restored_for_reinject, &detected);

        let paginated = append_pagination(&reinjected, pagination_verdict);

        restore(&paginated, &protect_map)
    }
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Strips line/block comments, collapses whitespace, strips a trailing
/// `;`, per §4.3 step 1.
fn normalize(sql: &str) -> String {
    let no_line_comments = strip_line_comments(sql);
    let no_block_comments = strip_block_comments(&no_line_comments);
    let collapsed = collapse_whitespace(&no_block_comments);
    collapsed.trim().trim_end_matches(';').trim().to_string()
}

fn strip_line_comments(sql: &str) -> String {
    sql.lines()
        .map(|line| match line.find("--") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_block_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start..].find("*/") {
            Some(end) => rest = &rest[start + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn collapse_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut last_was_space = false;
    for c in sql.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

fn extract_where_clause(sql: &str) -> String {
    let Some(where_pos) = find_top_level_keyword(sql, "WHERE", 0) else {
        return String::new();
    };
    let start = where_pos + "WHERE".len();
    let end = find_top_level_keyword(&sql[start..], "GROUP", 0)
        .or_else(|| find_top_level_keyword(&sql[start..], "ORDER", 0))
        .or_else(|| find_top_level_keyword(&sql[start..], "LIMIT", 0))
        .map(|p| start + p)
        .unwrap_or(sql.len());
    sql[start..end].to_string()
}
