// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Protect/restore pass of the rewriter pipeline, per §4.3 steps 2 and 6.
// Sentinels use Unicode Private Use Area code points, which cannot appear in
// SQL source text, closing the "sentinels that cannot appear in valid SQL"
// note in DESIGN NOTES §9.

use std::collections::HashMap;

use crate::sql_scan::{find_matching_paren, find_top_level_keyword, is_word_match};

const SENTINEL: char = '\u{E000}';

fn placeholder(kind: &str, n: usize) -> String {
    format!("{SENTINEL}{kind}{SENTINEL}{n}{SENTINEL}")
}

/// Replaces `EXISTS(…)`, scalar `SELECT (…)` subqueries, and `CASE … END`
/// expressions with opaque placeholders, storing originals in `map` so
/// `restore` can put them back byte-for-byte.
pub fn protect(sql: &str, map: &mut HashMap<String, String>) -> String {
    let mut result = sql.to_string();
    let mut n = 0usize;

    result = protect_paren_forms(&result, "EXISTS", "EXISTS", map, &mut n);
    result = protect_scalar_subselects(&result, map, &mut n);
    result = protect_case_expressions(&result, map, &mut n);
    result
}

fn protect_paren_forms(
    sql: &str,
    keyword: &str,
    kind: &str,
    map: &mut HashMap<String, String>,
    n: &mut usize,
) -> String {
    let mut out = String::new();
    let mut rest = sql;
    let mut base = 0usize;
    loop {
        let Some(kw_pos) = find_top_level_keyword(rest, keyword, 0) else {
            out.push_str(rest);
            break;
        };
        let after_kw = kw_pos + keyword.len();
        let ws_end = rest[after_kw..]
            .find(|c: char| !c.is_whitespace())
            .map(|p| after_kw + p)
            .unwrap_or(after_kw);
        if rest.as_bytes().get(ws_end) != Some(&b'(') {
            out.push_str(&rest[..after_kw]);
            rest = &rest[after_kw..];
            base += after_kw;
            continue;
        }
        let Some(close) = find_matching_paren(rest, ws_end) else {
            out.push_str(rest);
            break;
        };
        let original = &rest[kw_pos..close];
        let key = placeholder(kind, *n);
        map.insert(key.clone(), original.to_string());
        *n += 1;
        out.push_str(&rest[..kw_pos]);
        out.push_str(&key);
        rest = &rest[close..];
        let _ = base;
    }
    out
}

fn protect_scalar_subselects(sql: &str, map: &mut HashMap<String, String>, n: &mut usize) -> String {
    let mut out = String::new();
    let mut rest = sql;
    loop {
        let Some(open) = find_next_paren_starting_select(rest) else {
            out.push_str(rest);
            break;
        };
        let Some(close) = find_matching_paren(rest, open) else {
            out.push_str(rest);
            break;
        };
        let original = &rest[open..close];
        let key = placeholder("SUBSELECT", *n);
        map.insert(key.clone(), original.to_string());
        *n += 1;
        out.push_str(&rest[..open]);
        out.push_str(&key);
        rest = &rest[close..];
    }
    out
}

fn find_next_paren_starting_select(sql: &str) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'(' {
            let inner_start = sql[i + 1..]
                .find(|c: char| !c.is_whitespace())
                .map(|p| i + 1 + p)
                .unwrap_or(i + 1);
            if is_word_match(bytes, inner_start, b"SELECT") {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

fn protect_case_expressions(sql: &str, map: &mut HashMap<String, String>, n: &mut usize) -> String {
    let mut out = String::new();
    let mut rest = sql;
    loop {
        let Some(case_pos) = find_top_level_keyword(rest, "CASE", 0) else {
            out.push_str(rest);
            break;
        };
        let Some(end_pos) = find_matching_case_end(rest, case_pos) else {
            out.push_str(rest);
            break;
        };
        let original = &rest[case_pos..end_pos];
        let key = placeholder("CASE", *n);
        map.insert(key.clone(), original.to_string());
        *n += 1;
        out.push_str(&rest[..case_pos]);
        out.push_str(&key);
        rest = &rest[end_pos..];
    }
    out
}

/// Finds the position just past the `END` matching the `CASE` at
/// `case_pos`, honoring nested `CASE … END` blocks.
fn find_matching_case_end(sql: &str, case_pos: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut depth = 0i32;
    let mut i = case_pos;
    while i < bytes.len() {
        if is_word_match(bytes, i, b"CASE") {
            depth += 1;
            i += 4;
            continue;
        }
        if is_word_match(bytes, i, b"END") {
            depth -= 1;
            i += 3;
            if depth == 0 {
                return Some(i);
            }
            continue;
        }
        i += 1;
    }
    None
}

/// Restores every placeholder in `sql` from `map`, per §4.3 step 6.
/// Iterates to a fixed point since a restored expression can itself contain
/// a protected placeholder, nested protections resolve outside-in here
/// since protection runs outside-in.
pub fn restore(sql: &str, map: &HashMap<String, String>) -> String {
    let mut current = sql.to_string();
    for _ in 0..8 {
        let mut changed = false;
        for (key, original) in map {
            if current.contains(key.as_str()) {
                current = current.replace(key.as_str(), original);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    current
}
