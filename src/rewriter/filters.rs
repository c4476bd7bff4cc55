// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Detect/strip/reinject pass of the rewriter pipeline, per §4.3 steps 4, 5,
// 7. Operates only on the (already protected) WHERE clause text; recognizes
// the hardcoded filter kinds named in spec §4.3, including the four location
// scope levels from the Filter model's `provinces`/`municipalities`/
// `places`/`districts` (§3).

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    DateRange,
    InfractionState,
    InfractionType,
    ExportedToExternal,
    Province,
    Municipality,
    Place,
    District,
}

#[derive(Debug, Clone)]
pub struct DetectedFilter {
    pub kind: FilterKind,
    pub matched_text: String,
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[\w.]*fecha\w*\s*(BETWEEN\s+'[^']*'\s+AND\s+'[^']*'|[<>=]+\s*'[^']*')").unwrap()
    })
}

fn infraction_state_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[\w.]*(?:id_estado|state)\w*\s+IN\s*\([^)]*\)").unwrap())
}

fn infraction_type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[\w.]*id_tipo_infra\w*\s+IN\s*\([^)]*\)").unwrap())
}

fn exported_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[\w.]*exporta_sacit\w*\s*=\s*(true|false)").unwrap())
}

fn province_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[\w.]*provincia\w*\s+IN\s*\([^)]*\)").unwrap())
}

fn municipality_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[\w.]*municipio\w*\s+IN\s*\([^)]*\)").unwrap())
}

fn place_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[\w.]*lugar\w*\s+IN\s*\([^)]*\)").unwrap())
}

fn district_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[\w.]*distrito\w*\s+IN\s*\([^)]*\)").unwrap())
}

/// Scans `where_clause` for the recognized hardcoded filter kinds, per
/// §4.3 step 4.
pub fn detect_filters(where_clause: &str) -> Vec<DetectedFilter> {
    let mut found = Vec::new();
    for (re, kind) in [
        (date_regex(), FilterKind::DateRange),
        (infraction_state_regex(), FilterKind::InfractionState),
        (infraction_type_regex(), FilterKind::InfractionType),
        (exported_regex(), FilterKind::ExportedToExternal),
        (province_regex(), FilterKind::Province),
        (municipality_regex(), FilterKind::Municipality),
        (place_regex(), FilterKind::Place),
        (district_regex(), FilterKind::District),
    ] {
        for m in re.find_iter(where_clause) {
            found.push(DetectedFilter {
                kind,
                matched_text: m.as_str().to_string(),
            });
        }
    }
    found
}

/// Removes every detected hardcoded filter from `sql`, then collapses
/// leftover `WHERE AND`, `AND AND`, and empty `WHERE` via a bounded
/// fixed-point loop (≤3 iterations), per §4.3 step 5.
pub fn strip_filters(sql: &str, detected: &[DetectedFilter]) -> String {
    let mut result = sql.to_string();
    for filter in detected {
        result = result.replacen(&filter.matched_text, "", 1);
    }
    collapse_boolean_debris(&result)
}

fn collapse_boolean_debris(sql: &str) -> String {
    let mut result = sql.to_string();
    for _ in 0..3 {
        let before = result.clone();
        result = collapse_once(&result);
        if result == before {
            break;
        }
    }
    result
}

fn collapse_once(sql: &str) -> String {
    let and_and = Regex::new(r"(?i)\bAND\s+AND\b").unwrap();
    let where_and = Regex::new(r"(?i)\bWHERE\s+AND\b").unwrap();
    let trailing_and = Regex::new(r"(?i)\bAND\s*(\)|GROUP\s+BY|ORDER\s+BY|LIMIT|$)").unwrap();
    let empty_where = Regex::new(r"(?i)\bWHERE\s*(GROUP\s+BY|ORDER\s+BY|LIMIT|$)").unwrap();

    let mut out = and_and.replace_all(sql, "AND").to_string();
    out = where_and.replace_all(&out, "WHERE").to_string();
    out = trailing_and.replace_all(&out, "$1").to_string();
    out = empty_where.replace_all(&out, "$1").to_string();
    out
}

/// Stable templates for re-injecting parameterized filters, per §4.3 step 7:
/// `(:param IS NULL OR column op :param)` null-passthrough pattern.
pub fn reinject_filters(sql: &str, detected: &[DetectedFilter]) -> String {
    let kinds: std::collections::BTreeSet<_> = detected.iter().map(|f| discriminant_key(f.kind)).collect();
    if kinds.is_empty() {
        return sql.to_string();
    }

    let mut clauses = Vec::new();
    if kinds.contains(&discriminant_key(FilterKind::DateRange)) {
        clauses.push(
            "(:startDate IS NULL OR fecha >= :startDate) AND (:endDate IS NULL OR fecha <= :endDate) AND (:specificDate IS NULL OR fecha = :specificDate)"
                .to_string(),
        );
    }
    if kinds.contains(&discriminant_key(FilterKind::InfractionState)) {
        clauses.push("(:infractionStates IS NULL OR id_estado = ANY(:infractionStates))".to_string());
    }
    if kinds.contains(&discriminant_key(FilterKind::InfractionType)) {
        clauses.push("(:infractionTypes IS NULL OR id_tipo_infra = ANY(:infractionTypes))".to_string());
    }
    if kinds.contains(&discriminant_key(FilterKind::ExportedToExternal)) {
        clauses.push("(:exportedToExternal IS NULL OR exporta_sacit = :exportedToExternal)".to_string());
    }
    if kinds.contains(&discriminant_key(FilterKind::Province)) {
        clauses.push("(:provinces IS NULL OR provincia = ANY(:provinces))".to_string());
    }
    if kinds.contains(&discriminant_key(FilterKind::Municipality)) {
        clauses.push("(:municipalities IS NULL OR municipio = ANY(:municipalities))".to_string());
    }
    if kinds.contains(&discriminant_key(FilterKind::Place)) {
        clauses.push("(:places IS NULL OR lugar = ANY(:places))".to_string());
    }
    if kinds.contains(&discriminant_key(FilterKind::District)) {
        clauses.push("(:districts IS NULL OR distrito = ANY(:districts))".to_string());
    }

    inject_where(sql, &clauses.join(" AND "))
}

fn discriminant_key(kind: FilterKind) -> u8 {
    match kind {
        FilterKind::DateRange => 0,
        FilterKind::InfractionState => 1,
        FilterKind::InfractionType => 2,
        FilterKind::ExportedToExternal => 3,
        FilterKind::Province => 4,
        FilterKind::Municipality => 5,
        FilterKind::Place => 6,
        FilterKind::District => 7,
    }
}

/// Appends `clause` into the query's WHERE, creating one if absent, placed
/// before any `GROUP BY`/`ORDER BY`/`LIMIT` tail.
fn inject_where(sql: &str, clause: &str) -> String {
    use crate::sql_scan::find_top_level_keyword;

    let tail_start = find_top_level_keyword(sql, "GROUP", 0)
        .or_else(|| find_top_level_keyword(sql, "ORDER", 0))
        .or_else(|| find_top_level_keyword(sql, "LIMIT", 0))
        .unwrap_or(sql.len());
    let (head, tail) = sql.split_at(tail_start);

    let has_where = find_top_level_keyword(head, "WHERE", 0).is_some();
    let head_trimmed = head.trim_end();
    let joined = if has_where {
        format!("{head_trimmed} AND {clause} ")
    } else {
        format!("{head_trimmed} WHERE {clause} ")
    };
    format!("{joined}{tail}")
}
