// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Query Analyzer (C3), per spec §4.1. Classifies the SELECT list,
// detects GROUP BY, estimates post-aggregation cardinality, and emits a
// consolidation verdict. Grounded on the teacher's
// `tidb_query_executors::runner` batch-classification shape (a cascade of
// narrow checks rather than a general planner) and on its "never panics,
// always returns a result" discipline — here realized as `AnalysisVerdict`
// always being produced, never a `Result`.

pub mod cardinality;

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::catalog::ConsolidationType;
use crate::sql_scan::{find_outer_select_from, find_top_level_keyword, split_top_level};
use cardinality::{type_default_cardinality, CardinalityOracle, StaticCardinalityTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Location,
    Time,
    Categorization,
    NumericSum,
    NumericCount,
    Identifier,
    Detail,
    Computed,
}

#[derive(Debug, Clone)]
pub struct SelectField {
    pub name: String,
    pub expr: String,
    pub field_type: FieldType,
}

#[derive(Debug, Clone)]
pub struct AnalysisVerdict {
    pub consolidable: bool,
    pub grouping_fields: Vec<String>,
    pub numeric_fields: Vec<String>,
    pub time_fields: Vec<String>,
    pub location_fields: Vec<String>,
    pub field_type_map: HashMap<String, FieldType>,
    pub consolidation_type: ConsolidationType,
    pub estimated_rows: Option<u64>,
    pub confidence: f64,
    pub explanation: String,
}

impl AnalysisVerdict {
    pub fn empty() -> Self {
        AnalysisVerdict {
            consolidable: false,
            grouping_fields: Vec::new(),
            numeric_fields: Vec::new(),
            time_fields: Vec::new(),
            location_fields: Vec::new(),
            field_type_map: HashMap::new(),
            consolidation_type: ConsolidationType::Raw,
            estimated_rows: None,
            confidence: 0.0,
            explanation: "unparseable query".to_string(),
        }
    }
}

fn aggregation_fn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(SUM|AVG)\s*\(").unwrap())
}

fn count_fn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^COUNT\s*\(").unwrap())
}

fn wrapping_fn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(DATE_TRUNC|EXTRACT|TO_CHAR|DATE)\s*\(").unwrap()
    })
}

fn alias_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?P<expr>.+?)\s+AS\s+(?P<alias>[A-Za-z_][A-Za-z0-9_]*)\s*$").unwrap())
}

fn group_by_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bGROUP\s+BY\b").unwrap())
}

/// Derives the final projected name for a SELECT list item, per §4.1 step 2:
/// explicit alias wins; otherwise a closed set of wrapping-function rules
/// ("month" out of `DATE_TRUNC('month', x)`, etc.); otherwise the table
/// prefix is stripped from a bare column reference.
fn derive_field_name(item: &str) -> (String, String) {
    let item = item.trim();
    if let Some(caps) = alias_regex().captures(item) {
        let expr = caps.name("expr").unwrap().as_str().trim().to_string();
        let alias = caps.name("alias").unwrap().as_str().to_string();
        return (alias, expr);
    }

    if let Some(m) = wrapping_fn_regex().find(item) {
        let fn_name = m.as_str().trim_end_matches(|c: char| c == '(' || c.is_whitespace());
        let fn_upper = fn_name.to_ascii_uppercase();
        if fn_upper.starts_with("DATE_TRUNC") {
            // DATE_TRUNC('month', x) -> month
            if let Some(start) = item.find('\'') {
                if let Some(end) = item[start + 1..].find('\'') {
                    let unit = &item[start + 1..start + 1 + end];
                    return (unit.to_ascii_lowercase(), item.to_string());
                }
            }
        } else if fn_upper.starts_with("EXTRACT") {
            // EXTRACT(YEAR FROM x) -> year
            let re = Regex::new(r"(?i)EXTRACT\s*\(\s*([A-Za-z]+)\s+FROM").unwrap();
            if let Some(caps) = re.captures(item) {
                return (caps[1].to_ascii_lowercase(), item.to_string());
            }
        } else if fn_upper.starts_with("TO_CHAR") || fn_upper.starts_with("DATE") {
            // TO_CHAR(x, ...) / DATE(x) -> x (the inner column name)
            if let Some(open) = item.find('(') {
                let inner = &item[open + 1..];
                let arg_end = inner.find(',').unwrap_or(inner.len());
                let inner_col = inner[..arg_end].trim();
                let stripped = strip_table_prefix(inner_col);
                return (stripped.clone(), item.to_string());
            }
        }
    }

    let stripped = strip_table_prefix(item);
    (stripped, item.to_string())
}

fn strip_table_prefix(expr: &str) -> String {
    let trimmed = expr.trim().trim_matches(|c| c == '"' || c == '`');
    match trimmed.rsplit_once('.') {
        Some((_, col)) => col.trim_matches(|c| c == '"' || c == '`').to_string(),
        None => trimmed.to_string(),
    }
}

/// Classifies a field by its name and expression, per §4.1 step 3's
/// explicit-map -> aggregation-regex -> substring-heuristic cascade.
fn classify_field(name: &str, expr: &str) -> FieldType {
    if count_fn_regex().is_match(expr.trim()) {
        return FieldType::NumericCount;
    }
    if aggregation_fn_regex().is_match(expr.trim()) {
        return FieldType::NumericSum;
    }

    let lower = name.to_ascii_lowercase();
    if lower.starts_with("fecha") || lower.starts_with("date") || lower == "month" || lower == "year" || lower == "day" {
        return FieldType::Time;
    }
    if lower.contains("provincia")
        || lower.contains("municipio")
        || lower.contains("localidad")
        || lower.contains("lugar")
        || lower.contains("province")
        || lower.contains("location")
    {
        return FieldType::Location;
    }
    if lower.contains("tipo") || lower.contains("estado") || lower.contains("categoria") || lower.contains("category") {
        return FieldType::Categorization;
    }
    if lower.contains("total") || lower.contains("sum") || lower.contains("count") || lower.contains("cantidad") || lower.contains("monto") {
        return FieldType::NumericSum;
    }
    if lower.ends_with("_id") || lower == "id" || lower.contains("codigo") || lower.contains("serie") {
        return FieldType::Identifier;
    }
    FieldType::Detail
}

pub struct QueryAnalyzer {
    oracle: Arc<dyn CardinalityOracle>,
    streaming_threshold: u64,
    high_volume_threshold: u64,
}

impl QueryAnalyzer {
    pub fn new(oracle: Arc<dyn CardinalityOracle>) -> Self {
        QueryAnalyzer {
            oracle,
            streaming_threshold: 50_000,
            high_volume_threshold: 100_000,
        }
    }

    pub fn with_thresholds(mut self, streaming: u64, high_volume: u64) -> Self {
        self.streaming_threshold = streaming;
        self.high_volume_threshold = high_volume;
        self
    }

    pub fn with_default_oracle() -> Self {
        Self::new(Arc::new(StaticCardinalityTable::new()))
    }

    /// Runs the full classify/estimate/verdict pipeline. Never panics: any
    /// unparseable input yields `AnalysisVerdict::empty()`, per §4.1
    /// "Failure modes".
    pub fn analyze(&self, sql: &str) -> AnalysisVerdict {
        self.try_analyze(sql).unwrap_or_else(AnalysisVerdict::empty)
    }

    fn try_analyze(&self, sql: &str) -> Option<AnalysisVerdict> {
        let (list_start, list_end, _) = find_outer_select_from(sql)?;
        let select_list = &sql[list_start..list_end];
        let items = split_top_level(select_list, ',');
        if items.is_empty() {
            return None;
        }

        let mut fields = Vec::with_capacity(items.len());
        for item in &items {
            let (name, expr) = derive_field_name(item);
            let field_type = classify_field(&name, &expr);
            fields.push(SelectField { name, expr, field_type });
        }

        let group_by_cols = self.resolve_group_by(sql, &fields);

        let mut field_type_map = HashMap::new();
        let mut numeric_fields = Vec::new();
        let mut time_fields = Vec::new();
        let mut location_fields = Vec::new();
        for f in &fields {
            field_type_map.insert(f.name.clone(), f.field_type);
            match f.field_type {
                FieldType::NumericSum | FieldType::NumericCount => numeric_fields.push(f.name.clone()),
                FieldType::Time => time_fields.push(f.name.clone()),
                FieldType::Location => location_fields.push(f.name.clone()),
                _ => {}
            }
        }

        let mut grouping_fields = group_by_cols;
        if !grouping_fields.is_empty() && location_fields.is_empty() && !field_type_map.contains_key("province") {
            grouping_fields.push("province".to_string());
            field_type_map.insert("province".to_string(), FieldType::Location);
            location_fields.push("province".to_string());
        }

        if grouping_fields.is_empty() {
            return Some(AnalysisVerdict {
                consolidable: false,
                grouping_fields,
                numeric_fields,
                time_fields,
                location_fields,
                field_type_map,
                consolidation_type: ConsolidationType::Raw,
                estimated_rows: None,
                confidence: 0.0,
                explanation: "no GROUP BY: raw pass-through".to_string(),
            });
        }

        let (estimate, confidence) = self.estimate_rows(&grouping_fields, &field_type_map);
        let consolidation_type = match estimate {
            e if e < self.streaming_threshold => ConsolidationType::Aggregation,
            e if e < self.high_volume_threshold => ConsolidationType::AggregationStreaming,
            _ => ConsolidationType::AggregationHighVolume,
        };

        let consolidable = !numeric_fields.is_empty() && !grouping_fields.is_empty();

        let explanation = format!(
            "GROUP BY over {} field(s), estimated {} rows ({}% known cardinality) -> {:?}",
            grouping_fields.len(),
            estimate,
            (confidence * 100.0) as u32,
            consolidation_type,
        );

        Some(AnalysisVerdict {
            consolidable,
            grouping_fields,
            numeric_fields,
            time_fields,
            location_fields,
            field_type_map,
            consolidation_type,
            estimated_rows: Some(estimate),
            confidence,
            explanation,
        })
    }

    /// Detects `GROUP BY`, resolving numeric positional references against
    /// the resolved SELECT names, per §4.1 step 4.
    fn resolve_group_by(&self, sql: &str, fields: &[SelectField]) -> Vec<String> {
        let Some(m) = group_by_regex().find(sql) else {
            return Vec::new();
        };
        let after = m.end();
        let rest = &sql[after..];
        let end = find_top_level_keyword(rest, "ORDER", 0)
            .or_else(|| find_top_level_keyword(rest, "HAVING", 0))
            .or_else(|| find_top_level_keyword(rest, "LIMIT", 0))
            .unwrap_or(rest.len());
        let clause = rest[..end].trim().trim_end_matches(';');
        split_top_level(clause, ',')
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|item| {
                if let Ok(pos) = item.parse::<usize>() {
                    fields
                        .get(pos.saturating_sub(1))
                        .map(|f| f.name.clone())
                        .unwrap_or(item)
                } else {
                    strip_table_prefix(&item)
                }
            })
            .collect()
    }

    /// Multiplies known per-column cardinalities, applying the type-based
    /// default for unknown columns, per §4.1 step 5.
    fn estimate_rows(&self, grouping_fields: &[String], type_map: &HashMap<String, FieldType>) -> (u64, f64) {
        let mut estimate: u64 = 1;
        let mut known = 0usize;
        for field in grouping_fields {
            let field_type = type_map.get(field).copied().unwrap_or(FieldType::Detail);
            let value = match self.oracle.cardinality(field, field_type) {
                Some(v) => {
                    known += 1;
                    v
                }
                None => type_default_cardinality(field_type),
            };
            estimate = estimate.saturating_mul(value);
        }
        let confidence = if grouping_fields.is_empty() {
            0.0
        } else {
            known as f64 / grouping_fields.len() as f64
        };
        (estimate, confidence)
    }
}
