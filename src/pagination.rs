// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Pagination Strategy Analyzer (C4), per spec §4.2. Chooses how a shard
// query should page through its rows, in priority order, given the
// Analyzer's verdict and the catalog template's declared key columns.
// Grounded on the teacher's `Scanner` key-range selection in
// `storage/txn/scanner/mod.rs`: a small ordered chain of "does this apply"
// checks rather than a cost-based planner.

use crate::analyzer::AnalysisVerdict;
use crate::catalog::ConsolidationType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStrategy {
    KeysetWithId,
    CompositeKeyset,
    ConsolidationKeyset,
    Offset,
    LimitOnly,
    None,
}

#[derive(Debug, Clone)]
pub struct KeyColumn {
    pub name: String,
    pub param_name: String,
    pub sql_type: String,
}

impl KeyColumn {
    pub fn new(name: impl Into<String>, param_name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        KeyColumn {
            name: name.into(),
            param_name: param_name.into(),
            sql_type: sql_type.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaginationVerdict {
    pub strategy: PaginationStrategy,
    pub key_columns: Vec<KeyColumn>,
    pub explanation: String,
}

pub struct PaginationStrategyAnalyzer;

impl PaginationStrategyAnalyzer {
    pub fn new() -> Self {
        PaginationStrategyAnalyzer
    }

    /// Chooses a strategy, per §4.2's priority order:
    /// 1. Consolidation queries with ≥1 grouping field use
    ///    `CONSOLIDATION_KEYSET` over the grouping fields.
    /// 2. Non-consolidation queries with a single-column identifier key
    ///    (the catalog's declared id column) use `KEYSET_WITH_ID`.
    /// 3. Non-consolidation queries with a multi-column declared key use
    ///    `COMPOSITE_KEYSET`.
    /// 4. A query with an explicit `page`/`offset` filter but no usable key
    ///    falls back to `OFFSET`.
    /// 5. A query with only a `limit` falls back to `LIMIT_ONLY`.
    /// 6. Otherwise `NONE` (full scan, no pagination applied).
    pub fn choose(
        &self,
        verdict: &AnalysisVerdict,
        declared_key_columns: &[KeyColumn],
        has_page_or_offset: bool,
        has_limit: bool,
    ) -> PaginationVerdict {
        if verdict.consolidable && !verdict.grouping_fields.is_empty() {
            let key_columns = verdict
                .grouping_fields
                .iter()
                .map(|f| KeyColumn::new(f.clone(), format!("cursor_{f}"), "text"))
                .collect();
            return PaginationVerdict {
                strategy: PaginationStrategy::ConsolidationKeyset,
                key_columns,
                explanation: format!(
                    "consolidation type {:?} over {} grouping field(s): CONSOLIDATION_KEYSET",
                    verdict.consolidation_type,
                    verdict.grouping_fields.len()
                ),
            };
        }

        if matches!(verdict.consolidation_type, ConsolidationType::Deduplication | ConsolidationType::Hierarchical | ConsolidationType::Combined) {
            // Catalog-only consolidation kinds the Analyzer never infers on its
            // own; still route them through the keyset path since they group.
            if !declared_key_columns.is_empty() {
                return PaginationVerdict {
                    strategy: PaginationStrategy::ConsolidationKeyset,
                    key_columns: declared_key_columns.to_vec(),
                    explanation: format!("{:?} consolidation: CONSOLIDATION_KEYSET", verdict.consolidation_type),
                };
            }
        }

        match declared_key_columns.len() {
            1 => PaginationVerdict {
                strategy: PaginationStrategy::KeysetWithId,
                key_columns: declared_key_columns.to_vec(),
                explanation: "single declared key column: KEYSET_WITH_ID".to_string(),
            },
            n if n > 1 => PaginationVerdict {
                strategy: PaginationStrategy::CompositeKeyset,
                key_columns: declared_key_columns.to_vec(),
                explanation: format!("{n} declared key columns: COMPOSITE_KEYSET"),
            },
            _ if has_page_or_offset => PaginationVerdict {
                strategy: PaginationStrategy::Offset,
                key_columns: Vec::new(),
                explanation: "page/offset filter present, no usable key: OFFSET".to_string(),
            },
            _ if has_limit => PaginationVerdict {
                strategy: PaginationStrategy::LimitOnly,
                key_columns: Vec::new(),
                explanation: "limit present, no key or offset: LIMIT_ONLY".to_string(),
            },
            _ => PaginationVerdict {
                strategy: PaginationStrategy::None,
                key_columns: Vec::new(),
                explanation: "no key, no limit, no offset: NONE".to_string(),
            },
        }
    }
}

impl Default for PaginationStrategyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
