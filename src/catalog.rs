// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Query Catalog (C2), per spec §3/§6. Stores SQL templates keyed by code.
// The production catalog (persistence, CRUD transport) is out of scope;
// `InMemoryCatalog` is a reference implementation giving the crate a
// runnable default and a seam hosts replace with their own backing store,
// matching `QueryCatalog` as a trait rather than a concrete type.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::analyzer::FieldType;
use crate::pagination::PaginationStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationType {
    Aggregation,
    AggregationStreaming,
    AggregationHighVolume,
    Raw,
    Deduplication,
    Hierarchical,
    Combined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationKind {
    Sum,
    Count,
    Max,
    Min,
}

#[derive(Debug, Clone)]
pub struct NumericFieldSpec {
    pub name: String,
    pub aggregation: AggregationKind,
}

#[derive(Debug, Clone)]
pub struct QueryTemplate {
    pub code: String,
    pub name: String,
    pub sql_text: String,
    pub category: String,
    pub consolidable: bool,
    pub consolidation_type: Option<ConsolidationType>,
    pub pagination_strategy: PaginationStrategy,
    pub estimated_rows: Option<u64>,
    pub grouping_fields: Vec<String>,
    pub numeric_fields: Vec<NumericFieldSpec>,
    pub field_type_map: Vec<(String, FieldType)>,
    /// Declares the ordering keys are NOT NULL, suppressing the
    /// `COALESCE` fallback for `COMPOSITE_KEYSET` rewriting (open question,
    /// DESIGN NOTES §9).
    pub ordering_keys_not_null: bool,
    /// Monotonic version, bumped on every update; soft-deleted templates
    /// keep their last version.
    pub version: u32,
    pub deleted: bool,
}

impl QueryTemplate {
    pub fn new(code: impl Into<String>, name: impl Into<String>, sql_text: impl Into<String>) -> Self {
        QueryTemplate {
            code: code.into(),
            name: name.into(),
            sql_text: sql_text.into(),
            category: String::new(),
            consolidable: false,
            consolidation_type: None,
            pagination_strategy: PaginationStrategy::None,
            estimated_rows: None,
            grouping_fields: Vec::new(),
            numeric_fields: Vec::new(),
            field_type_map: Vec::new(),
            ordering_keys_not_null: false,
            version: 1,
            deleted: false,
        }
    }
}

/// Storage-agnostic catalog contract, per spec §6. The production backing
/// store is out of scope; hosts implement this trait against whatever they
/// persist templates in.
pub trait QueryCatalog: Send + Sync {
    fn find_by_code(&self, code: &str) -> Option<QueryTemplate>;
    fn list(&self) -> Vec<QueryTemplate>;
    fn save(&self, template: QueryTemplate) -> QueryTemplate;
    fn update(&self, code: &str, f: &dyn Fn(&mut QueryTemplate)) -> Option<QueryTemplate>;
    fn soft_delete(&self, code: &str) -> bool;
    fn most_used(&self, limit: usize) -> Vec<QueryTemplate>;
    fn pending_analysis(&self) -> Vec<QueryTemplate>;
}

/// Reference, in-memory `QueryCatalog`. Read-mostly after warm-up, so reads
/// never block writers for long: `DashMap`'s sharded locking is enough here
/// without a bespoke RwLock wrapper (teacher idiom, cf. the template cache
/// note in spec §5 "read-mostly... compute-if-absent").
pub struct InMemoryCatalog {
    templates: DashMap<String, QueryTemplate>,
    usage: DashMap<String, u64>,
    next_version: AtomicU32,
}

impl InMemoryCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(InMemoryCatalog {
            templates: DashMap::new(),
            usage: DashMap::new(),
            next_version: AtomicU32::new(1),
        })
    }

    /// Records a usage hit, feeding `most_used`.
    pub fn record_usage(&self, code: &str) {
        *self.usage.entry(code.to_string()).or_insert(0) += 1;
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        InMemoryCatalog {
            templates: DashMap::new(),
            usage: DashMap::new(),
            next_version: AtomicU32::new(1),
        }
    }
}

impl QueryCatalog for InMemoryCatalog {
    fn find_by_code(&self, code: &str) -> Option<QueryTemplate> {
        self.templates
            .get(code)
            .filter(|t| !t.deleted)
            .map(|t| t.clone())
    }

    fn list(&self) -> Vec<QueryTemplate> {
        self.templates
            .iter()
            .filter(|e| !e.value().deleted)
            .map(|e| e.value().clone())
            .collect()
    }

    fn save(&self, mut template: QueryTemplate) -> QueryTemplate {
        template.version = self.next_version.fetch_add(1, Ordering::SeqCst);
        self.templates.insert(template.code.clone(), template.clone());
        template
    }

    fn update(&self, code: &str, f: &dyn Fn(&mut QueryTemplate)) -> Option<QueryTemplate> {
        let mut entry = self.templates.get_mut(code)?;
        f(&mut entry);
        entry.version = self.next_version.fetch_add(1, Ordering::SeqCst);
        Some(entry.clone())
    }

    fn soft_delete(&self, code: &str) -> bool {
        if let Some(mut entry) = self.templates.get_mut(code) {
            entry.deleted = true;
            true
        } else {
            false
        }
    }

    fn most_used(&self, limit: usize) -> Vec<QueryTemplate> {
        let mut ranked: Vec<(String, u64)> = self
            .usage
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
            .into_iter()
            .take(limit)
            .filter_map(|(code, _)| self.find_by_code(&code))
            .collect()
    }

    fn pending_analysis(&self) -> Vec<QueryTemplate> {
        self.templates
            .iter()
            .filter(|e| !e.value().deleted && e.value().consolidation_type.is_none())
            .map(|e| e.value().clone())
            .collect()
    }
}
