// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Pluggable cardinality estimation, resolving the "estimation when
// cardinality table misses" open question from spec §9: the static table is
// one implementation of `CardinalityOracle`, not baked into the Analyzer.

use std::collections::HashMap;

use super::FieldType;

/// Supplies a known per-column cardinality, or `None` if the column is not
/// recognized — in which case the Analyzer applies its own type-based
/// default and counts the column as "unknown" for confidence purposes.
pub trait CardinalityOracle: Send + Sync {
    fn cardinality(&self, column: &str, field_type: FieldType) -> Option<u64>;
}

/// The default oracle, seeded with the static table from spec §4.1 step 5.
/// Lookups are by lowercase substring match against common column-naming
/// conventions in the domain (province, month, day, ...), matching how the
/// Analyzer itself classifies field names.
pub struct StaticCardinalityTable {
    known: HashMap<&'static str, u64>,
}

impl StaticCardinalityTable {
    pub fn new() -> Self {
        let mut known = HashMap::new();
        known.insert("provincia", 24);
        known.insert("province", 24);
        known.insert("month", 12);
        known.insert("mes", 12);
        known.insert("day", 31);
        known.insert("dia", 31);
        known.insert("year", 5);
        known.insert("anio", 5);
        known.insert("weekday", 7);
        known.insert("dia_semana", 7);
        known.insert("tipo_infra", 50);
        known.insert("infraction_type", 50);
        known.insert("estado", 10);
        known.insert("state", 10);
        known.insert("serial", 100);
        known.insert("serie", 100);
        known.insert("municipio", 500);
        known.insert("municipality", 500);
        known.insert("localidad", 2000);
        known.insert("locality", 2000);
        known.insert("lugar", 5000);
        known.insert("place", 5000);
        StaticCardinalityTable { known }
    }
}

/// Type-based default used when no oracle recognizes a grouping column, per
/// spec §4.1 step 5.
pub fn type_default_cardinality(field_type: FieldType) -> u64 {
    match field_type {
        FieldType::Location => 500,
        FieldType::Time => 365,
        FieldType::Categorization => 20,
        FieldType::Identifier => 1_000,
        FieldType::NumericSum | FieldType::NumericCount => 100,
        FieldType::Detail | FieldType::Computed => 100,
    }
}

impl Default for StaticCardinalityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CardinalityOracle for StaticCardinalityTable {
    fn cardinality(&self, column: &str, _field_type: FieldType) -> Option<u64> {
        let lower = column.to_ascii_lowercase();
        self.known
            .iter()
            .find(|(key, _)| lower.contains(**key))
            .map(|(_, value)| *value)
    }
}
