// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Parameter Binder (C6), per spec §4.3/§6. Maps a `Filter` to the named
// parameter bag a driver needs, using the bit-exact names from §6:
// `:limit`, `:offset`, `:lastId`, `:lastSerial`, `:lastLocation`,
// `:keyset_col_0..2`, `:startDate`, `:endDate`, `:specificDate`,
// `:infractionStates`, `:infractionTypes`, `:exportedToExternal`,
// `:provinces`, `:municipalities`, `:places`, `:districts`.

use std::collections::BTreeMap;

use crate::filter::{Filter, TriState};

#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Null,
    Int(i64),
    Text(String),
    Bool(bool),
    Date(chrono::NaiveDate),
    IntArray(Vec<i64>),
}

/// A named-parameter bag, ordered for deterministic logging/testing.
#[derive(Debug, Clone, Default)]
pub struct ParameterBag {
    values: BTreeMap<String, BoundValue>,
}

impl ParameterBag {
    pub fn get(&self, name: &str) -> Option<&BoundValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BoundValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn insert(&mut self, name: impl Into<String>, value: BoundValue) {
        self.values.insert(name.into(), value);
    }

    /// Returns a clone with `name` overridden, used by the Batch Processor
    /// to carry the current page's keyset cursor into the next fetch
    /// without mutating the request-scoped bag.
    pub fn with_override(&self, name: &str, value: BoundValue) -> ParameterBag {
        let mut clone = self.clone();
        clone.insert(name.to_string(), value);
        clone
    }
}

pub struct ParameterBinder;

impl ParameterBinder {
    pub fn new() -> Self {
        ParameterBinder
    }

    /// Binds every filter field to its named parameter, using `Null` for
    /// absent values so the rewriter's null-passthrough predicates
    /// (`:param IS NULL OR ...`) behave correctly.
    pub fn bind(&self, filter: &Filter) -> ParameterBag {
        let mut bag = ParameterBag::default();

        bag.insert(
            "startDate",
            filter.start_date.map(BoundValue::Date).unwrap_or(BoundValue::Null),
        );
        bag.insert(
            "endDate",
            filter.end_date.map(BoundValue::Date).unwrap_or(BoundValue::Null),
        );
        bag.insert(
            "specificDate",
            filter.specific_date.map(BoundValue::Date).unwrap_or(BoundValue::Null),
        );

        bag.insert(
            "infractionStates",
            if filter.infraction_state_ids.is_empty() {
                BoundValue::Null
            } else {
                BoundValue::IntArray(filter.infraction_state_ids.iter().copied().collect())
            },
        );
        bag.insert(
            "infractionTypes",
            if filter.infraction_type_ids.is_empty() {
                BoundValue::Null
            } else {
                BoundValue::IntArray(filter.infraction_type_ids.iter().copied().collect())
            },
        );
        bag.insert(
            "exportedToExternal",
            match filter.exported_to_external {
                TriState::Unset => BoundValue::Null,
                TriState::True => BoundValue::Bool(true),
                TriState::False => BoundValue::Bool(false),
            },
        );
        bag.insert(
            "provinces",
            if filter.provinces.is_empty() {
                BoundValue::Null
            } else {
                BoundValue::Text(filter.provinces.iter().cloned().collect::<Vec<_>>().join(","))
            },
        );
        bag.insert(
            "municipalities",
            if filter.municipalities.is_empty() {
                BoundValue::Null
            } else {
                BoundValue::Text(filter.municipalities.iter().cloned().collect::<Vec<_>>().join(","))
            },
        );
        bag.insert(
            "places",
            if filter.places.is_empty() {
                BoundValue::Null
            } else {
                BoundValue::Text(filter.places.iter().cloned().collect::<Vec<_>>().join(","))
            },
        );
        bag.insert(
            "districts",
            if filter.districts.is_empty() {
                BoundValue::Null
            } else {
                BoundValue::Text(filter.districts.iter().cloned().collect::<Vec<_>>().join(","))
            },
        );

        bag.insert(
            "limit",
            filter.limit.or(filter.page_size).map(|v| BoundValue::Int(v as i64)).unwrap_or(BoundValue::Null),
        );
        bag.insert(
            "offset",
            filter.offset.map(|v| BoundValue::Int(v as i64)).unwrap_or(BoundValue::Null),
        );

        bag.insert(
            "lastId",
            filter.cursor.last_id.map(BoundValue::Int).unwrap_or(BoundValue::Null),
        );
        bag.insert(
            "lastSerial",
            filter.cursor.last_serial.clone().map(BoundValue::Text).unwrap_or(BoundValue::Null),
        );
        bag.insert(
            "lastLocation",
            filter.cursor.last_location.clone().map(BoundValue::Text).unwrap_or(BoundValue::Null),
        );

        for (i, (_, value)) in filter.cursor.last_composite_key.iter().enumerate().take(3) {
            bag.insert(format!("keyset_col_{i}"), BoundValue::Text(value.clone()));
        }
        for (key, value) in filter.cursor.last_composite_key.iter() {
            bag.insert(format!("cursor_{key}"), BoundValue::Text(value.clone()));
        }

        bag
    }
}

impl Default for ParameterBinder {
    fn default() -> Self {
        Self::new()
    }
}
