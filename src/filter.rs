// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Filter model (C1), per spec §3. Immutable once constructed; validation
// accumulates every violated invariant in one pass, matching the teacher's
// own `GcConfig::validate` style of reporting everything wrong at once
// rather than bailing on the first failure.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TriState {
    Unset,
    True,
    False,
}

#[derive(Debug, Clone, Default)]
pub struct KeysetCursor {
    pub last_id: Option<i64>,
    pub last_serial: Option<String>,
    pub last_location: Option<String>,
    /// Up to 3 values for composite/consolidation keysets, per §3.
    pub last_composite_key: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub specific_date: Option<NaiveDate>,

    pub provinces: BTreeSet<String>,
    pub municipalities: BTreeSet<String>,
    pub places: BTreeSet<String>,
    pub districts: BTreeSet<String>,

    pub device_type_ids: BTreeSet<i64>,
    pub equipment_patterns: Vec<String>,
    pub exact_equipment_serials: BTreeSet<String>,
    pub include_red_light: bool,
    pub include_speed_radar: bool,
    pub filter_by_equipment_type: bool,

    pub infraction_type_ids: BTreeSet<i64>,
    pub infraction_state_ids: BTreeSet<i64>,
    pub exported_to_external: TriState,

    pub limit: Option<u32>,
    pub page_size: Option<u32>,
    pub page: Option<u32>,
    pub offset: Option<u32>,
    pub use_all_shards: bool,

    /// Whether this request forces keyset pagination even when the template
    /// is a small, consolidable `AGGREGATION` (spec §4.4 step 2, "the
    /// request does not force pagination"). Defaults to `true`: most
    /// requests against an `AGGREGATION` template want the single-shot
    /// consolidated result, not a paginated raw listing.
    pub consolidate: bool,
    /// Ad-hoc grouping columns for this request, overriding the template's
    /// own `grouping_fields` when non-empty -- lets a caller consolidate by
    /// a different cut without registering a new template.
    pub group_by_fields: Vec<String>,

    pub cursor: KeysetCursor,
}

impl Default for Filter {
    fn default() -> Self {
        Filter {
            start_date: None,
            end_date: None,
            specific_date: None,
            provinces: BTreeSet::new(),
            municipalities: BTreeSet::new(),
            places: BTreeSet::new(),
            districts: BTreeSet::new(),
            device_type_ids: BTreeSet::new(),
            equipment_patterns: Vec::new(),
            exact_equipment_serials: BTreeSet::new(),
            include_red_light: false,
            include_speed_radar: false,
            filter_by_equipment_type: false,
            infraction_type_ids: BTreeSet::new(),
            infraction_state_ids: BTreeSet::new(),
            exported_to_external: TriState::Unset,
            limit: None,
            page_size: None,
            page: None,
            offset: None,
            use_all_shards: false,
            consolidate: true,
            group_by_fields: Vec::new(),
            cursor: KeysetCursor::default(),
        }
    }
}

impl Filter {
    pub fn builder() -> FilterBuilder {
        FilterBuilder::default()
    }

    /// Validates every invariant in spec §3, collecting all violations
    /// rather than stopping at the first.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        let has_range = self.start_date.is_some() || self.end_date.is_some();
        if has_range && self.specific_date.is_some() {
            violations.push("specificDate mutually exclusive with range".to_string());
        }

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                violations.push("endDate must be >= startDate".to_string());
            }
        }

        if let Some(limit) = self.limit {
            if !(1..=50_000).contains(&limit) {
                violations.push("limit must be in [1, 50000]".to_string());
            }
        }

        if let Some(page) = self.page {
            if page < 1 {
                violations.push("page must be >= 1".to_string());
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(EngineError::validation(violations))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    filter: Filter,
}

impl FilterBuilder {
    pub fn start_date(mut self, date: NaiveDate) -> Self {
        self.filter.start_date = Some(date);
        self
    }

    pub fn end_date(mut self, date: NaiveDate) -> Self {
        self.filter.end_date = Some(date);
        self
    }

    pub fn specific_date(mut self, date: NaiveDate) -> Self {
        self.filter.specific_date = Some(date);
        self
    }

    pub fn provinces(mut self, provinces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter.provinces = provinces.into_iter().map(Into::into).collect();
        self
    }

    pub fn municipalities(mut self, municipalities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter.municipalities = municipalities.into_iter().map(Into::into).collect();
        self
    }

    pub fn places(mut self, places: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter.places = places.into_iter().map(Into::into).collect();
        self
    }

    pub fn districts(mut self, districts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter.districts = districts.into_iter().map(Into::into).collect();
        self
    }

    pub fn infraction_state_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.filter.infraction_state_ids = ids.into_iter().collect();
        self
    }

    pub fn infraction_type_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.filter.infraction_type_ids = ids.into_iter().collect();
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.filter.limit = Some(limit);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.filter.page = Some(page);
        self
    }

    pub fn consolidate(mut self, consolidate: bool) -> Self {
        self.filter.consolidate = consolidate;
        self
    }

    pub fn group_by_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter.group_by_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn cursor(mut self, cursor: KeysetCursor) -> Self {
        self.filter.cursor = cursor;
        self
    }

    /// Validates and returns the finished, immutable `Filter`.
    pub fn build(self) -> Result<Filter> {
        self.filter.validate()?;
        Ok(self.filter)
    }
}
