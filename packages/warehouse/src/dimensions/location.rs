//! Location dimension keyed by `(street, city)`.
//!
//! Grouping is a map-then-merge: each rayon worker (or each calendar year,
//! when partitioning is on) builds a [`LocationPartial`], partials are
//! merged pairwise, and rows are emitted only from the fully merged result.
//! Merging sums counters and keeps the descriptive attributes of the
//! record with the smallest accident id, so the outcome does not depend on
//! how records were split.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use accident_warehouse_accident_models::{CleanedRecord, InfraFlag};
use accident_warehouse_models::{
    DataQualityWarning, LocationDimensionRow, WarehouseConfig, WarningKind,
};
use rayon::prelude::*;

use super::{KeyMapping, partition_by_year};
use crate::fact::compare_accident_ids;

#[derive(Debug, Clone)]
pub struct LocationDimension {
    /// Sorted by `location_key`.
    pub rows: Vec<LocationDimensionRow>,
    pub mapping: KeyMapping,
    /// Empty street or city warnings, sorted by accident id.
    pub warnings: Vec<DataQualityWarning>,
}

/// Escapes `\` and `|` so the joined key can always be split back apart.
#[must_use]
pub fn escape_key_component(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for c in component.chars() {
        if matches!(c, '\\' | '|') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Builds the composite location key `street|city`.
#[must_use]
pub fn location_key(street: &str, city: &str) -> String {
    format!(
        "{}|{}",
        escape_key_component(street),
        escape_key_component(city)
    )
}

fn record_key(record: &CleanedRecord) -> String {
    location_key(
        record.street.as_deref().unwrap_or_default(),
        record.city.as_deref().unwrap_or_default(),
    )
}

/// Accumulated state for one location key.
#[derive(Debug, Clone)]
struct LocationGroup {
    /// Accident id the descriptive attributes were taken from.
    canonical_id: String,
    row: LocationDimensionRow,
}

impl LocationGroup {
    fn from_record(key: String, record: &CleanedRecord) -> Self {
        let mut row = LocationDimensionRow {
            location_key: key,
            street: record.street.clone().unwrap_or_default(),
            city: record.city.clone().unwrap_or_default(),
            county: record.county.clone(),
            state: record.state.clone(),
            zip: record.zip.clone(),
            timezone: record.timezone.clone(),
            ..LocationDimensionRow::default()
        };
        for flag in InfraFlag::all() {
            if record.has_flag(*flag) {
                *row.counter_mut(*flag) += 1;
            }
        }
        Self {
            canonical_id: record.id.clone(),
            row,
        }
    }

    fn merge(&mut self, other: Self) {
        for flag in InfraFlag::all() {
            *self.row.counter_mut(*flag) += other.row.counter(*flag);
        }
        if compare_accident_ids(&other.canonical_id, &self.canonical_id).is_lt() {
            let mut row = other.row;
            for flag in InfraFlag::all() {
                *row.counter_mut(*flag) = self.row.counter(*flag);
            }
            self.canonical_id = other.canonical_id;
            self.row = row;
        }
    }
}

/// Partial grouping over a subset of records.
#[derive(Debug, Clone, Default)]
pub struct LocationPartial {
    groups: BTreeMap<String, LocationGroup>,
}

impl LocationPartial {
    /// Folds one record into the partial.
    #[must_use]
    pub fn add(mut self, record: &CleanedRecord) -> Self {
        let key = record_key(record);
        let group = LocationGroup::from_record(key.clone(), record);
        self.insert(key, group);
        self
    }

    /// Merges two partials. Associative and commutative.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for (key, group) in other.groups {
            self.insert(key, group);
        }
        self
    }

    fn insert(&mut self, key: String, group: LocationGroup) {
        match self.groups.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(group);
            }
            Entry::Occupied(mut slot) => slot.get_mut().merge(group),
        }
    }

    /// Emits the finished rows in key order.
    #[must_use]
    pub fn into_rows(self) -> Vec<LocationDimensionRow> {
        self.groups.into_values().map(|g| g.row).collect()
    }
}

#[must_use]
pub fn build_location_dimension(
    records: &[CleanedRecord],
    config: &WarehouseConfig,
) -> LocationDimension {
    let merged = if config.partition_by_year {
        partition_by_year(records)
            .into_par_iter()
            .map(|(year, partition)| {
                let partial = partition
                    .into_iter()
                    .fold(LocationPartial::default(), LocationPartial::add);
                log::debug!("Location partial for {year}: {} keys", partial.groups.len());
                partial
            })
            .reduce(LocationPartial::default, LocationPartial::merge)
    } else {
        records
            .par_iter()
            .fold(LocationPartial::default, LocationPartial::add)
            .reduce(LocationPartial::default, LocationPartial::merge)
    };

    let rows = merged.into_rows();

    let mapping: KeyMapping = records
        .par_iter()
        .map(|r| (r.id.clone(), record_key(r)))
        .collect();

    let mut warnings: Vec<DataQualityWarning> =
        records.par_iter().flat_map_iter(location_warnings).collect();
    warnings.sort_by(|a, b| {
        compare_accident_ids(&a.accident_id, &b.accident_id).then(a.kind.cmp(&b.kind))
    });
    for warning in &warnings {
        log::debug!("{}: {}", warning.accident_id, warning.message);
    }
    if !warnings.is_empty() {
        log::warn!("{} records have an empty street or city", warnings.len());
    }

    LocationDimension {
        rows,
        mapping,
        warnings,
    }
}

fn location_warnings(record: &CleanedRecord) -> Vec<DataQualityWarning> {
    let mut warnings = Vec::new();
    if record.street.as_deref().is_none_or(str::is_empty) {
        warnings.push(DataQualityWarning::new(
            WarningKind::EmptyStreet,
            &record.id,
            "street is empty; keyed with an empty street component".to_string(),
        ));
    }
    if record.city.as_deref().is_none_or(str::is_empty) {
        warnings.push(DataQualityWarning::new(
            WarningKind::EmptyCity,
            &record.id,
            "city is empty; keyed with an empty city component".to_string(),
        ));
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, sample_records};

    #[test]
    fn escaping_prevents_separator_collisions() {
        assert_ne!(location_key("Main|St", "City"), location_key("Main", "St|City"));
        assert_eq!(location_key("Main|St", "City"), "Main\\|St|City");
        assert_eq!(location_key("A\\", "B"), "A\\\\|B");
        assert_ne!(location_key("A\\", "|B"), location_key("A", "\\|B"));
        assert_eq!(location_key("MainSt", "City"), "MainSt|City");
    }

    #[test]
    fn main_st_crossings_accumulate_on_one_row() {
        let mut records = Vec::new();
        for (id, sev) in [("A-1", 2), ("A-2", 3), ("A-3", 4)] {
            let mut r = record(id, "2021-03-01 08:00:00");
            r.severity = crate::test_support::severity(sev);
            r.infra.crossing = true;
            records.push(r);
        }

        let dim = build_location_dimension(&records, &WarehouseConfig::default());

        assert_eq!(dim.rows.len(), 1);
        let row = &dim.rows[0];
        assert_eq!(row.location_key, "Main St|Springfield");
        assert_eq!(row.count_crossing, 3);
        assert_eq!(row.count_amenity, 0);
        assert!(dim.mapping.values().all(|k| k == "Main St|Springfield"));
        assert!(dim.warnings.is_empty());
    }

    #[test]
    fn canonical_attributes_come_from_smallest_id() {
        let mut first = record("A-2", "2021-03-01 08:00:00");
        first.county = Some("Later County".to_string());
        let mut second = record("A-10", "2021-03-01 09:00:00");
        second.county = Some("Much Later County".to_string());
        let mut smallest = record("A-1", "2021-03-02 08:00:00");
        smallest.county = Some("Sangamon".to_string());

        let forward = vec![first.clone(), second.clone(), smallest.clone()];
        let backward = vec![smallest, second, first];
        let config = WarehouseConfig::default();

        let a = build_location_dimension(&forward, &config);
        let b = build_location_dimension(&backward, &config);
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.rows[0].county.as_deref(), Some("Sangamon"));
    }

    #[test]
    fn empty_components_are_kept_and_warned() {
        let mut no_street = record("A-1", "2021-03-01 08:00:00");
        no_street.street = None;
        let mut no_city = record("A-2", "2021-03-01 08:00:00");
        no_city.city = None;

        let dim = build_location_dimension(&[no_street, no_city], &WarehouseConfig::default());

        let keys: Vec<&str> = dim.rows.iter().map(|r| r.location_key.as_str()).collect();
        assert_eq!(keys, vec!["Main St|", "|Springfield"]);
        let kinds: Vec<WarningKind> = dim.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::EmptyStreet, WarningKind::EmptyCity]);
    }

    #[test]
    fn counters_match_flagged_records() {
        let records = sample_records();
        let dim = build_location_dimension(&records, &WarehouseConfig::default());

        for row in &dim.rows {
            for flag in InfraFlag::all() {
                let expected = records
                    .iter()
                    .filter(|r| dim.mapping[&r.id] == row.location_key && r.has_flag(*flag))
                    .count() as u64;
                assert_eq!(row.counter(*flag), expected, "{} {flag}", row.location_key);
            }
        }
    }

    #[test]
    fn partitioned_build_matches_unpartitioned() {
        let records = sample_records();
        let plain = build_location_dimension(&records, &WarehouseConfig::default());
        let partitioned = build_location_dimension(
            &records,
            &WarehouseConfig {
                partition_by_year: true,
                ..WarehouseConfig::default()
            },
        );
        assert_eq!(plain.rows, partitioned.rows);
        assert_eq!(plain.mapping, partitioned.mapping);
    }
}
