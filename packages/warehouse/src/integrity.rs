//! Referential integrity validator.
//!
//! Every fact foreign key must be present in its dimension's primary key
//! set, and every primary key (dimension and fact) must be unique. Any
//! violation is a hard failure that stops the pipeline before aggregation.

use std::collections::{BTreeMap, BTreeSet};

use accident_warehouse_models::FactRow;

use crate::WarehouseError;
use crate::dimensions::Dimensions;

/// Findings of an integrity check. Empty means the check passed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Dimension name to fact foreign-key values absent from it.
    pub orphans: BTreeMap<String, BTreeSet<String>>,
    /// Table name to primary-key values that occur more than once.
    pub duplicates: BTreeMap<String, BTreeSet<String>>,
}

impl IntegrityReport {
    /// Returns `true` if no orphan or duplicate was found.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.orphans.is_empty() && self.duplicates.is_empty()
    }
}

impl std::fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        for (dimension, keys) in &self.orphans {
            parts.push(format!(
                "{} orphaned {dimension} keys ({})",
                keys.len(),
                sample(keys)
            ));
        }
        for (table, keys) in &self.duplicates {
            parts.push(format!(
                "{} duplicated {table} keys ({})",
                keys.len(),
                sample(keys)
            ));
        }
        if parts.is_empty() {
            write!(f, "no violations")
        } else {
            write!(f, "{}", parts.join("; "))
        }
    }
}

fn sample(keys: &BTreeSet<String>) -> String {
    const SHOWN: usize = 5;
    let mut shown: Vec<&str> = keys.iter().take(SHOWN).map(String::as_str).collect();
    if keys.len() > SHOWN {
        shown.push("...");
    }
    shown.join(", ")
}

/// Runs every integrity check and returns the findings.
#[must_use]
pub fn check_integrity(dimensions: &Dimensions, facts: &[FactRow]) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    let time_keys = collect_keys(dimensions.time.rows.iter().map(|r| r.date_key.as_str()));
    let location_keys =
        collect_keys(dimensions.location.rows.iter().map(|r| r.location_key.as_str()));
    let weather_keys =
        collect_keys(dimensions.weather.rows.iter().map(|r| r.weather_key.as_str()));
    let fact_keys = collect_keys(facts.iter().map(|r| r.accident_id.as_str()));

    for (table, keys) in [
        ("dim_time", &time_keys),
        ("dim_location", &location_keys),
        ("dim_weather", &weather_keys),
        ("accident_detail", &fact_keys),
    ] {
        if !keys.duplicates.is_empty() {
            report
                .duplicates
                .insert(table.to_string(), keys.duplicates.clone());
        }
    }

    let foreign_keys: [(&str, &KeySet, fn(&FactRow) -> &str); 3] = [
        ("time", &time_keys, |r| r.date_key.as_str()),
        ("location", &location_keys, |r| r.location_key.as_str()),
        ("weather", &weather_keys, |r| r.weather_key.as_str()),
    ];
    for (dimension, pks, fk) in foreign_keys {
        let orphans: BTreeSet<String> = facts
            .iter()
            .map(fk)
            .filter(|key| !pks.distinct.contains(*key))
            .map(str::to_string)
            .collect();
        if !orphans.is_empty() {
            report.orphans.insert(dimension.to_string(), orphans);
        }
    }

    report
}

/// Fails with [`WarehouseError::Integrity`] unless every check passes.
///
/// # Errors
///
/// Returns the full report of orphaned and duplicated keys on failure.
pub fn validate_integrity(
    dimensions: &Dimensions,
    facts: &[FactRow],
) -> Result<(), WarehouseError> {
    let report = check_integrity(dimensions, facts);
    if report.passed() {
        log::info!("Referential integrity check passed for {} fact rows", facts.len());
        Ok(())
    } else {
        log::error!("Referential integrity check failed: {report}");
        Err(WarehouseError::Integrity(report))
    }
}

struct KeySet<'a> {
    distinct: BTreeSet<&'a str>,
    duplicates: BTreeSet<String>,
}

fn collect_keys<'a>(keys: impl Iterator<Item = &'a str>) -> KeySet<'a> {
    let mut distinct = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for key in keys {
        if !distinct.insert(key) {
            duplicates.insert(key.to_string());
        }
    }
    KeySet {
        distinct,
        duplicates,
    }
}
