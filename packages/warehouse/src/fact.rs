//! Fact assembler.
//!
//! Produces one `accident_detail` row per record by resolving its time,
//! location, and weather keys against the finished dimension mappings.
//! Dimension tables are never modified here.

use std::cmp::Ordering;

use accident_warehouse_accident_models::CleanedRecord;
use accident_warehouse_models::{DataQualityWarning, FactRow, WarehouseConfig, WarningKind};
use rayon::prelude::*;

use crate::WarehouseError;
use crate::dimensions::{Dimensions, KeyMapping};

#[derive(Debug, Clone)]
pub struct FactTable {
    /// Sorted by accident id.
    pub rows: Vec<FactRow>,
    /// Duration warnings, sorted by accident id.
    pub warnings: Vec<DataQualityWarning>,
}

/// Orders accident ids naturally, so `A-2` sorts before `A-10`.
///
/// Ids are compared by their non-numeric prefix, then by the value of a
/// trailing run of digits, then byte-wise as a tiebreak. This is a total
/// order.
#[must_use]
pub fn compare_accident_ids(a: &str, b: &str) -> Ordering {
    let (a_prefix, a_num) = split_numeric_suffix(a);
    let (b_prefix, b_num) = split_numeric_suffix(b);
    a_prefix
        .cmp(b_prefix)
        .then(a_num.cmp(&b_num))
        .then_with(|| a.cmp(b))
}

fn split_numeric_suffix(id: &str) -> (&str, Option<u128>) {
    let digits_start = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map_or(id.len(), |(i, _)| i);
    let (prefix, digits) = id.split_at(digits_start);
    (prefix, digits.parse().ok())
}

/// Minutes between two timestamps, fractional, negative if `end` precedes
/// `start`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn duration_minutes(record: &CleanedRecord) -> f64 {
    (record.end_time - record.start_time).num_milliseconds() as f64 / 60_000.0
}

/// Assembles the fact table.
///
/// # Errors
///
/// Returns [`WarehouseError::MissingKey`] for the first record (in id
/// order) whose time, location, or weather key cannot be resolved.
pub fn assemble_facts(
    records: &[CleanedRecord],
    dimensions: &Dimensions,
    config: &WarehouseConfig,
) -> Result<FactTable, WarehouseError> {
    let results: Vec<Result<(FactRow, Vec<DataQualityWarning>), WarehouseError>> = records
        .par_iter()
        .map(|r| assemble_row(r, dimensions, config))
        .collect();

    let mut rows = Vec::with_capacity(results.len());
    let mut warnings = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok((row, row_warnings)) => {
                rows.push(row);
                warnings.extend(row_warnings);
            }
            Err(e) => failures.push(e),
        }
    }

    if let Some(first) = failures.into_iter().min_by(|a, b| {
        compare_accident_ids(missing_key_id(a), missing_key_id(b))
    }) {
        return Err(first);
    }

    rows.par_sort_by(|a, b| compare_accident_ids(&a.accident_id, &b.accident_id));
    warnings.sort_by(|a, b| {
        compare_accident_ids(&a.accident_id, &b.accident_id).then(a.kind.cmp(&b.kind))
    });

    let negative = warnings
        .iter()
        .filter(|w| w.kind == WarningKind::NegativeDuration)
        .count();
    if negative > 0 {
        log::warn!("{negative} accidents end before they start");
    }
    let mismatched = warnings.len() - negative;
    if mismatched > 0 {
        log::warn!(
            "{mismatched} accidents disagree with their supplied duration by more than {} min",
            config.duration_tolerance_minutes
        );
    }
    log::info!("Assembled {} fact rows", rows.len());

    Ok(FactTable { rows, warnings })
}

fn missing_key_id(error: &WarehouseError) -> &str {
    match error {
        WarehouseError::MissingKey { accident_id, .. } => accident_id,
        _ => "",
    }
}

fn lookup(
    mapping: &KeyMapping,
    record: &CleanedRecord,
    dimension: &str,
) -> Result<String, WarehouseError> {
    mapping
        .get(&record.id)
        .cloned()
        .ok_or_else(|| WarehouseError::MissingKey {
            accident_id: record.id.clone(),
            dimension: dimension.to_string(),
        })
}

fn assemble_row(
    record: &CleanedRecord,
    dimensions: &Dimensions,
    config: &WarehouseConfig,
) -> Result<(FactRow, Vec<DataQualityWarning>), WarehouseError> {
    let date_key = lookup(&dimensions.time.mapping, record, "time")?;
    let location_key = lookup(&dimensions.location.mapping, record, "location")?;
    let weather_key = lookup(&dimensions.weather.mapping, record, "weather")?;

    let duration = duration_minutes(record);
    let mut warnings = Vec::new();

    if duration < 0.0 {
        warnings.push(DataQualityWarning::new(
            WarningKind::NegativeDuration,
            &record.id,
            format!("end time precedes start time by {:.3} min", -duration),
        ));
    }
    if let Some(supplied) = record.duration_min
        && (duration - supplied).abs() > config.duration_tolerance_minutes
    {
        warnings.push(DataQualityWarning::new(
            WarningKind::DurationMismatch,
            &record.id,
            format!("computed {duration:.3} min but supplied {supplied:.3} min"),
        ));
    }

    let row = FactRow {
        accident_id: record.id.clone(),
        severity: record.severity.value(),
        date_key,
        location_key,
        weather_key,
        start_time: record.start_time,
        end_time: record.end_time,
        duration_minutes: duration,
        description: record.description.clone(),
    };

    Ok((row, warnings))
}
