//! Data-quality warning summary and tolerance check.

use std::collections::BTreeMap;

use accident_warehouse_models::{DataQualityWarning, QualityReport, WarningKind};

use crate::WarehouseError;

/// Examples kept per warning kind in the report.
pub const EXAMPLES_PER_KIND: usize = 5;

/// Summarizes warnings into counts by kind plus the first few examples of
/// each kind. `warnings` are expected in accident id order.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn summarize_warnings(warnings: &[DataQualityWarning], total_records: u64) -> QualityReport {
    let mut counts: BTreeMap<WarningKind, u64> = BTreeMap::new();
    let mut examples = Vec::new();

    for warning in warnings {
        let count = counts.entry(warning.kind).or_insert(0);
        *count += 1;
        if *count as usize <= EXAMPLES_PER_KIND {
            examples.push(warning.clone());
        }
    }

    let total_warnings = warnings.len() as u64;
    let warning_fraction = if total_records == 0 {
        0.0
    } else {
        total_warnings as f64 / total_records as f64
    };

    QualityReport {
        total_records,
        total_warnings,
        warning_fraction,
        counts,
        examples,
    }
}

/// Fails if the warning fraction exceeds `max_fraction`.
///
/// # Errors
///
/// Returns [`WarehouseError::WarningToleranceExceeded`] when there are
/// too many warnings for the number of records.
pub fn check_tolerance(report: &QualityReport, max_fraction: f64) -> Result<(), WarehouseError> {
    for (kind, count) in &report.counts {
        log::info!("Data quality: {count} {kind} warnings");
    }

    if report.warning_fraction > max_fraction {
        return Err(WarehouseError::WarningToleranceExceeded {
            warnings: report.total_warnings,
            records: report.total_records,
            max_fraction,
        });
    }

    Ok(())
}
