//! End-to-end warehouse build.
//!
//! Runs the stages in order: config validation, dimension builders, fact
//! assembly, integrity validation, the data-quality tolerance check, and
//! aggregation. Any failure stops the build before later stages run, and
//! nothing here touches the filesystem.

use std::sync::Arc;

use accident_warehouse_accident_models::CleanedRecord;
use accident_warehouse_models::{DataQualityWarning, QualityReport, WarehouseConfig};

use crate::WarehouseError;
use crate::aggregate::{Aggregates, compute_aggregates};
use crate::config::validate_config;
use crate::dimensions::{Dimensions, build_dimensions};
use crate::fact::{FactTable, assemble_facts, compare_accident_ids};
use crate::integrity::validate_integrity;
use crate::progress::ProgressCallback;
use crate::quality::{check_tolerance, summarize_warnings};

/// Number of stages reported through the progress callback.
pub const STAGE_COUNT: u64 = 6;

/// Everything a successful build produces.
#[derive(Debug, Clone)]
pub struct WarehouseBuild {
    pub dimensions: Dimensions,
    pub facts: FactTable,
    pub aggregates: Aggregates,
    pub quality: QualityReport,
}

/// Builds the star schema and its aggregates from cleaned records.
///
/// # Errors
///
/// * [`WarehouseError::Config`] if `config` is invalid
/// * [`WarehouseError::MissingKey`] if a fact cannot resolve a dimension key
/// * [`WarehouseError::Integrity`] if orphaned or duplicate keys are found
/// * [`WarehouseError::WarningToleranceExceeded`] if too many records
///   raised data-quality warnings
pub fn build_warehouse(
    records: &[CleanedRecord],
    config: &WarehouseConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<WarehouseBuild, WarehouseError> {
    log::info!("Building warehouse from {} records", records.len());
    progress.set_total(STAGE_COUNT);

    progress.set_message("Validating config...".to_string());
    validate_config(config)?;
    progress.inc(1);

    progress.set_message("Building dimensions...".to_string());
    let dimensions = build_dimensions(records, config);
    progress.inc(1);

    progress.set_message("Assembling facts...".to_string());
    let facts = assemble_facts(records, &dimensions, config)?;
    progress.inc(1);

    progress.set_message("Checking referential integrity...".to_string());
    validate_integrity(&dimensions, &facts.rows)?;
    progress.inc(1);

    progress.set_message("Checking data quality...".to_string());
    let warnings = collect_warnings(&dimensions, &facts);
    let quality = summarize_warnings(&warnings, records.len() as u64);
    for example in &quality.examples {
        log::debug!("{} {}: {}", example.kind, example.accident_id, example.message);
    }
    check_tolerance(&quality, config.max_warning_fraction)?;
    progress.inc(1);

    progress.set_message("Computing aggregates...".to_string());
    let aggregates = compute_aggregates(records, &facts.rows, &dimensions, config)?;
    progress.inc(1);

    progress.finish(format!(
        "Built warehouse: {} facts, {} warnings",
        facts.rows.len(),
        quality.total_warnings
    ));

    Ok(WarehouseBuild {
        dimensions,
        facts,
        aggregates,
        quality,
    })
}

/// Merges location and fact warnings into accident id order.
fn collect_warnings(dimensions: &Dimensions, facts: &FactTable) -> Vec<DataQualityWarning> {
    let mut warnings: Vec<DataQualityWarning> = dimensions
        .location
        .warnings
        .iter()
        .chain(&facts.warnings)
        .cloned()
        .collect();
    warnings.sort_by(|a, b| {
        compare_accident_ids(&a.accident_id, &b.accident_id).then(a.kind.cmp(&b.kind))
    });
    warnings
}
