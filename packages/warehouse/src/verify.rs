//! Checks a written output directory against its manifest.
//!
//! Besides presence and row counts, every table is scanned for values
//! outside their domain: severities outside 1-4, mean severities outside
//! 1-4 (0 marks an empty group), percentages outside 0-100, and 0-10
//! scores above 10.

use std::fmt;
use std::path::Path;

use crate::WarehouseError;
use crate::output::{QUALITY_REPORT_FILE, Table, load_manifest};

/// Result of checking one table file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    pub table: Table,
    pub exists: bool,
    pub size_bytes: u64,
    /// Data rows, header excluded. `None` when the file is missing.
    pub row_count: Option<u64>,
    /// Row count recorded in the manifest, if any.
    pub expected_rows: Option<u64>,
    /// Cells outside their column's domain.
    pub out_of_range: u64,
    /// The first such cell, as `column row N: value`.
    pub first_out_of_range: Option<String>,
}

impl FileCheck {
    /// The file exists, its row count matches the manifest, and every
    /// checked value is in range.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.exists
            && self.expected_rows.is_some()
            && self.row_count == self.expected_rows
            && self.out_of_range == 0
    }
}

/// Domain of a checked numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    /// A severity level, 1-4.
    Severity,
    /// A mean severity, 1-4, or 0 for an empty group.
    MeanSeverity,
    /// 0-100.
    Percent,
    /// 0-10.
    Score,
}

impl Domain {
    fn contains(self, value: f64) -> bool {
        match self {
            Self::Severity => (1.0..=4.0).contains(&value),
            Self::MeanSeverity => value.abs() < f64::EPSILON || (1.0..=4.0).contains(&value),
            Self::Percent => (0.0..=100.0).contains(&value),
            Self::Score => (0.0..=10.0).contains(&value),
        }
    }
}

/// Checked columns. Any table containing one of these headers is checked.
const VALUE_DOMAINS: &[(&str, Domain)] = &[
    ("severity", Domain::Severity),
    ("avg_severity", Domain::MeanSeverity),
    ("present_avg_severity", Domain::MeanSeverity),
    ("absent_avg_severity", Domain::MeanSeverity),
    ("national_avg_severity", Domain::MeanSeverity),
    ("pct_of_year_total", Domain::Percent),
    ("pct_of_total", Domain::Percent),
    ("cumulative_pct", Domain::Percent),
    ("high_severity_rate", Domain::Percent),
    ("high_severity_pct", Domain::Percent),
    ("pct_of_area_total", Domain::Percent),
    ("hotspot_score", Domain::Score),
    ("weather_risk_score", Domain::Score),
];

/// Result of reading one table.
struct TableScan {
    rows: u64,
    out_of_range: u64,
    first_out_of_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub manifest_found: bool,
    pub quality_report_found: bool,
    pub files: Vec<FileCheck>,
}

impl VerifyReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.manifest_found && self.quality_report_found && self.files.iter().all(FileCheck::passed)
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "manifest.json: {}", if self.manifest_found { "ok" } else { "MISSING" })?;
        writeln!(
            f,
            "{QUALITY_REPORT_FILE}: {}",
            if self.quality_report_found { "ok" } else { "MISSING" }
        )?;
        for check in &self.files {
            let status = if check.passed() { "ok" } else { "FAIL" };
            let rows = check
                .row_count
                .map_or_else(|| "-".to_string(), |n| n.to_string());
            let expected = check
                .expected_rows
                .map_or_else(|| "-".to_string(), |n| n.to_string());
            writeln!(
                f,
                "{:<45} {status:<4} {:>10} bytes  {rows:>8} rows (manifest {expected})",
                check.table.path(),
                check.size_bytes,
            )?;
            if let Some(example) = &check.first_out_of_range {
                writeln!(f, "    {} values out of range, first {example}", check.out_of_range)?;
            }
        }
        write!(
            f,
            "Overall: {}",
            if self.all_passed() { "PASS" } else { "FAIL" }
        )
    }
}

/// Checks every expected file in `dir`.
///
/// # Errors
///
/// Returns an error if an existing table cannot be read as CSV.
pub fn verify_output(dir: &Path) -> Result<VerifyReport, WarehouseError> {
    let manifest = load_manifest(dir);
    let mut files = Vec::with_capacity(Table::all().len());

    for &table in Table::all() {
        let path = dir.join(table.path());
        let expected_rows = manifest
            .as_ref()
            .and_then(|m| m.tables.get(table.name()))
            .map(|t| t.row_count);

        let check = match std::fs::metadata(&path) {
            Ok(metadata) => {
                let scan = scan_table(&path)?;
                FileCheck {
                    table,
                    exists: true,
                    size_bytes: metadata.len(),
                    row_count: Some(scan.rows),
                    expected_rows,
                    out_of_range: scan.out_of_range,
                    first_out_of_range: scan.first_out_of_range,
                }
            }
            Err(_) => FileCheck {
                table,
                exists: false,
                size_bytes: 0,
                row_count: None,
                expected_rows,
                out_of_range: 0,
                first_out_of_range: None,
            },
        };

        if let Some(example) = &check.first_out_of_range {
            log::warn!(
                "{}: {} values out of range, first {example}",
                table.path(),
                check.out_of_range
            );
        }
        if !check.passed() {
            log::warn!("Verification failed for {}", table.path());
        }
        files.push(check);
    }

    let report = VerifyReport {
        manifest_found: manifest.is_some(),
        quality_report_found: dir.join(QUALITY_REPORT_FILE).exists(),
        files,
    };
    log::info!(
        "Verified {}: {}",
        dir.display(),
        if report.all_passed() { "pass" } else { "fail" }
    );
    Ok(report)
}

/// Counts data rows and checks every cell of a [`VALUE_DOMAINS`] column.
/// Empty cells are not checked; unparseable ones count as out of range.
fn scan_table(path: &Path) -> Result<TableScan, WarehouseError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| WarehouseError::csv(path, e))?;
    let headers = reader
        .headers()
        .map_err(|e| WarehouseError::csv(path, e))?
        .clone();
    let checked: Vec<(usize, &str, Domain)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, header)| {
            VALUE_DOMAINS
                .iter()
                .find(|(column, _)| *column == header)
                .map(|&(column, domain)| (i, column, domain))
        })
        .collect();

    let mut scan = TableScan {
        rows: 0,
        out_of_range: 0,
        first_out_of_range: None,
    };
    for record in reader.records() {
        let record = record.map_err(|e| WarehouseError::csv(path, e))?;
        scan.rows += 1;

        for &(i, column, domain) in &checked {
            let raw = record.get(i).unwrap_or_default();
            if raw.is_empty() {
                continue;
            }
            let in_range = raw.parse::<f64>().is_ok_and(|v| domain.contains(v));
            if !in_range {
                scan.out_of_range += 1;
                if scan.first_out_of_range.is_none() {
                    scan.first_out_of_range = Some(format!("{column} row {}: {raw}", scan.rows));
                }
            }
        }
    }
    Ok(scan)
}
