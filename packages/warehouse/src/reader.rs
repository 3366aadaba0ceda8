//! Cleaned-CSV reader.
//!
//! Enforces the cleaned-record schema: every required column must be
//! present (extra columns are ignored) and every cell must convert to its
//! column's type. The first violation aborts the read with a
//! [`SchemaError`], before any dimension is built.

use std::io::Read;
use std::path::Path;

use accident_warehouse_accident_models::{
    AccidentSeverity, CleanedRecord, InfraFlag, InfraFlags,
};
use chrono::NaiveDateTime;
use csv::StringRecord;

use crate::SchemaError;

/// Columns the cleaned input must provide, by exact name.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "ID",
    "Severity",
    "Start_Time",
    "End_Time",
    "Duration_min",
    "Street",
    "City",
    "County",
    "State",
    "Zipcode",
    "Timezone",
    "Weather_Condition",
    "Temperature(F)",
    "Visibility(mi)",
    "Amenity",
    "Crossing",
    "Junction",
    "Stop",
    "Traffic_Signal",
    "Description",
];

/// Timestamp layouts accepted in `Start_Time` / `End_Time`.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Reads every record of a cleaned CSV file.
///
/// # Errors
///
/// Returns a [`SchemaError`] if the file cannot be opened or parsed, a
/// required column is missing, or any cell has the wrong type.
pub fn read_records(path: &Path) -> Result<Vec<CleanedRecord>, SchemaError> {
    let label = path.display().to_string();
    let reader = csv::ReaderBuilder::new()
        .from_path(path)
        .map_err(|e| SchemaError::Csv {
            path: label.clone(),
            source: e,
        })?;
    let records = read_from_csv(reader, &label)?;
    log::info!("Read {} cleaned records from {label}", records.len());
    Ok(records)
}

/// Reads cleaned records from any byte source. `label` is used in error
/// messages in place of a file path.
///
/// # Errors
///
/// Same as [`read_records`].
pub fn read_records_from(
    reader: impl Read,
    label: &str,
) -> Result<Vec<CleanedRecord>, SchemaError> {
    read_from_csv(csv::ReaderBuilder::new().from_reader(reader), label)
}

fn read_from_csv<R: Read>(
    mut reader: csv::Reader<R>,
    label: &str,
) -> Result<Vec<CleanedRecord>, SchemaError> {
    let csv_err = |e| SchemaError::Csv {
        path: label.to_string(),
        source: e,
    };

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();
    let columns = ColumnIndex::resolve(&headers, label)?;

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let row = result.map_err(csv_err)?;
        records.push(columns.parse_row(&row, i as u64 + 1)?);
    }

    Ok(records)
}

/// Header positions of the required columns.
struct ColumnIndex {
    positions: Vec<usize>,
}

impl ColumnIndex {
    fn resolve(headers: &[String], label: &str) -> Result<Self, SchemaError> {
        let mut positions = Vec::with_capacity(REQUIRED_COLUMNS.len());
        let mut missing = Vec::new();

        for name in REQUIRED_COLUMNS {
            match headers.iter().position(|h| h == name) {
                Some(pos) => positions.push(pos),
                None => missing.push((*name).to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns {
                path: label.to_string(),
                columns: missing,
            });
        }

        Ok(Self { positions })
    }

    fn cell<'a>(&self, row: &'a StringRecord, column: &str) -> &'a str {
        REQUIRED_COLUMNS
            .iter()
            .position(|c| *c == column)
            .and_then(|i| row.get(self.positions[i]))
            .map_or("", str::trim)
    }

    fn parse_row(&self, row: &StringRecord, row_num: u64) -> Result<CleanedRecord, SchemaError> {
        let cell = |column: &str| self.cell(row, column);
        let invalid = |column: &str, message: &str| SchemaError::InvalidValue {
            row: row_num,
            column: column.to_string(),
            value: cell(column).to_string(),
            message: message.to_string(),
        };

        let id = cell("ID");
        if id.is_empty() {
            return Err(invalid("ID", "accident identifier is required"));
        }

        let severity = parse_severity(cell("Severity"))
            .ok_or_else(|| invalid("Severity", "expected an integer from 1 to 4"))?;
        let start_time = parse_timestamp(cell("Start_Time"))
            .ok_or_else(|| invalid("Start_Time", "unrecognized timestamp"))?;
        let end_time = parse_timestamp(cell("End_Time"))
            .ok_or_else(|| invalid("End_Time", "unrecognized timestamp"))?;

        let optional_number = |column: &str| -> Result<Option<f64>, SchemaError> {
            let raw = cell(column);
            if raw.is_empty() {
                return Ok(None);
            }
            raw.parse::<f64>()
                .map(Some)
                .map_err(|_| invalid(column, "expected a number"))
        };

        let mut infra = InfraFlags::default();
        for flag in InfraFlag::all() {
            let column = flag.source_column();
            let value =
                parse_bool(cell(column)).ok_or_else(|| invalid(column, "expected a boolean"))?;
            infra.set(*flag, value);
        }

        Ok(CleanedRecord {
            id: id.to_string(),
            severity,
            start_time,
            end_time,
            duration_min: optional_number("Duration_min")?,
            street: optional_text(cell("Street")),
            city: optional_text(cell("City")),
            county: optional_text(cell("County")),
            state: optional_text(cell("State")),
            zip: optional_text(cell("Zipcode")),
            timezone: optional_text(cell("Timezone")),
            weather_condition: optional_text(cell("Weather_Condition")),
            temperature_f: optional_number("Temperature(F)")?,
            visibility_mi: optional_number("Visibility(mi)")?,
            description: optional_text(cell("Description")),
            infra,
        })
    }
}

fn optional_text(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Accepts `3` as well as the float rendering `3.0` some writers emit.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_severity(raw: &str) -> Option<AccidentSeverity> {
    let value: u8 = raw.parse().ok().or_else(|| {
        let f: f64 = raw.parse().ok()?;
        (f.fract().abs() < f64::EPSILON && (1.0..=4.0).contains(&f)).then_some(f as u8)
    })?;
    AccidentSeverity::from_value(value).ok()
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Empty cells read as `false`.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Some(true),
        "false" | "f" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}
