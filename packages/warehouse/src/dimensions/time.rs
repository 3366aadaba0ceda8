//! Time dimension: one row per distinct date (or date and hour).

use std::collections::BTreeMap;

use accident_warehouse_accident_models::CleanedRecord;
use accident_warehouse_models::{TimeDimensionRow, TimeGranularity, WarehouseConfig};
use chrono::{Datelike as _, NaiveDateTime, Timelike as _};
use rayon::prelude::*;

use super::KeyMapping;

/// Full weekday names indexed by days from Monday.
pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone)]
pub struct TimeDimension {
    /// Sorted by `date_key`.
    pub rows: Vec<TimeDimensionRow>,
    pub mapping: KeyMapping,
}

/// Returns the time key of a timestamp: `YYYY-MM-DD`, or `YYYY-MM-DDTHH`
/// under hourly granularity.
#[must_use]
pub fn time_key(ts: &NaiveDateTime, granularity: TimeGranularity) -> String {
    match granularity {
        TimeGranularity::Date => ts.format("%Y-%m-%d").to_string(),
        TimeGranularity::Hour => ts.format("%Y-%m-%dT%H").to_string(),
    }
}

#[must_use]
pub fn build_time_dimension(records: &[CleanedRecord], config: &WarehouseConfig) -> TimeDimension {
    let keyed: Vec<(String, String, NaiveDateTime)> = records
        .par_iter()
        .map(|r| {
            (
                r.id.clone(),
                time_key(&r.start_time, config.time_granularity),
                r.start_time,
            )
        })
        .collect();

    // Every attribute is a function of the key, so any representative
    // timestamp will do.
    let mut distinct: BTreeMap<&str, NaiveDateTime> = BTreeMap::new();
    for (_, key, ts) in &keyed {
        distinct.entry(key.as_str()).or_insert(*ts);
    }

    let rows = distinct
        .into_iter()
        .map(|(key, ts)| time_row(key, &ts, config))
        .collect();

    let mapping = keyed.into_iter().map(|(id, key, _)| (id, key)).collect();

    TimeDimension { rows, mapping }
}

fn time_row(key: &str, ts: &NaiveDateTime, config: &WarehouseConfig) -> TimeDimensionRow {
    let date = ts.date();
    let day_of_week = date.weekday().num_days_from_monday();
    let hour = match config.time_granularity {
        TimeGranularity::Date => None,
        TimeGranularity::Hour => Some(ts.hour()),
    };

    TimeDimensionRow {
        date_key: key.to_string(),
        date,
        day: date.day(),
        month: date.month(),
        quarter: (date.month() - 1) / 3 + 1,
        year: date.year(),
        hour,
        day_of_week,
        day_name: DAY_NAMES[day_of_week as usize].to_string(),
        is_weekend: day_of_week >= 5,
        time_period: hour.and_then(|h| config.time_period(h)).map(str::to_string),
        is_peak: hour.map(|h| config.is_peak(h)),
    }
}
