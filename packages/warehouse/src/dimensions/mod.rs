//! Dimension builders.
//!
//! Each builder takes the full cleaned record set and returns its
//! deduplicated rows plus a mapping from accident id to dimension key. The
//! three builders share no state and run concurrently via
//! [`rayon::join`].

pub mod location;
pub mod time;
pub mod weather;

use std::collections::{BTreeMap, HashMap};

use accident_warehouse_accident_models::CleanedRecord;
use accident_warehouse_models::WarehouseConfig;
use chrono::Datelike as _;

pub use location::{LocationDimension, build_location_dimension, location_key};
pub use time::{TimeDimension, build_time_dimension, time_key};
pub use weather::{WeatherDimension, build_weather_dimension, categorize_weather};

/// Accident id to dimension key.
pub type KeyMapping = HashMap<String, String>;

/// The three finished dimensions.
#[derive(Debug, Clone)]
pub struct Dimensions {
    pub time: TimeDimension,
    pub location: LocationDimension,
    pub weather: WeatherDimension,
}

/// Builds all three dimensions in parallel.
#[must_use]
pub fn build_dimensions(records: &[CleanedRecord], config: &WarehouseConfig) -> Dimensions {
    let (time, (location, weather)) = rayon::join(
        || build_time_dimension(records, config),
        || {
            rayon::join(
                || build_location_dimension(records, config),
                || build_weather_dimension(records, config),
            )
        },
    );

    log::info!(
        "Built dimensions: {} time, {} location, {} weather rows",
        time.rows.len(),
        location.rows.len(),
        weather.rows.len()
    );

    Dimensions {
        time,
        location,
        weather,
    }
}

/// Groups records by the calendar year of their start time.
pub(crate) fn partition_by_year(records: &[CleanedRecord]) -> BTreeMap<i32, Vec<&CleanedRecord>> {
    let mut partitions: BTreeMap<i32, Vec<&CleanedRecord>> = BTreeMap::new();
    for record in records {
        partitions
            .entry(record.start_time.year())
            .or_default()
            .push(record);
    }
    log::debug!("Partitioned {} records into {} years", records.len(), partitions.len());
    partitions
}
