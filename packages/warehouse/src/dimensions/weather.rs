//! Weather dimension.
//!
//! Free-text conditions are canonicalized by case-insensitive keyword
//! matching. Surrogate keys `W1..Wn` are assigned over the distinct
//! categories sorted by label, so the key of a category depends only on
//! which categories occur, never on record order.

use std::collections::{BTreeMap, BTreeSet};

use accident_warehouse_accident_models::{CleanedRecord, WeatherCategory};
use accident_warehouse_models::{WarehouseConfig, WeatherDimensionRow};
use rayon::prelude::*;

use super::{KeyMapping, partition_by_year};

/// Keyword table, checked in order. The first category with a matching
/// keyword wins; text matching nothing is [`WeatherCategory::Clear`].
const CATEGORY_KEYWORDS: &[(WeatherCategory, &[&str])] = &[
    (WeatherCategory::Fog, &["fog", "mist", "haze"]),
    (WeatherCategory::Snow, &["snow", "ice", "sleet", "freezing"]),
    (WeatherCategory::Rain, &["rain", "drizzle", "shower"]),
    (WeatherCategory::Windy, &["wind", "storm", "thunder"]),
    (WeatherCategory::Cloudy, &["cloud", "overcast"]),
];

#[derive(Debug, Clone)]
pub struct WeatherDimension {
    /// Sorted by category label, which is also key order.
    pub rows: Vec<WeatherDimensionRow>,
    pub mapping: KeyMapping,
}

/// Maps a free-text weather condition to its canonical category.
///
/// Missing or empty text is [`WeatherCategory::Clear`].
#[must_use]
pub fn categorize_weather(condition: Option<&str>) -> WeatherCategory {
    let Some(text) = condition else {
        return WeatherCategory::Clear;
    };
    let lower = text.to_lowercase();

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| contains_any(&lower, keywords))
        .map_or(WeatherCategory::Clear, |(category, _)| *category)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn distinct_categories<'a>(
    records: impl Iterator<Item = &'a CleanedRecord>,
) -> BTreeSet<WeatherCategory> {
    records
        .map(|r| categorize_weather(r.weather_condition.as_deref()))
        .collect()
}

#[must_use]
pub fn build_weather_dimension(
    records: &[CleanedRecord],
    config: &WarehouseConfig,
) -> WeatherDimension {
    // Keys are always assigned over the union of every partition.
    let categories: BTreeSet<WeatherCategory> = if config.partition_by_year {
        partition_by_year(records)
            .into_par_iter()
            .map(|(_, partition)| distinct_categories(partition.into_iter()))
            .reduce(BTreeSet::new, |mut a, b| {
                a.extend(b);
                a
            })
    } else {
        records
            .par_iter()
            .fold(BTreeSet::new, |mut set, r| {
                set.insert(categorize_weather(r.weather_condition.as_deref()));
                set
            })
            .reduce(BTreeSet::new, |mut a, b| {
                a.extend(b);
                a
            })
    };

    let mut labelled: Vec<WeatherCategory> = categories.into_iter().collect();
    labelled.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));

    let rows: Vec<WeatherDimensionRow> = labelled
        .iter()
        .enumerate()
        .map(|(i, category)| WeatherDimensionRow {
            weather_key: format!("W{}", i + 1),
            weather_category: *category,
        })
        .collect();

    let key_by_category: BTreeMap<WeatherCategory, String> = rows
        .iter()
        .map(|r| (r.weather_category, r.weather_key.clone()))
        .collect();

    let mapping = records
        .par_iter()
        .filter_map(|r| {
            let category = categorize_weather(r.weather_condition.as_deref());
            key_by_category
                .get(&category)
                .map(|key| (r.id.clone(), key.clone()))
        })
        .collect();

    WeatherDimension { rows, mapping }
}
