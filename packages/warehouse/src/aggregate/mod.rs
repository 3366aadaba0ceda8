//! Aggregation engine.
//!
//! Computes the seven summary tables from the fact table joined to
//! dimension attributes by key. Every aggregate is an order-independent
//! reduction: severities and durations are summed as integers (severity
//! levels and milliseconds) so parallel partial sums merge exactly, and
//! floating-point means are taken only once, at the end, then rounded to
//! three decimals.

pub mod city_pareto;
pub mod infrastructure;
pub mod infrastructure_risk;
pub mod national;
pub mod state_year;
pub mod time_pattern;
pub mod weather_impact;

use std::collections::{BTreeMap, HashMap};

use accident_warehouse_accident_models::{CleanedRecord, InfraFlags, WeatherCategory};
use accident_warehouse_models::{
    CityParetoRow, FactRow, InfrastructureImpactRow, InfrastructureRiskRow, LocationDimensionRow,
    NationalYearRow, StateYearRow, TimePatternRow, WarehouseConfig, WeatherImpactRow,
};
use chrono::Timelike as _;
use rayon::prelude::*;

use crate::WarehouseError;
use crate::dimensions::Dimensions;

pub use city_pareto::city_pareto;
pub use infrastructure::infrastructure_impact;
pub use infrastructure_risk::infrastructure_risk;
pub use national::national_year;
pub use state_year::state_year;
pub use time_pattern::time_pattern;
pub use weather_impact::weather_impact;

/// The seven summary tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    pub state_year: Vec<StateYearRow>,
    pub national_year: Vec<NationalYearRow>,
    pub city_pareto: Vec<CityParetoRow>,
    pub time_pattern: Vec<TimePatternRow>,
    pub weather_impact: Vec<WeatherImpactRow>,
    pub infrastructure_impact: Vec<InfrastructureImpactRow>,
    pub infrastructure_risk: Vec<InfrastructureRiskRow>,
}

/// A fact row with the dimension attributes the aggregates group by.
#[derive(Debug, Clone, Copy)]
pub struct EnrichedFact<'a> {
    pub fact: &'a FactRow,
    pub location: &'a LocationDimensionRow,
    pub year: i32,
    /// 0 = Monday.
    pub day_of_week: u32,
    pub hour: u32,
    pub weather: WeatherCategory,
}

/// Joins every fact to its time, location, and weather rows.
///
/// # Errors
///
/// Returns [`WarehouseError::MissingKey`] if a fact references a key its
/// dimension does not contain.
pub fn enrich<'a>(
    facts: &'a [FactRow],
    dimensions: &'a Dimensions,
) -> Result<Vec<EnrichedFact<'a>>, WarehouseError> {
    let time: HashMap<&str, (i32, u32)> = dimensions
        .time
        .rows
        .iter()
        .map(|r| (r.date_key.as_str(), (r.year, r.day_of_week)))
        .collect();
    let location: HashMap<&str, &LocationDimensionRow> = dimensions
        .location
        .rows
        .iter()
        .map(|r| (r.location_key.as_str(), r))
        .collect();
    let weather: HashMap<&str, WeatherCategory> = dimensions
        .weather
        .rows
        .iter()
        .map(|r| (r.weather_key.as_str(), r.weather_category))
        .collect();

    let missing = |fact: &FactRow, dimension: &str| WarehouseError::MissingKey {
        accident_id: fact.accident_id.clone(),
        dimension: dimension.to_string(),
    };

    facts
        .par_iter()
        .map(|fact| {
            let (year, day_of_week) = *time
                .get(fact.date_key.as_str())
                .ok_or_else(|| missing(fact, "time"))?;
            let location = *location
                .get(fact.location_key.as_str())
                .ok_or_else(|| missing(fact, "location"))?;
            let weather = *weather
                .get(fact.weather_key.as_str())
                .ok_or_else(|| missing(fact, "weather"))?;
            Ok(EnrichedFact {
                fact,
                location,
                year,
                day_of_week,
                hour: fact.start_time.hour(),
                weather,
            })
        })
        .collect()
}

/// Computes all aggregates concurrently.
///
/// `records` supplies the per-accident infrastructure flags, which the
/// fact table does not carry.
///
/// # Errors
///
/// Returns an error if a fact cannot be joined to its dimensions.
pub fn compute_aggregates(
    records: &[CleanedRecord],
    facts: &[FactRow],
    dimensions: &Dimensions,
    config: &WarehouseConfig,
) -> Result<Aggregates, WarehouseError> {
    let enriched = enrich(facts, dimensions)?;
    let enriched = enriched.as_slice();
    let flags: HashMap<&str, InfraFlags> =
        records.iter().map(|r| (r.id.as_str(), r.infra)).collect();
    let weather_rows = &dimensions.weather.rows;

    let (trends, (patterns, infrastructure)) = rayon::join(
        || {
            rayon::join(
                || state_year(enriched, config),
                || national_year(enriched, config),
            )
        },
        || {
            rayon::join(
                || {
                    rayon::join(
                        || city_pareto(enriched, config),
                        || {
                            rayon::join(
                                || time_pattern(enriched, config),
                                || weather_impact(enriched, weather_rows, config),
                            )
                        },
                    )
                },
                || {
                    rayon::join(
                        || infrastructure_impact(enriched, config),
                        || infrastructure_risk(enriched, &flags, config),
                    )
                },
            )
        },
    );
    let (state_year, national_year) = trends;
    let (city_pareto, (time_pattern, weather_impact)) = patterns;
    let (infrastructure_impact, infrastructure_risk) = infrastructure;

    log::info!(
        "Computed aggregates: {} state-year, {} national-year, {} city, {} time-pattern, \
         {} weather, {} infrastructure, {} infrastructure-risk rows",
        state_year.len(),
        national_year.len(),
        city_pareto.len(),
        time_pattern.len(),
        weather_impact.len(),
        infrastructure_impact.len(),
        infrastructure_risk.len()
    );

    Ok(Aggregates {
        state_year,
        national_year,
        city_pareto,
        time_pattern,
        weather_impact,
        infrastructure_impact,
        infrastructure_risk,
    })
}

/// Exact running totals for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub count: u64,
    pub severity_sum: u64,
    /// Sum of squared severity levels.
    pub severity_sq_sum: u64,
    pub duration_ms: i128,
    pub high_severity: u64,
    /// Count per severity level, index 0 = level 1.
    pub by_severity: [u64; 4],
}

impl Stats {
    /// Adds one fact.
    pub fn add(&mut self, fact: &FactRow, high_severity_threshold: u8) {
        self.count += 1;
        self.severity_sum += u64::from(fact.severity);
        self.severity_sq_sum += u64::from(fact.severity) * u64::from(fact.severity);
        self.duration_ms += i128::from((fact.end_time - fact.start_time).num_milliseconds());
        if fact.severity >= high_severity_threshold {
            self.high_severity += 1;
        }
        if let Some(slot) = usize::from(fact.severity)
            .checked_sub(1)
            .and_then(|i| self.by_severity.get_mut(i))
        {
            *slot += 1;
        }
    }

    /// Combines two partial totals.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.count += other.count;
        self.severity_sum += other.severity_sum;
        self.severity_sq_sum += other.severity_sq_sum;
        self.duration_ms += other.duration_ms;
        self.high_severity += other.high_severity;
        for (slot, n) in self.by_severity.iter_mut().zip(other.by_severity) {
            *slot += n;
        }
        self
    }

    /// Mean severity, or 0 for an empty group.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_severity(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.severity_sum as f64 / self.count as f64
    }

    /// Sample standard deviation of severity, `None` below two facts.
    ///
    /// The variance numerator `n * sum(x^2) - sum(x)^2` is exact in
    /// integers, so merged partials give the same result as one pass.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn std_severity(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        let n = u128::from(self.count);
        let sum = u128::from(self.severity_sum);
        let numerator = n * u128::from(self.severity_sq_sum) - sum * sum;
        Some((numerator as f64 / (n * (n - 1)) as f64).sqrt())
    }

    /// Mean duration in minutes, or 0 for an empty group.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_duration_min(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.duration_ms as f64 / self.count as f64 / 60_000.0
    }

    /// Share of high-severity accidents, in percent.
    #[must_use]
    pub fn high_severity_rate(&self) -> f64 {
        percent(self.high_severity, self.count)
    }
}

/// Groups enriched facts by `key` and totals each group, in parallel.
pub fn group_stats<K, F>(facts: &[EnrichedFact<'_>], threshold: u8, key: F) -> BTreeMap<K, Stats>
where
    K: Ord + Send,
    F: Fn(&EnrichedFact<'_>) -> K + Sync + Send,
{
    facts
        .par_iter()
        .fold(BTreeMap::new, |mut groups: BTreeMap<K, Stats>, f| {
            groups.entry(key(f)).or_default().add(f.fact, threshold);
            groups
        })
        .reduce(BTreeMap::new, |mut a, b| {
            for (k, stats) in b {
                let merged = a.remove(&k).unwrap_or_default().merge(stats);
                a.insert(k, merged);
            }
            a
        })
}

/// Totals every fact matching `predicate`.
pub fn total_where<P>(facts: &[EnrichedFact<'_>], threshold: u8, predicate: P) -> Stats
where
    P: Fn(&EnrichedFact<'_>) -> bool + Sync + Send,
{
    facts
        .par_iter()
        .filter(|f| predicate(f))
        .fold(Stats::default, |mut stats, f| {
            stats.add(f.fact, threshold);
            stats
        })
        .reduce(Stats::default, Stats::merge)
}

/// Rounds to three decimals.
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Rounds to one decimal.
#[must_use]
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `part / whole` in percent, 0 when `whole` is 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Median of `values`, averaging the two middle values for an even count.
/// `None` when empty.
#[must_use]
pub fn median(mut values: Vec<f64>) -> Option<f64> {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    match values.len() {
        0 => None,
        n if n % 2 == 1 => values.get(mid).copied(),
        _ => Some((values[mid - 1] + values[mid]) / 2.0),
    }
}

/// Relative change from `baseline` to `value` in percent, `None` when the
/// baseline is 0.
#[must_use]
pub fn pct_change(value: f64, baseline: f64) -> Option<f64> {
    if baseline.abs() < f64::EPSILON {
        return None;
    }
    Some((value - baseline) / baseline * 100.0)
}
