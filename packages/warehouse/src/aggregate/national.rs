//! `agg_national_year`: one overview row per year across every state.

use std::collections::{BTreeMap, BTreeSet};

use accident_warehouse_models::{NationalYearRow, WarehouseConfig};
use rayon::prelude::*;

use super::{EnrichedFact, Stats, group_stats, median, pct_change, percent, round3};

/// Distinct places and raw durations seen in one year.
#[derive(Default)]
struct YearSpread<'a> {
    states: BTreeSet<&'a str>,
    cities: BTreeSet<&'a str>,
    durations_ms: Vec<i64>,
}

impl<'a> YearSpread<'a> {
    fn add(&mut self, fact: &EnrichedFact<'a>) {
        if let Some(state) = fact.location.state.as_deref() {
            self.states.insert(state);
        }
        self.cities.insert(fact.location.city.as_str());
        self.durations_ms
            .push((fact.fact.end_time - fact.fact.start_time).num_milliseconds());
    }

    fn merge(mut self, other: Self) -> Self {
        self.states.extend(other.states);
        self.cities.extend(other.cities);
        self.durations_ms.extend(other.durations_ms);
        self
    }

    #[allow(clippy::cast_precision_loss)]
    fn median_duration_min(&self) -> f64 {
        let minutes = self
            .durations_ms
            .iter()
            .map(|&ms| ms as f64 / 60_000.0)
            .collect();
        median(minutes).unwrap_or_default()
    }
}

/// Groups by year, ascending. Year-over-year changes compare against the
/// previous year present in the data.
#[must_use]
pub fn national_year(facts: &[EnrichedFact<'_>], config: &WarehouseConfig) -> Vec<NationalYearRow> {
    let groups = group_stats(facts, config.high_severity_threshold, |f| f.year);

    let spreads = facts
        .par_iter()
        .fold(BTreeMap::<i32, YearSpread<'_>>::new, |mut years, f| {
            years.entry(f.year).or_default().add(f);
            years
        })
        .reduce(BTreeMap::new, |mut a, b| {
            for (year, spread) in b {
                let merged = a.remove(&year).unwrap_or_default().merge(spread);
                a.insert(year, merged);
            }
            a
        });

    let mut rows = Vec::with_capacity(groups.len());
    let mut previous: Option<Stats> = None;
    let mut cumulative = 0u64;

    for (year, stats) in groups {
        let spread = spreads.get(&year);
        cumulative += stats.count;

        #[allow(clippy::cast_precision_loss)]
        let (yoy_accidents, yoy_severity) = previous.map_or((None, None), |prev| {
            (
                pct_change(stats.count as f64, prev.count as f64),
                pct_change(stats.avg_severity(), prev.avg_severity()),
            )
        });
        previous = Some(stats);

        rows.push(NationalYearRow {
            year,
            total_accidents: stats.count,
            high_severity_count: stats.high_severity,
            high_severity_pct: round3(percent(stats.high_severity, stats.count)),
            avg_severity: round3(stats.avg_severity()),
            std_severity: stats.std_severity().map(round3),
            avg_duration_min: round3(stats.avg_duration_min()),
            median_duration_min: round3(spread.map_or(0.0, YearSpread::median_duration_min)),
            total_states: spread.map_or(0, |s| s.states.len() as u64),
            total_cities: spread.map_or(0, |s| s.cities.len() as u64),
            yoy_accidents_change_pct: yoy_accidents.map(round3),
            yoy_severity_change_pct: yoy_severity.map(round3),
            cumulative_accidents: cumulative,
        });
    }

    rows
}
