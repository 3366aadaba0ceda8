//! `agg_city_pareto`: cities ranked by accident count with the Pareto
//! prefix flagged.

use accident_warehouse_models::{CityParetoRow, WarehouseConfig};

use super::{EnrichedFact, group_stats, percent, round3};

/// Slack for comparing a cumulative share against the threshold, so a
/// share that lands exactly on it closes the prefix.
const SHARE_EPSILON: f64 = 1e-9;

/// Ranks cities by count (descending, ties by city name) and flags the
/// smallest prefix whose cumulative share reaches
/// `config.pareto_threshold`.
#[must_use]
pub fn city_pareto(facts: &[EnrichedFact<'_>], config: &WarehouseConfig) -> Vec<CityParetoRow> {
    let groups = group_stats(facts, config.high_severity_threshold, |f| {
        f.location.city.clone()
    });
    let total: u64 = groups.values().map(|s| s.count).sum();

    let mut ranked: Vec<_> = groups.into_iter().collect();
    ranked.sort_by(|(a_city, a), (b_city, b)| {
        b.count.cmp(&a.count).then_with(|| a_city.cmp(b_city))
    });

    let mut rows = Vec::with_capacity(ranked.len());
    let mut cumulative = 0u64;

    for (i, (city, stats)) in ranked.into_iter().enumerate() {
        // In the prefix iff the share before this row had not yet reached
        // the threshold.
        let share_before = percent(cumulative, total) / 100.0;
        let is_pareto = share_before + SHARE_EPSILON < config.pareto_threshold;
        cumulative += stats.count;

        rows.push(CityParetoRow {
            rank: i as u64 + 1,
            city,
            total_accidents: stats.count,
            avg_severity: round3(stats.avg_severity()),
            high_severity_count: stats.high_severity,
            avg_duration_min: round3(stats.avg_duration_min()),
            pct_of_total: round3(percent(stats.count, total)),
            cumulative_count: cumulative,
            cumulative_pct: round3(percent(cumulative, total)),
            is_pareto,
        });
    }

    rows
}
